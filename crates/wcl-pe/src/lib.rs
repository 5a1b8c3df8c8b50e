//! PE/COFF image loading (spec.md §4.9 / C9): header validation, section
//! mapping, base relocation, import resolution, and the entry-point
//! trampoline. The stub registry imports resolve against lives in
//! `wcl-win32`; this crate only defines the [`imports::ImportResolver`]
//! seam it calls through.

pub mod error;
pub mod header;
pub mod imports;
pub mod loader;
pub mod reloc;
pub mod trampoline;

pub use error::PeError;
pub use header::{Bitness, NtHeaders};
pub use imports::{ImportOptions, ImportResolver, ImportSymbol};
pub use loader::{load, LoadedImage};
pub use trampoline::call_entry;
