use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeError {
    #[error("truncated image: expected at least {0} bytes at offset {1}")]
    Truncated(usize, usize),
    #[error("bad DOS signature (expected 'MZ')")]
    BadDosSignature,
    #[error("bad NT signature (expected 'PE\\0\\0')")]
    BadNtSignature,
    #[error("unsupported machine type 0x{0:04X}")]
    UnsupportedMachine(u16),
    #[error("unsupported optional header magic 0x{0:04X}")]
    UnsupportedMagic(u16),
    #[error("malformed section header {0}")]
    MalformedSection(usize),
    #[error("malformed base relocation block at RVA 0x{0:08X}")]
    MalformedReloc(u32),
    #[error("malformed import directory entry {0}")]
    MalformedImport(usize),
    #[error("unresolved import {dll}!{symbol}")]
    UnresolvedImport { dll: String, symbol: String },
    #[error("mmap failed: {0}")]
    Mmap(std::io::Error),
    #[error("mprotect failed: {0}")]
    Mprotect(std::io::Error),
    #[error("entry-point trampoline not implemented for this host architecture")]
    UnsupportedHostArch,
}
