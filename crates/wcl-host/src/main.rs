//! WCL host entry point (spec.md §4.9 / C9, tying in C10's stub registry
//! and C12's rasterizer behind it). Loads config, reads the PE image off
//! disk, runs `wcl_pe::load` against `wcl_win32::Resolver`, and jumps to
//! the entry point. Grounded on `citc_compositor/src/main.rs`'s
//! composition style (parse args -> load config -> init logging -> build
//! -> run), reduced to a single load-then-run step since there is no
//! per-frame loop here — the loaded PE drives its own message pump
//! through `user32::GetMessageA` once control transfers to it.

mod args;
mod config;

use clap::Parser;

use wcl_pe::{ImportOptions, PeError};

fn main() {
    let args = args::Args::parse();
    let config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("wcl-host: config error: {e}");
            std::process::exit(1);
        }
    };

    let filter = format!("wcl_host={},wcl_pe={},wcl_win32={}", config.log_level, config.log_level, config.log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let image = match std::fs::read(&args.image) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("fatal: failed to read {}: {e}", args.image.display());
            std::process::exit(1);
        }
    };

    let resolver = wcl_win32::Resolver;
    let import_opts = ImportOptions { tolerate_unresolved: config.tolerate_unresolved_imports };

    let loaded = match wcl_pe::load(&image, &resolver, import_opts) {
        Ok(loaded) => loaded,
        Err(PeError::UnresolvedImport { dll, symbol }) => {
            log::error!("fatal: unresolved import {dll}!{symbol} (pass --tolerate-unresolved to continue anyway)");
            std::process::exit(1);
        }
        Err(e) => {
            log::error!("fatal: failed to load {}: {e}", args.image.display());
            std::process::exit(1);
        }
    };

    log::info!(
        "loaded {} at base 0x{:X}, entry 0x{:X}",
        args.image.display(),
        loaded.base,
        loaded.entry_point
    );

    // Safety: `load` only returns `Ok` after mapping the image executable,
    // relocating it, and resolving every import against `Resolver` (or
    // leaving it deliberately null under `tolerate_unresolved`); the
    // entry point it reports is exactly the address `load` computed.
    let exit_code = match unsafe { wcl_pe::call_entry(loaded.entry_point) } {
        Ok(code) => code,
        Err(e) => {
            log::error!("fatal: entry-point trampoline failed: {e}");
            std::process::exit(1);
        }
    };

    log::info!("guest process exited with code {exit_code}");
    std::process::exit(exit_code);
}
