//! Mixing server entry point (spec.md §4.11, §5 / C11). Loads config,
//! opens the sink, and drives the mix-tick loop. Grounded on
//! `citc-compositor`'s `main.rs` composition style (parse args -> load
//! config -> init logging -> build subsystems -> run) and on its use of
//! `calloop` for tick timing, here generalized from frame pacing to mix
//! pacing (spec.md §5: "a separate process with its own single-threaded
//! loop").

use std::os::fd::RawFd;
use std::time::Duration;

use clap::Parser;
use nix::poll::{poll, PollFd, PollFlags};

use citc_audio::args::Args;
use citc_audio::server::AudioServer;

/// 20ms frames at 44.1kHz; good enough for a mixer with no resampler.
const SAMPLE_RATE: usize = 44_100;

fn readable(fd: RawFd) -> bool {
    let mut fds = [PollFd::new(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN)];
    matches!(poll(&mut fds, 0), Ok(n) if n > 0)
}

fn main() {
    let args = Args::parse();
    let config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("citc-audio: config error: {e}");
            std::process::exit(1);
        }
    };

    let filter = format!("citc_audio={}", config.log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let mut server = match AudioServer::new(&config.socket_path, &config.sink_device) {
        Ok(s) => s,
        Err(e) => {
            log::error!("fatal: failed to start audio server: {e}");
            std::process::exit(1);
        }
    };

    let mix_interval = Duration::from_millis(config.mix_interval_ms);
    let frame_samples = (SAMPLE_RATE * config.mix_interval_ms as usize) / 1000;

    let mut event_loop: calloop::EventLoop<'_, ()> =
        calloop::EventLoop::try_new().expect("create audio mixer event loop");
    let timer = calloop::timer::Timer::from_duration(mix_interval);
    event_loop
        .handle()
        .insert_source(timer, move |_deadline, _, _data| {
            calloop::timer::TimeoutAction::ToDuration(mix_interval)
        })
        .expect("install mix timer");

    log::info!("citc-audio listening on {}", config.socket_path);

    loop {
        if let Err(e) = event_loop.dispatch(Some(mix_interval), &mut ()) {
            log::error!("event loop dispatch error: {e}");
            break;
        }

        if let Err(e) = server.accept_one() {
            log::warn!("accept error: {e}");
        }
        for (idx, fd) in server.client_fds() {
            if readable(fd) {
                server.service_client(idx);
            }
        }
        server.mix_tick(frame_samples);
    }
}
