//! Compositor entry point (spec.md §4.7, §5 / C7). Loads config, opens
//! input devices, starts the CDP server, and drives the per-frame event
//! loop. Grounded on the teacher's `main.rs` composition style (parse
//! args -> load config -> init logging -> build subsystems -> run) and
//! on `compositor/state.rs::init_wayland_listener`'s use of `calloop`
//! for loop timing.

use std::os::fd::RawFd;
use std::time::Duration;

use clap::Parser;
use nix::poll::{poll, PollFd, PollFlags};

use citc_compositor::args::Args;
use citc_compositor::input::InputDevice;
use citc_compositor::server::CdpServer;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const INPUT_DEVICE_GLOB_MAX: u32 = 32;

fn discover_input_devices() -> Vec<String> {
    (0..INPUT_DEVICE_GLOB_MAX)
        .map(|n| format!("/dev/input/event{n}"))
        .filter(|p| std::path::Path::new(p).exists())
        .collect()
}

/// Non-blocking readiness check for one fd, used to decide which client
/// sockets need `service_client` on this tick (spec.md §4.7's per-frame
/// loop combining listener, devices, and clients).
fn readable(fd: RawFd) -> bool {
    let mut fds = [PollFd::new(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }, PollFlags::POLLIN)];
    matches!(poll(&mut fds, 0), Ok(n) if n > 0)
}

fn main() {
    let args = Args::parse();
    let config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("citc-compositor: config error: {e}");
            std::process::exit(1);
        }
    };

    let filter = format!("citc_compositor={},citc_proto={}", config.log_level, config.log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let device_paths = if config.input_devices.is_empty() {
        discover_input_devices()
    } else {
        config.input_devices.clone()
    };
    let mut devices = Vec::new();
    for path in &device_paths {
        match InputDevice::open(path) {
            Ok(dev) => {
                log::info!("opened input device {path} as {:?}", dev.kind);
                devices.push(dev);
            }
            Err(e) => log::warn!("failed to open input device {path}: {e}"),
        }
    }

    let mut server = match CdpServer::new(&config.socket_path, config.screen_w, config.screen_h, devices) {
        Ok(s) => s,
        Err(e) => {
            log::error!("fatal: failed to start compositor server: {e}");
            std::process::exit(1);
        }
    };

    // `calloop` drives the tick itself (frame pacing), matching the
    // teacher's use of the same reactor for its display/listener sources;
    // readiness of the listener, input devices, and the dynamic set of
    // client sockets is then resolved by a non-blocking poll each tick,
    // since CDP's client set changes far more often than the teacher's
    // single Wayland display source ever does.
    let mut event_loop: calloop::EventLoop<'_, ()> =
        calloop::EventLoop::try_new().expect("create compositor event loop");
    let timer = calloop::timer::Timer::from_duration(FRAME_INTERVAL);
    event_loop
        .handle()
        .insert_source(timer, |_deadline, _, _data| {
            calloop::timer::TimeoutAction::ToDuration(FRAME_INTERVAL)
        })
        .expect("install frame timer");

    log::info!("citc-compositor listening on {} ({}x{})", config.socket_path, config.screen_w, config.screen_h);

    loop {
        if let Err(e) = event_loop.dispatch(Some(FRAME_INTERVAL), &mut ()) {
            log::error!("event loop dispatch error: {e}");
            break;
        }

        if let Err(e) = server.accept_one() {
            log::warn!("accept error: {e}");
        }
        server.pump_input();
        for (idx, fd) in server.client_fds() {
            if readable(fd) {
                server.service_client(idx);
            }
        }
        server.render_frame();

        if server.should_quit() {
            log::info!("citc-compositor shutting down");
            break;
        }
    }
}
