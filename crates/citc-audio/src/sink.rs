//! Where mixed PCM goes once it leaves the mixer. Mirrors
//! `wcl_win32::audio_sink::AudioSink`'s own fallback order, minus the
//! mixer-socket leg (this crate *is* the mixer): raw OSS if the device is
//! openable, else a bit bucket.

use std::io::Write;

pub struct Sink {
    file: Option<std::fs::File>,
}

impl Sink {
    pub fn open(device: &str) -> Self {
        match std::fs::OpenOptions::new().write(true).open(device) {
            Ok(f) => {
                log::info!("mixed output sinking to {device}");
                Self { file: Some(f) }
            }
            Err(e) => {
                log::warn!("no sink device at {device} ({e}), discarding mixed PCM");
                Self { file: None }
            }
        }
    }

    pub fn write_samples(&mut self, samples: &[i16]) {
        let Some(f) = self.file.as_mut() else { return };
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        if let Err(e) = f.write_all(&bytes) {
            log::warn!("sink write failed: {e}");
        }
    }
}
