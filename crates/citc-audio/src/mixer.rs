//! Mixes concurrent 16-bit PCM streams by saturating sum (spec.md §4.11).
//! There is no seeking and no backpressure: a stream that doesn't have
//! enough queued samples for a tick contributes silence for the rest of it,
//! and packets that arrive after a stream is closed are simply dropped.

use std::collections::{HashMap, VecDeque};

pub struct Stream {
    pub rate: u32,
    pub channels: u16,
    pub bits: u16,
    samples: VecDeque<i16>,
}

impl Stream {
    fn push(&mut self, payload: &[u8]) {
        if self.bits != 16 {
            log::warn!("stream with bits={} treated as 16-bit PCM", self.bits);
        }
        for chunk in payload.chunks_exact(2) {
            self.samples.push_back(i16::from_le_bytes([chunk[0], chunk[1]]));
        }
    }
}

#[derive(Default)]
pub struct Mixer {
    streams: HashMap<u32, Stream>,
    next_id: u32,
}

impl Mixer {
    pub fn new() -> Self {
        Self { streams: HashMap::new(), next_id: 1 }
    }

    pub fn open_stream(&mut self, rate: u32, channels: u16, bits: u16) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.streams.insert(id, Stream { rate, channels, bits, samples: VecDeque::new() });
        id
    }

    /// Late packets for an unknown or already-closed stream are dropped.
    pub fn write(&mut self, stream_id: u32, payload: &[u8]) {
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.push(payload);
        } else {
            log::debug!("dropping write for unknown/closed stream {stream_id}");
        }
    }

    pub fn close_stream(&mut self, stream_id: u32) {
        self.streams.remove(&stream_id);
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Pulls up to `frame_samples` samples from every open stream and sums
    /// them with saturating arithmetic, padding exhausted streams with
    /// silence so every stream contributes the same frame length.
    pub fn mix_tick(&mut self, frame_samples: usize) -> Vec<i16> {
        let mut out = vec![0i16; frame_samples];
        for stream in self.streams.values_mut() {
            for slot in out.iter_mut() {
                let sample = stream.samples.pop_front().unwrap_or(0);
                *slot = slot.saturating_add(sample);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn open_stream_ids_are_unique_and_nonzero() {
        let mut mixer = Mixer::new();
        let a = mixer.open_stream(44100, 2, 16);
        let b = mixer.open_stream(44100, 2, 16);
        assert_ne!(a, b);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
    }

    #[test]
    fn mixes_two_streams_with_saturation() {
        let mut mixer = Mixer::new();
        let a = mixer.open_stream(44100, 1, 16);
        let b = mixer.open_stream(44100, 1, 16);
        mixer.write(a, &samples_to_bytes(&[30000, -30000]));
        mixer.write(b, &samples_to_bytes(&[30000, -30000]));
        let mixed = mixer.mix_tick(2);
        assert_eq!(mixed, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn exhausted_stream_contributes_silence() {
        let mut mixer = Mixer::new();
        let a = mixer.open_stream(44100, 1, 16);
        mixer.write(a, &samples_to_bytes(&[100]));
        let mixed = mixer.mix_tick(3);
        assert_eq!(mixed, vec![100, 0, 0]);
    }

    #[test]
    fn write_to_unknown_stream_is_dropped_not_panicking() {
        let mut mixer = Mixer::new();
        mixer.write(999, &samples_to_bytes(&[1, 2, 3]));
        assert!(mixer.mix_tick(1).iter().all(|&s| s == 0));
    }

    #[test]
    fn closed_stream_no_longer_mixes() {
        let mut mixer = Mixer::new();
        let a = mixer.open_stream(44100, 1, 16);
        mixer.write(a, &samples_to_bytes(&[500]));
        mixer.close_stream(a);
        assert!(mixer.is_empty());
        assert_eq!(mixer.mix_tick(1), vec![0]);
    }
}
