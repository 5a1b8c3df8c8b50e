//! XAudio2: the same background-PCM-to-mixer path as `dsound`, behind
//! the newer `IXAudio2`/`IXAudio2SourceVoice` COM surface (spec.md
//! §4.10). `SubmitSourceBuffer` plays the role `Lock`+`Unlock` plays for
//! DirectSound: one call hands over a whole buffer of PCM at once.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::audio_sink::AudioSink;
use crate::dsound::WaveFormatEx;

#[repr(C)]
pub struct XAudio2Buffer {
    pub flags: u32,
    pub audio_bytes: u32,
    pub audio_data: *const u8,
    pub play_begin: u32,
    pub play_length: u32,
    pub loop_begin: u32,
    pub loop_length: u32,
    pub loop_count: u32,
    pub context: usize,
}

#[repr(C)]
struct VoiceVtbl {
    submit_source_buffer: unsafe extern "win64" fn(*mut SourceVoice, *const XAudio2Buffer, usize) -> i32,
    start: extern "win64" fn(*mut SourceVoice, u32, u32) -> i32,
    stop: extern "win64" fn(*mut SourceVoice, u32, u32) -> i32,
    destroy_voice: extern "win64" fn(*mut SourceVoice),
}

static VOICE_VTBL: VoiceVtbl = VoiceVtbl {
    submit_source_buffer: voice_submit_source_buffer,
    start: voice_start,
    stop: voice_stop,
    destroy_voice: voice_destroy,
};

#[repr(C)]
struct SourceVoice {
    vtbl: *const VoiceVtbl,
    sink: Mutex<AudioSink>,
}

/// # Safety
/// `buffer` must point at a readable `XAudio2Buffer` whose `audio_data`
/// points at `audio_bytes` readable bytes.
unsafe extern "win64" fn voice_submit_source_buffer(this: *mut SourceVoice, buffer: *const XAudio2Buffer, _ctx: usize) -> i32 {
    let buf = &*buffer;
    let data = std::slice::from_raw_parts(buf.audio_data, buf.audio_bytes as usize);
    (*this).sink.lock().unwrap().write_pcm(data);
    0
}

extern "win64" fn voice_start(_this: *mut SourceVoice, _flags: u32, _operation_set: u32) -> i32 {
    0
}

extern "win64" fn voice_stop(_this: *mut SourceVoice, _flags: u32, _operation_set: u32) -> i32 {
    0
}

extern "win64" fn voice_destroy(this: *mut SourceVoice) {
    unsafe { drop(Box::from_raw(this)) };
}

#[repr(C)]
struct EngineVtbl {
    create_source_voice: unsafe extern "win64" fn(*mut Engine, *mut usize, *const WaveFormatEx, u32, f32, usize, usize, usize) -> i32,
    release: extern "win64" fn(*mut Engine),
}

static ENGINE_VTBL: EngineVtbl = EngineVtbl { create_source_voice: engine_create_source_voice, release: engine_release };

#[repr(C)]
struct Engine {
    vtbl: *const EngineVtbl,
    refcount: AtomicU32,
}

/// # Safety
/// `format` must point at a readable `WaveFormatEx`; `out_voice` must be
/// writable for one pointer.
unsafe extern "win64" fn engine_create_source_voice(
    _this: *mut Engine,
    out_voice: *mut usize,
    format: *const WaveFormatEx,
    _flags: u32,
    _max_frequency_ratio: f32,
    _callback: usize,
    _send_list: usize,
    _effect_chain: usize,
) -> i32 {
    let fmt = &*format;
    let sink = AudioSink::open_best_effort(fmt.samples_per_sec, fmt.channels, fmt.bits_per_sample);
    let voice = Box::new(SourceVoice { vtbl: &VOICE_VTBL, sink: Mutex::new(sink) });
    *out_voice = Box::into_raw(voice) as usize;
    0
}

extern "win64" fn engine_release(this: *mut Engine) {
    unsafe {
        if (*this).refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            drop(Box::from_raw(this));
        }
    }
}

/// # Safety
/// `out_engine` must be writable for one pointer.
pub unsafe extern "win64" fn x_audio2_create(out_engine: *mut usize, _flags: u32, _processor: u32) -> i32 {
    let engine = Box::new(Engine { vtbl: &ENGINE_VTBL, refcount: AtomicU32::new(1) });
    *out_engine = Box::into_raw(engine) as usize;
    0
}
