//! DirectSound8: a COM device whose sound buffers background-stream PCM
//! to the mixing server (spec.md §4.10). Represented per spec.md §4.9's
//! ABI note: a `#[repr(C)]` object whose first field is a vtable pointer,
//! materialized only at the PE boundary — the `Lock`/`Unlock`/`Play`/
//! `Stop` bodies are plain safe Rust underneath.

use std::ffi::c_void;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::audio_sink::AudioSink;
use crate::types::{BOOL, TRUE};

#[repr(C)]
pub struct WaveFormatEx {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub cb_size: u16,
}

#[repr(C)]
pub struct DsBufferDesc {
    pub size: u32,
    pub flags: u32,
    pub buffer_bytes: u32,
    pub reserved: u32,
    pub wfx_format: *const WaveFormatEx,
}

#[repr(C)]
struct BufferVtbl {
    query_interface: extern "win64" fn(*mut SoundBuffer, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut SoundBuffer) -> u32,
    release: extern "win64" fn(*mut SoundBuffer) -> u32,
    lock: unsafe extern "win64" fn(*mut SoundBuffer, u32, u32, *mut usize, *mut u32, *mut usize, *mut u32, u32) -> i32,
    unlock: unsafe extern "win64" fn(*mut SoundBuffer, usize, u32, usize, u32) -> i32,
    play: extern "win64" fn(*mut SoundBuffer, u32, u32, u32) -> i32,
    stop: extern "win64" fn(*mut SoundBuffer) -> i32,
}

static BUFFER_VTBL: BufferVtbl = BufferVtbl {
    query_interface: buffer_query_interface,
    add_ref: buffer_add_ref,
    release: buffer_release,
    lock: buffer_lock,
    unlock: buffer_unlock,
    play: buffer_play,
    stop: buffer_stop,
};

#[repr(C)]
struct SoundBuffer {
    vtbl: *const BufferVtbl,
    refcount: AtomicU32,
    sink: Mutex<AudioSink>,
    // Tracks the scratch allocation handed out by `Lock`, so `Unlock`
    // knows what to free; real DirectSound allows no more than one
    // outstanding lock per buffer, which this mirrors.
    locked: Mutex<Option<(*mut u8, usize)>>,
}
unsafe impl Send for SoundBuffer {}
unsafe impl Sync for SoundBuffer {}

extern "win64" fn buffer_query_interface(_this: *mut SoundBuffer, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    -2147467262 // E_NOINTERFACE
}

extern "win64" fn buffer_add_ref(this: *mut SoundBuffer) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn buffer_release(this: *mut SoundBuffer) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

/// # Safety
/// `this` must be a live `SoundBuffer`; the four `out_*` pointers must be
/// writable for a pointer/u32 pair each.
unsafe extern "win64" fn buffer_lock(
    this: *mut SoundBuffer,
    _offset: u32,
    bytes: u32,
    out_ptr1: *mut usize,
    out_bytes1: *mut u32,
    out_ptr2: *mut usize,
    out_bytes2: *mut u32,
    _flags: u32,
) -> i32 {
    let scratch = libc::malloc(bytes as usize) as *mut u8;
    *(*this).locked.lock().unwrap() = Some((scratch, bytes as usize));
    *out_ptr1 = scratch as usize;
    *out_bytes1 = bytes;
    if !out_ptr2.is_null() {
        *out_ptr2 = 0;
    }
    if !out_bytes2.is_null() {
        *out_bytes2 = 0;
    }
    0 // DS_OK
}

/// # Safety
/// `ptr1` must be exactly the pointer `Lock` handed back for this
/// buffer's current lock.
unsafe extern "win64" fn buffer_unlock(this: *mut SoundBuffer, ptr1: usize, bytes1: u32, _ptr2: usize, _bytes2: u32) -> i32 {
    let locked = (*this).locked.lock().unwrap().take();
    if let Some((scratch, _)) = locked {
        debug_assert_eq!(scratch as usize, ptr1);
        let data = std::slice::from_raw_parts(ptr1 as *const u8, bytes1 as usize);
        (*this).sink.lock().unwrap().write_pcm(data);
        libc::free(scratch as *mut c_void);
    }
    0
}

extern "win64" fn buffer_play(_this: *mut SoundBuffer, _reserved1: u32, _priority: u32, _flags: u32) -> i32 {
    0
}

extern "win64" fn buffer_stop(_this: *mut SoundBuffer) -> i32 {
    0
}

#[repr(C)]
struct DeviceVtbl {
    query_interface: extern "win64" fn(*mut Device, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut Device) -> u32,
    release: extern "win64" fn(*mut Device) -> u32,
    create_sound_buffer: unsafe extern "win64" fn(*mut Device, *const DsBufferDesc, *mut usize, usize) -> i32,
}

static DEVICE_VTBL: DeviceVtbl = DeviceVtbl {
    query_interface: device_query_interface,
    add_ref: device_add_ref,
    release: device_release,
    create_sound_buffer: device_create_sound_buffer,
};

#[repr(C)]
struct Device {
    vtbl: *const DeviceVtbl,
    refcount: AtomicU32,
}

extern "win64" fn device_query_interface(_this: *mut Device, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    -2147467262
}

extern "win64" fn device_add_ref(this: *mut Device) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn device_release(this: *mut Device) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

/// # Safety
/// `desc` must point at a readable `DsBufferDesc` whose `wfx_format`
/// points at a readable `WaveFormatEx`; `out_buffer` must be writable for
/// one pointer.
unsafe extern "win64" fn device_create_sound_buffer(
    _this: *mut Device,
    desc: *const DsBufferDesc,
    out_buffer: *mut usize,
    _outer: usize,
) -> i32 {
    let desc = &*desc;
    let fmt = &*desc.wfx_format;
    let sink = AudioSink::open_best_effort(fmt.samples_per_sec, fmt.channels, fmt.bits_per_sample);
    let buffer = Box::new(SoundBuffer {
        vtbl: &BUFFER_VTBL,
        refcount: AtomicU32::new(1),
        sink: Mutex::new(sink),
        locked: Mutex::new(None),
    });
    *out_buffer = Box::into_raw(buffer) as usize;
    0
}

/// Called from `ole32::co_create_instance` when the guest asks for
/// `CLSID_DirectSound8`.
pub fn create_directsound8() -> usize {
    let device = Box::new(Device { vtbl: &DEVICE_VTBL, refcount: AtomicU32::new(1) });
    Box::into_raw(device) as usize
}

pub extern "win64" fn direct_sound_create8(_guid_device: usize, out: *mut usize, _outer: usize) -> BOOL {
    unsafe { *out = create_directsound8() };
    TRUE
}
