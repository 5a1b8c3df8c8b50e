//! Input dispatcher (spec.md §4.2 / C2): enumerates evdev devices,
//! classifies them, and decodes raw `input_event` records into a
//! normalized stream. Grounded on the teacher's `src/input.rs`
//! (`InputEvent`/`InputEventData` shape, generalized here from
//! WebRTC-forwarded events to evdev-decoded ones) and on
//! `other_examples/eb4c20ad_gabriele-0201-AIGITests__aigi_udev-src-state.rs.rs`'s
//! device-classification style.

use std::fs::File;
use std::io::Read;
use std::os::fd::{AsRawFd, RawFd};

// Linux evdev event-type constants (linux/input-event-codes.h).
const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;
const EV_ABS: u16 = 0x03;

const REL_X: u16 = 0x00;
const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;

const BTN_LEFT: u16 = 0x110;
const BTN_MOUSE: u16 = 0x110;
const BTN_GAMEPAD: u16 = 0x130;

// A representative slice of the evdev keycode space (not alphabetically
// contiguous, unlike ASCII — this mirrors the real kernel numbering).
pub const KEY_A: u16 = 30;
pub const KEY_Z: u16 = 44;
pub const KEY_LEFTSHIFT: u16 = 42;
pub const KEY_RIGHTSHIFT: u16 = 54;
pub const KEY_LEFTCTRL: u16 = 29;
pub const KEY_RIGHTCTRL: u16 = 97;
pub const KEY_SPACE: u16 = 57;
pub const KEY_ENTER: u16 = 28;
pub const KEY_TAB: u16 = 15;
pub const KEY_BACKSPACE: u16 = 14;

/// Raw `input_event` record layout on 64-bit Linux: two `timeval` fields
/// (16 bytes total), then `type`, `code`, `value`.
#[repr(C)]
#[derive(Clone, Copy)]
struct RawInputEvent {
    tv_sec: i64,
    tv_usec: i64,
    ev_type: u16,
    code: u16,
    value: i32,
}

const RAW_EVENT_SIZE: usize = std::mem::size_of::<RawInputEvent>();

fn parse_raw_event(buf: &[u8]) -> Option<RawInputEvent> {
    if buf.len() < RAW_EVENT_SIZE {
        return None;
    }
    let tv_sec = i64::from_ne_bytes(buf[0..8].try_into().ok()?);
    let tv_usec = i64::from_ne_bytes(buf[8..16].try_into().ok()?);
    let ev_type = u16::from_ne_bytes(buf[16..18].try_into().ok()?);
    let code = u16::from_ne_bytes(buf[18..20].try_into().ok()?);
    let value = i32::from_ne_bytes(buf[20..24].try_into().ok()?);
    Some(RawInputEvent { tv_sec, tv_usec, ev_type, code, value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Keyboard,
    RelativePointer,
    AbsolutePointer { max_x: i32, max_y: i32 },
}

/// Capability summary gathered during classification (spec.md §4.2: "A
/// device advertising absolute X/Y is an absolute pointer even if it also
/// reports relative motion... a device with an alphabetical key is a
/// keyboard.").
#[derive(Debug, Default, Clone, Copy)]
pub struct Capabilities {
    pub has_abs_x: bool,
    pub has_abs_y: bool,
    pub has_rel: bool,
    pub has_alpha_key: bool,
    pub abs_max_x: i32,
    pub abs_max_y: i32,
}

impl Capabilities {
    pub fn classify(&self) -> Option<DeviceKind> {
        if self.has_abs_x && self.has_abs_y {
            return Some(DeviceKind::AbsolutePointer { max_x: self.abs_max_x, max_y: self.abs_max_y });
        }
        if self.has_rel {
            return Some(DeviceKind::RelativePointer);
        }
        if self.has_alpha_key {
            return Some(DeviceKind::Keyboard);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedEvent {
    Key { raw_code: u16, pressed: bool },
    PointerRel { dx: i32, dy: i32 },
    PointerAbs { x_raw: i32, y_raw: i32, max_x: i32, max_y: i32 },
    Button { code: u16, pressed: bool },
}

/// Process-wide `{shift, ctrl}` state, updated on modifier transitions
/// and never otherwise reported (spec.md §4.2).
#[derive(Debug, Default, Clone, Copy)]
pub struct ModifierState {
    pub shift: bool,
    pub ctrl: bool,
}

impl ModifierState {
    /// Returns `true` if `code` was a modifier key and the state was
    /// updated; the caller should not emit a `Key` event for it.
    pub fn apply(&mut self, code: u16, pressed: bool) -> bool {
        match code {
            KEY_LEFTSHIFT | KEY_RIGHTSHIFT => {
                self.shift = pressed;
                true
            }
            KEY_LEFTCTRL | KEY_RIGHTCTRL => {
                self.ctrl = pressed;
                true
            }
            _ => false,
        }
    }
}

/// Base and shift keycode -> character tables, deliberately sparse (only
/// the keys exercised in tests and by the user32 VK table need entries).
pub struct KeyTranslator {
    base: [Option<char>; 128],
    shifted: [Option<char>; 128],
}

impl Default for KeyTranslator {
    fn default() -> Self {
        let mut base = [None; 128];
        let mut shifted = [None; 128];
        // evdev alpha row keycodes in physical qwerty order.
        const ROW_CODES: &[u16] = &[
            30, 48, 46, 32, 18, 33, 34, 35, 23, 36, 37, 38, 50, 49, 24, 25, 16, 19, 31, 20, 22, 47,
            17, 45, 21, 44,
        ];
        const ROW_LOWER: &[char] =
            &['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q',
              'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z'];
        for (&code, &lower) in ROW_CODES.iter().zip(ROW_LOWER.iter()) {
            base[code as usize] = Some(lower);
            shifted[code as usize] = Some(lower.to_ascii_uppercase());
        }
        base[KEY_SPACE as usize] = Some(' ');
        shifted[KEY_SPACE as usize] = Some(' ');
        base[KEY_ENTER as usize] = Some('\r');
        shifted[KEY_ENTER as usize] = Some('\r');
        base[KEY_TAB as usize] = Some('\t');
        shifted[KEY_TAB as usize] = Some('\t');
        base[KEY_BACKSPACE as usize] = Some('\u{8}');
        shifted[KEY_BACKSPACE as usize] = Some('\u{8}');
        Self { base, shifted }
    }
}

impl KeyTranslator {
    /// Translates `code` under the current modifier state. With Ctrl held
    /// and a letter, the emitted character is `letter - 'a' + 1`
    /// regardless of shift (spec.md §4.2).
    pub fn translate(&self, code: u16, mods: ModifierState) -> Option<char> {
        let table = if mods.shift { &self.shifted } else { &self.base };
        let ch = *table.get(code as usize)?;
        let ch = ch?;
        if mods.ctrl && ch.is_ascii_alphabetic() {
            let lower = ch.to_ascii_lowercase() as u8;
            return Some((lower - b'a' + 1) as char);
        }
        Some(ch)
    }
}

/// One opened input device.
pub struct InputDevice {
    pub kind: DeviceKind,
    file: File,
}

impl InputDevice {
    /// Opens `path` and classifies it using `EVIOCGBIT` capability
    /// queries. Hot-plug is not supported; devices are opened once at
    /// startup (spec.md §3).
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let caps = query_capabilities(file.as_raw_fd());
        let kind = caps.classify().unwrap_or(DeviceKind::Keyboard);
        Ok(Self { kind, file })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Reads and normalizes the next batch of events available on this
    /// device without blocking past what's already buffered by the
    /// caller's poll/readiness notification.
    pub fn read_events(&mut self) -> std::io::Result<Vec<NormalizedEvent>> {
        let mut buf = vec![0u8; RAW_EVENT_SIZE * 16];
        let n = self.file.read(&mut buf)?;
        let mut out = Vec::new();
        let mut off = 0;
        while off + RAW_EVENT_SIZE <= n {
            if let Some(raw) = parse_raw_event(&buf[off..off + RAW_EVENT_SIZE]) {
                if let Some(ev) = self.normalize(raw) {
                    out.push(ev);
                }
            }
            off += RAW_EVENT_SIZE;
        }
        Ok(out)
    }

    fn normalize(&self, raw: RawInputEvent) -> Option<NormalizedEvent> {
        match raw.ev_type {
            EV_KEY => {
                let pressed = raw.value != 0;
                if raw.code >= BTN_MOUSE && raw.code < BTN_GAMEPAD + 0x10 {
                    Some(NormalizedEvent::Button { code: raw.code, pressed })
                } else {
                    Some(NormalizedEvent::Key { raw_code: raw.code, pressed })
                }
            }
            EV_REL => {
                if raw.code == REL_X {
                    Some(NormalizedEvent::PointerRel { dx: raw.value, dy: 0 })
                } else {
                    Some(NormalizedEvent::PointerRel { dx: 0, dy: raw.value })
                }
            }
            EV_ABS => {
                if let DeviceKind::AbsolutePointer { max_x, max_y } = self.kind {
                    if raw.code == ABS_X {
                        Some(NormalizedEvent::PointerAbs { x_raw: raw.value, y_raw: 0, max_x, max_y })
                    } else if raw.code == ABS_Y {
                        Some(NormalizedEvent::PointerAbs { x_raw: 0, y_raw: raw.value, max_x, max_y })
                    } else {
                        None
                    }
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

// EVIOCGBIT(ev, len) ioctl request numbers, computed the same way the
// kernel's `_IOC` macro does for the `input-event-codes.h` families we
// care about (EV_KEY, EV_REL, EV_ABS).
fn eviocgbit(ev_type: u16, len: usize) -> libc::c_ulong {
    const IOC_READ: u32 = 2;
    const IOC_NRBITS: u32 = 8;
    const IOC_TYPEBITS: u32 = 8;
    const IOC_SIZEBITS: u32 = 14;
    let nr = 0x20 + ev_type as u32;
    let typ = b'E' as u32;
    let size = len as u32;
    ((IOC_READ << (IOC_NRBITS + IOC_TYPEBITS + IOC_SIZEBITS))
        | (typ << IOC_NRBITS)
        | (nr << 0)
        | (size << (IOC_NRBITS + IOC_TYPEBITS))) as libc::c_ulong
}

fn query_capabilities(fd: RawFd) -> Capabilities {
    let mut caps = Capabilities::default();
    let mut key_bits = [0u8; 96]; // covers keycodes 0..767
    let req = eviocgbit(EV_KEY, key_bits.len());
    let ok = unsafe { libc::ioctl(fd, req, key_bits.as_mut_ptr()) } >= 0;
    if ok {
        let bit_set = |bits: &[u8], code: u16| bits[(code / 8) as usize] & (1 << (code % 8)) != 0;
        for code in KEY_A..=KEY_Z {
            if bit_set(&key_bits, code) {
                caps.has_alpha_key = true;
                break;
            }
        }
    }

    let mut abs_bits = [0u8; 4];
    let req = eviocgbit(EV_ABS, abs_bits.len());
    if unsafe { libc::ioctl(fd, req, abs_bits.as_mut_ptr()) } >= 0 {
        let bit_set = |bits: &[u8], code: u16| bits[(code / 8) as usize] & (1 << (code % 8)) != 0;
        caps.has_abs_x = bit_set(&abs_bits, ABS_X);
        caps.has_abs_y = bit_set(&abs_bits, ABS_Y);
        // Absolute pointer max extents would normally come from
        // EVIOCGABS(ABS_X/Y); default to a common touch-panel range when
        // unavailable so classification still succeeds.
        caps.abs_max_x = 32767;
        caps.abs_max_y = 32767;
    }

    let mut rel_bits = [0u8; 1];
    let req = eviocgbit(EV_REL, rel_bits.len());
    if unsafe { libc::ioctl(fd, req, rel_bits.as_mut_ptr()) } >= 0 {
        caps.has_rel = rel_bits[0] & (1 << REL_X) != 0;
    }

    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prefers_absolute_pointer() {
        let caps = Capabilities { has_abs_x: true, has_abs_y: true, has_rel: true, has_alpha_key: false, abs_max_x: 4096, abs_max_y: 4096 };
        assert_eq!(caps.classify(), Some(DeviceKind::AbsolutePointer { max_x: 4096, max_y: 4096 }));
    }

    #[test]
    fn classify_relative_without_abs_x() {
        let caps = Capabilities { has_rel: true, ..Default::default() };
        assert_eq!(caps.classify(), Some(DeviceKind::RelativePointer));
    }

    #[test]
    fn classify_keyboard_by_alpha_key() {
        let caps = Capabilities { has_alpha_key: true, ..Default::default() };
        assert_eq!(caps.classify(), Some(DeviceKind::Keyboard));
    }

    #[test]
    fn ctrl_letter_yields_control_character() {
        let xlat = KeyTranslator::default();
        let mods = ModifierState { shift: false, ctrl: true };
        // KEY_A -> 'a' -> ctrl+a -> 0x01
        assert_eq!(xlat.translate(KEY_A, mods), Some(1u8 as char));
        // Shift should not matter once ctrl is held.
        let mods_shift = ModifierState { shift: true, ctrl: true };
        assert_eq!(xlat.translate(KEY_A, mods_shift), Some(1u8 as char));
    }

    #[test]
    fn shift_uppercases_letters() {
        let xlat = KeyTranslator::default();
        assert_eq!(xlat.translate(KEY_A, ModifierState::default()), Some('a'));
        assert_eq!(xlat.translate(KEY_A, ModifierState { shift: true, ctrl: false }), Some('A'));
    }

    #[test]
    fn modifier_state_tracks_transitions() {
        let mut mods = ModifierState::default();
        assert!(mods.apply(KEY_LEFTSHIFT, true));
        assert!(mods.shift);
        assert!(mods.apply(KEY_LEFTSHIFT, false));
        assert!(!mods.shift);
        assert!(!mods.apply(KEY_A, true));
    }
}
