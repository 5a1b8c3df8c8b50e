//! evdev-keycode-to-VK translation and the last-character latch
//! `TranslateMessage` reads from (spec.md §4.10).

use std::sync::atomic::{AtomicU32, Ordering};

pub const VK_BACK: u8 = 0x08;
pub const VK_TAB: u8 = 0x09;
pub const VK_RETURN: u8 = 0x0D;
pub const VK_SHIFT: u8 = 0x10;
pub const VK_CONTROL: u8 = 0x11;
pub const VK_ESCAPE: u8 = 0x1B;
pub const VK_SPACE: u8 = 0x20;

/// A fixed 128-entry table from evdev keycode to Windows virtual-key
/// code (spec.md §4.10), covering the keys this runtime actually needs
/// to translate: letters, digits, and the handful of named keys above.
/// Unmapped codes translate to 0.
const EVDEV_TO_VK: [u8; 128] = {
    let mut table = [0u8; 128];
    table[1] = VK_ESCAPE;
    table[14] = VK_BACK;
    table[15] = VK_TAB;
    table[28] = VK_RETURN;
    table[29] = VK_CONTROL;
    table[42] = VK_SHIFT;
    table[54] = VK_SHIFT;
    table[57] = VK_SPACE;
    // KEY_1..KEY_0 (evdev 2..11) -> VK '1'..'9','0' (ASCII digits).
    let mut i = 0;
    while i < 10 {
        table[2 + i] = b'1' + i as u8;
        i += 1;
    }
    table[11] = b'0';
    // KEY_Q..KEY_P row (evdev 16..25) -> QWERTYUIOP.
    let row1 = b"QWERTYUIOP";
    let mut i = 0;
    while i < row1.len() {
        table[16 + i] = row1[i];
        i += 1;
    }
    // KEY_A..KEY_L row (evdev 30..38) -> ASDFGHJKL.
    let row2 = b"ASDFGHJKL";
    let mut i = 0;
    while i < row2.len() {
        table[30 + i] = row2[i];
        i += 1;
    }
    // KEY_Z..KEY_M row (evdev 44..50) -> ZXCVBNM.
    let row3 = b"ZXCVBNM";
    let mut i = 0;
    while i < row3.len() {
        table[44 + i] = row3[i];
        i += 1;
    }
    table
};

pub fn vk_from_evdev(keycode: u32) -> u8 {
    EVDEV_TO_VK.get(keycode as usize).copied().unwrap_or(0)
}

static LAST_CHAR: AtomicU32 = AtomicU32::new(0);

/// Records the character the server attached to the most recent key
/// event, zero included — `translate_message` needs to see a real zero
/// to know it must synthesize one, not a stale nonzero value from an
/// earlier keypress.
pub(crate) fn note_last_char(ch: u32) {
    LAST_CHAR.store(ch, Ordering::Relaxed);
}

/// Synthesizes a plausible character for `vk` when the originating key
/// event carried none (spec.md §4.10): letters lowercased, digits
/// literal, `SPACE`/`RETURN`/`TAB`/`BACK` special, everything else
/// silent.
pub fn translate_message(vk: u32) -> u32 {
    let latched = LAST_CHAR.load(Ordering::Relaxed);
    if latched != 0 {
        return latched;
    }
    match vk as u8 {
        b'A'..=b'Z' => (vk as u8).to_ascii_lowercase() as u32,
        b'0'..=b'9' => vk,
        VK_SPACE => b' ' as u32,
        VK_RETURN => b'\r' as u32,
        VK_TAB => b'\t' as u32,
        VK_BACK => 0x08,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_letter_row_correctly() {
        assert_eq!(vk_from_evdev(30), b'A'); // KEY_A
        assert_eq!(vk_from_evdev(16), b'Q'); // KEY_Q
        assert_eq!(vk_from_evdev(44), b'Z'); // KEY_Z
    }

    #[test]
    fn synthesizes_lowercase_for_letter_keys() {
        assert_eq!(translate_message(b'A' as u32), b'a' as u32);
        assert_eq!(translate_message(VK_SPACE as u32), b' ' as u32);
    }
}
