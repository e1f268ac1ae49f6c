//! # ESC/POS command bytes
//!
//! The small subset of ESC/POS every BLE receipt printer understands. Column
//! alignment is done with space padding in [`crate::layout`], never with tab
//! stops, so only these commands are needed:
//!
//! | Command | Bytes | Meaning |
//! |---------|-------|---------|
//! | `ESC @` | `1B 40` | Reset formatting |
//! | `ESC E n` | `1B 45 n` | Emphasis (bold) on/off |
//! | `ESC a n` | `1B 61 n` | Justification |
//! | `GS ! n` | `1D 21 n` | Character size |
//! | `ESC d n` | `1B 64 n` | Print and feed `n` lines |
//! | `GS V 0` | `1D 56 00` | Full cut |
//! | `LF` | `0A` | Print and feed one line |

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print the buffer and advance one line
pub const LF: u8 = 0x0A;

/// Horizontal justification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Alignment {
    Left = 0,
    Center = 1,
    Right = 2,
}

/// # Initialize Printer (ESC @)
///
/// Clears the line buffer and resets bold, size and alignment. Sent at the
/// start of every payload so a half-printed previous job cannot leak
/// formatting into this one.
///
/// ```
/// use posprint_core::escpos;
///
/// assert_eq!(escpos::init(), [0x1B, 0x40]);
/// ```
#[inline]
pub const fn init() -> [u8; 2] {
    [ESC, b'@']
}

/// # Emphasis (ESC E n)
///
/// `n = 1` turns bold on, `n = 0` turns it off.
#[inline]
pub const fn bold(on: bool) -> [u8; 3] {
    [ESC, b'E', on as u8]
}

/// # Justification (ESC a n)
#[inline]
pub const fn align(alignment: Alignment) -> [u8; 3] {
    [ESC, b'a', alignment as u8]
}

/// # Character Size (GS ! n)
///
/// Width and height multipliers, each clamped to 1..=8. The high nibble of
/// `n` is the width scale minus one, the low nibble the height scale minus one.
///
/// ```
/// use posprint_core::escpos;
///
/// assert_eq!(escpos::size(1, 1), [0x1D, 0x21, 0x00]);
/// assert_eq!(escpos::size(2, 2), [0x1D, 0x21, 0x11]);
/// ```
#[inline]
pub const fn size(width: u8, height: u8) -> [u8; 3] {
    let w = clamp_scale(width) - 1;
    let h = clamp_scale(height) - 1;
    [GS, b'!', (w << 4) | h]
}

const fn clamp_scale(n: u8) -> u8 {
    if n < 1 {
        1
    } else if n > 8 {
        8
    } else {
        n
    }
}

/// # Print and Feed (ESC d n)
#[inline]
pub const fn feed(lines: u8) -> [u8; 3] {
    [ESC, b'd', lines]
}

/// # Full Cut (GS V 0)
///
/// Printers without a cutter ignore it.
#[inline]
pub const fn cut() -> [u8; 3] {
    [GS, b'V', 0]
}

/// Strip the commands above out of a byte stream, leaving the printable text.
///
/// `ESC d n` becomes `n` newlines so previews keep the paper's shape. Bytes
/// that are not valid UTF-8 are replaced with U+FFFD.
///
/// ```
/// use posprint_core::escpos;
///
/// let mut bytes = escpos::init().to_vec();
/// bytes.extend(escpos::bold(true));
/// bytes.extend(b"KOT\n");
/// bytes.extend(escpos::cut());
/// assert_eq!(escpos::strip_commands(&bytes), "KOT\n");
/// ```
pub fn strip_commands(bytes: &[u8]) -> String {
    let mut text = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            ESC => match bytes.get(i + 1) {
                Some(b'@') => i += 2,
                Some(b'd') => {
                    let n = bytes.get(i + 2).copied().unwrap_or(0);
                    text.extend(std::iter::repeat_n(LF, n as usize));
                    i += 3;
                }
                Some(_) => i += 3,
                None => i += 1,
            },
            GS => match bytes.get(i + 1) {
                // GS V m n form carries an extra feed byte.
                Some(b'V') if matches!(bytes.get(i + 2), Some(65) | Some(66)) => i += 4,
                Some(_) => i += 3,
                None => i += 1,
            },
            b => {
                text.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&text).into_owned()
}
