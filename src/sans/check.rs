//! Helpers for judging whether bytes and values are plausible.

use tartan_bitfield::bitfield;

use super::message::MessageKind;

/// Earliest plausible device time (1999-10-01T00:00:00Z), in milliseconds.
pub const MIN_TIMESTAMP: u64 = 938_736_000_000;

/// Latest plausible device time (2036-10-01T00:00:00Z), in milliseconds.
pub const MAX_TIMESTAMP: u64 = 2_106_432_000_000;

/// Upper bound (exclusive) on the channel numbers a device reports.
pub const MAX_CHANNELS: u8 = 8;

const KNOWN_TYPES: [bool; 256] = {
    let mut table = [false; 256];
    let mut i = 0;
    while i < MessageKind::ALL.len() {
        table[MessageKind::ALL[i].code() as usize] = true;
        i += 1;
    }
    table
};

/// Whether a byte is the type code of any known message kind.
///
/// This is the cheap signature used to pick resynchronization candidates.
pub fn is_known_type(b: u8) -> bool {
    KNOWN_TYPES[b as usize]
}

/// Width in bytes of one pulse sample, given a pulse list's format byte.
pub fn sample_width(format: u8) -> Option<usize> {
    bitfield! {
        struct Format(u8) {
            [0..2] width: u8,
        }
    }

    match Format(format).width() {
        0 => Some(4),
        1 => Some(3),
        2 => Some(2),
        _ => None,
    }
}
