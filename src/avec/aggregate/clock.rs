//! Device clock reconstruction from 16-bit ticks.

use crate::sans::check::MAX_TIMESTAMP;

const LOW: u64 = 0xFFFF;
const WRAP: u64 = 0x10000;

/// A tick this close to the top of its range may wrap on the next message.
const WRAP_HIGH: u64 = 65000;
/// A tick this close to zero may have just wrapped.
const WRAP_LOW: u64 = 100;

/// Gap between consecutive ticks reported as a forward jump, in milliseconds.
const JUMP: u64 = 1000;

/// The latest full device time, advanced by each tick.
#[derive(Debug, Clone, Default)]
pub(super) struct Clock {
    current: Option<u64>,
    reference: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Advance {
    pub time: u64,
    /// The tick moved the clock forward by more than a second.
    pub jumped: bool,
}

impl Clock {
    /// Latch a full timestamp. References beyond the plausible range, or
    /// earlier than the last accepted reference, are refused.
    pub fn latch(&mut self, time: u64) -> bool {
        if time > MAX_TIMESTAMP || self.reference.is_some_and(|r| time < r) {
            return false;
        }

        self.current = Some(time);
        self.reference = Some(time);
        true
    }

    /// Replace the low 16 bits of the clock with a tick, carrying or borrowing
    /// across a counter wrap. Returns `None` before any reference.
    pub fn advance(&mut self, tick: u16) -> Option<Advance> {
        let current = self.current?;
        let tick = tick as u64;
        let low = current & LOW;

        let base = if low > WRAP_HIGH && tick < WRAP_LOW {
            (current & !LOW) + WRAP
        } else if tick > WRAP_HIGH && low < WRAP_LOW {
            (current & !LOW).saturating_sub(WRAP)
        } else {
            current & !LOW
        };

        let time = base | tick;
        self.current = Some(time);

        Some(Advance {
            time,
            jumped: time > current + JUMP,
        })
    }
}

/// Resolve a tick received before `later`: the latest time not after `later`
/// whose low 16 bits equal the tick.
pub(super) fn resolve_backwards(later: u64, tick: u16) -> Option<u64> {
    let time = (later & !LOW) | tick as u64;

    if time > later {
        time.checked_sub(WRAP)
    } else {
        Some(time)
    }
}
