//! Conversion of single-channel pulse blocks into multi-channel rows.
//!
//! Each channel keeps its own sample clock, locked to the time of its first
//! block. Samples are stamped from that clock rather than from the block's own
//! time, so blocks from different channels line up on the same stamps. Block
//! times that drift from the clock are counted, and a block arriving well away
//! from its expected time re-locks the channel. Re-locking backwards stamps
//! samples over earlier ones; the later sample replaces the earlier.

use std::collections::BTreeMap;

use tracing::debug;

use crate::sans::{
    check::MAX_CHANNELS,
    message::PulseBlock,
    stats::TimingStatistics,
};

use super::{PhysioRow, Record, Time};

/// Drift beyond which a block counts as early or late, in milliseconds.
const DRIFT: f64 = 0.95;
/// Drift beyond which a channel re-locks to the block's time, in milliseconds.
const RELOCK: f64 = 5.0;

const CHANNELS: usize = MAX_CHANNELS as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Signal {
    Ecg,
    Ppg,
}

#[derive(Debug, Clone, Copy)]
struct Lock {
    start: u64,
    /// Index of the next sample expected on the channel.
    index: u64,
}

impl Lock {
    fn stamp(&self, interval: f64, k: u64) -> u64 {
        self.start.saturating_add(((self.index + k) as f64 * interval) as u64)
    }
}

#[derive(Debug, Clone)]
struct Merged {
    /// Offset of the block providing the row's first sample.
    offset: u64,
    ecg: [Option<i32>; CHANNELS],
    ppg: [Option<i32>; CHANNELS],
}

#[derive(Debug, Clone)]
pub(super) struct BlockMerger {
    /// Milliseconds between consecutive samples of a channel.
    interval: f64,
    locks: BTreeMap<(Signal, u8), Lock>,
    rows: BTreeMap<u64, Merged>,
}

impl BlockMerger {
    pub fn new(samplerate: f64) -> Self {
        Self {
            interval: 1000.0 / samplerate,
            locks: BTreeMap::new(),
            rows: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn ingest(
        &mut self,
        signal: Signal,
        offset: u64,
        block: PulseBlock,
        timing: &mut TimingStatistics,
    ) {
        let lock = self
            .locks
            .entry((signal, block.channel))
            .or_insert(Lock {
                start: block.time,
                index: 0,
            });

        let diff = lock.stamp(self.interval, 0) as f64 - block.time as f64;

        if diff > DRIFT {
            timing.early_blocks += 1;
        } else if diff < -DRIFT {
            timing.late_blocks += 1;
        }

        if diff.abs() > RELOCK {
            debug!(
                offset,
                channel = block.channel,
                diff,
                "re-locking pulse channel"
            );
            *lock = Lock {
                start: block.time,
                index: 0,
            };
        }

        let channel = block.channel as usize % CHANNELS;
        let value = |v: i32| match signal {
            Signal::Ecg => v,
            Signal::Ppg => v.saturating_neg(),
        };

        for (k, sample) in block.samples.iter().enumerate() {
            let stamp = lock.stamp(self.interval, k as u64);

            let row = self.rows.entry(stamp).or_insert(Merged {
                offset,
                ecg: [None; CHANNELS],
                ppg: [None; CHANNELS],
            });

            let slot = match signal {
                Signal::Ecg => &mut row.ecg[channel],
                Signal::Ppg => &mut row.ppg[channel],
            };

            if let Some(previous) = slot.replace(value(*sample)) {
                debug!(
                    offset,
                    channel = block.channel,
                    stamp,
                    previous,
                    "sample overwritten"
                );
                timing.duplicate_samples += 1;
            }
        }

        lock.index += block.samples.len() as u64;
    }

    /// Emit the merged rows in stamp order, keeping only the channels that
    /// received samples.
    pub fn finish(self) -> Vec<Record<PhysioRow>> {
        let width = |pick: fn(&Merged) -> &[Option<i32>; CHANNELS]| {
            self.rows
                .values()
                .filter_map(|m| pick(m).iter().rposition(Option::is_some))
                .max()
                .map_or(0, |i| i + 1)
        };

        let ecgs = width(|m| &m.ecg);
        let ppgs = width(|m| &m.ppg);

        self.rows
            .into_iter()
            .map(|(stamp, m)| Record {
                offset: m.offset,
                time: Time::Resolved(stamp),
                row: PhysioRow {
                    ecg: m.ecg[..ecgs].to_vec(),
                    ppg: m.ppg[..ppgs].to_vec(),
                },
            })
            .collect()
    }
}
