//! Passive accumulator of per-session parse statistics.
//!
//! Nothing here can fail. Every anomaly the parser or aggregator notices is
//! absorbed into counters and lists, to be read once the session ends.

use std::collections::BTreeMap;

use serde::Serialize;

use super::message::{DecodeReason, MessageKind};

/// Statistics for one parse session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseStatistics {
    /// Decoded messages and bytes, per kind.
    pub kinds: BTreeMap<MessageKind, KindCount>,
    /// Every decode failure, in input order.
    pub errors: Vec<ErrorEntry>,
    pub sequence: SequenceStatistics,
    /// Successful resynchronizations after a decode failure.
    pub resyncs: u64,
    /// Bytes passed over by successful resynchronizations.
    pub skipped_bytes: u64,
    /// Bytes left at the end of input after resynchronization found nothing.
    pub unrecovered_bytes: u64,
    /// Bytes belonging to decoded frames.
    pub bytes_consumed: u64,
    pub timing: TimingStatistics,
    pub records: RecordStatistics,
    #[serde(skip)]
    last_sequence: BTreeMap<MessageKind, u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCount {
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub offset: u64,
    pub reason: DecodeReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SequenceStatistics {
    pub gaps: u64,
    pub duplicates: u64,
    pub anomalies: Vec<SequenceAnomaly>,
}

/// A sequence counter that did not follow its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceAnomaly {
    pub kind: MessageKind,
    pub offset: u64,
    pub expected: u16,
    pub actual: u16,
    pub anomaly: Anomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Anomaly {
    /// Counters were skipped.
    Gap { missing: u16 },
    /// The counter repeated or moved backwards.
    Duplicate,
}

/// Time-keeping statistics, filled in by the record aggregator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimingStatistics {
    /// Records still lacking a time reference at the end of the session.
    pub unresolved: u64,
    /// Records that arrived before a time reference and were resolved later.
    pub resolved_retroactively: u64,
    /// Records stamped before the earliest plausible device time.
    pub too_old: u64,
    /// Consecutive ticks more than one second apart.
    pub forward_jumps: u64,
    /// Full timestamps rejected as implausible or moving backwards.
    pub rejected_references: u64,
    /// Records dropped for repeating a timestamp within their stream.
    pub duplicate_timestamps: u64,
    /// Pulse blocks stamped earlier than their channel's sample clock.
    pub early_blocks: u64,
    /// Pulse blocks stamped later than their channel's sample clock.
    pub late_blocks: u64,
    /// Pulse samples overwriting another sample with the same stamp.
    pub duplicate_samples: u64,
}

/// Reconciliation of decoded messages with the records built from them, filled
/// in by the record aggregator.
///
/// A message may produce no record (time references, heartbeats), one, or
/// several (combined motion frames, pulse blocks), so the two are only related
/// through the aggregator's count of messages it received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordStatistics {
    /// Messages handed to the aggregator. Every decoded message is, so this
    /// equals [`ParseStatistics::message_count`].
    pub messages: u64,
    /// Records per stream.
    pub streams: BTreeMap<&'static str, StreamCount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCount {
    /// Records built before repeated timestamps were dropped.
    pub aggregated: u64,
    /// Records left for export.
    pub exported: u64,
}

impl RecordStatistics {
    /// Records built across every stream.
    pub fn aggregated(&self) -> u64 {
        self.streams.values().map(|s| s.aggregated).sum()
    }

    /// Records left for export across every stream.
    pub fn exported(&self) -> u64 {
        self.streams.values().map(|s| s.exported).sum()
    }
}

impl ParseStatistics {
    /// Count a decoded message.
    pub fn record_success(&mut self, kind: MessageKind, len: usize) {
        let entry = self.kinds.entry(kind).or_default();
        entry.count += 1;
        entry.bytes += len as u64;
        self.bytes_consumed += len as u64;
    }

    /// Record a decode failure.
    pub fn record_error(&mut self, offset: u64, reason: DecodeReason) {
        self.errors.push(ErrorEntry { offset, reason });
    }

    /// Compare a sequence counter against the value expected to follow its
    /// predecessor, recording a gap or duplicate if they differ.
    ///
    /// Counters wrap, so the comparison is made on the signed distance between
    /// the two.
    pub fn record_sequence_check(
        &mut self,
        kind: MessageKind,
        offset: u64,
        expected: u16,
        actual: u16,
    ) {
        let distance = actual.wrapping_sub(expected) as i16;

        let anomaly = match distance {
            0 => return,
            d if d > 0 => {
                self.sequence.gaps += 1;
                Anomaly::Gap { missing: d as u16 }
            }
            _ => {
                self.sequence.duplicates += 1;
                Anomaly::Duplicate
            }
        };

        self.sequence.anomalies.push(SequenceAnomaly {
            kind,
            offset,
            expected,
            actual,
            anomaly,
        });
    }

    /// Check a counter against the last one seen for the same kind.
    pub fn observe_sequence(&mut self, kind: MessageKind, offset: u64, actual: u16) {
        let Some(&last) = self.last_sequence.get(&kind) else {
            self.last_sequence.insert(kind, actual);
            return;
        };

        let expected = last.wrapping_add(1);
        self.record_sequence_check(kind, offset, expected, actual);

        // A duplicate must not drag the expectation backwards.
        if (actual.wrapping_sub(last) as i16) > 0 {
            self.last_sequence.insert(kind, actual);
        }
    }

    /// Number of decoded messages of one kind.
    pub fn count(&self, kind: MessageKind) -> u64 {
        self.kinds.get(&kind).map_or(0, |k| k.count)
    }

    /// Number of decoded messages across all kinds.
    pub fn message_count(&self) -> u64 {
        self.kinds.values().map(|k| k.count).sum()
    }
}
