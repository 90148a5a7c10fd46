//! A resynchronizing parser for wearable sensor log files.
//!
//! Sensor devices write a continuous stream of framed messages (samples,
//! device metadata, timestamps) with no delimiter between them. Sprocket walks
//! such a stream one frame at a time, recovers from corrupted or truncated
//! regions, tallies what it saw, and groups the decoded messages into
//! timestamped record streams ready for export.
//!
//! Most users should begin with [`avec::read_recording`], which parses a file
//! or reader into a [`avec::Recording`] alongside a [`avec::Report`] of parse
//! statistics. Applications that manage their own I/O (or want to inspect the
//! raw message sequence) can drive the state machine in the [`sans`] module
//! directly.
//!
//! Recordings are written out through the [`export::Exporter`] trait, with
//! delimited-text and columnar implementations provided.

pub mod avec;
pub mod export;
pub mod sans;
