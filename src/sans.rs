//! Input-free state machine for parsing device log streams.
//!
//! This module never performs I/O. Callers feed byte chunks into a
//! [`StreamParser`] and pull [`parser::Event`]s out of it; the parser reports
//! when it needs more input, and the caller decides where those bytes come
//! from. See [`crate::avec`] for drivers over readers and slices.
//!
//! # Architecture
//!
//! The byte stream is a concatenation of frames, each a one-byte type code
//! followed by a big-endian payload (see [`message`] for the layouts). Parsing
//! a frame passes through three components:
//!
//! - The [`frame`] scanner proposes the window of bytes that a frame at the
//! cursor would occupy, or asks for more data. It never consumes anything.
//!
//! - The [`message`] decoder turns a window into a typed [`message::Message`],
//! or a [`message::DecodeError`] describing why it could not.
//!
//! - On failure, the [`resync`] search looks for the next offset at which the
//! scanner and decoder agree on a frame.
//!
//! The [`parser`] ties these together under a strict or lenient policy and
//! feeds a [`stats::ParseStatistics`] accumulator along the way.

pub mod check;
pub mod frame;
pub mod message;
pub mod parser;
pub mod resync;
pub mod stats;

/// Entrypoint to the state machine.
pub use parser::StreamParser;
