//! Convenience interfaces for common parsing patterns.
//!
//! The functions in this module drive a [`StreamParser`] over files and data
//! slices, publishing decoded messages to a [`MessageSink`]. The [`Aggregator`]
//! is the sink most callers want: it groups messages into the record streams of
//! a [`Recording`]. [`read_recording`] wires the two together.
//!
//! ```
//! use sprocket::{avec::ParseOptions, sans::parser::Mode};
//!
//! let file = std::fs::File::open("session.log")?;
//! let options = ParseOptions::default().mode(Mode::Strict);
//! let (recording, report) = sprocket::avec::read_recording(file, &options)?;
//!
//! println!("{} records, {:?}", recording.record_count(), report.status);
//! ```

use std::{
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::info;

use crate::sans::{
    StreamParser,
    message::{DecodeError, Message},
    parser::{Event, Mode},
    stats::ParseStatistics,
};

pub mod aggregate;
pub mod reader;
pub mod slice;

pub use aggregate::{Aggregator, DeviceInfo, Record, RecordStream, Recording, Time};
pub use reader::{Error, parse as parse_reader};
pub use slice::parse as parse_slice;

/// Receive decoded messages, in input order.
pub trait MessageSink {
    fn ingest(&mut self, message: Message);
}

impl MessageSink for Vec<Message> {
    fn ingest(&mut self, message: Message) {
        self.push(message);
    }
}

impl MessageSink for Aggregator {
    fn ingest(&mut self, message: Message) {
        Aggregator::ingest(self, message);
    }
}

/// Sampling rate of the pulse channels, used to stamp pulse block samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleRate {
    #[default]
    Hz1000,
    Hz500,
    Hz250,
    Hz125,
}

impl SampleRate {
    pub fn hz(self) -> f64 {
        match self {
            SampleRate::Hz1000 => 1000.0,
            SampleRate::Hz500 => 500.0,
            SampleRate::Hz250 => 250.0,
            SampleRate::Hz125 => 125.0,
        }
    }
}

/// Configuration for a parse session.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub mode: Mode,
    pub samplerate: SampleRate,
    /// Bytes requested from a reader at a time.
    pub chunk_size: usize,
    pub cancel: Option<Cancel>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            samplerate: SampleRate::default(),
            chunk_size: 16 * 1024,
            cancel: None,
        }
    }
}

impl ParseOptions {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn samplerate(mut self, samplerate: SampleRate) -> Self {
        self.samplerate = samplerate;
        self
    }

    /// Set the read size. Zero is treated as one.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// A cooperative cancellation flag, shared between clones.
///
/// Sessions check the flag after each message, so cancelling stops a session
/// after the message in progress.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a parse session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The input was exhausted.
    Completed,
    /// The session was cancelled before the input was exhausted.
    Cancelled,
    /// A frame failed to decode in strict mode.
    Aborted(DecodeError),
}

/// The outcome of a parse session.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub statistics: ParseStatistics,
    pub status: Status,
}

impl Report {
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, Status::Aborted(_))
    }
}

/// Parse a reader into a recording.
///
/// The timing section of the report's statistics is filled in by the
/// aggregator.
pub fn read_recording(
    mut r: impl Read,
    options: &ParseOptions,
) -> Result<(Recording, Report), Error> {
    let mut aggregator = Aggregator::new(options.samplerate.hz());
    let mut report = reader::parse(&mut r, &mut aggregator, options)?;
    let recording = aggregator.finish(&mut report.statistics);

    Ok((recording, report))
}

/// Pull events until the parser needs input or the session ends.
fn pump(
    parser: &mut StreamParser,
    eof: bool,
    sink: &mut impl MessageSink,
    cancel: Option<&Cancel>,
) -> Option<Status> {
    loop {
        match parser.next(eof) {
            Event::Message(message) => {
                sink.ingest(message);

                if cancel.is_some_and(Cancel::is_cancelled) {
                    return Some(Status::Cancelled);
                }
            }
            Event::NeedMoreData => return None,
            Event::Done => return Some(Status::Completed),
            Event::Aborted(error) => return Some(Status::Aborted(error)),
        }
    }
}

fn summarize(parser: StreamParser, status: Status) -> Report {
    let statistics = parser.into_stats();

    info!(
        messages = statistics.message_count(),
        errors = statistics.errors.len(),
        resyncs = statistics.resyncs,
        skipped = statistics.skipped_bytes,
        unrecovered = statistics.unrecovered_bytes,
        ?status,
        "parse session ended"
    );

    Report { statistics, status }
}
