//! The stream parser, orchestrating scanning, decoding and recovery.

use either::Either::{Left, Right};
use tracing::{debug, trace, warn};

use super::{
    frame::{self, NeedMoreData},
    message::{self, DecodeError, DecodeReason, Message},
    resync::{self, Resync},
    stats::ParseStatistics,
};

/// Policy applied when a frame fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Skip past the failure and resynchronize.
    #[default]
    Lenient,
    /// Stop at the first failure.
    Strict,
}

/// Something the parser has to report.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A frame decoded.
    Message(Message),
    /// Feed more input, or call again with `eof` set if there is none.
    NeedMoreData,
    /// Input is exhausted. Every later call returns this again.
    Done,
    /// A frame failed to decode in strict mode. Every later call returns this
    /// again.
    Aborted(DecodeError),
}

#[derive(Debug, Clone)]
enum State {
    Scanning,
    /// Searching for a frame start after a failure at `failed_at`. The cursor
    /// marks where the search resumes.
    Recovering { failed_at: u64 },
    Done,
    Aborted(DecodeError),
}

/// A single parse session over one input stream.
///
/// The parser owns its buffer, cursor and statistics outright; independent
/// sessions share nothing and may run on separate threads.
#[derive(Debug)]
pub struct StreamParser {
    mode: Mode,
    buffer: Vec<u8>,
    /// Absolute offset of `buffer[0]`.
    base: u64,
    /// Index into `buffer` of the next unconsumed byte.
    cursor: usize,
    state: State,
    stats: ParseStatistics,
}

impl StreamParser {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            buffer: Vec::new(),
            base: 0,
            cursor: 0,
            state: State::Scanning,
            stats: ParseStatistics::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Append input, discarding bytes already consumed.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.base += self.cursor as u64;
            self.cursor = 0;
        }

        self.buffer.extend_from_slice(bytes);
    }

    /// Absolute offset of the cursor in the input.
    pub fn offset(&self) -> u64 {
        self.base + self.cursor as u64
    }

    pub fn stats(&self) -> &ParseStatistics {
        &self.stats
    }

    pub fn into_stats(self) -> ParseStatistics {
        self.stats
    }

    /// Advance the state machine until it has something to report.
    ///
    /// Set `eof` once the input has no more bytes to give.
    pub fn next(&mut self, eof: bool) -> Event {
        loop {
            match &self.state {
                State::Scanning => {
                    let offset = self.offset();
                    let scanned = match frame::scan(&self.buffer[self.cursor..]) {
                        Left(window) => Ok(message::decode(window, offset)),
                        Right(more) => Err(more),
                    };

                    match scanned {
                        Ok(Ok(message)) => return self.emit(message),
                        Ok(Err(error)) => {
                            if let Some(error) = self.fail(error) {
                                return Event::Aborted(error);
                            }
                        }
                        Err(NeedMoreData { needed }) => {
                            if !eof {
                                return Event::NeedMoreData;
                            }

                            let remaining = self.buffer.len() - self.cursor;
                            if remaining == 0 {
                                self.state = State::Done;
                                continue;
                            }

                            trace!(offset, remaining, needed, "input ended inside a frame");
                            let error = DecodeError {
                                offset,
                                reason: DecodeReason::Truncated,
                                inspected: remaining,
                            };
                            if let Some(error) = self.fail(error) {
                                return Event::Aborted(error);
                            }
                        }
                    }
                }
                State::Recovering { failed_at } => {
                    let failed_at = *failed_at;

                    match resync::search(&self.buffer, self.cursor, eof) {
                        Resync::Found(i) => {
                            self.cursor = i;
                            let skipped = self.offset() - failed_at;
                            self.stats.resyncs += 1;
                            self.stats.skipped_bytes += skipped;
                            debug!(offset = self.offset(), skipped, "resynchronized");
                            self.state = State::Scanning;
                        }
                        Resync::Pending(i) => {
                            self.cursor = i;
                            return Event::NeedMoreData;
                        }
                        Resync::NotFound => {
                            self.cursor = self.buffer.len();
                            let unrecovered = self.offset() - failed_at;
                            self.stats.unrecovered_bytes += unrecovered;
                            warn!(
                                offset = failed_at,
                                unrecovered, "no frame found before end of input"
                            );
                            self.state = State::Done;
                        }
                    }
                }
                State::Done => return Event::Done,
                State::Aborted(error) => return Event::Aborted(error.clone()),
            }
        }
    }

    fn emit(&mut self, message: Message) -> Event {
        let kind = message.kind();
        trace!(
            offset = message.offset,
            len = message.len,
            ?kind,
            "decoded frame"
        );

        self.cursor += message.len;
        self.stats.record_success(kind, message.len);

        if let Some(sequence) = message.payload.sequence() {
            self.stats.observe_sequence(kind, message.offset, sequence);
        }

        Event::Message(message)
    }

    /// Record a failure and apply the mode's policy. Returns the error if the
    /// session must stop.
    fn fail(&mut self, error: DecodeError) -> Option<DecodeError> {
        warn!(offset = error.offset, reason = %error.reason, "decode failed");
        self.stats.record_error(error.offset, error.reason);

        match self.mode {
            Mode::Strict => {
                self.state = State::Aborted(error.clone());
                Some(error)
            }
            Mode::Lenient => {
                self.state = State::Recovering {
                    failed_at: error.offset,
                };
                // A failed frame is at least one byte long.
                self.cursor += 1;
                None
            }
        }
    }
}
