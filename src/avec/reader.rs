//! Reader-based driver implementation.

use std::io::{ErrorKind, Read};

use thiserror::Error;
use tracing::trace;

use crate::sans::StreamParser;

use super::{MessageSink, ParseOptions, Report, Status, pump, summarize};

/// Errors occurring while parsing from a reader.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the supplied reader.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parse input from a reader, publishing to a sink.
///
/// Input is read in chunks of [`ParseOptions::chunk_size`] bytes; frames may
/// straddle chunk boundaries. Decode failures are not errors here: they are
/// reported in the returned [`Report`].
///
/// This method is also re-exported as `sprocket::avec::parse_reader`.
pub fn parse(
    r: &mut impl Read,
    sink: &mut impl MessageSink,
    options: &ParseOptions,
) -> Result<Report, Error> {
    let mut parser = StreamParser::new(options.mode);
    let mut chunk = vec![0; options.chunk_size.max(1)];
    let mut eof = false;

    let status = loop {
        if let Some(status) = pump(&mut parser, eof, sink, options.cancel.as_ref()) {
            break status;
        }

        if eof {
            break Status::Completed;
        }

        match r.read(&mut chunk) {
            Ok(0) => eof = true,
            Ok(n) => {
                trace!(offset = parser.offset(), n, "read chunk");
                parser.feed(&chunk[..n]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => Err(e)?,
        }
    };

    Ok(summarize(parser, status))
}
