//! Slice-based driver implementation.

use crate::sans::StreamParser;

use super::{MessageSink, ParseOptions, Report, Status, pump, summarize};

/// Parse a complete input held in memory, publishing to a sink.
///
/// This method is also re-exported as `sprocket::avec::parse_slice`.
pub fn parse(r: &[u8], sink: &mut impl MessageSink, options: &ParseOptions) -> Report {
    let mut parser = StreamParser::new(options.mode);
    parser.feed(r);

    // With the whole input buffered, the parser never waits for more.
    let status =
        pump(&mut parser, true, sink, options.cancel.as_ref()).unwrap_or(Status::Completed);

    summarize(parser, status)
}
