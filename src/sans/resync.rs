//! Search for the next frame start after a decode failure.
//!
//! Candidates are narrowed with a cheap signature: only bytes that are the type
//! code of a known kind are considered. A candidate is accepted when its frame
//! decodes and is followed either by another known type code or by the end of
//! input. The confirming byte rules out most type codes that merely happen to
//! appear inside corrupted data.
//!
//! The worst case is one decode attempt per candidate byte, each bounded by
//! [`MAX_FRAME`](super::frame::MAX_FRAME), so a corrupted span of `n` bytes
//! costs at most `O(n * MAX_FRAME)`. Spans with few type-like bytes cost `O(n)`.

use either::Either::{Left, Right};

use super::{check::is_known_type, frame, message};

/// Outcome of a resynchronization search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    /// A frame starts at this index.
    Found(usize),
    /// The search reached the end of the buffered bytes; resume at this index
    /// once more input is available.
    Pending(usize),
    /// No frame starts anywhere before the end of input.
    NotFound,
}

enum Candidate {
    Accept,
    Reject,
    Incomplete,
}

/// Search `r` for a frame start, beginning at index `from`.
///
/// When `eof` is false, candidates that cannot be judged with the buffered
/// bytes suspend the search instead of being rejected.
pub fn search(r: &[u8], from: usize, eof: bool) -> Resync {
    let mut i = from;

    while let Some(p) = r.get(i..).and_then(|s| s.iter().position(|&b| is_known_type(b))) {
        i += p;

        match confirm(&r[i..], eof) {
            Candidate::Accept => return Resync::Found(i),
            Candidate::Incomplete => return Resync::Pending(i),
            Candidate::Reject => i += 1,
        }
    }

    if eof {
        Resync::NotFound
    } else {
        Resync::Pending(r.len())
    }
}

fn confirm(r: &[u8], eof: bool) -> Candidate {
    let incomplete = if eof {
        Candidate::Reject
    } else {
        Candidate::Incomplete
    };

    let window = match frame::scan(r) {
        Left(window) => window,
        Right(_) => return incomplete,
    };

    if message::decode(window, 0).is_err() {
        return Candidate::Reject;
    }

    match r.get(window.len()) {
        Some(&b) if is_known_type(b) => Candidate::Accept,
        Some(_) => Candidate::Reject,
        None if eof => Candidate::Accept,
        None => Candidate::Incomplete,
    }
}
