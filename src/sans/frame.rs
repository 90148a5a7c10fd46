//! Frame scanner, proposing the window a frame at the cursor would occupy.

use either::Either::{self, Left, Right};

use super::message::{Layout, MessageKind};

/// Smallest possible frame (a heartbeat), in bytes.
pub const MIN_FRAME: usize = 3;

/// Largest possible frame (a full pulse block), in bytes.
pub const MAX_FRAME: usize = 1 + 10 + 255 * 4;

/// Too few bytes are buffered to bound the frame at the cursor.
///
/// This is a request for input, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedMoreData {
    /// Total bytes, counted from the cursor, needed to make progress.
    pub needed: usize,
}

/// Propose the window of the frame starting at the first byte of `r`.
///
/// Frames of an unknown type are proposed as a single byte, which the decoder
/// will reject, however few bytes follow. Nothing is consumed; the caller
/// advances past the window only once it has decoded.
pub fn scan(r: &[u8]) -> Either<&[u8], NeedMoreData> {
    let Some(code) = r.first() else {
        return Right(NeedMoreData { needed: MIN_FRAME });
    };

    let Some(kind) = MessageKind::from_code(*code) else {
        return Left(&r[..1]);
    };

    if r.len() < MIN_FRAME {
        return Right(NeedMoreData { needed: MIN_FRAME });
    }

    let len = match kind.layout() {
        Layout::Fixed(size) => 1 + size,
        Layout::Prefixed { prefix, body } => {
            let Some(p) = r.get(1..1 + prefix) else {
                return Right(NeedMoreData { needed: 1 + prefix });
            };
            1 + prefix + body(p)
        }
    };

    match r.get(..len) {
        Some(window) => Left(window),
        None => Right(NeedMoreData { needed: len }),
    }
}
