//! Line codec for the stream-json channel.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length
//! so an unterminated or runaway frame from a misbehaving agent process
//! cannot exhaust memory.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::errors::{Result, SdkError};

/// Maximum frame length accepted on the inbound stream: 1 MiB.
///
/// Longer lines cause [`NdjsonCodec::decode`] to return
/// [`SdkError::Transport`] rather than allocating without bound.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited JSON codec for both directions of the agent channel.
///
/// Each `\n`-terminated UTF-8 line is one complete frame. The max-length
/// limit is a decoder-side concern and is not enforced during encoding.
#[derive(Debug)]
pub struct NdjsonCodec(LinesCodec);

impl NdjsonCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NdjsonCodec {
    type Item = String;
    type Error = SdkError;

    /// Decode the next newline-terminated frame from `src`.
    ///
    /// Returns `Ok(None)` when `src` holds no complete line yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final unterminated frame when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for NdjsonCodec {
    type Error = SdkError;

    /// Encode `item` as a `\n`-terminated line into `dst`.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> SdkError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            SdkError::Transport(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => io_err.into(),
    }
}
