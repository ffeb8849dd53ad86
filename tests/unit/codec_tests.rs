//! Unit tests for the NDJSON line codec.
//!
//! Covers:
//! - single and batched line decoding
//! - partial lines buffered until the newline arrives
//! - empty lines decoded as empty strings
//! - the maximum line length guard
//! - newline-terminated encoding

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use agent_conduit::transport::codec::{NdjsonCodec, MAX_LINE_BYTES};
use agent_conduit::SdkError;

// ── Decoding ─────────────────────────────────────────────────────────────────

/// A complete JSON object on one newline-terminated line is decoded without
/// error and returned without the trailing `\n`.
#[test]
fn single_line_decodes_without_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"assistant\"}\n");

    let decoded = codec
        .decode(&mut buf)
        .expect("decode must succeed for a valid line");

    assert_eq!(
        decoded,
        Some("{\"type\":\"assistant\"}".to_owned()),
        "codec must strip the trailing newline"
    );
}

/// Two frames delivered in one buffer are yielded as two separate items by
/// successive `decode` calls.
#[test]
fn batched_lines_decode_separately() {
    let mut codec = NdjsonCodec::new();
    let raw = concat!(
        "{\"type\":\"system\",\"subtype\":\"init\"}\n",
        "{\"type\":\"result\",\"subtype\":\"success\"}\n",
    );
    let mut buf = BytesMut::from(raw);

    let first = codec.decode(&mut buf).expect("first decode must succeed");
    assert_eq!(
        first.as_deref(),
        Some("{\"type\":\"system\",\"subtype\":\"init\"}"),
        "first frame must come out first"
    );

    let second = codec.decode(&mut buf).expect("second decode must succeed");
    assert_eq!(
        second.as_deref(),
        Some("{\"type\":\"result\",\"subtype\":\"success\"}"),
        "second frame must come out second"
    );

    let third = codec.decode(&mut buf).expect("empty buffer must not error");
    assert!(third.is_none(), "no further frames must be present");
}

/// A frame that arrives without its terminating newline stays buffered and
/// is only emitted once the newline shows up.
#[test]
fn partial_line_buffers_until_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"user\"");

    let pending = codec.decode(&mut buf).expect("partial decode must not error");
    assert!(pending.is_none(), "incomplete line must not be emitted");

    buf.extend_from_slice(b",\"message\":{}}\n");
    let decoded = codec
        .decode(&mut buf)
        .expect("decode must succeed once the newline arrives");
    assert_eq!(
        decoded.as_deref(),
        Some("{\"type\":\"user\",\"message\":{}}"),
        "the full line must be emitted after the newline arrives"
    );
}

/// A bare newline decodes as an empty string; skipping it is the reader's
/// job, not the codec's.
#[test]
fn empty_line_decodes_as_empty_string() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("\n");

    let decoded = codec.decode(&mut buf).expect("decode must succeed");

    assert_eq!(
        decoded.as_deref(),
        Some(""),
        "a bare newline must decode to an empty line"
    );
}

/// A line longer than `MAX_LINE_BYTES` fails with a transport error naming
/// the limit instead of buffering without bound.
#[test]
fn oversized_line_returns_transport_error() {
    let mut codec = NdjsonCodec::new();
    let oversized = "a".repeat(MAX_LINE_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(oversized.as_str());

    let result = codec.decode(&mut buf);

    match result {
        Err(SdkError::Transport(msg)) => assert!(
            msg.contains("line too long"),
            "error must mention 'line too long', got: {msg}"
        ),
        other => panic!("expected Err(SdkError::Transport), got: {other:?}"),
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Encoding appends exactly one newline, producing a valid NDJSON line.
#[test]
fn encode_appends_single_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::new();

    codec
        .encode("{\"type\":\"user\"}".to_owned(), &mut buf)
        .expect("encode must succeed");

    assert_eq!(
        &buf[..],
        b"{\"type\":\"user\"}\n",
        "encoded frame must end with exactly one newline"
    );
}
