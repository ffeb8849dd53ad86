//! Session lifecycle behavior.
//!
//! Covers: closed-session errors, abort teardown, single-turn input
//! auto-close, input streaming, the close grace for embedded servers,
//! and initialize-failure reporting.

use std::sync::Arc;

use agent_conduit::{
    InputMode, Message, SdkError, Session, SessionOptions, ToolServer, UserInput,
};
use futures_util::stream;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{answer_initialize, assistant_frame, result_frame, scripted_transport};

// ── Close and abort ─────────────────────────────────────────────────

/// A closed session rejects every further operation with `Closed`.
#[tokio::test]
async fn closed_session_rejects_further_operations() {
    let (transport, _handle) = scripted_transport();
    let session = Session::new(transport, SessionOptions::default())
        .await
        .expect("session must start");

    session.close().await.expect("close must succeed");
    assert!(session.is_closed());

    assert!(matches!(session.end_input().await, Err(SdkError::Closed)));
    assert!(matches!(session.interrupt().await, Err(SdkError::Closed)));
    let inputs = stream::iter(vec![UserInput::text("late")]);
    assert!(matches!(
        session.stream_input(inputs).await,
        Err(SdkError::Closed)
    ));
}

/// Cancelling the abort token tears the session down and ends the
/// message stream with one `Aborted` error.
#[tokio::test]
async fn abort_token_tears_the_session_down() {
    let (transport, _handle) = scripted_transport();
    let abort = CancellationToken::new();
    let options = SessionOptions {
        abort: Some(abort.clone()),
        ..SessionOptions::default()
    };
    let mut session = Session::new(transport.clone(), options)
        .await
        .expect("session must start");

    abort.cancel();

    assert!(matches!(
        session.next_message().await,
        Some(Err(SdkError::Aborted))
    ));
    assert!(session.next_message().await.is_none());
    assert!(session.is_closed());
    for _ in 0..32 {
        if transport.close_calls() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.close_calls(), 1, "abort must release the transport");
}

// ── Single-turn input ───────────────────────────────────────────────

/// Single-turn sessions close the input side on their own after the
/// first result frame.
#[tokio::test]
async fn single_turn_sessions_end_input_after_first_result() {
    let (transport, handle) = scripted_transport();
    let options = SessionOptions {
        input_mode: InputMode::SingleTurn,
        ..SessionOptions::default()
    };
    let mut session = Session::new(transport.clone(), options)
        .await
        .expect("session must start");

    handle.inject(result_frame("s-one-shot")).await;
    assert!(matches!(
        session.next_message().await,
        Some(Ok(Message::Result(_)))
    ));

    for _ in 0..32 {
        if transport.end_input_calls() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.end_input_calls(), 1);
}

/// Multi-turn sessions leave the input side open across results.
#[tokio::test]
async fn multi_turn_sessions_keep_input_open_after_results() {
    let (transport, handle) = scripted_transport();
    let mut session = Session::new(transport.clone(), SessionOptions::default())
        .await
        .expect("session must start");

    handle.inject(result_frame("s-open")).await;
    assert!(matches!(
        session.next_message().await,
        Some(Ok(Message::Result(_)))
    ));

    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.end_input_calls(), 0);
}

// ── Input streaming ─────────────────────────────────────────────────

/// Each input item becomes one user frame, and input ends as soon as
/// the stream does when no in-process servers are attached.
#[tokio::test]
async fn stream_input_sends_each_item_then_ends_input() {
    let (transport, mut handle) = scripted_transport();
    let session = Session::new(transport.clone(), SessionOptions::default())
        .await
        .expect("session must start");
    answer_initialize(&mut handle).await;

    let inputs = stream::iter(vec![UserInput::text("hello"), UserInput::text("again")]);
    session
        .stream_input(inputs)
        .await
        .expect("streaming must succeed");

    for expected in ["hello", "again"] {
        let frame = handle.next_written().await;
        assert_eq!(frame["type"], "user");
        assert_eq!(frame["session_id"], session.session_id());
        assert_eq!(frame["message"]["role"], "user");
        assert_eq!(frame["message"]["content"], expected);
        assert_eq!(frame["parent_tool_use_id"], json!(null));
        assert!(
            frame.get("uuid").is_none(),
            "outbound user frames carry no uuid"
        );
    }
    assert_eq!(transport.end_input_calls(), 1);
}

/// With an in-process server attached, input stays open after the last
/// item until the first result arrives.
#[tokio::test]
async fn stream_input_waits_for_the_first_result_with_servers_attached() {
    let (transport, mut handle) = scripted_transport();
    let options = SessionOptions {
        sdk_mcp_servers: vec![Arc::new(ToolServer::new("noop", "0.1.0"))],
        ..SessionOptions::default()
    };
    let mut session = Session::new(transport.clone(), options)
        .await
        .expect("session must start");
    answer_initialize(&mut handle).await;

    handle.inject(result_frame("s-grace")).await;
    assert!(matches!(
        session.next_message().await,
        Some(Ok(Message::Result(_)))
    ));

    let inputs = stream::iter(vec![UserInput::text("one last thing")]);
    session
        .stream_input(inputs)
        .await
        .expect("streaming must succeed");

    let frame = handle.next_written().await;
    assert_eq!(frame["message"]["content"], "one last thing");
    assert_eq!(transport.end_input_calls(), 1);
}

/// Single-turn sessions skip the close grace even with servers
/// attached.
#[tokio::test]
async fn single_turn_stream_input_skips_the_result_grace() {
    let (transport, mut handle) = scripted_transport();
    let options = SessionOptions {
        input_mode: InputMode::SingleTurn,
        sdk_mcp_servers: vec![Arc::new(ToolServer::new("noop", "0.1.0"))],
        ..SessionOptions::default()
    };
    let session = Session::new(transport.clone(), options)
        .await
        .expect("session must start");
    answer_initialize(&mut handle).await;

    let inputs = stream::iter(vec![UserInput::text("prompt")]);
    session
        .stream_input(inputs)
        .await
        .expect("streaming must succeed");
    assert_eq!(transport.end_input_calls(), 1);
}

/// The close grace gives up after its timeout when no result arrives.
#[tokio::test(start_paused = true)]
async fn input_grace_elapses_without_a_result() {
    let (transport, mut handle) = scripted_transport();
    let options = SessionOptions {
        sdk_mcp_servers: vec![Arc::new(ToolServer::new("noop", "0.1.0"))],
        ..SessionOptions::default()
    };
    let session = Session::new(transport.clone(), options)
        .await
        .expect("session must start");
    answer_initialize(&mut handle).await;

    let inputs = stream::iter(vec![UserInput::text("no result coming")]);
    session
        .stream_input(inputs)
        .await
        .expect("streaming must succeed after the grace elapses");

    let frame = handle.next_written().await;
    assert_eq!(frame["message"]["content"], "no result coming");
    assert_eq!(transport.end_input_calls(), 1);
}

/// Cancellation interrupts an in-flight input stream.
#[tokio::test]
async fn abort_interrupts_stream_input() {
    let (transport, mut handle) = scripted_transport();
    let abort = CancellationToken::new();
    let options = SessionOptions {
        abort: Some(abort.clone()),
        ..SessionOptions::default()
    };
    let session = Session::new(transport, options)
        .await
        .expect("session must start");
    answer_initialize(&mut handle).await;

    let (outcome, ()) = tokio::join!(
        session.stream_input(stream::pending::<UserInput>()),
        async {
            tokio::task::yield_now().await;
            abort.cancel();
        }
    );
    assert!(matches!(outcome, Err(SdkError::Aborted)));
}

// ── Handshake failure ───────────────────────────────────────────────

/// An initialize failure is reported once through the message stream,
/// after which iteration keeps delivering whatever still arrives.
#[tokio::test]
async fn initialize_failure_surfaces_once_then_iteration_continues() {
    let (transport, mut handle) = scripted_transport();
    let mut session = Session::new(transport, SessionOptions::default())
        .await
        .expect("session must start");

    let init = handle.next_written().await;
    assert_eq!(init["request"]["subtype"], "initialize");
    let request_id = init["request_id"].as_str().expect("request id").to_string();
    handle
        .inject(json!({
            "type": "control_response",
            "response": {
                "subtype": "error",
                "request_id": request_id,
                "error": "agent does not speak the control protocol",
            },
        }))
        .await;

    match session.next_message().await {
        Some(Err(SdkError::Control(msg))) => {
            assert!(msg.contains("control protocol"), "unexpected error: {msg}");
        }
        other => panic!("expected the handshake failure, got: {other:?}"),
    }

    handle.inject(assistant_frame("s-degraded", "still here")).await;
    assert!(matches!(
        session.next_message().await,
        Some(Ok(Message::Assistant(_)))
    ));

    drop(handle.to_session);
    assert!(session.next_message().await.is_none());
}
