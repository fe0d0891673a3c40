// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! End-to-end signaling tests against an in-process relay.
//!
//! Covers:
//! - credential pairing into a shared token
//! - verbatim relay of offer / answer / candidate / leave to the peer only
//! - wrong-password and full-room logins leaving the room untouched
//! - leave notification and room cleanup on disconnect
//! - per-sender ordering under a burst of candidates
//! - binary frames dispatched like text

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rendezvous_proto::codec;
use rendezvous_proto::signal::{LoginResult, ServerMessage, Token};
use rendezvous_relay::registry::Registry;
use rendezvous_relay::relay::{self, RelayState};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite;

type Client =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the relay in-process and return its state and a ws:// URL.
async fn start_relay() -> (String, Arc<RelayState>) {
    let state = Arc::new(RelayState::with_config(
        relay::DEFAULT_MAX_MESSAGE_SIZE,
        Registry::new(b"integration"),
    ));
    let (addr, _handle) = relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start relay server");
    (format!("ws://{addr}/"), state)
}

async fn connect(url: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn send(ws: &mut Client, value: Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Receive the next frame's text exactly as the relay wrote it.
async fn recv_text(ws: &mut Client) -> String {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("recv timed out")
        .unwrap()
        .unwrap();
    msg.to_text().unwrap().to_owned()
}

async fn recv(ws: &mut Client) -> ServerMessage {
    codec::decode_server(&recv_text(ws).await).unwrap()
}

/// Asserts nothing arrives on `ws` within a short window.
async fn assert_quiet(ws: &mut Client) {
    let next = tokio::time::timeout(Duration::from_millis(150), ws.next()).await;
    assert!(next.is_err(), "unexpected message: {next:?}");
}

async fn login(ws: &mut Client, secret: &str, password: &str) -> ServerMessage {
    send(
        ws,
        json!({"type": "login", "secret": secret, "password": password}),
    )
    .await;
    recv(ws).await
}

async fn login_ok(ws: &mut Client, secret: &str, password: &str) -> Token {
    match login(ws, secret, password).await {
        ServerMessage::Login(LoginResult::Success { token }) => token,
        other => panic!("expected login success, got {other:?}"),
    }
}

// =============================================================================
// Pairing
// =============================================================================

#[tokio::test]
async fn pairing_scenario() {
    let (url, state) = start_relay().await;
    let mut conn1 = connect(&url).await;
    let mut conn2 = connect(&url).await;
    let mut conn3 = connect(&url).await;

    let token = login_ok(&mut conn1, "abc", "x").await;
    assert_eq!(state.registry.room_of(&token).map(|m| m.len()), Some(1));

    assert_eq!(login_ok(&mut conn2, "abc", "x").await, token);
    assert_eq!(state.registry.room_of(&token).map(|m| m.len()), Some(2));

    send(
        &mut conn1,
        json!({"type": "offer", "token": token, "offer": {"sdp": "..."}}),
    )
    .await;
    assert_eq!(
        recv(&mut conn2).await,
        ServerMessage::Offer {
            offer: json!({"sdp": "..."})
        }
    );
    assert_quiet(&mut conn1).await;

    assert_eq!(
        login(&mut conn3, "abc", "y").await,
        ServerMessage::Login(LoginResult::failure("wrong password"))
    );
    assert_eq!(state.registry.room_of(&token).map(|m| m.len()), Some(2));
}

#[tokio::test]
async fn third_participant_gets_room_full() {
    let (url, state) = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let mut c = connect(&url).await;

    let token = login_ok(&mut a, "abc", "x").await;
    login_ok(&mut b, "abc", "x").await;

    match login(&mut c, "abc", "x").await {
        ServerMessage::Login(LoginResult::Failure { error, success }) => {
            assert!(!success);
            assert!(error.contains("room is full"), "got: {error}");
        }
        other => panic!("expected login failure, got {other:?}"),
    }
    assert_eq!(state.registry.room_of(&token).map(|m| m.len()), Some(2));
}

#[tokio::test]
async fn independent_rooms_do_not_leak() {
    let (url, _state) = start_relay().await;
    let mut a1 = connect(&url).await;
    let mut a2 = connect(&url).await;
    let mut b1 = connect(&url).await;
    let mut b2 = connect(&url).await;

    let ta = login_ok(&mut a1, "room-a", "pw").await;
    login_ok(&mut a2, "room-a", "pw").await;
    let tb = login_ok(&mut b1, "room-b", "pw").await;
    login_ok(&mut b2, "room-b", "pw").await;
    assert_ne!(ta, tb);

    send(
        &mut a1,
        json!({"type": "candidate", "token": ta, "candidate": {"c": 1}}),
    )
    .await;
    assert_eq!(
        recv(&mut a2).await,
        ServerMessage::Candidate {
            candidate: json!({"c": 1})
        }
    );
    assert_quiet(&mut b1).await;
    assert_quiet(&mut b2).await;
}

#[tokio::test]
async fn concurrent_first_logins_one_wins() {
    let (url, state) = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;

    let (reply_a, reply_b) = tokio::join!(login(&mut a, "race", "x"), login(&mut b, "race", "y"));

    let wrong = ServerMessage::Login(LoginResult::failure("wrong password"));
    let token = match (reply_a, reply_b) {
        (ServerMessage::Login(LoginResult::Success { token }), other)
        | (other, ServerMessage::Login(LoginResult::Success { token })) => {
            assert_eq!(other, wrong);
            token
        }
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert_eq!(state.registry.room_of(&token).map(|m| m.len()), Some(1));
}

// =============================================================================
// Relay
// =============================================================================

#[tokio::test]
async fn payload_text_relayed_unchanged() {
    let (url, _state) = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let token = login_ok(&mut a, "verbatim", "pw").await;
    login_ok(&mut b, "verbatim", "pw").await;

    let frame = format!(
        r#"{{"type":"offer","token":"{token}","offer":{{"z":1,"a":2,"type":"offer"}}}}"#
    );
    a.send(tungstenite::Message::Text(frame.into())).await.unwrap();

    assert_eq!(
        recv_text(&mut b).await,
        r#"{"type":"offer","offer":{"z":1,"a":2,"type":"offer"}}"#
    );
}

#[tokio::test]
async fn full_handshake_round_trip() {
    let (url, _state) = start_relay().await;
    let mut caller = connect(&url).await;
    let mut callee = connect(&url).await;
    let token = login_ok(&mut caller, "meet", "pw").await;
    login_ok(&mut callee, "meet", "pw").await;

    let offer = json!({"type": "offer", "sdp": "v=0\r\na=group:BUNDLE 0\r\n"});
    send(&mut caller, json!({"type": "offer", "token": token, "offer": offer})).await;
    assert_eq!(recv(&mut callee).await, ServerMessage::Offer { offer });

    let answer = json!({"type": "answer", "sdp": "v=0\r\na=setup:active\r\n"});
    send(&mut callee, json!({"type": "answer", "token": token, "answer": answer})).await;
    assert_eq!(recv(&mut caller).await, ServerMessage::Answer { answer });

    send(&mut callee, json!({"type": "leave", "token": token})).await;
    assert_eq!(recv(&mut caller).await, ServerMessage::Leave);
    assert_quiet(&mut callee).await;
}

#[tokio::test]
async fn candidates_arrive_in_send_order() {
    let (url, _state) = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let token = login_ok(&mut a, "order", "pw").await;
    login_ok(&mut b, "order", "pw").await;

    for i in 0..50 {
        send(
            &mut a,
            json!({"type": "candidate", "token": token, "candidate": {"seq": i}}),
        )
        .await;
    }
    for i in 0..50 {
        assert_eq!(
            recv(&mut b).await,
            ServerMessage::Candidate {
                candidate: json!({"seq": i})
            }
        );
    }
}

#[tokio::test]
async fn offer_before_partner_is_dropped_silently() {
    let (url, _state) = start_relay().await;
    let mut a = connect(&url).await;
    let token = login_ok(&mut a, "alone", "pw").await;

    send(
        &mut a,
        json!({"type": "offer", "token": token, "offer": {"sdp": "early"}}),
    )
    .await;
    assert_quiet(&mut a).await;
}

#[tokio::test]
async fn offer_for_unknown_token_reports_room_not_found() {
    let (url, _state) = start_relay().await;
    let mut a = connect(&url).await;

    send(
        &mut a,
        json!({"type": "offer", "token": "0000", "offer": {}}),
    )
    .await;
    assert_eq!(recv(&mut a).await, ServerMessage::error("room not found"));

    // Handler survived.
    login_ok(&mut a, "abc", "x").await;
}

#[tokio::test]
async fn foreign_token_reply_does_not_reveal_room() {
    let (url, _state) = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let token = login_ok(&mut a, "private", "pw").await;

    send(&mut b, json!({"type": "offer", "token": token, "offer": {}})).await;
    let live = recv_text(&mut b).await;
    send(&mut b, json!({"type": "offer", "token": "0000", "offer": {}})).await;
    let absent = recv_text(&mut b).await;

    assert_eq!(live, absent);
    assert_quiet(&mut a).await;
}

#[tokio::test]
async fn unknown_command_reported() {
    let (url, _state) = start_relay().await;
    let mut a = connect(&url).await;
    send(&mut a, json!({"type": "subscribe"})).await;
    assert_eq!(
        recv(&mut a).await,
        ServerMessage::error("Command not found: subscribe")
    );
}

#[tokio::test]
async fn binary_login_accepted() {
    let (url, state) = start_relay().await;
    let mut a = connect(&url).await;
    let frame = json!({"type": "login", "secret": "bin", "password": "pw"}).to_string();

    a.send(tungstenite::Message::Binary(frame.into_bytes().into()))
        .await
        .unwrap();

    let expected = state.registry.derive_token("bin", "pw");
    assert_eq!(
        recv(&mut a).await,
        ServerMessage::Login(LoginResult::Success {
            token: expected.clone()
        })
    );
    assert_eq!(state.registry.room_of(&expected).map(|m| m.len()), Some(1));
}

#[tokio::test]
async fn non_utf8_binary_frame_reported() {
    let (url, _state) = start_relay().await;
    let mut a = connect(&url).await;

    a.send(tungstenite::Message::Binary(vec![0xc3, 0x28, 0xff].into()))
        .await
        .unwrap();
    assert_eq!(
        recv(&mut a).await,
        ServerMessage::error("Command not found: undefined")
    );

    // Handler survived.
    login_ok(&mut a, "abc", "x").await;
}

// =============================================================================
// Disconnect
// =============================================================================

#[tokio::test]
async fn disconnect_notifies_peer_and_frees_slot() {
    let (url, state) = start_relay().await;
    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    let token = login_ok(&mut a, "abc", "x").await;
    login_ok(&mut b, "abc", "x").await;

    drop(a);

    assert_eq!(recv(&mut b).await, ServerMessage::Leave);
    assert_eq!(state.registry.room_of(&token).map(|m| m.len()), Some(1));

    // A replacement participant can take the free slot and reach b.
    let mut c = connect(&url).await;
    assert_eq!(login_ok(&mut c, "abc", "x").await, token);
    send(
        &mut c,
        json!({"type": "offer", "token": token, "offer": {"sdp": "again"}}),
    )
    .await;
    assert_eq!(
        recv(&mut b).await,
        ServerMessage::Offer {
            offer: json!({"sdp": "again"})
        }
    );
}

#[tokio::test]
async fn last_disconnect_removes_room() {
    let (url, state) = start_relay().await;
    let mut a = connect(&url).await;
    let token = login_ok(&mut a, "abc", "x").await;

    a.close(None).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.registry.room_of(&token).is_some() {
        assert!(tokio::time::Instant::now() < deadline, "room never removed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.connection_count().await, 0);
}
