//! End-to-end scenarios through the public API.
//!
//! Tests cover:
//! - Handle allocation order with the self contact first
//! - Inbound message creating a channel with a pending message
//! - Repeated handle requests returning the same handle
//! - A client send surfacing as a `message_sent` event envelope

use simplecm::channel::ChannelRequest;
use simplecm::connection::{ConnectionStatus, ContactListState};
use simplecm::message::MessageParts;
use simplecm::{Chat, ChatKind, ConnectionEvent, HandleType, Message, Service};

fn connected_service() -> Service {
    let mut service = Service::new();
    service.set_manager_name("simplecm");
    service.set_protocol_name("simple");
    service.set_self_contact_identifier("me");
    service.start().unwrap();
    service.request_connection().unwrap().connect();
    service
}

#[test]
fn first_contact_gets_handle_two() {
    let mut service = connected_service();
    let conn = service.connection_mut().unwrap();
    assert_eq!(conn.self_handle(), 1);
    assert_eq!(conn.ensure_contact("alice"), 2);
    assert_eq!(conn.ensure_contact("alice"), 2);
    assert_eq!(conn.handles().lookup(2), Some("alice"));
}

#[test]
fn inbound_message_creates_channel() {
    let mut service = connected_service();
    service
        .add_message(&Message {
            chat: Chat::contact("alice"),
            from: "alice".to_string(),
            text: "hi".to_string(),
        })
        .unwrap();

    let conn = service.connection().unwrap();
    let channel = conn.channels().find(HandleType::Contact, 2).unwrap();
    assert_eq!(channel.target_id(), "alice");
    assert_eq!(channel.pending_messages().len(), 1);
    assert_eq!(channel.pending_messages()[0].message.plain_text(), Some("hi"));
}

#[test]
fn request_handles_is_stable() {
    let mut service = connected_service();
    let conn = service.connection_mut().unwrap();
    let first = conn.request_handles(HandleType::Contact, &["bob"]).unwrap();
    let second = conn.request_handles(HandleType::Contact, &["bob"]).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        conn.inspect_handles(HandleType::Contact, &first).unwrap(),
        vec!["bob".to_string()]
    );
}

#[test]
fn connect_reaches_contact_list_success() {
    let service = connected_service();
    let conn = service.connection().unwrap();
    assert_eq!(conn.status(), ConnectionStatus::Connected);
    assert_eq!(conn.contact_list_state(), ContactListState::Success);
    assert_eq!(conn.presence(conn.self_handle()).status, "available");
}

#[test]
fn client_send_becomes_event() {
    let mut service = connected_service();
    service.drain_events();

    let conn = service.connection_mut().unwrap();
    let ensured = conn.ensure_channel(&ChannelRequest::text_to_id("carol")).unwrap();
    conn.send_message(&ensured.object_path, &MessageParts::outgoing_text("hey"), 0)
        .unwrap();

    let envelopes = service.drain_events();
    let sent = envelopes
        .iter()
        .find_map(|e| match &e.event {
            ConnectionEvent::MessageSent { chat, text, .. } => Some((chat, text)),
            _ => None,
        })
        .expect("message_sent event");
    assert_eq!(sent.0.identifier, "carol");
    assert_eq!(sent.0.kind, ChatKind::Contact);
    assert_eq!(sent.1, "hey");

    let json = serde_json::to_value(envelopes.last().unwrap()).unwrap();
    assert_eq!(json["version"], 1);
    assert_eq!(json["event"]["type"], "message_sent");
}
