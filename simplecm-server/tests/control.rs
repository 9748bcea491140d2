//! Control protocol tests against a live server on an ephemeral port.
//!
//! Tests cover:
//! - Connect, contacts and handle inspection over TCP
//! - Inbound messages surfacing as event lines
//! - Client sends broadcast to every session
//! - Presets seeding the contact list at startup

use std::time::Duration;

use serde_json::Value;
use simplecm_server::config::ServerConfig;
use simplecm_server::server::Server;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

const TIMEOUT_MS: u64 = 5000;

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    /// Event lines seen while waiting for replies.
    events: Vec<Value>,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            events: Vec::new(),
        }
    }

    async fn next(&mut self) -> Value {
        let line = timeout(Duration::from_millis(TIMEOUT_MS), self.lines.next_line())
            .await
            .expect("timeout waiting for line")
            .unwrap()
            .expect("server closed the session");
        serde_json::from_str(&line).unwrap()
    }

    /// Send a command and return its reply, stashing events seen on the way.
    async fn call(&mut self, command: &str) -> Value {
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await
            .unwrap();
        loop {
            let value = self.next().await;
            if value.get("ok").is_some() {
                return value;
            }
            self.events.push(value);
        }
    }

    /// Wait for an event of `kind`, checking stashed events first.
    async fn wait_event(&mut self, kind: &str) -> Value {
        if let Some(pos) = self
            .events
            .iter()
            .position(|e| e["event"]["type"] == kind)
        {
            return self.events.remove(pos);
        }
        loop {
            let value = self.next().await;
            if value["event"]["type"] == kind {
                return value;
            }
        }
    }
}

async fn start_server(config: ServerConfig) -> std::net::SocketAddr {
    let config = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..config
    };
    let (addr, _handle) = Server::new(config).start().await.unwrap();
    addr
}

#[tokio::test]
async fn connect_and_resolve_handles() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;

    let reply = client.call("CONNECT").await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["self_handle"], 1);

    assert_eq!(client.call("CONTACT alice").await["handle"], 2);
    let first = client.call("HANDLES bob").await;
    let second = client.call("HANDLES bob").await;
    assert_eq!(first["handles"], second["handles"]);
    assert_eq!(
        client.call("INSPECT 1 2").await["identifiers"],
        serde_json::json!(["me", "alice"])
    );

    let err = client.call("INSPECT 0").await;
    assert_eq!(err["ok"], false);
    assert_eq!(err["error"]["name"], "org.freedesktop.Telepathy.Error.InvalidHandle");
}

#[tokio::test]
async fn unknown_command_is_an_error_reply() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;
    let reply = client.call("FROB").await;
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"]["name"], "org.freedesktop.Telepathy.Error.InvalidArgument");
}

#[tokio::test]
async fn inbound_message_is_an_event() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;
    client.call("CONNECT").await;

    let reply = client.call("RECV alice hi").await;
    assert_eq!(reply["ok"], true);

    let channel = client.wait_event("new_channel").await;
    assert_eq!(channel["event"]["data"]["target_id"], "alice");
    assert_eq!(channel["event"]["data"]["requested"], false);

    let received = client.wait_event("message_received").await;
    assert_eq!(received["version"], 1);
    assert_eq!(received["event"]["data"]["pending_id"], reply["pending_id"]);
    assert_eq!(
        received["event"]["data"]["message"][1]["content"],
        "hi"
    );
}

#[tokio::test]
async fn sends_reach_every_session() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;
    let mut observer = Client::connect(addr).await;
    client.call("CONNECT").await;

    // Make sure the observer is subscribed before the send happens.
    observer.call("STATUS").await;

    let reply = client.call("SEND bob hello bob").await;
    assert_eq!(reply["ok"], true);

    let sent = observer.wait_event("message_sent").await;
    assert_eq!(sent["event"]["data"]["chat"]["identifier"], "bob");
    assert_eq!(sent["event"]["data"]["chat"]["kind"], "contact");
    assert_eq!(sent["event"]["data"]["text"], "hello bob");
    assert_eq!(sent["event"]["data"]["token"], reply["token"]);
}

#[tokio::test]
async fn preset_seeds_contacts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preset.toml");
    std::fs::write(
        &path,
        r#"
self_id = "host"
auto_connect = true
contacts = ["alice", "bob"]

[presences]
alice = "available"
"#,
    )
    .unwrap();

    let addr = start_server(ServerConfig {
        preset: Some(path),
        ..Default::default()
    })
    .await;
    let mut client = Client::connect(addr).await;

    let status = client.call("STATUS").await;
    assert_eq!(status["status"], "connected");

    let list = client.call("LIST").await;
    let contacts = list["contacts"].as_object().unwrap();
    assert_eq!(contacts.len(), 2);
    assert_eq!(
        contacts["2"]["org.freedesktop.Telepathy.Connection.Interface.SimplePresence/presence"][1],
        "available"
    );
    assert_eq!(
        contacts["3"]["org.freedesktop.Telepathy.Connection.Interface.ContactList/subscribe"],
        4
    );
}

#[tokio::test]
async fn quit_closes_the_session() {
    let addr = start_server(ServerConfig::default()).await;
    let mut client = Client::connect(addr).await;
    assert_eq!(client.call("QUIT").await["ok"], true);

    let eof = timeout(Duration::from_millis(TIMEOUT_MS), client.lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert!(eof.is_none());
}
