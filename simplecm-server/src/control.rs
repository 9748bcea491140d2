//! The control protocol: one command per line, one JSON reply per command.
//!
//! ```text
//! CONNECT                 create (once) and connect the connection
//! DISCONNECT              disconnect, closing every channel
//! STATUS                  service and connection state
//! CONTACT <id>            add a contact
//! CONTACTS <id>...        set the contact list
//! PRESENCE <id> <status>  set a contact's presence
//! RECV <id> <text>        deliver a message from <id>
//! RECVJSON <id> <json>    deliver a message given as JSON parts
//! SEND <id> <text>        send a message to <id> as the local client
//! HANDLES <id>...         request contact handles
//! INSPECT <handle>...     identifiers for handles
//! LIST                    contact list attributes
//! ATTRS <handle>...       contact attributes
//! PENDING <id>            pending messages on <id>'s channel
//! ACK <id> <msgid>...     acknowledge pending messages
//! CLOSE <id>              close <id>'s channel
//! QUIT                    end the session
//! ```
//!
//! Replies are `{"ok":true,...}` or `{"ok":false,"error":{"name","message"}}`.

use serde_json::{Value, json};
use simplecm::channel::ChannelRequest;
use simplecm::connection::{CONTACT_LIST_INTERFACE, Connection, SIMPLE_PRESENCE_INTERFACE};
use simplecm::error::WireError;
use simplecm::handle::{Handle, HandleType, NO_HANDLE};
use simplecm::message::MessageParts;
use simplecm::{Chat, Message, Service, ServiceError, TpError};

use crate::config::Seed;

/// Interfaces reported by `LIST` and `ATTRS`.
const ATTRIBUTE_INTERFACES: [&str; 2] = [CONTACT_LIST_INTERFACE, SIMPLE_PRESENCE_INTERFACE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Disconnect,
    Status,
    Contact(String),
    Contacts(Vec<String>),
    Presence { id: String, status: String },
    Recv { id: String, text: String },
    RecvJson { id: String, json: String },
    Send { id: String, text: String },
    Handles(Vec<String>),
    Inspect(Vec<Handle>),
    List,
    Attrs(Vec<Handle>),
    Pending(String),
    Ack { id: String, message_ids: Vec<u32> },
    Close(String),
    Quit,
}

impl Command {
    /// Parse one line. Verbs are case-insensitive; message text keeps its spacing.
    pub fn parse(line: &str) -> Result<Self, TpError> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim_start()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match verb.to_ascii_uppercase().as_str() {
            "CONNECT" => Self::Connect,
            "DISCONNECT" => Self::Disconnect,
            "STATUS" => Self::Status,
            "LIST" => Self::List,
            "QUIT" => Self::Quit,
            "CONTACT" => Self::Contact(one_arg(verb, &args)?),
            "CONTACTS" => Self::Contacts(owned(&args)),
            "PRESENCE" => match args.as_slice() {
                [id, status] => Self::Presence {
                    id: id.to_string(),
                    status: status.to_string(),
                },
                _ => return Err(usage(verb, "<id> <status>")),
            },
            "RECV" | "SEND" | "RECVJSON" => {
                let (id, text) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| usage(verb, "<id> <text>"))?;
                let (id, text) = (id.to_string(), text.trim_start().to_string());
                match verb.to_ascii_uppercase().as_str() {
                    "RECV" => Self::Recv { id, text },
                    "SEND" => Self::Send { id, text },
                    _ => Self::RecvJson { id, json: text },
                }
            }
            "HANDLES" => Self::Handles(non_empty(verb, owned(&args))?),
            "INSPECT" => Self::Inspect(non_empty(verb, parse_numbers(&args)?)?),
            "ATTRS" => Self::Attrs(non_empty(verb, parse_numbers(&args)?)?),
            "PENDING" => Self::Pending(one_arg(verb, &args)?),
            "ACK" => match args.split_first() {
                Some((id, ids)) if !ids.is_empty() => Self::Ack {
                    id: id.to_string(),
                    message_ids: parse_numbers(ids)?,
                },
                _ => return Err(usage(verb, "<id> <msgid>...")),
            },
            "CLOSE" => Self::Close(one_arg(verb, &args)?),
            "" => return Err(TpError::invalid_argument("Empty command")),
            _ => return Err(TpError::invalid_argument(format!("Unknown command '{verb}'"))),
        };
        Ok(command)
    }
}

fn one_arg(verb: &str, args: &[&str]) -> Result<String, TpError> {
    match args {
        [arg] => Ok(arg.to_string()),
        _ => Err(usage(verb, "<id>")),
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn non_empty<T>(verb: &str, items: Vec<T>) -> Result<Vec<T>, TpError> {
    if items.is_empty() {
        Err(usage(verb, "<arg>..."))
    } else {
        Ok(items)
    }
}

fn parse_numbers(args: &[&str]) -> Result<Vec<u32>, TpError> {
    args.iter()
        .map(|s| {
            s.parse::<u32>()
                .map_err(|_| TpError::invalid_argument(format!("'{s}' is not a number")))
        })
        .collect()
}

fn usage(verb: &str, args: &str) -> TpError {
    TpError::invalid_argument(format!("Usage: {} {args}", verb.to_ascii_uppercase()))
}

/// Serialize a success reply, merging `fields` into `{"ok":true}`.
pub fn ok_reply(fields: Value) -> String {
    let mut reply = json!({ "ok": true });
    if let (Some(target), Value::Object(extra)) = (reply.as_object_mut(), fields) {
        target.extend(extra);
    }
    reply.to_string()
}

pub fn error_reply(error: &WireError) -> String {
    json!({ "ok": false, "error": error }).to_string()
}

/// Run one command against the service and build the reply line.
pub fn execute(service: &mut Service, seed: &Seed, command: Command) -> String {
    tracing::debug!(?command, "Control command");
    match run(service, seed, command) {
        Ok(fields) => ok_reply(fields),
        Err(e) => {
            tracing::debug!("Command failed: {e}");
            error_reply(&e.to_wire())
        }
    }
}

fn run(service: &mut Service, seed: &Seed, command: Command) -> Result<Value, ServiceError> {
    let fields = match command {
        Command::Connect => {
            if service.connection().is_none() {
                service.request_connection()?;
                apply_seed(service, seed)?;
            }
            let conn = service.connection_mut()?;
            conn.connect();
            json!({ "self_handle": conn.self_handle(), "object_path": conn.object_path() })
        }
        Command::Disconnect => {
            service.connection_mut()?.disconnect();
            json!({})
        }
        Command::Status => status(service),
        Command::Contact(id) => json!({ "handle": service.add_contact(&id)? }),
        Command::Contacts(ids) => {
            service.set_contact_list(&ids)?;
            let conn = service.connection_mut()?;
            let handles: Vec<Handle> = ids.iter().map(|id| conn.handles().reverse_lookup(id)).collect();
            json!({ "handles": handles })
        }
        Command::Presence { id, status } => {
            json!({ "handle": service.set_contact_presence(&id, &status)? })
        }
        Command::Recv { id, text } => {
            let message = Message {
                chat: Chat::contact(id.as_str()),
                from: id,
                text,
            };
            json!({ "pending_id": service.add_message(&message)? })
        }
        Command::RecvJson { id, json } => {
            let pending_id = service.add_json_message(&Chat::contact(id), &json)?;
            json!({ "pending_id": pending_id })
        }
        Command::Send { id, text } => {
            let conn = service.connection_mut()?;
            let ensured = conn.ensure_channel(&ChannelRequest::text_to_id(&id))?;
            let token = conn.send_message(&ensured.object_path, &MessageParts::outgoing_text(&text), 0)?;
            json!({ "channel": ensured.object_path, "token": token })
        }
        Command::Handles(ids) => {
            let handles = service
                .connection_mut()?
                .request_handles(HandleType::Contact, &ids)?;
            json!({ "handles": handles })
        }
        Command::Inspect(handles) => {
            let identifiers = service
                .connection_mut()?
                .inspect_handles(HandleType::Contact, &handles)?;
            json!({ "identifiers": identifiers })
        }
        Command::List => {
            let contacts = service
                .connection_mut()?
                .contact_list_attributes(&ATTRIBUTE_INTERFACES, false);
            json!({ "contacts": contacts })
        }
        Command::Attrs(handles) => {
            let attributes = service
                .connection_mut()?
                .contact_attributes(&handles, &ATTRIBUTE_INTERFACES, false);
            json!({ "attributes": attributes })
        }
        Command::Pending(id) => {
            let conn = service.connection_mut()?;
            let path = channel_for(conn, &id)?;
            let messages = conn.list_pending_messages(&path)?;
            json!({ "channel": path, "messages": messages })
        }
        Command::Ack { id, message_ids } => {
            let conn = service.connection_mut()?;
            let path = channel_for(conn, &id)?;
            conn.acknowledge_pending_messages(&path, &message_ids)?;
            json!({})
        }
        Command::Close(id) => {
            let conn = service.connection_mut()?;
            let path = channel_for(conn, &id)?;
            conn.close_channel(&path)?;
            json!({ "channel": path })
        }
        Command::Quit => json!({}),
    };
    Ok(fields)
}

fn status(service: &Service) -> Value {
    let mut fields = json!({ "service": service.state() });
    if let (Some(conn), Some(map)) = (service.connection(), fields.as_object_mut()) {
        map.insert("status".into(), json!(conn.status()));
        map.insert("contact_list_state".into(), json!(conn.contact_list_state()));
        map.insert("self_handle".into(), json!(conn.self_handle()));
        map.insert("object_path".into(), json!(conn.object_path()));
        map.insert("channels".into(), json!(conn.channels().len()));
    }
    fields
}

/// Object path of the open text channel with contact `id`.
fn channel_for(conn: &Connection, id: &str) -> Result<String, TpError> {
    let handle = conn.handles().reverse_lookup(id);
    if handle == NO_HANDLE {
        return Err(TpError::invalid_handle(format!("Unknown contact '{id}'")));
    }
    conn.channels()
        .find(HandleType::Contact, handle)
        .map(|channel| channel.object_path().to_string())
        .ok_or_else(|| TpError::invalid_argument(format!("No channel with '{id}'")))
}

fn apply_seed(service: &mut Service, seed: &Seed) -> Result<(), ServiceError> {
    if !seed.contacts.is_empty() {
        service.set_contact_list(&seed.contacts)?;
    }
    for (id, status) in &seed.presences {
        if let Err(e) = service.set_contact_presence(id, status) {
            tracing::warn!(contact = %id, status = %status, "Skipping preset presence: {e}");
        }
    }
    tracing::info!(
        contacts = seed.contacts.len(),
        presences = seed.presences.len(),
        "Applied preset"
    );
    Ok(())
}
