use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_frame::Message;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    /// Tables for people, JSON lines for pipes.
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One received message as emitted by `--format json`.
#[derive(Debug, Serialize)]
pub struct MessageRecord<'a> {
    pub msg_type: &'a str,
    pub payload_size: usize,
    pub payload: Payload,
    pub connection: u64,
    pub received_at: u64,
}

/// Payload rendering: embedded JSON when it parses, text when it is UTF-8,
/// otherwise only a size marker.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "encoding", content = "value", rename_all = "lowercase")]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
    Binary(String),
}

impl Payload {
    pub fn from_bytes(payload: &[u8]) -> Self {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
            return Payload::Json(value);
        }
        match std::str::from_utf8(payload) {
            Ok(text) => Payload::Text(text.to_string()),
            Err(_) => Payload::Binary(format!("<binary {} bytes>", payload.len())),
        }
    }

    fn preview(&self) -> String {
        match self {
            Payload::Json(value) => value.to_string(),
            Payload::Text(text) | Payload::Binary(text) => text.clone(),
        }
    }
}

impl<'a> MessageRecord<'a> {
    pub fn new(message: &'a Message, connection: u64) -> Self {
        Self {
            msg_type: &message.msg_type,
            payload_size: message.payload.len(),
            payload: Payload::from_bytes(&message.payload),
            connection,
            received_at: now_unix_seconds(),
        }
    }
}

pub fn print_message(message: &Message, connection: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let record = MessageRecord::new(message, connection);
            println!(
                "{}",
                serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let preview = Payload::from_bytes(&message.payload).preview();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "SIZE", "CONN", "PAYLOAD"])
                .add_row(vec![
                    display_type(&message.msg_type).to_string(),
                    message.payload.len().to_string(),
                    connection.to_string(),
                    preview,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} size={} conn={} payload={}",
                display_type(&message.msg_type),
                message.payload.len(),
                connection,
                Payload::from_bytes(&message.payload).preview()
            );
        }
        OutputFormat::Raw => print_raw(&message.payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn display_type(msg_type: &str) -> &str {
    if msg_type.is_empty() {
        "<untyped>"
    } else {
        msg_type
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
