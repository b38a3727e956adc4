//! Export document builders.

use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};

pub const CREATED_AT: &str = "2024-05-01T09:00:00.000000+00:00";

/// A chat message with a direct text field.
pub fn message(uuid: &str, sender: &str, parent: Option<&str>) -> Value {
    json!({
        "uuid": uuid,
        "sender": sender,
        "text": format!("text of {uuid}"),
        "content": [],
        "created_at": CREATED_AT,
        "updated_at": CREATED_AT,
        "parent_message_uuid": parent,
    })
}

/// A message alternating human/assistant by position, handy for generated trees.
pub fn message_at(position: usize, uuid: &str, parent: Option<&str>) -> Value {
    let sender = if position % 2 == 0 { "human" } else { "assistant" };
    message(uuid, sender, parent)
}

pub fn conversation(uuid: &str, messages: Vec<Value>) -> Value {
    json!({
        "uuid": uuid,
        "name": format!("Conversation {uuid}"),
        "created_at": CREATED_AT,
        "updated_at": CREATED_AT,
        "chat_messages": messages,
    })
}

/// Write an export array into `dir` and return its path.
pub fn write_export(dir: &Path, name: &str, conversations: &[Value]) -> PathBuf {
    let path = dir.join(name);
    let body = serde_json::to_string_pretty(&Value::Array(conversations.to_vec()))
        .expect("serialize export");
    fs::write(&path, body).expect("write export");
    path
}

/// The two-message export from the basic re-import scenario.
pub fn scenario_one(dir: &Path) -> PathBuf {
    write_export(
        dir,
        "scenario_one.json",
        &[conversation(
            "c1",
            vec![
                message("m1", "human", None),
                message("m2", "assistant", Some("m1")),
            ],
        )],
    )
}

/// `scenario_one` re-exported with a second reply to `m1`.
pub fn scenario_two(dir: &Path) -> PathBuf {
    write_export(
        dir,
        "scenario_two.json",
        &[conversation(
            "c1",
            vec![
                message("m1", "human", None),
                message("m2", "assistant", Some("m1")),
                message("m3", "assistant", Some("m1")),
            ],
        )],
    )
}
