//! Backend reply parsing
//!
//! Models often wrap JSON in a Markdown code fence and are loose with the
//! casing of `action`. Both are tolerated; anything else that is not an
//! operation list or an envelope is `BackendMalformed`.

use super::BackendReply;
use crate::files::EditOperation;
use crate::{Result, VoiceFlowError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default, alias = "edits", alias = "changes")]
    operations: Vec<EditOperation>,
}

/// Remove a surrounding ``` fence (with or without a language tag)
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn normalize_actions(value: &mut Value) {
    let ops = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map
            .iter_mut()
            .find(|(k, _)| matches!(k.as_str(), "operations" | "edits" | "changes"))
        {
            Some((_, Value::Array(items))) => items,
            _ => return,
        },
        _ => return,
    };
    for op in ops.iter_mut() {
        if let Some(Value::String(action)) = op.get_mut("action") {
            *action = action.trim().to_lowercase();
        }
    }
}

/// Parse raw model text into a reply
pub fn parse_reply(raw: &str) -> Result<BackendReply> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(VoiceFlowError::BackendMalformed("empty reply".into()));
    }

    let mut value: Value = serde_json::from_str(body)?;
    normalize_actions(&mut value);

    match value {
        Value::Array(_) => {
            let operations: Vec<EditOperation> = serde_json::from_value(value)?;
            Ok(BackendReply {
                operations,
                reply: None,
            })
        }
        Value::Object(_) => {
            let envelope: Envelope = serde_json::from_value(value)?;
            Ok(BackendReply {
                operations: envelope.operations,
                reply: envelope.reply.filter(|r| !r.trim().is_empty()),
            })
        }
        other => Err(VoiceFlowError::BackendMalformed(format!(
            "expected an object or array, got {}",
            other
        ))),
    }
}
