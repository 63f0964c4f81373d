//! Application message payloads.
//!
//! Only the text message type is modelled. The request body posted to
//! `cgi-bin/message/send` looks like:
//!
//! ```json
//! {
//!   "touser": "UserID1|UserID2",
//!   "toparty": "PartyID1",
//!   "totag": "TagID1",
//!   "msgtype": "text",
//!   "agentid": 1,
//!   "text": { "content": "Holiday request from Pony" },
//!   "safe": 0
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Path of the message dispatch endpoint, relative to the API base URL.
pub const SEND_PATH: &str = "cgi-bin/message/send";

/// Recipient value addressing every member visible to the application.
pub const ALL_USERS: &str = "@all";

/// Who receives a message.
///
/// Users, departments ("parties") and tags can be combined; the server sends
/// to the union.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    /// Member user IDs.
    pub users: Vec<String>,

    /// Department IDs.
    pub parties: Vec<String>,

    /// Tag IDs.
    pub tags: Vec<String>,
}

impl Recipients {
    /// Address everyone the application can see.
    pub fn all() -> Self {
        Self {
            users: vec![ALL_USERS.to_string()],
            ..Self::default()
        }
    }

    /// Address the given users.
    pub fn users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add departments.
    pub fn with_parties<I, S>(mut self, parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parties.extend(parties.into_iter().map(Into::into));
        self
    }

    /// Add tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Whether no recipient is set at all.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.parties.is_empty() && self.tags.is_empty()
    }
}

fn join_ids(ids: &[String]) -> Option<String> {
    let joined = ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>()
        .join("|");
    (!joined.is_empty()).then_some(joined)
}

/// A plain text application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    /// Recipients.
    pub recipients: Recipients,

    /// Application (agent) ID sending the message.
    pub agent_id: i64,

    /// Message text.
    pub content: String,

    /// Mark the message as confidential (no forwarding, watermark).
    pub safe: bool,
}

impl TextMessage {
    /// Create a message from agent 0 that is not confidential.
    pub fn new(recipients: Recipients, content: impl Into<String>) -> Self {
        Self {
            recipients,
            agent_id: 0,
            content: content.into(),
            safe: false,
        }
    }

    /// Set the sending application.
    pub fn with_agent_id(mut self, agent_id: i64) -> Self {
        self.agent_id = agent_id;
        self
    }

    /// Mark the message as confidential.
    pub fn confidential(mut self) -> Self {
        self.safe = true;
        self
    }

    /// Build the request body.
    pub fn to_payload(&self) -> serde_json::Value {
        let body = TextPayload {
            touser: join_ids(&self.recipients.users),
            toparty: join_ids(&self.recipients.parties),
            totag: join_ids(&self.recipients.tags),
            msgtype: "text",
            agentid: self.agent_id,
            text: TextContent {
                content: &self.content,
            },
            safe: u8::from(self.safe),
        };
        serde_json::json!(body)
    }
}

#[derive(Serialize)]
struct TextPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    touser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    toparty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    totag: Option<String>,
    msgtype: &'static str,
    agentid: i64,
    text: TextContent<'a>,
    safe: u8,
}

#[derive(Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

/// Acknowledgement returned by the dispatch endpoint.
///
/// The server still answers `errcode: 0` when only some recipients were
/// invalid; those are listed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Invalid user IDs, `|`-separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invaliduser: Option<String>,

    /// Invalid department IDs, `|`-separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidparty: Option<String>,

    /// Invalid tag IDs, `|`-separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidtag: Option<String>,

    /// Message ID, usable to recall the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgid: Option<String>,
}

impl SendReceipt {
    /// Whether every recipient was accepted.
    pub fn all_delivered(&self) -> bool {
        [&self.invaliduser, &self.invalidparty, &self.invalidtag]
            .iter()
            .all(|field| field.as_deref().is_none_or(str::is_empty))
    }
}
