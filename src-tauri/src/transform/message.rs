use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config;

/// Remote field names, as they appear in the client's JSON payloads.
pub const FIELD_TYPE: &str = "MsgType";
pub const FIELD_DIGEST: &str = "MMDigest";
pub const FIELD_CONTENT: &str = "MMActualContent";
pub const FIELD_IMG_STYLE: &str = "MMImgStyle";
pub const FIELD_PEER: &str = "MMPeerUserName";
pub const FIELD_UNREAD: &str = "MMUnread";
pub const FIELD_IMG_WIDTH: &str = "ImgWidth";
pub const FIELD_IMG_HEIGHT: &str = "ImgHeight";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum MsgKind {
    Text,
    Emoticon,
    SystemRecallNotice,
    Other,
}

/// One chat event as seen by the transform pipeline.
///
/// Fields overridden during classification are sealed: later writes through
/// the setters are silently ignored, so the remote client's own rendering
/// code cannot revert an override. Sealing is keyed by the remote field
/// name so the page-side lock list and the host-side guard agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    peer_user_id: String,
    kind: MsgKind,
    digest: String,
    image_width: Option<u32>,
    image_height: Option<u32>,
    unread: bool,
    // Interception time, not the client's own timestamp (that stays in raw).
    #[serde(default = "Utc::now")]
    received_at: DateTime<Utc>,
    raw: Value,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    sealed: BTreeSet<String>,
}

fn str_field(element: &Value, key: &str) -> String {
    element
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn u32_field(element: &Value, key: &str) -> Option<u32> {
    element.get(key).and_then(Value::as_u64).map(|v| v as u32)
}

impl Message {
    /// Builds a message from one raw `AddMsgList` element. Unclassified
    /// elements with textual content count as `Text`, the rest as `Other`.
    pub fn from_raw(element: &Value) -> Self {
        let kind = if element.get(FIELD_CONTENT).map_or(false, Value::is_string) {
            MsgKind::Text
        } else {
            MsgKind::Other
        };

        Self {
            peer_user_id: str_field(element, FIELD_PEER),
            kind,
            digest: str_field(element, FIELD_DIGEST),
            image_width: u32_field(element, FIELD_IMG_WIDTH),
            image_height: u32_field(element, FIELD_IMG_HEIGHT),
            unread: element
                .get(FIELD_UNREAD)
                .and_then(Value::as_bool)
                .unwrap_or(true),
            received_at: Utc::now(),
            raw: element.clone(),
            sealed: BTreeSet::new(),
        }
    }

    pub fn peer_user_id(&self) -> &str {
        &self.peer_user_id
    }

    pub fn kind(&self) -> MsgKind {
        self.kind
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn image_width(&self) -> Option<u32> {
        self.image_width
    }

    pub fn image_height(&self) -> Option<u32> {
        self.image_height
    }

    pub fn unread(&self) -> bool {
        self.unread
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// Remote field names locked by classification; the page-side injector
    /// re-applies these as property locks so the client cannot overwrite.
    pub fn sealed_fields(&self) -> impl Iterator<Item = &str> {
        self.sealed.iter().map(String::as_str)
    }

    pub fn is_sealed(&self, field: &str) -> bool {
        self.sealed.contains(field)
    }

    fn seal(&mut self, field: &str) {
        self.sealed.insert(field.to_string());
    }

    fn write_raw(&mut self, field: &str, value: Value) {
        if let Value::Object(map) = &mut self.raw {
            map.insert(field.to_string(), value);
        }
    }

    /// Ignored once `MMDigest` is sealed.
    pub fn set_digest(&mut self, digest: impl Into<String>) {
        if self.is_sealed(FIELD_DIGEST) {
            return;
        }
        self.digest = digest.into();
        self.write_raw(FIELD_DIGEST, Value::String(self.digest.clone()));
    }

    /// Ignored once `MsgType` is sealed.
    pub fn set_kind(&mut self, kind: MsgKind) {
        if self.is_sealed(FIELD_TYPE) {
            return;
        }
        self.kind = kind;
    }

    pub fn mark_read(&mut self) {
        self.unread = false;
        self.write_raw(FIELD_UNREAD, Value::Bool(false));
    }

    /// Emoticon override: fixed digest, oversized stickers clamped to
    /// `EMOJI_MAX_SIZE` on the larger axis with the other axis automatic.
    pub fn classify_emoticon(&mut self) {
        self.set_kind(MsgKind::Emoticon);
        self.set_digest(config::EMOTICON_DIGEST);
        self.seal(FIELD_TYPE);
        self.seal(FIELD_DIGEST);

        let max = config::EMOJI_MAX_SIZE;
        if self.image_height.map_or(false, |h| h >= max) {
            self.image_height = Some(max);
            self.image_width = None;
            self.write_raw(
                FIELD_IMG_STYLE,
                json!({ "height": format!("{max}px"), "width": "initial" }),
            );
            self.seal(FIELD_IMG_STYLE);
        } else if self.image_width.map_or(false, |w| w >= max) {
            self.image_width = Some(max);
            self.image_height = None;
            self.write_raw(
                FIELD_IMG_STYLE,
                json!({ "width": format!("{max}px"), "height": "initial" }),
            );
            self.seal(FIELD_IMG_STYLE);
        }
    }

    /// Anti-recall override: the message is retyped to the system-notice
    /// discriminant and both content and digest are replaced with the
    /// fixed placeholder. Idempotent.
    pub fn classify_recalled(&mut self, sys_discriminant: Value) {
        self.set_kind(MsgKind::SystemRecallNotice);
        self.set_digest(config::RECALL_PLACEHOLDER);
        self.write_raw(FIELD_TYPE, sys_discriminant);
        self.write_raw(
            FIELD_CONTENT,
            Value::String(config::RECALL_PLACEHOLDER.to_string()),
        );
        self.seal(FIELD_TYPE);
        self.seal(FIELD_DIGEST);
        self.seal(FIELD_CONTENT);
    }
}
