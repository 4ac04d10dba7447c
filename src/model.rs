//! The normalized data model (§3): contacts, chats, messages, attachments.

use std::collections::BTreeMap;

use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::{ChatId, ContactId, MsgId};

/// Identity attributes of a remote user or group.
///
/// Created on first observation, mutated by subsequent profile sync events,
/// never destroyed except with the owning profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub id: ContactId,
    pub name: String,
    pub phone: Option<String>,
    pub is_self: bool,
}

impl ContactInfo {
    pub fn new(id: ContactId) -> Self {
        ContactInfo {
            id,
            name: String::new(),
            phone: None,
            is_self: false,
        }
    }
}

/// A conversation addressable within one profile.
///
/// Invariant: one `ChatInfo` per `(profileId, chatId)`; mutated when new
/// messages arrive or the user marks the chat read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: ChatId,
    pub is_unread: bool,
    pub is_unread_mention: bool,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub last_message_time: i64,
}

impl ChatInfo {
    /// The minimal chat synthesized on first encounter of a message whose
    /// chat is not yet known (§3 invariant).
    pub fn synthesize(id: ChatId) -> Self {
        ChatInfo {
            id,
            is_unread: false,
            is_unread_mention: false,
            is_muted: false,
            is_pinned: false,
            last_message_time: 0,
        }
    }
}

/// One of `{None, NotDownloaded, Downloaded, Downloading, DownloadFailed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromPrimitive, ToPrimitive)]
pub enum FileStatus {
    None,
    NotDownloaded,
    Downloaded,
    Downloading,
    DownloadFailed,
}

impl Default for FileStatus {
    fn default() -> Self {
        FileStatus::None
    }
}

/// Attachment descriptor, carried hex-encoded inside `ChatMessage::file_info`
/// (§6).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_path: String,
    pub file_type: String,
    pub file_id: String,
    pub file_status: FileStatus,
}

impl FileStatus {
    pub(crate) fn to_u8(self) -> u8 {
        num_traits::ToPrimitive::to_u8(&self).expect("FileStatus variants fit in a u8")
    }

    pub(crate) fn from_u8(v: u8) -> crate::error::Result<Self> {
        num_traits::FromPrimitive::from_u8(v).ok_or(crate::error::Error::InvalidFileInfo)
    }
}

/// Atomic content unit (§3).
///
/// `id` is unique within `(profileId, chatId)` and MUST be stable across
/// restarts. `time_sent` is made strictly monotonic per message by
/// [`ChatMessage::apply_tiebreak`]: when two messages in the same chat share
/// a coarse timestamp, a low-order byte derived from `hash(id) mod 256` is
/// added. Whether 256 buckets is enough to avoid collisions in very active
/// chats is an open question carried over unresolved from the source this
/// spec was distilled from (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MsgId,
    pub sender_id: ContactId,
    pub chat_id: ChatId,
    pub text: String,
    pub quoted_id: Option<MsgId>,
    pub quoted_text: Option<String>,
    pub quoted_sender: Option<ContactId>,
    /// Hex-encoded attachment descriptor; empty when no file (§6).
    pub file_info: String,
    pub time_sent: i64,
    pub is_outgoing: bool,
    pub is_read: bool,
    pub reactions: BTreeMap<String, String>,
}

impl ChatMessage {
    pub fn new(id: MsgId, chat_id: ChatId, sender_id: ContactId, text: String) -> Self {
        ChatMessage {
            id,
            sender_id,
            chat_id,
            text,
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: String::new(),
            time_sent: 0,
            is_outgoing: false,
            is_read: false,
            reactions: BTreeMap::new(),
        }
    }

    /// Tiebreaker hash of the message id, in `0..256`, used to nudge a
    /// colliding `time_sent` forward by a deterministic, stable amount.
    pub fn tiebreak_byte(id: &MsgId) -> u8 {
        let digest = Sha256::digest(id.as_str().as_bytes());
        digest[digest.len() - 1]
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch — the unit
/// `ChatMessage::time_sent` is expressed in (§3). Adapters stamp outgoing
/// messages with this at the moment the backend acknowledges the send.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tiebreak_is_deterministic() {
        let id = MsgId::from("msg-42");
        assert_eq!(
            ChatMessage::tiebreak_byte(&id),
            ChatMessage::tiebreak_byte(&id)
        );
    }

    #[test]
    fn file_status_round_trips_through_wire_byte() {
        for status in [
            FileStatus::None,
            FileStatus::NotDownloaded,
            FileStatus::Downloaded,
            FileStatus::Downloading,
            FileStatus::DownloadFailed,
        ] {
            assert_eq!(FileStatus::from_u8(status.to_u8()).unwrap(), status);
        }
    }
}
