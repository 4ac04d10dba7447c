//! C1: the closed `Request`/`Notification` sum types that form the wire
//! between UI, cache, and adapters (§4.1). Every variant carries its
//! `profile_id`; a failed notification still carries enough echoed
//! identity (`chat_id`, `msg_id`, `profile_id`) for the UI to correlate it
//! with the originating request (§4.1).
//!
//! Modeled on the teacher's closed `Action` enum (`job.rs`) and the newer
//! `Event` enum (`events.rs` in the retrieval pack) — a tagged sum type
//! dispatched by pattern match rather than by integer tag plus downcast.

use strum_macros::Display;

use crate::ids::{ChatId, ContactId, MsgId, ProfileId};
use crate::model::ChatMessage;

/// A download action for [`Request::DownloadFile`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum DownloadAction {
    Start,
    Cancel,
}

/// Typed inbound command from the UI toward an adapter, possibly
/// intercepted by the cache (§4.1).
#[derive(Debug, Display, Clone, PartialEq)]
pub enum Request {
    GetContacts {
        profile_id: ProfileId,
    },
    GetChats {
        profile_id: ProfileId,
    },
    GetMessage {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
    },
    GetMessages {
        profile_id: ProfileId,
        chat_id: ChatId,
        from_msg_id: MsgId,
        limit: usize,
        from_is_outgoing: bool,
    },
    SendMessage {
        profile_id: ProfileId,
        chat_id: ChatId,
        chat_message: ChatMessage,
    },
    MarkMessageRead {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
    },
    DeleteMessage {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
    },
    SendTyping {
        profile_id: ProfileId,
        chat_id: ChatId,
        is_typing: bool,
    },
    SetStatus {
        profile_id: ProfileId,
        is_online: bool,
    },
    CreateChat {
        profile_id: ProfileId,
        user_id: ContactId,
    },
    DownloadFile {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
        file_id: String,
        action: DownloadAction,
    },
}

impl Request {
    pub fn profile_id(&self) -> &ProfileId {
        match self {
            Request::GetContacts { profile_id }
            | Request::GetChats { profile_id }
            | Request::GetMessage { profile_id, .. }
            | Request::GetMessages { profile_id, .. }
            | Request::SendMessage { profile_id, .. }
            | Request::MarkMessageRead { profile_id, .. }
            | Request::DeleteMessage { profile_id, .. }
            | Request::SendTyping { profile_id, .. }
            | Request::SetStatus { profile_id, .. }
            | Request::CreateChat { profile_id, .. }
            | Request::DownloadFile { profile_id, .. } => profile_id,
        }
    }

    /// Builds the failure notification this request would emit if the
    /// adapter or dispatcher cannot serve it (unsupported feature, shed
    /// queue, unrecognized variant) — §4.4's "must not drop silently" and
    /// §5's queue-shedding rule both funnel through here.
    pub fn failure(&self) -> Notification {
        let profile_id = self.profile_id().clone();
        match self {
            Request::GetContacts { .. } => Notification::NewContacts {
                profile_id,
                success: false,
                contacts: Vec::new(),
            },
            Request::GetChats { .. } => Notification::NewChats {
                profile_id,
                success: false,
                chats: Vec::new(),
            },
            Request::GetMessage { chat_id, .. } | Request::GetMessages { chat_id, .. } => {
                Notification::NewMessages {
                    profile_id,
                    chat_id: chat_id.clone(),
                    success: false,
                    messages: Vec::new(),
                }
            }
            Request::SendMessage {
                chat_id,
                chat_message,
                ..
            } => Notification::SendMessage {
                profile_id,
                chat_id: chat_id.clone(),
                success: false,
                chat_message: chat_message.clone(),
            },
            Request::MarkMessageRead { chat_id, msg_id, .. } => Notification::MarkMessageRead {
                profile_id,
                chat_id: chat_id.clone(),
                msg_id: msg_id.clone(),
                success: false,
            },
            Request::DeleteMessage { chat_id, msg_id, .. } => Notification::DeleteMessage {
                profile_id,
                chat_id: chat_id.clone(),
                msg_id: msg_id.clone(),
                success: false,
            },
            Request::SendTyping {
                chat_id, is_typing, ..
            } => Notification::SendTyping {
                profile_id,
                chat_id: chat_id.clone(),
                is_typing: *is_typing,
                success: false,
            },
            Request::SetStatus { is_online, .. } => Notification::SetStatus {
                profile_id,
                is_online: *is_online,
                success: false,
            },
            Request::CreateChat { .. } => Notification::NewChats {
                profile_id,
                success: false,
                chats: Vec::new(),
            },
            Request::DownloadFile {
                chat_id, msg_id, ..
            } => Notification::NewMessageFile {
                profile_id,
                chat_id: chat_id.clone(),
                msg_id: msg_id.clone(),
                success: false,
            },
        }
    }
}

/// Typed outbound event from adapter or cache toward the UI (§4.1). Every
/// notification carries `success`.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum Notification {
    NewContacts {
        profile_id: ProfileId,
        success: bool,
        contacts: Vec<crate::model::ContactInfo>,
    },
    NewChats {
        profile_id: ProfileId,
        success: bool,
        chats: Vec<crate::model::ChatInfo>,
    },
    NewMessages {
        profile_id: ProfileId,
        chat_id: ChatId,
        success: bool,
        messages: Vec<ChatMessage>,
    },
    SendMessage {
        profile_id: ProfileId,
        chat_id: ChatId,
        success: bool,
        chat_message: ChatMessage,
    },
    MarkMessageRead {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
        success: bool,
    },
    DeleteMessage {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
        success: bool,
    },
    SendTyping {
        profile_id: ProfileId,
        chat_id: ChatId,
        is_typing: bool,
        success: bool,
    },
    SetStatus {
        profile_id: ProfileId,
        is_online: bool,
        success: bool,
    },
    ReceiveTyping {
        profile_id: ProfileId,
        chat_id: ChatId,
        user_id: ContactId,
        is_typing: bool,
    },
    ReceiveStatus {
        profile_id: ProfileId,
        user_id: ContactId,
        is_online: bool,
    },
    NewMessageStatus {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
        is_read: bool,
    },
    NewMessageFile {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
        success: bool,
    },
    NewMessageReaction {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
        sender_id: ContactId,
        emoji: String,
    },
    UpdateMute {
        profile_id: ProfileId,
        chat_id: ChatId,
        is_muted: bool,
    },
    UpdatePin {
        profile_id: ProfileId,
        chat_id: ChatId,
        is_pinned: bool,
    },
    DeleteChat {
        profile_id: ProfileId,
        chat_id: ChatId,
    },
    Connect {
        profile_id: ProfileId,
        success: bool,
    },
}

impl Notification {
    pub fn profile_id(&self) -> &ProfileId {
        match self {
            Notification::NewContacts { profile_id, .. }
            | Notification::NewChats { profile_id, .. }
            | Notification::NewMessages { profile_id, .. }
            | Notification::SendMessage { profile_id, .. }
            | Notification::MarkMessageRead { profile_id, .. }
            | Notification::DeleteMessage { profile_id, .. }
            | Notification::SendTyping { profile_id, .. }
            | Notification::SetStatus { profile_id, .. }
            | Notification::ReceiveTyping { profile_id, .. }
            | Notification::ReceiveStatus { profile_id, .. }
            | Notification::NewMessageStatus { profile_id, .. }
            | Notification::NewMessageFile { profile_id, .. }
            | Notification::NewMessageReaction { profile_id, .. }
            | Notification::UpdateMute { profile_id, .. }
            | Notification::UpdatePin { profile_id, .. }
            | Notification::DeleteChat { profile_id, .. }
            | Notification::Connect { profile_id, .. } => profile_id,
        }
    }

    /// `chat_id`, when this variant carries one — used to group
    /// notifications for the per-chat ordering guarantee (§5).
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Notification::NewMessages { chat_id, .. }
            | Notification::SendMessage { chat_id, .. }
            | Notification::MarkMessageRead { chat_id, .. }
            | Notification::DeleteMessage { chat_id, .. }
            | Notification::SendTyping { chat_id, .. }
            | Notification::ReceiveTyping { chat_id, .. }
            | Notification::NewMessageStatus { chat_id, .. }
            | Notification::NewMessageFile { chat_id, .. }
            | Notification::NewMessageReaction { chat_id, .. }
            | Notification::UpdateMute { chat_id, .. }
            | Notification::UpdatePin { chat_id, .. }
            | Notification::DeleteChat { chat_id, .. } => Some(chat_id),
            _ => None,
        }
    }

    /// Rewrites this notification (of any variant) as its `success = false`
    /// twin, preserving echoed identity. Used when a durable commit fails
    /// (§4.6) or an unsupported feature is requested (§7).
    pub fn as_failure(&self) -> Notification {
        let mut n = self.clone();
        match &mut n {
            Notification::NewContacts { success, .. }
            | Notification::NewChats { success, .. }
            | Notification::NewMessages { success, .. }
            | Notification::SendMessage { success, .. }
            | Notification::MarkMessageRead { success, .. }
            | Notification::DeleteMessage { success, .. }
            | Notification::SendTyping { success, .. }
            | Notification::SetStatus { success, .. }
            | Notification::NewMessageFile { success, .. }
            | Notification::Connect { success, .. } => *success = false,
            _ => {}
        }
        n
    }
}
