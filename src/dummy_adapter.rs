//! A reference `ProtocolAdapter` with no real network, used for the
//! fixtures in §8 and wherever an adapter-shaped stub is needed. Its own
//! `Dispatcher` is composed internally exactly as §4.5 describes: a backend
//! owns one FIFO worker and `send_request`/`set_message_handler` delegate
//! to it — the dispatcher itself stays protocol-agnostic (`dispatcher.rs`).
//!
//! Modeled on the connect/disconnect lifecycle shape of the teacher's
//! `imap.rs`/`smtp.rs`, minus any wire protocol (out of scope, §1).

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::adapter::{AdapterState, Feature, ProtocolAdapter};
use crate::bus::{Notification, Request};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::ids::ProfileId;
use crate::status::StatusRegister;

/// `SendMessage` "succeeds" immediately and is followed by a `NewMessages`
/// echo with `isOutgoing=true` (S1); every other variant not recognized
/// below falls through to `request.failure()` so the "must not drop
/// silently" obligation (§4.4) holds even for a stub.
fn execute(
    handler: Arc<dyn Fn(Notification) + Send + Sync>,
) -> impl FnMut(Request) -> Notification + Send {
    move |request: Request| -> Notification {
        match request {
            Request::SendMessage {
                profile_id,
                chat_id,
                chat_message,
            } => {
                let mut chat_message = chat_message;
                chat_message.time_sent = crate::model::now_millis();
                handler(Notification::SendMessage {
                    profile_id: profile_id.clone(),
                    chat_id: chat_id.clone(),
                    success: true,
                    chat_message: chat_message.clone(),
                });
                let mut echoed = chat_message;
                echoed.is_outgoing = true;
                Notification::NewMessages {
                    profile_id,
                    chat_id,
                    success: true,
                    messages: vec![echoed],
                }
            }
            Request::SetStatus {
                profile_id,
                is_online,
            } => Notification::SetStatus {
                profile_id,
                is_online,
                success: true,
            },
            Request::MarkMessageRead {
                profile_id,
                chat_id,
                msg_id,
            } => Notification::MarkMessageRead {
                profile_id,
                chat_id,
                msg_id,
                success: true,
            },
            other => other.failure(),
        }
    }
}

pub struct DummyAdapter {
    profile_id: ProfileId,
    state: AdapterState,
    dispatcher: Option<Dispatcher>,
    handler: Arc<Mutex<Option<Arc<dyn Fn(Notification) + Send + Sync>>>>,
    status: Arc<StatusRegister>,
}

impl DummyAdapter {
    pub fn new(profile_id: ProfileId) -> Self {
        DummyAdapter {
            profile_id,
            state: AdapterState::Uninitialized,
            dispatcher: None,
            handler: Arc::new(Mutex::new(None)),
            status: Arc::new(StatusRegister::new()),
        }
    }
}

impl ProtocolAdapter for DummyAdapter {
    fn setup_profile(&mut self, _profiles_dir: &Path) -> Result<ProfileId> {
        Ok(self.profile_id.clone())
    }

    fn load_profile(&mut self, _profiles_dir: &Path, profile_id: &ProfileId) -> Result<()> {
        self.profile_id = profile_id.clone();
        self.state = AdapterState::Loaded;
        Ok(())
    }

    fn close_profile(&mut self) -> Result<()> {
        self.dispatcher = None;
        self.state = AdapterState::Uninitialized;
        Ok(())
    }

    fn login(&mut self) -> Result<()> {
        let handler = self.handler.lock().unwrap().clone().unwrap_or_else(|| {
            let h: Arc<dyn Fn(Notification) + Send + Sync> = Arc::new(|_n: Notification| {});
            h
        });
        self.state = AdapterState::LoggingIn;
        self.dispatcher = Some(Dispatcher::spawn(
            execute(handler.clone()),
            handler.clone(),
            self.status.clone(),
        ));
        self.state = AdapterState::Online;
        handler(Notification::Connect {
            profile_id: self.profile_id.clone(),
            success: true,
        });
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        self.dispatcher = None;
        self.state = AdapterState::Loaded;
        Ok(())
    }

    fn send_request(&self, request: Request) {
        match &self.dispatcher {
            Some(dispatcher) => {
                if let Some(failure) = dispatcher.send(request) {
                    if let Some(handler) = self.handler.lock().unwrap().as_ref() {
                        handler(failure);
                    }
                }
            }
            None => {
                if let Some(handler) = self.handler.lock().unwrap().as_ref() {
                    handler(request.failure());
                }
            }
        }
    }

    fn set_message_handler(&mut self, handler: Box<dyn Fn(Notification) + Send + Sync>) {
        *self.handler.lock().unwrap() = Some(Arc::from(handler));
    }

    fn has_feature(&self, feature: Feature) -> bool {
        feature == Feature::AUTO_GET_CHATS_ON_LOGIN
    }

    fn get_profile_id(&self) -> ProfileId {
        self.profile_id.clone()
    }

    fn get_profile_display_name(&self) -> String {
        format!("Dummy ({})", self.profile_id.as_str())
    }

    fn get_self_id(&self) -> String {
        "self".to_string()
    }

    fn state(&self) -> AdapterState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Request;
    use crate::ids::{ChatId, ContactId, MsgId};
    use crate::model::ChatMessage;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[test]
    fn send_message_acks_then_echoes_as_outgoing() {
        let mut adapter = DummyAdapter::new(ProfileId::from("Dummy_1"));
        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        adapter.set_message_handler(Box::new(move |n: Notification| {
            received_clone.lock().unwrap().push(n);
        }));
        adapter.login().unwrap();

        let chat_message = ChatMessage::new(
            MsgId::from("m1"),
            ChatId::from("c1"),
            ContactId::from("self"),
            "hi".to_string(),
        );
        adapter.send_request(Request::SendMessage {
            profile_id: ProfileId::from("Dummy_1"),
            chat_id: ChatId::from("c1"),
            chat_message,
        });

        std::thread::sleep(Duration::from_millis(150));
        let received = received.lock().unwrap();
        // [0] is Connect{success=true} from login, then the send ack, then the echo.
        assert!(matches!(received[0], Notification::Connect { success: true, .. }));
        assert!(matches!(received[1], Notification::SendMessage { success: true, .. }));
        match &received[2] {
            Notification::NewMessages { messages, .. } => {
                assert_eq!(messages.len(), 1);
                assert!(messages[0].is_outgoing);
                assert_eq!(messages[0].text, "hi");
            }
            other => panic!("expected NewMessages, got {:?}", other),
        }
    }

    #[test]
    fn send_request_before_login_yields_failure() {
        let adapter = DummyAdapter::new(ProfileId::from("Dummy_1"));
        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        // set_message_handler requires &mut self; build a second handle via a
        // fresh adapter value instead of mutating through the shared ref.
        let handler: Box<dyn Fn(Notification) + Send + Sync> =
            Box::new(move |n: Notification| received_clone.lock().unwrap().push(n));
        *adapter.handler.lock().unwrap() = Some(Arc::from(handler));

        adapter.send_request(Request::SetStatus {
            profile_id: ProfileId::from("Dummy_1"),
            is_online: true,
        });
        let received = received.lock().unwrap();
        assert!(matches!(
            received[0],
            Notification::SetStatus { success: false, .. }
        ));
    }
}
