//! Top-level orchestrator tying the profile store, per-profile adapters,
//! the message cache, the status register and the UI façade together —
//! the nearest analogue of the teacher's `Context`/`dc_context_new`
//! (`context.rs`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::adapter::ProtocolAdapter;
use crate::bus::{Notification, Request};
use crate::cache::{CacheAnswer, MessageCache};
use crate::error::Result;
use crate::ids::ProfileId;
use crate::profile::{self, ScopedLock};
use crate::status::StatusRegister;
use crate::ui::UiFacade;

pub struct App {
    app_dir: PathBuf,
    ui: Arc<UiFacade>,
    cache: Arc<MessageCache>,
    status: Arc<StatusRegister>,
    locks: Mutex<Vec<(ProfileId, ScopedLock)>>,
}

impl App {
    /// Validates/creates the app dir layout (§4.2) and wires the cache's
    /// writer thread to forward into the UI façade.
    pub fn new(app_dir: &Path, allow_setup: bool) -> Result<Self> {
        profile::init(app_dir, allow_setup)?;
        crate::log::init(app_dir)?;

        let ui = Arc::new(UiFacade::new());
        let ui_for_cache = ui.clone();
        let cache = Arc::new(MessageCache::new(Arc::new(move |n: Notification| {
            ui_for_cache.handle(n);
        })));
        let status = Arc::new(StatusRegister::new());

        Ok(App {
            app_dir: app_dir.to_path_buf(),
            ui,
            cache,
            status,
            locks: Mutex::new(Vec::new()),
        })
    }

    pub fn ui(&self) -> &Arc<UiFacade> {
        &self.ui
    }

    pub fn status(&self) -> &Arc<StatusRegister> {
        &self.status
    }

    /// Opens `profile_id`'s directory (acquiring its advisory lock, §4.2),
    /// opens its cache database, loads `adapter` against it, registers the
    /// adapter with the UI façade, and wires its notifications through the
    /// cache (§2's data-flow: adapter -> cache -> UI).
    pub fn load_profile(
        &self,
        mut adapter: Box<dyn ProtocolAdapter>,
        profile_id: ProfileId,
    ) -> Result<()> {
        let (profile_dir, lock) = profile::open_profile_dir(&self.app_dir, &profile_id)?;
        self.cache
            .open_profile(profile_id.clone(), &profile::cache_dir_path(&profile_dir))?;

        let cache_for_handler = self.cache.clone();
        adapter.set_message_handler(Box::new(move |n: Notification| {
            cache_for_handler.ingest(n);
        }));
        adapter.load_profile(&self.app_dir.join("profiles"), &profile_id)?;
        adapter.login()?;

        self.ui
            .add_protocol(profile_id.clone(), Arc::new(Mutex::new(adapter)));
        self.locks.lock().unwrap().push((profile_id, lock));
        Ok(())
    }

    /// Routes one `Request` (§2's data flow). `GetMessages` is answered
    /// from cache when possible (§4.6(b)) without ever reaching the
    /// adapter; a request for an unloaded profile fails immediately rather
    /// than panicking (S4).
    pub fn send_request(&self, request: Request) {
        if let Request::GetMessages {
            profile_id,
            chat_id,
            from_msg_id,
            limit,
            ..
        } = &request
        {
            match self.cache.get_messages(profile_id, chat_id, from_msg_id, *limit) {
                Ok(CacheAnswer::Hit(messages)) => {
                    self.ui.handle(Notification::NewMessages {
                        profile_id: profile_id.clone(),
                        chat_id: chat_id.clone(),
                        success: true,
                        messages,
                    });
                    return;
                }
                Ok(CacheAnswer::Miss) => {
                    self.cache
                        .expect_backfill(profile_id.clone(), chat_id.clone(), *limit);
                }
                Err(_) => {
                    self.ui.handle(request.failure());
                    return;
                }
            }
        }

        match self.ui.adapter(request.profile_id()) {
            Some(adapter) => adapter.lock().unwrap().send_request(request),
            None => self.ui.handle(request.failure()),
        }
    }

    /// §4.6(f): dumps every loaded profile's chats to `export_dir`.
    pub fn export(&self, export_dir: &Path) -> Result<()> {
        self.cache.export(export_dir)
    }

    /// Logs out and unregisters `profile_id`, releasing its directory lock.
    pub fn unload_profile(&self, profile_id: &ProfileId) -> Result<()> {
        if let Some(adapter) = self.ui.adapter(profile_id) {
            adapter.lock().unwrap().logout()?;
            adapter.lock().unwrap().close_profile()?;
        }
        self.ui.remove_protocol(profile_id);
        self.locks.lock().unwrap().retain(|(id, _)| id != profile_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy_adapter::DummyAdapter;
    use crate::ids::{ChatId, ContactId, MsgId};
    use crate::model::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn set_status_with_no_loaded_profile_fails_without_crashing() {
        let dir = tempdir().unwrap();
        let app = App::new(dir.path(), false).unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        app.ui().set_render_callback(move |n: Notification| {
            received_clone.lock().unwrap().push(n);
        });

        app.send_request(Request::SetStatus {
            profile_id: ProfileId::from("Dummy_1"),
            is_online: true,
        });

        let received = received.lock().unwrap();
        assert!(matches!(
            received[0],
            Notification::SetStatus { success: false, .. }
        ));
    }

    #[test]
    fn send_message_round_trips_through_dummy_adapter() {
        let dir = tempdir().unwrap();
        let app = App::new(dir.path(), false).unwrap();
        let profile_id = ProfileId::from("Dummy_1");

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        app.ui().set_render_callback(move |_n: Notification| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        app.load_profile(Box::new(DummyAdapter::new(profile_id.clone())), profile_id.clone())
            .unwrap();

        let chat_message = ChatMessage::new(
            MsgId::from("m1"),
            ChatId::from("c1"),
            ContactId::from("self"),
            "hi".to_string(),
        );
        app.send_request(Request::SendMessage {
            profile_id,
            chat_id: ChatId::from("c1"),
            chat_message,
        });

        std::thread::sleep(Duration::from_millis(200));
        // Connect, SendMessage ack, NewMessages echo.
        assert!(count.load(Ordering::SeqCst) >= 3);
    }
}
