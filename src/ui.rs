//! C7: the core-facing half of the UI façade (§4.7) — the `profileId ->
//! Adapter` registry, current-selection state, and the single
//! `handle(Notification)` entrypoint the cache calls into UI-land.
//!
//! The render layer itself (input, scrollback, widgets) is external to this
//! crate; this module only demultiplexes and forwards. Modeled on the
//! teacher's `cb`/`call_cb` single-callback dispatch in `context.rs`,
//! generalized from one global callback to a small registry plus one
//! render callback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::adapter::ProtocolAdapter;
use crate::bus::Notification;
use crate::ids::{ChatId, ProfileId};

type RenderCallback = Box<dyn Fn(Notification) + Send>;

struct Selection {
    current_profile_id: Option<ProfileId>,
    current_chat_id: Option<ChatId>,
}

/// Owns the adapter registry and the small amount of state the UI reads on
/// display. Safe to share across threads: the cache's writer thread calls
/// [`UiFacade::handle`] while the main thread reads selection state.
pub struct UiFacade {
    adapters: Mutex<HashMap<ProfileId, Arc<Mutex<Box<dyn ProtocolAdapter>>>>>,
    selection: Mutex<Selection>,
    render: Mutex<Option<RenderCallback>>,
}

impl UiFacade {
    pub fn new() -> Self {
        UiFacade {
            adapters: Mutex::new(HashMap::new()),
            selection: Mutex::new(Selection {
                current_profile_id: None,
                current_chat_id: None,
            }),
            render: Mutex::new(None),
        }
    }

    /// Registers an already-loaded adapter (§4.7).
    pub fn add_protocol(&self, profile_id: ProfileId, adapter: Arc<Mutex<Box<dyn ProtocolAdapter>>>) {
        self.adapters.lock().unwrap().insert(profile_id, adapter);
    }

    pub fn remove_protocol(&self, profile_id: &ProfileId) {
        self.adapters.lock().unwrap().remove(profile_id);
    }

    pub fn adapter(&self, profile_id: &ProfileId) -> Option<Arc<Mutex<Box<dyn ProtocolAdapter>>>> {
        self.adapters.lock().unwrap().get(profile_id).cloned()
    }

    pub fn loaded_profiles(&self) -> Vec<ProfileId> {
        self.adapters.lock().unwrap().keys().cloned().collect()
    }

    /// Registers the render layer's callback. Replaces any previous one.
    pub fn set_render_callback(&self, callback: impl Fn(Notification) + Send + 'static) {
        *self.render.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn set_current_profile(&self, profile_id: Option<ProfileId>) {
        self.selection.lock().unwrap().current_profile_id = profile_id;
    }

    pub fn current_profile(&self) -> Option<ProfileId> {
        self.selection.lock().unwrap().current_profile_id.clone()
    }

    pub fn set_current_chat(&self, chat_id: Option<ChatId>) {
        self.selection.lock().unwrap().current_chat_id = chat_id;
    }

    pub fn current_chat(&self) -> Option<ChatId> {
        self.selection.lock().unwrap().current_chat_id.clone()
    }

    /// The callback registered with the cache (§4.7). Demultiplexing on
    /// `(profileId, type)` is the render layer's job; this only forwards.
    pub fn handle(&self, notification: Notification) {
        if let Some(callback) = self.render.lock().unwrap().as_ref() {
            callback(notification);
        }
    }
}

impl Default for UiFacade {
    fn default() -> Self {
        UiFacade::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handle_forwards_to_render_callback() {
        let ui = UiFacade::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        ui.set_render_callback(move |_n| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        ui.handle(Notification::Connect {
            profile_id: ProfileId::from("Dummy_1"),
            success: true,
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_without_render_callback_is_a_no_op() {
        let ui = UiFacade::new();
        ui.handle(Notification::Connect {
            profile_id: ProfileId::from("Dummy_1"),
            success: true,
        });
    }

    #[test]
    fn current_selection_round_trips() {
        let ui = UiFacade::new();
        let profile_id = ProfileId::from("Dummy_1");
        let chat_id = ChatId::from("c1");
        ui.set_current_profile(Some(profile_id.clone()));
        ui.set_current_chat(Some(chat_id.clone()));
        assert_eq!(ui.current_profile(), Some(profile_id));
        assert_eq!(ui.current_chat(), Some(chat_id));
    }
}
