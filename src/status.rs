//! C8: process-wide atomic bitset of activity flags (§4.8), used by the UI
//! for indicator rendering. Modeled on the teacher's `SmtpState`/
//! `RunningState` pattern of small shared state behind one lock, rather than
//! a single process-wide mutex over everything.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use bitflags::bitflags;

bitflags! {
    pub struct StatusFlags: u32 {
        const OFFLINE    = 0b0000_0000;
        const ONLINE     = 0b0000_0001;
        const FETCHING   = 0b0000_0010;
        const SENDING    = 0b0000_0100;
        const UPDATING   = 0b0000_1000;
        const SYNCING    = 0b0001_0000;
        const CONNECTING = 0b0010_0000;
    }
}

type Observer = Box<dyn Fn(StatusFlags) + Send + Sync>;

/// Thread-safe atomic bitset with a registered-observer callback that fires
/// on any transition (§4.8).
pub struct StatusRegister {
    bits: AtomicU32,
    observers: Mutex<Vec<Observer>>,
}

impl StatusRegister {
    pub fn new() -> Self {
        StatusRegister {
            bits: AtomicU32::new(StatusFlags::OFFLINE.bits()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.bits.load(Ordering::SeqCst))
    }

    pub fn set(&self, flags: StatusFlags) {
        if flags.is_empty() {
            return;
        }
        self.bits.fetch_or(flags.bits(), Ordering::SeqCst);
        self.notify();
    }

    pub fn clear(&self, flags: StatusFlags) {
        if flags.is_empty() {
            return;
        }
        self.bits.fetch_and(!flags.bits(), Ordering::SeqCst);
        self.notify();
    }

    /// Registers an observer invoked (on the calling thread) after every
    /// `set`/`clear` transition.
    pub fn on_change(&self, observer: Observer) {
        self.observers.lock().unwrap().push(observer);
    }

    fn notify(&self) {
        let current = self.get();
        for observer in self.observers.lock().unwrap().iter() {
            observer(current);
        }
    }
}

impl Default for StatusRegister {
    fn default() -> Self {
        StatusRegister::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn observer_fires_on_set_and_clear() {
        let register = StatusRegister::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        register.on_change(Box::new(move |_flags| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        register.set(StatusFlags::ONLINE);
        register.clear(StatusFlags::ONLINE);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(register.get(), StatusFlags::OFFLINE);
    }

    #[test]
    fn setting_empty_flags_is_a_no_op() {
        let register = StatusRegister::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        register.on_change(Box::new(move |_flags| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));
        register.set(StatusFlags::empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
