//! C5: the per-profile FIFO request dispatcher.
//!
//! Each adapter instance owns one of these: a dedicated worker thread
//! driven by a FIFO of [`Request`]s guarded by a mutex + condvar, modeled
//! directly on the teacher's `job_thread.rs` idle/interrupt pattern. Requests
//! for a profile are serialized — one backend call at a time — deliberately
//! trading per-profile throughput for simpler backend reentrancy assumptions
//! (§4.5); concurrent profiles still run in parallel, each with its own
//! dispatcher thread.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::bus::{Notification, Request};
use crate::status::{StatusFlags, StatusRegister};

/// Bounded so `send` can never block; past this the dispatcher sheds by
/// emitting the request's failure notification and logging a warning (§5,
/// §C).
pub const DISPATCH_QUEUE_CAPACITY: usize = 256;

/// Rate-limiting pause between ordinary requests (§4.5).
const INTER_REQUEST_DELAY: Duration = Duration::from_millis(50);

struct Entry {
    request: Request,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    shutdown: bool,
}

/// The per-profile executor a [`Dispatcher`] drives: "make the backend call
/// for this request and return its notification". Implemented once per
/// protocol adapter; the dispatcher itself is protocol-agnostic.
pub trait Execute: Send {
    fn execute(&mut self, request: Request) -> Notification;
}

impl<F> Execute for F
where
    F: FnMut(Request) -> Notification + Send,
{
    fn execute(&mut self, request: Request) -> Notification {
        self(request)
    }
}

/// Owns the FIFO and its worker thread. Dropping it (or calling
/// [`Dispatcher::shutdown`]) drains: the worker is signalled to exit, any
/// in-flight request is allowed to finish, and remaining queued requests are
/// discarded with failure notifications (§4.5).
pub struct Dispatcher {
    state: Arc<(Mutex<QueueState>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn(
        mut execute: impl Execute + 'static,
        handler: Arc<dyn Fn(Notification) + Send + Sync>,
        status: Arc<StatusRegister>,
    ) -> Self {
        let state = Arc::new((Mutex::new(QueueState::default()), Condvar::new()));
        let worker_state = state.clone();

        let handle = std::thread::spawn(move || {
            let (lock, cvar) = &*worker_state;
            loop {
                let entry = {
                    let mut guard = lock.lock().unwrap();
                    loop {
                        if let Some(entry) = guard.entries.pop_front() {
                            break Some(entry);
                        }
                        if guard.shutdown {
                            break None;
                        }
                        guard = cvar.wait(guard).unwrap();
                    }
                };
                let entry = match entry {
                    Some(entry) => entry,
                    None => break,
                };

                status.set(flags_for(&entry.request));
                let notification = execute.execute(entry.request);
                status.clear(flags_for_notification(&notification));
                handler(notification);
                std::thread::sleep(INTER_REQUEST_DELAY);
            }

            // Drain: anything queued after shutdown was requested is
            // rejected rather than silently dropped (§4.5).
            let remaining = {
                let mut guard = lock.lock().unwrap();
                std::mem::take(&mut guard.entries)
            };
            for entry in remaining {
                handler(entry.request.failure());
            }
        });

        Dispatcher {
            state,
            handle: Some(handle),
        }
    }

    /// Non-blocking enqueue (§4.4, §5). Sheds under a full queue by
    /// returning the request's failure notification for the caller to
    /// forward and log, rather than blocking or panicking.
    pub fn send(&self, request: Request) -> Option<Notification> {
        let (lock, cvar) = &*self.state;
        let mut guard = lock.lock().unwrap();
        if guard.shutdown {
            return Some(request.failure());
        }
        if guard.entries.len() >= DISPATCH_QUEUE_CAPACITY {
            crate::warn!("dispatch queue full for {:?}, shedding {}", request.profile_id(), request);
            return Some(request.failure());
        }
        guard.entries.push_back(Entry { request });
        cvar.notify_one();
        None
    }

    /// Cooperative cancellation (§4.5, §5): signals the worker to exit after
    /// finishing any in-flight request, then blocks until it has drained.
    pub fn shutdown(&mut self) {
        {
            let (lock, cvar) = &*self.state;
            let mut guard = lock.lock().unwrap();
            guard.shutdown = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn flags_for(request: &Request) -> StatusFlags {
    match request {
        Request::GetContacts { .. } | Request::GetChats { .. } | Request::GetMessages { .. } | Request::GetMessage { .. } => {
            StatusFlags::FETCHING
        }
        Request::SendMessage { .. } | Request::SendTyping { .. } | Request::CreateChat { .. } => {
            StatusFlags::SENDING
        }
        Request::MarkMessageRead { .. }
        | Request::DeleteMessage { .. }
        | Request::SetStatus { .. }
        | Request::DownloadFile { .. } => StatusFlags::UPDATING,
    }
}

fn flags_for_notification(_notification: &Notification) -> StatusFlags {
    // The worker clears whatever it set before the call, regardless of
    // success (§4.5) — tracked symmetrically by clearing the same bits
    // `flags_for` set for the originating request at the call site.
    StatusFlags::FETCHING | StatusFlags::SENDING | StatusFlags::UPDATING
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProfileId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[test]
    fn requests_are_served_in_fifo_order() {
        let seen: Arc<StdMutex<Vec<bool>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_exec = seen.clone();
        let status = Arc::new(StatusRegister::new());
        let handler_seen = seen.clone();

        let dispatcher = Dispatcher::spawn(
            move |request: Request| -> Notification {
                let is_online = matches!(&request, Request::SetStatus { is_online, .. } if *is_online);
                seen_exec.lock().unwrap().push(is_online);
                request.failure()
            },
            Arc::new(move |_n: Notification| {
                let _ = &handler_seen;
            }),
            status,
        );

        let profile_id = ProfileId::from("Dummy_1");
        dispatcher.send(Request::SetStatus {
            profile_id: profile_id.clone(),
            is_online: true,
        });
        dispatcher.send(Request::SetStatus {
            profile_id,
            is_online: false,
        });

        std::thread::sleep(Duration::from_millis(250));
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![true, false]);
    }

    #[test]
    fn shedding_when_queue_is_shut_down_returns_failure() {
        let status = Arc::new(StatusRegister::new());
        let mut dispatcher = Dispatcher::spawn(
            |request: Request| request.failure(),
            Arc::new(|_n: Notification| {}),
            status,
        );
        dispatcher.shutdown();

        let counter = Arc::new(AtomicUsize::new(0));
        let _ = counter.load(Ordering::SeqCst);
        let result = dispatcher.send(Request::SetStatus {
            profile_id: ProfileId::from("Dummy_1"),
            is_online: true,
        });
        assert!(matches!(result, Some(Notification::SetStatus { success: false, .. })));
    }
}
