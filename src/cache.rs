//! C6: the persistent per-profile message cache — the hard part of this
//! system (§4.6). Serves history without round-tripping to the network,
//! deduplicates adapter re-emissions, coalesces status storms, keeps a
//! single message-handler façade, and supports export.
//!
//! Storage is one sqlite database per profile directory (§4.2's
//! `<ProfileId>/cache/`), which already gives the "partitioning by
//! profileId is the locking discipline" guarantee from §5 for free: two
//! profiles' cache mutations never contend on the same connection.
//!
//! Grounded on the teacher's query style in `context.rs`
//! (`dc_get_fresh_msgs`, `dc_search_msgs`) and the job-table persist/retry
//! shape in `job.rs`.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rusqlite::{params, OptionalExtension};

use crate::bus::Notification;
use crate::error::Result;
use crate::ids::{ChatId, ContactId, MsgId, ProfileId};
use crate::model::{ChatInfo, ChatMessage, ContactInfo};
use crate::storage::Storage;

/// Result of a [`MessageCache::get_messages`] lookup: either the cache can
/// answer directly (§4.6(b)), or the caller must forward the request to the
/// adapter.
pub enum CacheAnswer {
    Hit(Vec<ChatMessage>),
    Miss,
}

struct ProfileCache {
    storage: Storage,
}

struct Shared {
    profiles: Mutex<HashMap<ProfileId, ProfileCache>>,
    handler: Arc<dyn Fn(Notification) + Send + Sync>,
    /// Last-seen typing state per (profile, chat), used to coalesce typing
    /// storms (§4.6(d)): a repeat of the same value is dropped.
    typing_state: Mutex<HashMap<(ProfileId, ChatId), bool>>,
    /// Requested `limit` of a `GetMessages` backfill forwarded to the
    /// adapter, keyed by (profile, chat). Consulted when the matching
    /// `NewMessages` reply lands, so "oldest known" (§4.6(b)) can be set
    /// only on a true end-of-history reply rather than on every insert.
    pending_fetches: Mutex<HashMap<(ProfileId, ChatId), usize>>,
}

impl Shared {
    fn take_pending_fetch(&self, profile_id: &ProfileId, chat_id: &ChatId) -> Option<usize> {
        self.pending_fetches
            .lock()
            .unwrap()
            .remove(&(profile_id.clone(), chat_id.clone()))
    }
}

/// Queue item for the cache's own writer thread (§5: "The cache runs its own
/// writer thread consuming a cross-profile notification queue").
struct QueueState {
    items: VecDeque<Notification>,
    shutdown: bool,
}

pub struct MessageCache {
    shared: Arc<Shared>,
    queue: Arc<(Mutex<QueueState>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl MessageCache {
    pub fn new(handler: Arc<dyn Fn(Notification) + Send + Sync>) -> Self {
        let shared = Arc::new(Shared {
            profiles: Mutex::new(HashMap::new()),
            handler,
            typing_state: Mutex::new(HashMap::new()),
            pending_fetches: Mutex::new(HashMap::new()),
        });
        let queue = Arc::new((
            Mutex::new(QueueState {
                items: VecDeque::new(),
                shutdown: false,
            }),
            Condvar::new(),
        ));

        let worker_shared = shared.clone();
        let worker_queue = queue.clone();
        let handle = std::thread::spawn(move || writer_loop(worker_shared, worker_queue));

        MessageCache {
            shared,
            queue,
            handle: Some(handle),
        }
    }

    /// Opens (or re-opens) the on-disk cache for `profile_id` at
    /// `cache_dir/messages.sqlite`.
    pub fn open_profile(&self, profile_id: ProfileId, cache_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(cache_dir)?;
        let storage = Storage::open(&cache_dir.join("messages.sqlite"))?;
        self.shared
            .profiles
            .lock()
            .unwrap()
            .insert(profile_id, ProfileCache { storage });
        Ok(())
    }

    /// Non-blocking ingestion of a notification from an adapter (or from the
    /// cache's own synthesized replies). The writer thread persists and
    /// forwards it to the UI.
    pub fn ingest(&self, notification: Notification) {
        let (lock, cvar) = &*self.queue;
        let mut guard = lock.lock().unwrap();
        guard.items.push_back(notification);
        cvar.notify_one();
    }

    /// §4.6(b): answers `GetMessages` from cache when possible.
    ///
    /// - `from_msg_id == ""`: a hit iff the chat has any cached messages and
    ///   the oldest one is flagged "oldest known" (§4.6(b)); returns the
    ///   most recent `limit` messages, ascending by `time_sent`.
    /// - otherwise: a hit iff the cache holds at least `limit` messages with
    ///   `time_sent < time(from_msg_id)`; returns the `limit` messages
    ///   immediately preceding it, ascending.
    pub fn get_messages(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        from_msg_id: &MsgId,
        limit: usize,
    ) -> Result<CacheAnswer> {
        let profiles = self.shared.profiles.lock().unwrap();
        let profile = match profiles.get(profile_id) {
            Some(p) => p,
            None => return Ok(CacheAnswer::Miss),
        };
        let conn = profile.storage.pool().get()?;

        if from_msg_id.is_empty() {
            let has_oldest: Option<i64> = conn
                .query_row(
                    "SELECT has_oldest FROM chats WHERE id = ?",
                    params![chat_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if has_oldest != Some(1) {
                return Ok(CacheAnswer::Miss);
            }
            let rows = query_messages(
                &conn,
                "SELECT chat_id, id, sender_id, text, quoted_id, quoted_text, quoted_sender,
                        file_info, time_sent, is_outgoing, is_read
                 FROM messages WHERE chat_id = ? ORDER BY time_sent DESC LIMIT ?",
                params![chat_id.as_str(), limit as i64],
            )?;
            let mut rows = attach_reactions(&conn, chat_id, rows)?;
            rows.reverse();
            return Ok(CacheAnswer::Hit(rows));
        }

        let anchor_time: Option<i64> = conn
            .query_row(
                "SELECT time_sent FROM messages WHERE chat_id = ? AND id = ?",
                params![chat_id.as_str(), from_msg_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let anchor_time = match anchor_time {
            Some(t) => t,
            None => return Ok(CacheAnswer::Miss),
        };

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ? AND time_sent < ?",
            params![chat_id.as_str(), anchor_time],
            |row| row.get(0),
        )?;
        if (count as usize) < limit {
            return Ok(CacheAnswer::Miss);
        }

        let rows = query_messages(
            &conn,
            "SELECT chat_id, id, sender_id, text, quoted_id, quoted_text, quoted_sender,
                    file_info, time_sent, is_outgoing, is_read
             FROM messages WHERE chat_id = ? AND time_sent < ?
             ORDER BY time_sent DESC LIMIT ?",
            params![chat_id.as_str(), anchor_time, limit as i64],
        )?;
        let mut rows = attach_reactions(&conn, chat_id, rows)?;
        rows.reverse();
        Ok(CacheAnswer::Hit(rows))
    }

    /// Records that a `GetMessages` cache miss was forwarded to the adapter
    /// requesting up to `limit` messages, so the `NewMessages` reply can be
    /// recognized as a true end-of-history backfill (§4.6(b)) when it comes
    /// back short. Call this right before forwarding the request.
    pub fn expect_backfill(&self, profile_id: ProfileId, chat_id: ChatId, limit: usize) {
        self.shared
            .pending_fetches
            .lock()
            .unwrap()
            .insert((profile_id, chat_id), limit);
    }

    /// §4.6(f): dumps every chat of every loaded profile as a
    /// newline-delimited text file per chat.
    pub fn export(&self, export_dir: &Path) -> Result<()> {
        let profiles = self.shared.profiles.lock().unwrap();
        for (profile_id, profile) in profiles.iter() {
            let profile_dir = export_dir.join(profile_id.dir_name());
            std::fs::create_dir_all(&profile_dir)?;

            let conn = profile.storage.pool().get()?;
            let mut chat_stmt = conn.prepare("SELECT id FROM chats ORDER BY id")?;
            let chat_ids: Vec<String> = chat_stmt
                .query_map(rusqlite::NO_PARAMS, |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            drop(chat_stmt);

            for chat_id in chat_ids {
                let messages = query_messages(
                    &conn,
                    "SELECT chat_id, id, sender_id, text, quoted_id, quoted_text, quoted_sender,
                            file_info, time_sent, is_outgoing, is_read
                     FROM messages WHERE chat_id = ? ORDER BY time_sent ASC",
                    params![chat_id],
                )?;

                let mut out = String::new();
                for message in &messages {
                    let attachment = crate::fileinfo::decode(&message.file_info)
                        .ok()
                        .flatten()
                        .map(|f| f.file_path)
                        .unwrap_or_default();
                    let _ = writeln!(
                        out,
                        "{}\t{}\t{}\t{}",
                        message.time_sent,
                        message.sender_id.as_str(),
                        escape_export_field(&message.text),
                        escape_export_field(&attachment),
                    );
                }
                std::fs::write(profile_dir.join(format!("{}.txt", chat_id)), out)?;
            }
        }
        Ok(())
    }

    pub fn shutdown(&mut self) {
        {
            let (lock, cvar) = &*self.queue;
            let mut guard = lock.lock().unwrap();
            guard.shutdown = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MessageCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Escapes embedded newlines and tabs so the one-record-per-line export
/// invariant (§C) holds.
fn escape_export_field(field: &str) -> String {
    field.replace('\\', "\\\\").replace('\n', "\\n").replace('\t', "\\t")
}

fn query_messages(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ChatMessage>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok(ChatMessage {
            chat_id: ChatId::from(row.get::<_, String>(0)?),
            id: MsgId::from(row.get::<_, String>(1)?),
            sender_id: ContactId::from(row.get::<_, String>(2)?),
            text: row.get(3)?,
            quoted_id: row.get::<_, Option<String>>(4)?.map(MsgId::from),
            quoted_text: row.get(5)?,
            quoted_sender: row.get::<_, Option<String>>(6)?.map(ContactId::from),
            file_info: row.get(7)?,
            time_sent: row.get(8)?,
            is_outgoing: row.get::<_, i64>(9)? != 0,
            is_read: row.get::<_, i64>(10)? != 0,
            reactions: Default::default(),
        })
    })?;
    rows.collect::<std::result::Result<_, _>>().map_err(Into::into)
}

fn attach_reactions(
    conn: &rusqlite::Connection,
    chat_id: &ChatId,
    mut messages: Vec<ChatMessage>,
) -> Result<Vec<ChatMessage>> {
    for message in &mut messages {
        let mut stmt = conn.prepare(
            "SELECT sender_id, emoji FROM reactions WHERE chat_id = ? AND msg_id = ?",
        )?;
        let rows = stmt.query_map(params![chat_id.as_str(), message.id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (sender, emoji) = row?;
            message.reactions.insert(sender, emoji);
        }
    }
    Ok(messages)
}

fn writer_loop(shared: Arc<Shared>, queue: Arc<(Mutex<QueueState>, Condvar)>) {
    let (lock, cvar) = &*queue;
    loop {
        let notification = {
            let mut guard = lock.lock().unwrap();
            loop {
                if let Some(n) = guard.items.pop_front() {
                    break Some(n);
                }
                if guard.shutdown {
                    break None;
                }
                guard = cvar.wait(guard).unwrap();
            }
        };
        let notification = match notification {
            Some(n) => n,
            None => break,
        };
        process(&shared, notification);
    }
}

/// Persists a notification and forwards it (or its failure twin) to the UI.
/// Write failures are retried twice with exponential backoff before being
/// surfaced as `success = false` (§4.6, §7).
fn process(shared: &Shared, notification: Notification) {
    if is_coalesced_duplicate(shared, &notification) {
        return;
    }
    let outcome = persist(shared, &notification);
    match outcome {
        Ok(Some(forwarded)) => (shared.handler)(forwarded),
        Ok(None) => {}
        Err(_) => (shared.handler)(notification.as_failure()),
    }
}

/// §4.6(d): drops a `SendTyping`/`ReceiveTyping` notification that repeats
/// the chat's last-known typing state, keeping only the latest of a storm.
fn is_coalesced_duplicate(shared: &Shared, notification: &Notification) -> bool {
    let (profile_id, chat_id, is_typing) = match notification {
        Notification::SendTyping { profile_id, chat_id, is_typing, .. }
        | Notification::ReceiveTyping { profile_id, chat_id, is_typing, .. } => {
            (profile_id.clone(), chat_id.clone(), *is_typing)
        }
        _ => return false,
    };
    let mut state = shared.typing_state.lock().unwrap();
    let key = (profile_id, chat_id);
    if state.get(&key) == Some(&is_typing) {
        return true;
    }
    state.insert(key, is_typing);
    false
}

/// Returns `Ok(Some(notification))` to forward, `Ok(None)` to suppress
/// (e.g. a pure duplicate), or `Err` on unrecoverable write failure.
fn persist(shared: &Shared, notification: &Notification) -> Result<Option<Notification>> {
    let profile_id = notification.profile_id().clone();
    let mut profiles = shared.profiles.lock().unwrap();
    let profile = match profiles.get_mut(&profile_id) {
        Some(p) => p,
        None => return Ok(Some(notification.clone())),
    };

    with_retry(|| match notification {
        Notification::NewContacts { success: true, contacts, .. } => {
            persist_contacts(&profile.storage, contacts)?;
            Ok(())
        }
        Notification::NewChats { success: true, chats, .. } => {
            persist_chats(&profile.storage, chats)?;
            Ok(())
        }
        _ => Ok(()),
    })?;

    match notification {
        Notification::NewMessages { success: true, chat_id, messages, .. } => {
            let received_count = messages.len();
            let persisted = with_retry(|| persist_messages(&profile.storage, chat_id, messages))?;
            if let Some(limit) = shared.take_pending_fetch(&profile_id, chat_id) {
                if received_count < limit {
                    with_retry(|| mark_oldest_known(&profile.storage, chat_id))?;
                }
            }
            if persisted.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Notification::NewMessages {
                    profile_id,
                    chat_id: chat_id.clone(),
                    success: true,
                    messages: persisted,
                }))
            }
        }
        Notification::SendMessage { success: true, chat_id, chat_message, .. } => {
            with_retry(|| persist_messages(&profile.storage, chat_id, std::slice::from_ref(chat_message)))?;
            Ok(Some(notification.clone()))
        }
        Notification::MarkMessageRead { success: true, chat_id, msg_id, .. } => {
            with_retry(|| {
                profile.storage.pool().get()?.execute(
                    "UPDATE messages SET is_read = 1 WHERE chat_id = ? AND id = ?",
                    params![chat_id.as_str(), msg_id.as_str()],
                )?;
                Ok(())
            })?;
            Ok(Some(notification.clone()))
        }
        Notification::DeleteMessage { success: true, chat_id, msg_id, .. } => {
            with_retry(|| {
                profile.storage.pool().get()?.execute(
                    "DELETE FROM messages WHERE chat_id = ? AND id = ?",
                    params![chat_id.as_str(), msg_id.as_str()],
                )?;
                Ok(())
            })?;
            Ok(Some(notification.clone()))
        }
        Notification::NewMessageStatus { chat_id, msg_id, is_read, .. } => {
            with_retry(|| {
                profile.storage.pool().get()?.execute(
                    "UPDATE messages SET is_read = ? WHERE chat_id = ? AND id = ?",
                    params![*is_read as i64, chat_id.as_str(), msg_id.as_str()],
                )?;
                Ok(())
            })?;
            Ok(Some(notification.clone()))
        }
        Notification::NewMessageReaction { chat_id, msg_id, sender_id, emoji, .. } => {
            with_retry(|| {
                profile.storage.pool().get()?.execute(
                    "INSERT INTO reactions (chat_id, msg_id, sender_id, emoji) VALUES (?, ?, ?, ?)
                     ON CONFLICT(chat_id, msg_id, sender_id) DO UPDATE SET emoji = excluded.emoji",
                    params![chat_id.as_str(), msg_id.as_str(), sender_id.as_str(), emoji],
                )?;
                Ok(())
            })?;
            Ok(Some(notification.clone()))
        }
        Notification::UpdateMute { chat_id, is_muted, .. } => {
            with_retry(|| {
                ensure_chat(&profile.storage, chat_id)?;
                profile.storage.pool().get()?.execute(
                    "UPDATE chats SET is_muted = ? WHERE id = ?",
                    params![*is_muted as i64, chat_id.as_str()],
                )?;
                Ok(())
            })?;
            Ok(Some(notification.clone()))
        }
        Notification::UpdatePin { chat_id, is_pinned, .. } => {
            with_retry(|| {
                ensure_chat(&profile.storage, chat_id)?;
                profile.storage.pool().get()?.execute(
                    "UPDATE chats SET is_pinned = ? WHERE id = ?",
                    params![*is_pinned as i64, chat_id.as_str()],
                )?;
                Ok(())
            })?;
            Ok(Some(notification.clone()))
        }
        Notification::DeleteChat { chat_id, .. } => {
            with_retry(|| {
                let conn = profile.storage.pool().get()?;
                conn.execute("DELETE FROM messages WHERE chat_id = ?", params![chat_id.as_str()])?;
                conn.execute("DELETE FROM chats WHERE id = ?", params![chat_id.as_str()])?;
                Ok(())
            })?;
            Ok(Some(notification.clone()))
        }
        _ => Ok(Some(notification.clone())),
    }
}

const MAX_RETRIES: u32 = 2;

/// Retries a fallible write twice with exponential backoff (§4.6, §7).
fn with_retry<T>(mut f: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(_) if attempt < MAX_RETRIES => {
                attempt += 1;
                std::thread::sleep(Duration::from_millis(50 * (1 << attempt)));
            }
            Err(err) => return Err(err),
        }
    }
}

fn persist_contacts(storage: &Storage, contacts: &[ContactInfo]) -> Result<()> {
    let conn = storage.pool().get()?;
    for contact in contacts {
        conn.execute(
            "INSERT INTO contacts (id, name, phone, is_self) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, phone = excluded.phone,
                 is_self = excluded.is_self",
            params![
                contact.id.as_str(),
                contact.name,
                contact.phone,
                contact.is_self as i64
            ],
        )?;
    }
    Ok(())
}

fn persist_chats(storage: &Storage, chats: &[ChatInfo]) -> Result<()> {
    let conn = storage.pool().get()?;
    for chat in chats {
        conn.execute(
            "INSERT INTO chats (id, is_unread, is_unread_mention, is_muted, is_pinned, last_message_time, has_oldest)
             VALUES (?, ?, ?, ?, ?, ?, 0)
             ON CONFLICT(id) DO UPDATE SET is_unread = excluded.is_unread,
                 is_unread_mention = excluded.is_unread_mention,
                 is_muted = excluded.is_muted, is_pinned = excluded.is_pinned,
                 last_message_time = MAX(chats.last_message_time, excluded.last_message_time)",
            params![
                chat.id.as_str(),
                chat.is_unread as i64,
                chat.is_unread_mention as i64,
                chat.is_muted as i64,
                chat.is_pinned as i64,
                chat.last_message_time
            ],
        )?;
    }
    Ok(())
}

fn ensure_chat(storage: &Storage, chat_id: &ChatId) -> Result<()> {
    let conn = storage.pool().get()?;
    conn.execute(
        "INSERT OR IGNORE INTO chats
             (id, is_unread, is_unread_mention, is_muted, is_pinned, last_message_time, has_oldest)
         VALUES (?, 0, 0, 0, 0, 0, 0)",
        params![chat_id.as_str()],
    )?;
    Ok(())
}

/// Flags `chat_id`'s oldest cached message as "oldest known" (§4.6(b)),
/// called only once a backfill reply from the adapter comes back with
/// fewer messages than it was asked for — true end-of-history.
fn mark_oldest_known(storage: &Storage, chat_id: &ChatId) -> Result<()> {
    ensure_chat(storage, chat_id)?;
    storage
        .pool()
        .get()?
        .execute("UPDATE chats SET has_oldest = 1 WHERE id = ?", params![chat_id.as_str()])?;
    Ok(())
}

/// Persists `messages` into `chat_id`, applying dedup (§4.6(c)) and the
/// monotonic-time tiebreaker (§3). Returns only the messages that were new
/// or edited, in
/// ascending `time_sent` order, ready to forward (§5's per-chat ordering
/// guarantee).
fn persist_messages(
    storage: &Storage,
    chat_id: &ChatId,
    messages: &[ChatMessage],
) -> Result<Vec<ChatMessage>> {
    ensure_chat(storage, chat_id)?;
    let conn = storage.pool().get()?;

    let mut sorted: Vec<ChatMessage> = messages.to_vec();
    sorted.sort_by_key(|m| m.time_sent);

    let mut forwarded = Vec::new();
    for mut message in sorted {
        let existing: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT text, file_info, time_sent FROM messages WHERE chat_id = ? AND id = ?",
                params![chat_id.as_str(), message.id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        if let Some((text, file_info, time_sent)) = existing {
            if text == message.text && file_info == message.file_info {
                // Exact duplicate (§4.6(c)): drop silently.
                continue;
            }
            message.time_sent = time_sent;
        } else {
            message.time_sent = dedup_time(&conn, chat_id, &message)?;
        }

        conn.execute(
            "INSERT INTO messages (chat_id, id, sender_id, text, quoted_id, quoted_text,
                 quoted_sender, file_info, time_sent, is_outgoing, is_read)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(chat_id, id) DO UPDATE SET
                 sender_id = excluded.sender_id, text = excluded.text,
                 quoted_id = excluded.quoted_id, quoted_text = excluded.quoted_text,
                 quoted_sender = excluded.quoted_sender, file_info = excluded.file_info,
                 time_sent = excluded.time_sent, is_outgoing = excluded.is_outgoing,
                 is_read = excluded.is_read",
            params![
                chat_id.as_str(),
                message.id.as_str(),
                message.sender_id.as_str(),
                message.text,
                message.quoted_id.as_ref().map(MsgId::as_str),
                message.quoted_text,
                message.quoted_sender.as_ref().map(ContactId::as_str),
                message.file_info,
                message.time_sent,
                message.is_outgoing as i64,
                message.is_read as i64,
            ],
        )?;

        conn.execute(
            "UPDATE chats SET last_message_time = MAX(last_message_time, ?) WHERE id = ?",
            params![message.time_sent, chat_id.as_str()],
        )?;

        forwarded.push(message);
    }

    forwarded.sort_by_key(|m| m.time_sent);
    Ok(forwarded)
}

/// If `message.time_sent` collides with an existing message's timestamp in
/// the same chat, nudges it forward by the §3 tiebreaker.
fn dedup_time(conn: &rusqlite::Connection, chat_id: &ChatId, message: &ChatMessage) -> Result<i64> {
    let mut time_sent = message.time_sent;
    loop {
        let collision: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM messages WHERE chat_id = ? AND time_sent = ? AND id != ?",
                params![chat_id.as_str(), time_sent, message.id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if collision.is_none() {
            return Ok(time_sent);
        }
        time_sent += i64::from(ChatMessage::tiebreak_byte(&message.id)).max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ProfileId;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    fn new_cache() -> (MessageCache, Arc<StdMutex<Vec<Notification>>>, tempfile::TempDir) {
        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        let cache = MessageCache::new(Arc::new(move |n: Notification| {
            received_clone.lock().unwrap().push(n);
        }));
        let dir = tempdir().unwrap();
        (cache, received, dir)
    }

    fn wait_for(received: &Arc<StdMutex<Vec<Notification>>>, n: usize) {
        for _ in 0..100 {
            if received.lock().unwrap().len() >= n {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn dedup_submitting_same_message_twice_yields_one_forward() {
        let (mut cache, received, dir) = new_cache();
        let profile_id = ProfileId::from("Dummy_1");
        cache.open_profile(profile_id.clone(), &dir.path().join("p1")).unwrap();

        let chat_id = ChatId::from("c1");
        let msg = ChatMessage {
            time_sent: 1000,
            ..ChatMessage::new(MsgId::from("m1"), chat_id.clone(), ContactId::from("u1"), "hi".into())
        };

        let notify = || Notification::NewMessages {
            profile_id: profile_id.clone(),
            chat_id: chat_id.clone(),
            success: true,
            messages: vec![msg.clone()],
        };
        cache.ingest(notify());
        cache.ingest(notify());
        wait_for(&received, 1);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn edited_message_forwards_a_second_notification() {
        let (mut cache, received, dir) = new_cache();
        let profile_id = ProfileId::from("Dummy_1");
        cache.open_profile(profile_id.clone(), &dir.path().join("p1")).unwrap();
        let chat_id = ChatId::from("c1");

        let mut msg = ChatMessage {
            time_sent: 1000,
            ..ChatMessage::new(MsgId::from("mX"), chat_id.clone(), ContactId::from("u1"), "hi".into())
        };
        cache.ingest(Notification::NewMessages {
            profile_id: profile_id.clone(),
            chat_id: chat_id.clone(),
            success: true,
            messages: vec![msg.clone()],
        });
        wait_for(&received, 1);

        msg.text = "hi edited".into();
        cache.ingest(Notification::NewMessages {
            profile_id: profile_id.clone(),
            chat_id: chat_id.clone(),
            success: true,
            messages: vec![msg.clone()],
        });
        wait_for(&received, 2);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 2);
        match &received[1] {
            Notification::NewMessages { messages, .. } => {
                assert_eq!(messages[0].id, msg.id);
                assert_eq!(messages[0].text, "hi edited");
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    fn ten_messages(chat_id: &ChatId) -> Vec<ChatMessage> {
        (1..=10)
            .map(|i| ChatMessage {
                time_sent: i * 1000,
                ..ChatMessage::new(
                    MsgId::from(format!("m{}", i)),
                    chat_id.clone(),
                    ContactId::from("u1"),
                    format!("msg {}", i),
                )
            })
            .collect()
    }

    #[test]
    fn fetch_from_cache_returns_recent_window_after_a_short_backfill_reply() {
        let (mut cache, _received, dir) = new_cache();
        let profile_id = ProfileId::from("Dummy_1");
        cache.open_profile(profile_id.clone(), &dir.path().join("p1")).unwrap();
        let chat_id = ChatId::from("c1");

        // Simulates the adapter replying to a forwarded backfill request for
        // up to 20 messages with only the 10 that exist: true end-of-history.
        cache.expect_backfill(profile_id.clone(), chat_id.clone(), 20);
        cache.ingest(Notification::NewMessages {
            profile_id: profile_id.clone(),
            chat_id: chat_id.clone(),
            success: true,
            messages: ten_messages(&chat_id),
        });
        std::thread::sleep(Duration::from_millis(150));

        let answer = cache
            .get_messages(&profile_id, &chat_id, &MsgId::from(""), 5)
            .unwrap();
        match answer {
            CacheAnswer::Hit(messages) => {
                let ids: Vec<String> = messages.iter().map(|m| m.id.as_str().to_string()).collect();
                assert_eq!(ids, vec!["m6", "m7", "m8", "m9", "m10"]);
                let times: Vec<i64> = messages.iter().map(|m| m.time_sent).collect();
                let mut sorted_times = times.clone();
                sorted_times.sort();
                assert_eq!(times, sorted_times);
            }
            CacheAnswer::Miss => panic!("expected cache hit"),
        }
    }

    #[test]
    fn fetch_from_cache_misses_without_a_completed_backfill() {
        let (mut cache, _received, dir) = new_cache();
        let profile_id = ProfileId::from("Dummy_1");
        cache.open_profile(profile_id.clone(), &dir.path().join("p1")).unwrap();
        let chat_id = ChatId::from("c1");

        // No expect_backfill call: an organic NewMessages push (or a
        // full-limit reply that might still have more history behind it)
        // must not make fromMsgId="" answer from cache.
        cache.ingest(Notification::NewMessages {
            profile_id: profile_id.clone(),
            chat_id: chat_id.clone(),
            success: true,
            messages: ten_messages(&chat_id),
        });
        std::thread::sleep(Duration::from_millis(150));

        let answer = cache
            .get_messages(&profile_id, &chat_id, &MsgId::from(""), 5)
            .unwrap();
        assert!(matches!(answer, CacheAnswer::Miss));
    }
}
