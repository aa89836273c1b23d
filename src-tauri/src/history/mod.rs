//! Bounded per-peer message history.
//!
//! Best-effort cache, not a system of record: appends are deferred off the
//! transform path, corrupt records read back as empty, and a write lost to
//! teardown is acceptable.

mod store;

use std::path::PathBuf;

use anyhow::Result;
use log::{debug, warn};

use crate::transform::Message;

use store::HistoryStore;

/// Retention bound per peer; appends beyond this evict oldest-first.
pub const MAX_HISTORY: usize = 20;

#[derive(Clone)]
pub struct HistoryCache {
    store: HistoryStore,
}

impl HistoryCache {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        Ok(Self {
            store: HistoryStore::open(&db_path)?,
        })
    }

    /// Appends one message to its peer's record, evicting oldest-first past
    /// [`MAX_HISTORY`]. Messages without an identifiable peer cannot be
    /// filed and are dropped silently.
    pub async fn append(&self, message: Message) -> Result<()> {
        if message.peer_user_id().is_empty() {
            debug!("history append skipped: message has no peer user id");
            return Ok(());
        }

        self.store.append(message).await
    }

    /// Queues an append on the runtime so the response-transform path never
    /// waits on storage I/O. Failures are logged and swallowed.
    pub fn append_deferred(&self, message: Message) {
        let cache = self.clone();
        tauri::async_runtime::spawn(async move {
            if let Err(err) = cache.append(message).await {
                warn!("deferred history append failed: {err:#}");
            }
        });
    }

    /// Returns the peer's record, oldest first. A missing or malformed
    /// record reads as empty; storage failures are logged and also read as
    /// empty so history can never take the UI down with it.
    pub async fn read_all(&self, peer_user_id: &str) -> Vec<Message> {
        match self.store.read_all(peer_user_id).await {
            Ok(record) => record,
            Err(err) => {
                warn!("history read failed for peer {peer_user_id}: {err:#}");
                Vec::new()
            }
        }
    }

    /// Fills `target` from cache only when it is currently empty. The guard
    /// keeps the restore from double-inserting under a view the remote
    /// client already populated from its own backend. Restored entries are
    /// marked read.
    pub async fn restore_into(&self, target: &mut Vec<Message>, peer_user_id: &str) {
        if !target.is_empty() {
            return;
        }

        let mut restored = self.read_all(peer_user_id).await;
        for message in &mut restored {
            message.mark_read();
        }
        target.extend(restored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::message::FIELD_PEER;
    use serde_json::json;
    use uuid::Uuid;

    fn temp_cache() -> (HistoryCache, PathBuf) {
        let path = std::env::temp_dir().join(format!("webchat-history-{}.sqlite3", Uuid::new_v4()));
        (HistoryCache::new(path.clone()).unwrap(), path)
    }

    fn sample_message(peer: &str, seq: usize) -> Message {
        Message::from_raw(&json!({
            FIELD_PEER: peer,
            "MMActualContent": format!("message #{seq}"),
            "MMUnread": true,
        }))
    }

    #[tokio::test]
    async fn fifo_eviction_keeps_last_twenty() {
        let (cache, _path) = temp_cache();
        for seq in 1..=25 {
            cache.append(sample_message("u1", seq)).await.unwrap();
        }

        let record = cache.read_all("u1").await;
        assert_eq!(record.len(), MAX_HISTORY);
        assert_eq!(record[0].raw()["MMActualContent"], json!("message #6"));
        assert_eq!(record[19].raw()["MMActualContent"], json!("message #25"));
    }

    #[tokio::test]
    async fn append_without_peer_is_a_noop() {
        let (cache, _path) = temp_cache();
        cache
            .append(Message::from_raw(&json!({ "MMActualContent": "orphan" })))
            .await
            .unwrap();

        assert!(cache.read_all("").await.is_empty());
    }

    #[tokio::test]
    async fn missing_record_reads_as_empty() {
        let (cache, _path) = temp_cache();
        assert!(cache.read_all("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_record_reads_as_empty_and_recovers() {
        let (cache, path) = temp_cache();

        // Damage the record through a second connection, the way a crashed
        // or foreign writer would.
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO history (peer_user_id, messages) VALUES ('u9', 'not json')",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(cache.read_all("u9").await.is_empty());

        cache.append(sample_message("u9", 1)).await.unwrap();
        assert_eq!(cache.read_all("u9").await.len(), 1);
    }

    #[tokio::test]
    async fn restore_guard_leaves_populated_list_alone() {
        let (cache, _path) = temp_cache();
        cache.append(sample_message("u2", 1)).await.unwrap();

        let mut populated = vec![sample_message("u2", 99)];
        cache.restore_into(&mut populated, "u2").await;
        assert_eq!(populated.len(), 1);
        assert_eq!(populated[0].raw()["MMActualContent"], json!("message #99"));

        let mut empty = Vec::new();
        cache.restore_into(&mut empty, "u2").await;
        assert_eq!(empty.len(), 1);
        assert!(!empty[0].unread());
    }
}
