use std::{
    path::Path,
    sync::{mpsc, Arc},
    thread,
};

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, error, warn};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

use crate::transform::Message;

use super::MAX_HISTORY;

// rusqlite connections are not Sync, so a single worker thread owns the
// connection and serializes every record operation. That also gives append
// its atomicity: the read-modify-write happens inside one command, and no
// reader can slot in between.
enum StoreCommand {
    Append {
        message: Message,
        reply: oneshot::Sender<Result<()>>,
    },
    ReadAll {
        peer: String,
        reply: oneshot::Sender<Vec<Message>>,
    },
}

struct StoreHandle {
    // Taken (and thereby closed) on drop; the worker drains the queue and
    // exits once every sender is gone.
    commands: Option<mpsc::Sender<StoreCommand>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        drop(self.commands.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("history worker panicked during shutdown");
            }
        }
    }
}

/// Durable per-peer record store. One row per peer, the record serialized
/// as a JSON document, capped at [`MAX_HISTORY`] entries oldest-first.
#[derive(Clone)]
pub struct HistoryStore {
    handle: Arc<StoreHandle>,
}

impl HistoryStore {
    /// Opens (or creates) the database, prepares the schema, and hands the
    /// connection off to the worker thread.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open history database {}", db_path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("history database left in rollback journal mode: {err}");
        }
        prepare_schema(&conn)
            .with_context(|| format!("failed to prepare schema in {}", db_path.display()))?;

        let (commands_tx, commands_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("history-store".into())
            .spawn(move || worker_loop(conn, commands_rx))
            .context("failed to spawn history worker")?;

        debug!("history store open at {}", db_path.display());

        Ok(Self {
            handle: Arc::new(StoreHandle {
                commands: Some(commands_tx),
                worker: Some(worker),
            }),
        })
    }

    pub async fn append(&self, message: Message) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(StoreCommand::Append {
            message,
            reply: reply_tx,
        })?;
        reply_rx
            .await
            .map_err(|_| anyhow!("history worker dropped an append reply"))?
    }

    pub async fn read_all(&self, peer: &str) -> Result<Vec<Message>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(StoreCommand::ReadAll {
            peer: peer.to_string(),
            reply: reply_tx,
        })?;
        reply_rx
            .await
            .map_err(|_| anyhow!("history worker dropped a read reply"))
    }

    fn send(&self, command: StoreCommand) -> Result<()> {
        let Some(commands) = self.handle.commands.as_ref() else {
            bail!("history store already shut down");
        };
        commands
            .send(command)
            .map_err(|_| anyhow!("history worker is gone"))
    }
}

const SCHEMA_VERSION: i32 = 1;

// Record payloads carry no version tag of their own; one that no longer
// parses reads as empty and is overwritten by the next append. A message
// shape change that must not be masked that way bumps the version here.
fn prepare_schema(conn: &Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")?;

    match found {
        0 => {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS history (
                     peer_user_id TEXT PRIMARY KEY,
                     messages     TEXT NOT NULL
                 );",
            )
            .context("failed to create history table")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("failed to stamp schema version")?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        newer => bail!(
            "history database was written by a newer build (schema {newer}, supported {SCHEMA_VERSION})"
        ),
    }
}

fn worker_loop(conn: Connection, commands: mpsc::Receiver<StoreCommand>) {
    while let Ok(command) = commands.recv() {
        match command {
            StoreCommand::Append { message, reply } => {
                let outcome = append_message(&conn, message);
                if reply.send(outcome).is_err() {
                    debug!("append reply discarded, caller went away");
                }
            }
            StoreCommand::ReadAll { peer, reply } => {
                let _ = reply.send(read_record(&conn, &peer));
            }
        }
    }
    debug!("history worker stopped");
}

fn append_message(conn: &Connection, message: Message) -> Result<()> {
    let peer = message.peer_user_id().to_string();

    let mut record = read_record(conn, &peer);
    record.push(message);
    if record.len() > MAX_HISTORY {
        let excess = record.len() - MAX_HISTORY;
        record.drain(..excess);
    }

    let doc = serde_json::to_string(&record).context("failed to serialize history record")?;
    conn.execute(
        "INSERT INTO history (peer_user_id, messages) VALUES (?1, ?2)
         ON CONFLICT(peer_user_id) DO UPDATE SET messages = excluded.messages",
        params![peer, doc],
    )
    .with_context(|| format!("failed to write history record for peer {peer}"))?;

    Ok(())
}

fn read_record(conn: &Connection, peer: &str) -> Vec<Message> {
    let row = conn
        .query_row(
            "SELECT messages FROM history WHERE peer_user_id = ?1",
            params![peer],
            |row| row.get::<_, String>(0),
        )
        .optional();

    match row {
        Ok(Some(doc)) => serde_json::from_str(&doc).unwrap_or_else(|err| {
            warn!("history record for peer {peer} does not parse, treating as empty: {err}");
            Vec::new()
        }),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!("history lookup for peer {peer} failed, treating as empty: {err}");
            Vec::new()
        }
    }
}
