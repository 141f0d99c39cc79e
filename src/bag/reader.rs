use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

use crate::error::BagError;

/// A raw message as stored in the bag.
#[derive(Debug, Clone)]
pub struct BagMessage {
    pub timestamp_ns: i64,
    pub data: Vec<u8>,
}

/// Read-only view over a ROS 2 sqlite3 bag, restricted to a single topic.
pub struct BagReader {
    conn: Connection,
    storage: PathBuf,
    topic: String,
    topic_id: i64,
}

impl BagReader {
    /// Opens a `.db3` file or a bag directory containing one.
    pub fn open(path: &Path, topic: &str) -> Result<Self, BagError> {
        let storage = resolve_storage(path)?;
        let conn = Connection::open_with_flags(
            &storage,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let topic_id = conn
            .query_row(
                "SELECT id FROM topics WHERE name = ?1",
                params![topic],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => BagError::TopicNotFound(topic.to_string()),
                other => BagError::Sqlite(other),
            })?;

        tracing::debug!("Opened bag storage {} (topic {})", storage.display(), topic);

        Ok(Self {
            conn,
            storage,
            topic: topic.to_string(),
            topic_id,
        })
    }

    pub fn storage(&self) -> &Path {
        &self.storage
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn message_count(&self) -> Result<u64, BagError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE topic_id = ?1",
            params![self.topic_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// First and last timestamp on the topic, if any message exists.
    pub fn time_bounds(&self) -> Result<Option<(i64, i64)>, BagError> {
        let bounds: (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM messages WHERE topic_id = ?1",
            params![self.topic_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match bounds {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        })
    }

    /// Visits messages in timestamp order, stopping after `limit` messages or
    /// when the visitor returns `false`. Returns the number of messages visited.
    pub fn for_each<F>(&self, limit: Option<u64>, mut visit: F) -> Result<u64, BagError>
    where
        F: FnMut(BagMessage) -> bool,
    {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, data FROM messages WHERE topic_id = ?1
             ORDER BY timestamp, id LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![self.topic_id, limit])?;

        let mut visited = 0u64;
        while let Some(row) = rows.next()? {
            let message = BagMessage {
                timestamp_ns: row.get(0)?,
                data: row.get(1)?,
            };
            visited += 1;
            if !visit(message) {
                break;
            }
        }
        Ok(visited)
    }

    /// Collects up to `limit` messages.
    pub fn read(&self, limit: u64) -> Result<Vec<BagMessage>, BagError> {
        let mut messages = Vec::with_capacity(limit.min(1024) as usize);
        self.for_each(Some(limit), |message| {
            messages.push(message);
            true
        })?;
        Ok(messages)
    }
}

fn resolve_storage(path: &Path) -> Result<PathBuf, BagError> {
    if !path.exists() {
        return Err(BagError::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(path)
        .map_err(|_| BagError::NotFound(path.to_path_buf()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "db3"))
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| BagError::NoStorage(path.to_path_buf()))
}
