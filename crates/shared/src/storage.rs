use rusqlite::{params, Connection};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::StorageKind;
use crate::error::PersistenceError;
use crate::models::Platform;

/// Remembers which stories have already been announced to which platform.
///
/// `save_posted` must be idempotent: saving a pair twice is not an error and
/// `is_posted` keeps answering `true`.
///
/// Calls are synchronous and run on the announcer's task; runs are sequential
/// and each call is a single small query or file scan.
pub trait PostedStore: Send + Sync {
    fn is_posted(&self, platform: Platform, story_id: u64) -> Result<bool, PersistenceError>;

    fn save_posted(&self, platform: Platform, story_id: u64) -> Result<(), PersistenceError>;

    fn backend_name(&self) -> &'static str;
}

/// Open the backend selected in the configuration.
pub fn open_store(kind: &StorageKind) -> Result<Box<dyn PostedStore>, PersistenceError> {
    match kind {
        StorageKind::Local { dir } => Ok(Box::new(FileStore::open(dir)?)),
        StorageKind::Database { path } => Ok(Box::new(SqliteStore::open(path)?)),
    }
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS posted_stories (
    story_id TEXT,
    platform TEXT,
    PRIMARY KEY (story_id, platform)
)";

/// SQLite backend, one row per (story, platform).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, e))?;
        }

        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PostedStore for SqliteStore {
    fn is_posted(&self, platform: Platform, story_id: u64) -> Result<bool, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posted_stories WHERE story_id = ? AND platform = ?",
            params![story_id.to_string(), platform.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn save_posted(&self, platform: Platform, story_id: u64) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        conn.execute(
            "INSERT OR IGNORE INTO posted_stories (story_id, platform) VALUES (?, ?)",
            params![story_id.to_string(), platform.as_str()],
        )?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "database"
    }
}

/// Flat-file backend: `<platform>_posted_stories.txt`, one story id per line.
///
/// Lookups scan the whole file, so cost grows linearly with the number of
/// stories ever posted to that platform.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self, PersistenceError> {
        fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn file_path(&self, platform: Platform) -> PathBuf {
        self.dir.join(format!("{}_posted_stories.txt", platform.as_str()))
    }
}

impl PostedStore for FileStore {
    fn is_posted(&self, platform: Platform, story_id: u64) -> Result<bool, PersistenceError> {
        let path = self.file_path(platform);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(PersistenceError::io(&path, e)),
        };

        let wanted = story_id.to_string();
        // Lines that are not valid UTF-8 never match but do not stop the scan
        for line in BufReader::new(file).split(b'\n') {
            let line = line.map_err(|e| PersistenceError::io(&path, e))?;
            if String::from_utf8_lossy(&line).trim() == wanted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn save_posted(&self, platform: Platform, story_id: u64) -> Result<(), PersistenceError> {
        let path = self.file_path(platform);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| PersistenceError::io(&path, e))?;

        writeln!(file, "{}", story_id).map_err(|e| PersistenceError::io(&path, e))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
