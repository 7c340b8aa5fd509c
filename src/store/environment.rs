use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::StoreError;

/// File name of the database inside an environment home directory
pub const DATABASE_FILE: &str = "fragments.sqlite";

/// Default cache size as a percentage of available memory
pub const DEFAULT_CACHE_PERCENT: u8 = 10;

/// Largest cache percentage accepted
pub const MAX_CACHE_PERCENT: u8 = 90;

/// Default number of records a cursor fetches per page
pub const DEFAULT_CURSOR_BATCH_SIZE: usize = 256;

/// Memory assumed available when the system cannot be queried
const FALLBACK_AVAILABLE_MEMORY: u64 = 1 << 30;

/// How an environment is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Open without write access; the environment must already exist
    pub read_only: bool,

    /// Batches are written atomically and every commit is synced to disk
    pub transactional: bool,

    /// Page cache size as a percentage of available memory (1-90)
    pub cache_percent: u8,

    /// Records fetched per cursor page
    pub cursor_batch_size: usize,

    /// Memory available to the process; detected from the system when unset
    pub available_memory: Option<u64>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            transactional: true,
            cache_percent: DEFAULT_CACHE_PERCENT,
            cursor_batch_size: DEFAULT_CURSOR_BATCH_SIZE,
            available_memory: None,
        }
    }
}

impl EnvironmentConfig {
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    #[must_use]
    pub fn with_cache_percent(mut self, percent: u8) -> Self {
        self.cache_percent = percent;
        self
    }

    #[must_use]
    pub fn with_cursor_batch_size(mut self, size: usize) -> Self {
        self.cursor_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_available_memory(mut self, bytes: u64) -> Self {
        self.available_memory = Some(bytes);
        self
    }

    /// Check settings before any I/O happens
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` for an out-of-range cache
    /// percentage or a zero cursor batch size.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_cache_percent(self.cache_percent)?;
        if self.cursor_batch_size == 0 {
            return Err(StoreError::Configuration(
                "Cursor batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_cache_percent(percent: u8) -> Result<(), StoreError> {
    if percent == 0 || percent > MAX_CACHE_PERCENT {
        return Err(StoreError::Configuration(format!(
            "Cache percent must be between 1 and {MAX_CACHE_PERCENT}, got {percent}"
        )));
    }
    Ok(())
}

/// Memory available to this process, from `/proc/meminfo` where present
fn detect_available_memory() -> u64 {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|meminfo| {
            meminfo
                .lines()
                .find(|line| line.starts_with("MemAvailable:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
        })
        .map_or(FALLBACK_AVAILABLE_MEMORY, |kb| kb * 1024)
}

/// An open database environment.
///
/// The environment is the context object every store operation runs against.
/// Its lifecycle belongs to the caller: open it once, hand references to the
/// stores that need it, and [`close`](Self::close) it when those are gone.
#[derive(Debug)]
pub struct StoreEnvironment {
    connection: Connection,
    home: PathBuf,
    config: EnvironmentConfig,
    available_memory: u64,
    cache_percent: Cell<u8>,
}

impl StoreEnvironment {
    /// Open (creating if writable) the environment rooted at `home`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if the configuration is invalid or
    /// `home` is unusable for the requested mode, and `StoreError::Resource`
    /// if the database cannot be opened.
    pub fn open(home: &Path, config: EnvironmentConfig) -> Result<Self, StoreError> {
        config.validate()?;
        info!(
            path = %home.display(),
            read_only = config.read_only,
            transactional = config.transactional,
            "Opening database environment"
        );

        if home.exists() && !home.is_dir() {
            return Err(StoreError::Configuration(format!(
                "Environment home {} is not a directory",
                home.display()
            )));
        }

        let db_path = home.join(DATABASE_FILE);
        let flags = if config.read_only {
            if !db_path.is_file() {
                return Err(StoreError::Configuration(format!(
                    "No environment found at {} (read-only environments must already exist)",
                    home.display()
                )));
            }
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            std::fs::create_dir_all(home).map_err(|e| {
                StoreError::Configuration(format!(
                    "Cannot create environment home {}: {e}",
                    home.display()
                ))
            })?;
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };

        let resource_err = |source: rusqlite::Error| StoreError::Resource {
            action: "open",
            path: home.to_path_buf(),
            source,
        };

        let connection = Connection::open_with_flags(&db_path, flags).map_err(resource_err)?;

        if !config.read_only {
            connection
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })
                .map_err(resource_err)?;
            let synchronous = if config.transactional { "FULL" } else { "NORMAL" };
            connection
                .pragma_update(None, "synchronous", synchronous)
                .map_err(resource_err)?;
            connection
                .execute_batch(
                    "CREATE TABLE IF NOT EXISTS store_meta (
                        store TEXT PRIMARY KEY,
                        version TEXT NOT NULL,
                        created_at TEXT NOT NULL
                    ) WITHOUT ROWID;",
                )
                .map_err(resource_err)?;
        }

        let available_memory = config
            .available_memory
            .unwrap_or_else(detect_available_memory);

        let env = Self {
            connection,
            home: home.to_path_buf(),
            cache_percent: Cell::new(config.cache_percent),
            config,
            available_memory,
        };
        env.apply_cache_percent(env.config.cache_percent)
            .map_err(resource_err)?;
        Ok(env)
    }

    /// Close the environment, flushing everything to disk
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Resource` if the database does not close cleanly.
    pub fn close(self) -> Result<(), StoreError> {
        info!(path = %self.home.display(), "Closing database environment");
        let home = self.home;
        self.connection
            .close()
            .map_err(|(_, source)| StoreError::Resource {
                action: "close",
                path: home,
                source,
            })
    }

    /// Resize the page cache to `percent` of available memory without reopening.
    ///
    /// Returns the new cache size in bytes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` for an out-of-range percentage.
    pub fn set_cache_percent(&self, percent: u8) -> Result<u64, StoreError> {
        validate_cache_percent(percent)?;
        self.apply_cache_percent(percent)
            .map_err(|source| StoreError::Resource {
                action: "configure cache for",
                path: self.home.clone(),
                source,
            })?;
        let bytes = self.cache_size_bytes();
        info!(cache_bytes = bytes, percent, "Changed cache size");
        Ok(bytes)
    }

    fn apply_cache_percent(&self, percent: u8) -> rusqlite::Result<()> {
        let kib = self.available_memory / 100 * u64::from(percent) / 1024;
        let kib = i64::try_from(kib.max(1)).unwrap_or(i64::MAX);
        // Negative cache_size is interpreted by SQLite as KiB rather than pages
        self.connection.pragma_update(None, "cache_size", -kib)?;
        self.cache_percent.set(percent);
        debug!(cache_kib = kib, "Applied cache size");
        Ok(())
    }

    /// Current cache size in bytes as requested from the engine
    #[must_use]
    pub fn cache_size_bytes(&self) -> u64 {
        self.available_memory / 100 * u64::from(self.cache_percent.get()) / 1024 * 1024
    }

    #[must_use]
    pub fn cache_percent(&self) -> u8 {
        self.cache_percent.get()
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    #[must_use]
    pub fn is_transactional(&self) -> bool {
        self.config.transactional
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Fail with a configuration error if the environment cannot be written
    pub(crate) fn ensure_writable(&self, what: &str) -> Result<(), StoreError> {
        if self.config.read_only {
            return Err(StoreError::Configuration(format!(
                "Cannot {what}: environment {} is read-only",
                self.home.display()
            )));
        }
        Ok(())
    }

    /// Names of all stores in this environment
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Engine` if the store catalog cannot be read.
    pub fn store_names(&self) -> Result<Vec<String>, StoreError> {
        let engine_err = |source: rusqlite::Error| StoreError::Engine {
            path: self.home.clone(),
            store: "store_meta".to_string(),
            operation: "list stores",
            key: String::new(),
            source,
        };

        let has_meta: Option<String> = self
            .connection
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'store_meta'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(engine_err)?;
        if has_meta.is_none() {
            return Ok(Vec::new());
        }

        let mut statement = self
            .connection
            .prepare("SELECT store FROM store_meta ORDER BY store")
            .map_err(engine_err)?;
        let names = statement
            .query_map([], |row| row.get(0))
            .map_err(engine_err)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(engine_err)?;
        Ok(names)
    }

    /// Drop a store and all of its indices
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` on a read-only environment or for an
    /// invalid store name, and `StoreError::Engine` if the tables cannot be dropped.
    pub fn remove_store(&self, name: &str) -> Result<(), StoreError> {
        self.ensure_writable("remove a store")?;
        let tables = super::schema::StoreTables::new(name)?;
        warn!(store = name, path = %self.home.display(), "Removing store");
        let engine_err = |source: rusqlite::Error| StoreError::Engine {
            path: self.home.clone(),
            store: name.to_string(),
            operation: "remove",
            key: String::new(),
            source,
        };

        let tx = self.connection.unchecked_transaction().map_err(engine_err)?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};
             DROP TABLE IF EXISTS {};
             DROP TABLE IF EXISTS {};",
            tables.by_barcodes, tables.by_id, tables.records,
        ))
        .map_err(engine_err)?;
        tx.execute("DELETE FROM store_meta WHERE store = ?1", [name])
            .map_err(engine_err)?;
        tx.commit().map_err(engine_err)
    }
}
