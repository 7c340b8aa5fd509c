use rusqlite::{params, OptionalExtension, Transaction};
use std::cell::Cell;
use tracing::{debug, info, warn};

use super::cursor::{CursorScope, FragmentCursor, RecordCursor};
use super::environment::StoreEnvironment;
use super::schema::{StoreTables, StoredFragment, SCHEMA_VERSION};
use super::{QueryError, StoreError};
use crate::core::fragment::FragmentRecord;

/// Lookup of fragments by canonical barcode signature.
///
/// This is the seam the join engine scans through; [`FragmentStore`] is the
/// production implementation.
pub trait SignatureIndex {
    type Cursor<'a>: FragmentCursor
    where
        Self: 'a;

    /// Open a cursor over every fragment whose signature equals `signature`
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the cursor cannot be opened.
    fn cursor_for_signature(&self, signature: &str) -> Result<Self::Cursor<'_>, StoreError>;
}

/// A named collection of fragments with a primary index on
/// `id:reference:start-end` and secondary indices on id and signature.
#[derive(Debug)]
pub struct FragmentStore<'env> {
    env: &'env StoreEnvironment,
    name: String,
    tables: StoreTables,
    open_cursors: Cell<usize>,
}

impl<'env> FragmentStore<'env> {
    /// Open store `name`, creating its tables if the environment is writable.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` for an invalid name,
    /// `QueryError::MissingIndex` if a read-only environment lacks one of the
    /// store's tables, and `StoreError::Engine` if the tables cannot be created.
    pub fn open(env: &'env StoreEnvironment, name: &str) -> Result<Self, StoreError> {
        let tables = StoreTables::new(name)?;
        let store = Self {
            env,
            name: name.to_string(),
            tables,
            open_cursors: Cell::new(0),
        };

        if env.is_read_only() {
            store.check_tables()?;
        } else {
            store.create_tables()?;
        }
        store.check_version()?;

        info!(store = name, path = %env.home().display(), "Opened fragment store");
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        let connection = self.env.connection();
        let tx = connection
            .unchecked_transaction()
            .map_err(|source| self.engine_error("create", "", source))?;
        tx.execute_batch(&self.tables.create_statements())
            .map_err(|source| self.engine_error("create", "", source))?;
        tx.execute(
            "INSERT OR IGNORE INTO store_meta (store, version, created_at) VALUES (?1, ?2, ?3)",
            params![self.name, SCHEMA_VERSION, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|source| self.engine_error("create", "", source))?;
        tx.commit()
            .map_err(|source| self.engine_error("create", "", source))
    }

    fn check_tables(&self) -> Result<(), StoreError> {
        let indices = [
            ("primary", &self.tables.records),
            ("id", &self.tables.by_id),
            ("barcodes", &self.tables.by_barcodes),
        ];
        for (index, table) in indices {
            let found: Option<String> = self
                .env
                .connection()
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|source| self.engine_error("open", "", source))?;
            if found.is_none() {
                return Err(QueryError::MissingIndex {
                    store: self.name.clone(),
                    index,
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_version(&self) -> Result<(), StoreError> {
        let version: Option<String> = self
            .env
            .connection()
            .query_row(
                "SELECT version FROM store_meta WHERE store = ?1",
                [&self.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| self.engine_error("open", "", source))?;
        match version {
            Some(version) if version != SCHEMA_VERSION => {
                warn!(
                    store = %self.name,
                    found = %version,
                    expected = SCHEMA_VERSION,
                    "Store was written with a different schema version"
                );
            }
            None => debug!(store = %self.name, "Store has no metadata row"),
            Some(_) => {}
        }
        Ok(())
    }

    /// Upsert one record. An existing record with the same primary key is
    /// replaced, along with its index rows.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` on a read-only environment, and
    /// `StoreError::Engine` or `StoreError::Codec` if the write fails.
    pub fn put(&self, record: &FragmentRecord) -> Result<(), StoreError> {
        self.env.ensure_writable("put a fragment")?;
        let key = record.primary_key();
        let tx = self
            .env
            .connection()
            .unchecked_transaction()
            .map_err(|source| self.engine_error("put", &key, source))?;
        self.write_record(&tx, record, &key)?;
        tx.commit()
            .map_err(|source| self.engine_error("put", &key, source))
    }

    /// Upsert many records, returning how many were written.
    ///
    /// In a transactional environment the whole batch commits atomically;
    /// otherwise each record commits on its own and a failure leaves the
    /// records before it in place.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put).
    pub fn put_batch<'r, I>(&self, records: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = &'r FragmentRecord>,
    {
        if !self.env.is_transactional() {
            let mut written = 0;
            for record in records {
                self.put(record)?;
                written += 1;
            }
            debug!(store = %self.name, written, "Wrote batch without transaction");
            return Ok(written);
        }

        self.env.ensure_writable("put fragments")?;
        let tx = self
            .env
            .connection()
            .unchecked_transaction()
            .map_err(|source| self.engine_error("put batch", "", source))?;
        let mut written = 0;
        for record in records {
            let key = record.primary_key();
            self.write_record(&tx, record, &key)?;
            written += 1;
        }
        tx.commit()
            .map_err(|source| self.engine_error("put batch", "", source))?;
        debug!(store = %self.name, written, "Committed batch");
        Ok(written)
    }

    fn write_record(
        &self,
        tx: &Transaction<'_>,
        record: &FragmentRecord,
        key: &str,
    ) -> Result<(), StoreError> {
        let stored = StoredFragment::from_record(record);
        let payload = stored.encode(&self.name, key)?;
        let write_err = |source: rusqlite::Error| self.engine_error("put", key, source);

        // Drop index rows of any record this one replaces
        for table in [&self.tables.by_id, &self.tables.by_barcodes] {
            tx.prepare_cached(&delete_index_rows(table))
                .and_then(|mut statement| statement.execute([key]))
                .map_err(write_err)?;
        }

        tx.prepare_cached(&format!(
            "INSERT OR REPLACE INTO {} (pkey, payload) VALUES (?1, ?2)",
            self.tables.records
        ))
        .and_then(|mut statement| statement.execute(params![key, payload]))
        .map_err(write_err)?;
        tx.prepare_cached(&format!(
            "INSERT OR REPLACE INTO {} (id, pkey) VALUES (?1, ?2)",
            self.tables.by_id
        ))
        .and_then(|mut statement| statement.execute(params![stored.id, key]))
        .map_err(write_err)?;
        tx.prepare_cached(&format!(
            "INSERT OR REPLACE INTO {} (barcodes, pkey) VALUES (?1, ?2)",
            self.tables.by_barcodes
        ))
        .and_then(|mut statement| statement.execute(params![stored.barcodes.as_str(), key]))
        .map_err(write_err)?;
        Ok(())
    }

    /// Point lookup by primary key
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Engine` or `StoreError::Codec` if the read fails.
    pub fn get(&self, primary_key: &str) -> Result<Option<FragmentRecord>, StoreError> {
        let payload: Option<Vec<u8>> = self
            .env
            .connection()
            .query_row(
                &format!("SELECT payload FROM {} WHERE pkey = ?1", self.tables.records),
                [primary_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| self.engine_error("get", primary_key, source))?;
        payload
            .map(|bytes| {
                StoredFragment::decode(&bytes, &self.name, primary_key)
                    .map(StoredFragment::into_record)
            })
            .transpose()
    }

    /// Cursor over every record with fragment id `id`, in primary key order
    ///
    /// # Errors
    ///
    /// Errors surface from the cursor as it advances; opening does not fail.
    pub fn get_by_id(&self, id: &str) -> Result<RecordCursor<'_>, StoreError> {
        Ok(RecordCursor::new(self, CursorScope::Id(id.to_string())))
    }

    /// Cursor over every record whose canonical signature equals `signature`
    ///
    /// # Errors
    ///
    /// Errors surface from the cursor as it advances; opening does not fail.
    pub fn get_by_barcode_signature(
        &self,
        signature: &str,
    ) -> Result<RecordCursor<'_>, StoreError> {
        Ok(RecordCursor::new(
            self,
            CursorScope::Barcodes(signature.to_string()),
        ))
    }

    /// Full scan in primary key order
    ///
    /// # Errors
    ///
    /// Errors surface from the cursor as it advances; opening does not fail.
    pub fn get_all(&self) -> Result<RecordCursor<'_>, StoreError> {
        Ok(RecordCursor::new(self, CursorScope::All))
    }

    /// Number of records in the primary index
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Engine` if the count query fails.
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .env
            .connection()
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", self.tables.records),
                [],
                |row| row.get(0),
            )
            .map_err(|source| self.engine_error("count", "", source))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Cursors handed out by this store and not yet released
    #[must_use]
    pub fn open_cursor_count(&self) -> usize {
        self.open_cursors.get()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn environment(&self) -> &'env StoreEnvironment {
        self.env
    }

    pub(crate) fn tables(&self) -> &StoreTables {
        &self.tables
    }

    pub(crate) fn cursor_opened(&self) {
        self.open_cursors.set(self.open_cursors.get() + 1);
    }

    pub(crate) fn cursor_closed(&self) {
        self.open_cursors
            .set(self.open_cursors.get().saturating_sub(1));
    }

    pub(crate) fn engine_error(
        &self,
        operation: &'static str,
        key: &str,
        source: rusqlite::Error,
    ) -> StoreError {
        StoreError::Engine {
            path: self.env.home().to_path_buf(),
            store: self.name.clone(),
            operation,
            key: key.to_string(),
            source,
        }
    }
}

/// Statement removing every row of secondary index `table` for one primary key
fn delete_index_rows(table: &str) -> String {
    format!("DELETE FROM {table} WHERE pkey = ?1")
}

impl<'env> SignatureIndex for FragmentStore<'env> {
    type Cursor<'a> = RecordCursor<'a> where Self: 'a;

    fn cursor_for_signature(&self, signature: &str) -> Result<Self::Cursor<'_>, StoreError> {
        self.get_by_barcode_signature(signature)
    }
}

impl Drop for FragmentStore<'_> {
    fn drop(&mut self) {
        let open = self.open_cursors.get();
        if open > 0 {
            warn!(store = %self.name, open, "Fragment store dropped with open cursors");
        }
    }
}
