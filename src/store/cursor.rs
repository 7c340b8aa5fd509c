//! Cursors over fragment store indices.
//!
//! A [`RecordCursor`] pages through one index in batches of
//! `cursor_batch_size` rows using keyset pagination on the primary key, so
//! no SQLite statement stays open between advances. A [`JoinedCursor`]
//! concatenates several cursors, draining each in turn.

use rusqlite::{params, Row};
use std::collections::VecDeque;
use tracing::debug;

use super::fragments::FragmentStore;
use super::schema::StoredFragment;
use super::StoreError;
use crate::core::fragment::FragmentRecord;

/// A scoped, pull-based stream of fragment records.
///
/// Releasing happens on [`close`](Self::close) or on drop, whichever comes
/// first. A released cursor yields nothing further.
pub trait FragmentCursor: Iterator<Item = Result<FragmentRecord, StoreError>> {
    /// Release the cursor. Calling this more than once is a no-op.
    fn close(&mut self);

    /// Whether the cursor has been released
    fn is_closed(&self) -> bool;
}

/// Which index a [`RecordCursor`] walks
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CursorScope {
    All,
    Id(String),
    Barcodes(String),
}

impl CursorScope {
    fn describe(&self) -> &str {
        match self {
            Self::All => "*",
            Self::Id(key) | Self::Barcodes(key) => key,
        }
    }
}

/// Cursor over one index of a [`FragmentStore`]
#[derive(Debug)]
pub struct RecordCursor<'a> {
    store: &'a FragmentStore<'a>,
    scope: CursorScope,
    buffer: VecDeque<(String, Vec<u8>)>,
    last_key: Option<String>,
    batch_size: usize,
    exhausted: bool,
    released: bool,
}

impl<'a> RecordCursor<'a> {
    pub(crate) fn new(store: &'a FragmentStore<'a>, scope: CursorScope) -> Self {
        store.cursor_opened();
        let batch_size = store.environment().config().cursor_batch_size;
        Self {
            store,
            scope,
            buffer: VecDeque::new(),
            last_key: None,
            batch_size,
            exhausted: false,
            released: false,
        }
    }

    fn fetch_page(&mut self) -> Result<(), StoreError> {
        let tables = self.store.tables();
        let sql = match (&self.scope, self.last_key.is_some()) {
            (CursorScope::All, false) => format!(
                "SELECT pkey, payload FROM {} ORDER BY pkey LIMIT ?1",
                tables.records
            ),
            (CursorScope::All, true) => format!(
                "SELECT pkey, payload FROM {} WHERE pkey > ?2 ORDER BY pkey LIMIT ?1",
                tables.records
            ),
            (CursorScope::Id(_), resumed) => secondary_page_sql(
                &tables.by_id,
                "id",
                &tables.records,
                resumed,
            ),
            (CursorScope::Barcodes(_), resumed) => secondary_page_sql(
                &tables.by_barcodes,
                "barcodes",
                &tables.records,
                resumed,
            ),
        };

        let limit = i64::try_from(self.batch_size).unwrap_or(i64::MAX);
        let connection = self.store.environment().connection();
        let mut statement = connection
            .prepare_cached(&sql)
            .map_err(|source| {
                self.store
                    .engine_error("prepare cursor", self.scope.describe(), source)
            })?;

        let read_row = |row: &Row<'_>| -> rusqlite::Result<(String, Vec<u8>)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows = match (&self.scope, &self.last_key) {
            (CursorScope::All, None) => statement.query_map(params![limit], read_row),
            (CursorScope::All, Some(last)) => statement.query_map(params![limit, last], read_row),
            (CursorScope::Id(key) | CursorScope::Barcodes(key), None) => {
                statement.query_map(params![limit, key], read_row)
            }
            (CursorScope::Id(key) | CursorScope::Barcodes(key), Some(last)) => {
                statement.query_map(params![limit, key, last], read_row)
            }
        }
        .map_err(|source| {
            self.store
                .engine_error("advance cursor", self.scope.describe(), source)
        })?;

        let mut fetched = 0usize;
        for row in rows {
            let row = row.map_err(|source| {
                self.store
                    .engine_error("advance cursor", self.scope.describe(), source)
            })?;
            self.buffer.push_back(row);
            fetched += 1;
        }
        debug!(
            store = self.store.name(),
            scope = self.scope.describe(),
            fetched,
            "Fetched cursor page"
        );

        if fetched < self.batch_size {
            self.exhausted = true;
        }
        if let Some((key, _)) = self.buffer.back() {
            self.last_key = Some(key.clone());
        }
        Ok(())
    }
}

fn secondary_page_sql(index: &str, column: &str, records: &str, resumed: bool) -> String {
    let resume = if resumed { " AND i.pkey > ?3" } else { "" };
    format!(
        "SELECT r.pkey, r.payload FROM {index} i \
         JOIN {records} r ON r.pkey = i.pkey \
         WHERE i.{column} = ?2{resume} \
         ORDER BY i.pkey LIMIT ?1"
    )
}

impl Iterator for RecordCursor<'_> {
    type Item = Result<FragmentRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.released {
            return None;
        }
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_page() {
                self.close();
                return Some(Err(err));
            }
        }
        match self.buffer.pop_front() {
            Some((key, payload)) => Some(
                StoredFragment::decode(&payload, self.store.name(), &key)
                    .map(StoredFragment::into_record),
            ),
            None => {
                self.close();
                None
            }
        }
    }
}

impl FragmentCursor for RecordCursor<'_> {
    fn close(&mut self) {
        if !self.released {
            self.released = true;
            self.buffer.clear();
            self.store.cursor_closed();
        }
    }

    fn is_closed(&self) -> bool {
        self.released
    }
}

impl Drop for RecordCursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Concatenation of cursors: drains the first to exhaustion, releases it,
/// then moves to the next.
///
/// No ordering is imposed across sub-cursors. Releasing the joined cursor
/// releases every sub-cursor it still owns.
#[derive(Debug)]
pub struct JoinedCursor<C: FragmentCursor> {
    cursors: VecDeque<C>,
    released: bool,
}

impl<C: FragmentCursor> JoinedCursor<C> {
    #[must_use]
    pub fn new(cursors: Vec<C>) -> Self {
        Self {
            cursors: cursors.into(),
            released: false,
        }
    }

    /// Number of sub-cursors not yet drained
    #[must_use]
    pub fn remaining_cursors(&self) -> usize {
        self.cursors.len()
    }
}

impl<C: FragmentCursor> Iterator for JoinedCursor<C> {
    type Item = Result<FragmentRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.cursors.front_mut() {
            if let Some(item) = current.next() {
                return Some(item);
            }
            if let Some(mut drained) = self.cursors.pop_front() {
                drained.close();
            }
        }
        self.released = true;
        None
    }
}

impl<C: FragmentCursor> FragmentCursor for JoinedCursor<C> {
    fn close(&mut self) {
        for mut cursor in self.cursors.drain(..) {
            cursor.close();
        }
        self.released = true;
    }

    fn is_closed(&self) -> bool {
        self.released
    }
}

impl<C: FragmentCursor> Drop for JoinedCursor<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::BarcodeSequence;
    use std::cell::Cell;
    use std::rc::Rc;

    /// In-memory cursor that reports how many of its kind are still open
    struct VecCursor {
        items: VecDeque<FragmentRecord>,
        open: Rc<Cell<usize>>,
        closed: bool,
    }

    impl VecCursor {
        fn new(ids: &[&str], open: &Rc<Cell<usize>>) -> Self {
            open.set(open.get() + 1);
            let barcodes = BarcodeSequence::from_attribute_string("[x]").unwrap();
            Self {
                items: ids
                    .iter()
                    .map(|id| FragmentRecord::new(id, barcodes.clone()))
                    .collect(),
                open: Rc::clone(open),
                closed: false,
            }
        }
    }

    impl Iterator for VecCursor {
        type Item = Result<FragmentRecord, StoreError>;

        fn next(&mut self) -> Option<Self::Item> {
            if self.closed {
                return None;
            }
            self.items.pop_front().map(Ok)
        }
    }

    impl FragmentCursor for VecCursor {
        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.open.set(self.open.get() - 1);
            }
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    impl Drop for VecCursor {
        fn drop(&mut self) {
            self.close();
        }
    }

    #[test]
    fn test_joined_cursor_concatenates_in_order() {
        let open = Rc::new(Cell::new(0));
        let joined = JoinedCursor::new(vec![
            VecCursor::new(&["a", "b"], &open),
            VecCursor::new(&[], &open),
            VecCursor::new(&["c"], &open),
        ]);
        let ids: Vec<String> = joined
            .map(|record| record.unwrap().id().to_string())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(open.get(), 0);
    }

    #[test]
    fn test_joined_cursor_releases_drained_sub_cursors_eagerly() {
        let open = Rc::new(Cell::new(0));
        let mut joined = JoinedCursor::new(vec![
            VecCursor::new(&["a"], &open),
            VecCursor::new(&["b", "c"], &open),
        ]);
        assert_eq!(open.get(), 2);

        assert_eq!(joined.next().unwrap().unwrap().id(), "a");
        assert_eq!(joined.next().unwrap().unwrap().id(), "b");
        assert_eq!(open.get(), 1);
        assert_eq!(joined.remaining_cursors(), 1);
    }

    #[test]
    fn test_closing_joined_cursor_early_releases_everything() {
        let open = Rc::new(Cell::new(0));
        let mut joined = JoinedCursor::new(vec![
            VecCursor::new(&["a", "b"], &open),
            VecCursor::new(&["c"], &open),
        ]);
        assert!(joined.next().is_some());
        joined.close();
        assert_eq!(open.get(), 0);
        assert!(joined.is_closed());
        assert!(joined.next().is_none());
    }

    #[test]
    fn test_dropping_joined_cursor_releases_everything() {
        let open = Rc::new(Cell::new(0));
        {
            let _joined = JoinedCursor::new(vec![
                VecCursor::new(&["a"], &open),
                VecCursor::new(&["b"], &open),
            ]);
            assert_eq!(open.get(), 2);
        }
        assert_eq!(open.get(), 0);
    }
}
