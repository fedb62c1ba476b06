//! Ordered id index with a bidirectional cursor
//!
//! Shared by snapshot and live enumerations; only live ones receive the
//! incremental insert/remove/reposition calls.

use std::cmp::Ordering;

use crate::error::{Result, RmsError};
use crate::table::RecordTable;
use crate::types::RecordId;

use super::{RecordComparator, RecordFilter};

/// Cursor position within the ordered ids
///
/// `At(i)` means element `i` was the last one returned: `next` yields
/// `i + 1` and `previous` yields `i - 1`. `Gap(g)` appears when the element
/// under the cursor is removed: `next` yields `g`, `previous` yields `g - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Nothing returned yet: `next` → first, `previous` → last
    Fresh,
    At(usize),
    Gap(usize),
}

pub(crate) struct OrderedIndex {
    ids: Vec<RecordId>,
    cursor: Cursor,
    filter: Option<Box<dyn RecordFilter>>,
    comparator: Option<Box<dyn RecordComparator>>,
}

impl OrderedIndex {
    pub fn new(
        filter: Option<Box<dyn RecordFilter>>,
        comparator: Option<Box<dyn RecordComparator>>,
    ) -> Self {
        Self {
            ids: Vec::new(),
            cursor: Cursor::Fresh,
            filter,
            comparator,
        }
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Recompute the matching ids from scratch; the cursor goes back to the start
    pub fn rebuild(&mut self, table: &RecordTable) {
        let mut matching: Vec<(RecordId, &[u8])> = table
            .iter()
            .filter(|(_, data)| self.accepts(data))
            .map(|(id, data)| (id, data.as_ref()))
            .collect();

        // Table iterates by ascending id, so without a comparator we are done
        if let Some(comparator) = &self.comparator {
            matching.sort_by(|a, b| comparator.compare(a.1, b.1).then(a.0.cmp(&b.0)));
        }

        self.ids = matching.into_iter().map(|(id, _)| id).collect();
        self.cursor = Cursor::Fresh;
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.cursor = Cursor::Fresh;
    }

    pub fn reset(&mut self) {
        self.cursor = Cursor::Fresh;
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    // =========================================================================
    // Incremental Updates (live enumerations)
    // =========================================================================

    /// Place a newly added record if it passes the filter
    pub fn insert(&mut self, table: &RecordTable, id: RecordId) {
        if self.ids.contains(&id) {
            return;
        }
        let Some(data) = table.get(id) else {
            return;
        };
        if !self.accepts(data) {
            return;
        }

        let pos = self
            .ids
            .partition_point(|&existing| self.order(table, existing, id) == Ordering::Less);
        self.ids.insert(pos, id);

        self.cursor = match self.cursor {
            Cursor::At(c) if pos <= c => Cursor::At(c + 1),
            Cursor::Gap(g) if pos < g => Cursor::Gap(g + 1),
            other => other,
        };
    }

    /// Drop a record from the index if present
    pub fn remove(&mut self, id: RecordId) {
        let Some(pos) = self.ids.iter().position(|&existing| existing == id) else {
            return;
        };
        self.ids.remove(pos);

        self.cursor = match self.cursor {
            Cursor::At(c) if pos < c => Cursor::At(c - 1),
            Cursor::At(c) if pos == c => Cursor::Gap(c),
            Cursor::Gap(g) if pos < g => Cursor::Gap(g - 1),
            other => other,
        };
    }

    /// Re-filter and re-sort a changed record
    pub fn reposition(&mut self, table: &RecordTable, id: RecordId) {
        self.remove(id);
        self.insert(table, id);
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    pub fn has_next(&self) -> bool {
        self.next_pos().is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous_pos().is_some()
    }

    pub fn step_next(&mut self) -> Result<RecordId> {
        let pos = self.next_pos().ok_or(RmsError::NoMoreRecords)?;
        self.cursor = Cursor::At(pos);
        Ok(self.ids[pos])
    }

    pub fn step_previous(&mut self) -> Result<RecordId> {
        let pos = self.previous_pos().ok_or(RmsError::NoMoreRecords)?;
        self.cursor = Cursor::At(pos);
        Ok(self.ids[pos])
    }

    fn next_pos(&self) -> Option<usize> {
        let pos = match self.cursor {
            Cursor::Fresh => 0,
            Cursor::At(c) => c + 1,
            Cursor::Gap(g) => g,
        };
        (pos < self.ids.len()).then_some(pos)
    }

    fn previous_pos(&self) -> Option<usize> {
        let pos = match self.cursor {
            Cursor::Fresh => self.ids.len().checked_sub(1)?,
            Cursor::At(c) => c.checked_sub(1)?,
            Cursor::Gap(g) => g.checked_sub(1)?,
        };
        (pos < self.ids.len()).then_some(pos)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn accepts(&self, data: &[u8]) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(data))
    }

    /// Total order: comparator on payloads, then ascending id
    fn order(&self, table: &RecordTable, a: RecordId, b: RecordId) -> Ordering {
        let by_data = match &self.comparator {
            Some(comparator) => {
                let data_a = table.get(a).map(|d| d.as_ref()).unwrap_or(&[]);
                let data_b = table.get(b).map(|d| d.as_ref()).unwrap_or(&[]);
                comparator.compare(data_a, data_b)
            }
            None => Ordering::Equal,
        };
        by_data.then(a.cmp(&b))
    }
}
