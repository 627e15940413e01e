//! Seekable bidirectional cursor over a table view.
//!
//! The cursor holds a position (the current entry) within a [`TableView`] and
//! supports:
//! - Seeking to the first entry, the last entry, or the first key at or after a given key
//! - Forward and backward movement, single steps or skips
//! - An optional required prefix: positions whose key does not start with it count as
//!   "not found"
//!
//! A cursor borrows its transaction, so it can never outlive the snapshot it reads.

use std::ops::Bound;

use crate::db::{Slot, TableView};

/// Where a seek positions the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget<'k> {
    /// The first entry (or the first entry at or after the required prefix).
    BeforeAll,
    /// The last entry.
    AfterAll,
    /// The first entry whose key is greater than or equal to the given key.
    Key(&'k [u8]),
}

/// Cursor over one table.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    view: TableView<'a>,
    current: Option<(&'a [u8], &'a Slot)>,
    required_prefix: Option<Vec<u8>>,
}

impl<'a> Cursor<'a> {
    /// Creates an unpositioned cursor.
    pub fn new(view: TableView<'a>) -> Self {
        Self { view, current: None, required_prefix: None }
    }

    /// Restricts the cursor to keys starting with `prefix`.
    #[must_use]
    pub fn with_required_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.required_prefix = Some(prefix.into());
        self
    }

    /// Positions the cursor, returning whether it landed on an entry.
    pub fn seek(&mut self, target: SeekTarget<'_>) -> bool {
        let found = match target {
            SeekTarget::BeforeAll => match self.required_prefix.as_deref() {
                Some(prefix) => self.view.first_from(Bound::Included(prefix)),
                None => self.view.first_from(Bound::Unbounded),
            },
            SeekTarget::AfterAll => self.view.last_before(Bound::Unbounded),
            SeekTarget::Key(key) => self.view.first_from(Bound::Included(key)),
        };
        self.land(found)
    }

    /// Advances to the next entry in key order.
    pub fn move_next(&mut self) -> bool {
        let Some((key, _)) = self.current else {
            return false;
        };
        let found = self.view.first_from(Bound::Excluded(key));
        self.land(found)
    }

    /// Steps back to the previous entry in key order.
    pub fn move_prev(&mut self) -> bool {
        let Some((key, _)) = self.current else {
            return false;
        };
        let found = self.view.last_before(Bound::Excluded(key));
        self.land(found)
    }

    /// Moves `count` entries forward (positive) or backward (negative).
    ///
    /// Returns `false` as soon as a step fails; the cursor is then unpositioned.
    pub fn skip(&mut self, count: i64) -> bool {
        let steps = count.unsigned_abs();
        for _ in 0..steps {
            let moved = if count > 0 { self.move_next() } else { self.move_prev() };
            if !moved {
                return false;
            }
        }
        self.current.is_some()
    }

    /// Key of the current entry.
    pub fn key(&self) -> Option<&'a [u8]> {
        self.current.map(|(key, _)| key)
    }

    /// Value of the current entry.
    pub fn value(&self) -> Option<&'a [u8]> {
        self.current.map(|(_, slot)| slot.value.as_slice())
    }

    /// Whether the cursor currently sits on an entry.
    pub fn is_positioned(&self) -> bool {
        self.current.is_some()
    }

    fn land(&mut self, found: Option<(&'a [u8], &'a Slot)>) -> bool {
        self.current = found.filter(|(key, _)| match self.required_prefix.as_deref() {
            Some(prefix) => key.starts_with(prefix),
            None => true,
        });
        self.current.is_some()
    }
}
