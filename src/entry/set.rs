//! The ordered ignore set shared between the response hook and the
//! interactive operations.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{matcher, Entry};
use crate::error::{ClassificationError, EditError};

/// Result of appending a raw entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// Newly appended at the end of the set
    Added(Entry),
    /// Same literal text is already present; the set is unchanged
    Duplicate(Entry),
}

impl Insertion {
    pub fn entry(&self) -> &Entry {
        match self {
            Insertion::Added(entry) | Insertion::Duplicate(entry) => entry,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Insertion::Added(_))
    }
}

/// Result of editing an entry in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// New text equals the old text
    Unchanged,
    Replaced { old: Entry, new: Entry },
}

/// Ordered, de-duplicated sequence of ignore entries.
///
/// Readers take a snapshot (`Arc` clone under a short read lock) and match
/// against it without holding the lock. Writers build a new vector and swap
/// it in, so a reader never sees a half-applied mutation.
#[derive(Debug, Default)]
pub struct IgnoreSet {
    entries: RwLock<Arc<Vec<Entry>>>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already classified entries, dropping literal duplicates
    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let mut out: Vec<Entry> = Vec::new();
        for entry in entries {
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        Self {
            entries: RwLock::new(Arc::new(out)),
        }
    }

    /// Parse the persisted blob: one entry per line, trimmed, blanks skipped
    pub fn from_blob(blob: &str) -> Self {
        Self::from_entries(blob.lines().filter_map(|line| Entry::classify(line).ok()))
    }

    /// Serialize for persistence, newline separated
    pub fn to_blob(&self) -> String {
        let snapshot = self.snapshot();
        let raws: Vec<&str> = snapshot.iter().map(Entry::raw).collect();
        raws.join("\n")
    }

    /// Consistent view of the current entries
    pub fn snapshot(&self) -> Arc<Vec<Entry>> {
        self.entries.read().clone()
    }

    /// Entries at the given positions, in the order requested.
    /// Out-of-range positions are skipped.
    pub fn select(&self, indices: &[usize]) -> Vec<Entry> {
        let snapshot = self.snapshot();
        indices
            .iter()
            .filter_map(|&i| snapshot.get(i).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, raw: &str) -> bool {
        let raw = raw.trim();
        self.entries.read().iter().any(|e| e.raw() == raw)
    }

    /// Test a message against the current entries
    pub fn matches(&self, host: &str, url_base: &str) -> bool {
        let snapshot = self.snapshot();
        matcher::matches(&snapshot, host, url_base)
    }

    /// Classify `raw` and append it unless the same text is already present
    pub fn append(&self, raw: &str) -> Result<Insertion, ClassificationError> {
        let entry = Entry::classify(raw)?;

        let mut guard = self.entries.write();
        if let Some(existing) = guard.iter().find(|e| **e == entry) {
            return Ok(Insertion::Duplicate(existing.clone()));
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(entry.clone());
        *guard = Arc::new(next);

        Ok(Insertion::Added(entry))
    }

    /// Replace the entry at `index` with a newly classified `raw`
    pub fn replace(&self, index: usize, raw: &str) -> Result<Replacement, EditError> {
        let entry = Entry::classify(raw)?;

        let mut guard = self.entries.write();
        let len = guard.len();
        let old = guard
            .get(index)
            .cloned()
            .ok_or(EditError::OutOfRange { index, len })?;

        if old == entry {
            return Ok(Replacement::Unchanged);
        }
        if guard.iter().any(|e| *e == entry) {
            return Err(EditError::Duplicate(entry.raw().to_string()));
        }

        let mut next = (**guard).clone();
        next[index] = entry.clone();
        *guard = Arc::new(next);

        Ok(Replacement::Replaced { old, new: entry })
    }

    /// Remove the entries at `indices`. Duplicated and out-of-range
    /// positions are ignored. Returns the removed entries in set order.
    pub fn remove_at(&self, indices: &[usize]) -> Vec<Entry> {
        let mut guard = self.entries.write();

        let mut positions: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < guard.len())
            .collect();
        positions.sort_unstable();
        positions.dedup();
        if positions.is_empty() {
            return Vec::new();
        }

        let mut next = (**guard).clone();
        let mut removed = Vec::with_capacity(positions.len());
        for &i in positions.iter().rev() {
            removed.push(next.remove(i));
        }
        removed.reverse();
        *guard = Arc::new(next);

        removed
    }

    /// Drop every entry, returning the entries that were removed
    pub fn clear(&self) -> Arc<Vec<Entry>> {
        std::mem::take(&mut *self.entries.write())
    }
}
