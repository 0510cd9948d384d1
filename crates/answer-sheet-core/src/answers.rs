//! The student's answers, keyed by field id
//!
//! One store lives for the whole session. It outlives page navigation and
//! re-layout; only an explicit session reset discards it.

use crate::template::Field;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerStore {
    entries: BTreeMap<String, String>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field_id: &str) -> Option<&str> {
        self.entries.get(field_id).map(String::as_str)
    }

    /// Store a value verbatim. Last write wins.
    pub fn set(&mut self, field_id: &str, value: &str) {
        self.entries.insert(field_id.to_string(), value.to_string());
    }

    /// Store a value with surrounding whitespace removed
    pub fn set_trimmed(&mut self, field_id: &str, value: &str) {
        self.set(field_id, value.trim());
    }

    /// Whether the field holds something other than whitespace
    pub fn is_filled(&self, field_id: &str) -> bool {
        self.get(field_id).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Filled-field count against the template's total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub filled: usize,
    pub total: usize,
}

impl Progress {
    pub fn compute(store: &AnswerStore, fields: &[Field]) -> Self {
        let filled = fields.iter().filter(|f| store.is_filled(&f.id)).count();
        Self {
            filled,
            total: fields.len(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.filled >= self.total
    }
}
