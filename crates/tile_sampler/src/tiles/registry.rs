use crate::dictionary::{AoiRecord, HitDictionary};
use std::sync::Mutex;

/// Outcome of placing one AoI in the shared hit dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Appended to a tile that was already known; nothing to download.
    Existing(String),
    /// First AoI on this tile; the caller downloads it exactly once.
    New(String),
}

/// Hit dictionary shared by the resolver workers.
///
/// The membership check and the insert/append happen under one lock, so two workers can
/// never both see the same tile as new.
#[derive(Debug, Default)]
pub struct HitRegistry {
    inner: Mutex<HitDictionary>,
}

impl HitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from tiles already on disk, each with no records.
    pub fn seeded<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dict = HitDictionary::new();
        for key in keys {
            dict.ensure_tile(key);
        }
        Self {
            inner: Mutex::new(dict),
        }
    }

    /// Assign `record` given the catalog's candidates, best first.
    ///
    /// If any candidate is already a known tile, the record joins the first such tile.
    /// Otherwise the first candidate becomes a new tile. Returns `None` when there are
    /// no candidates.
    pub fn assign(&self, candidates: &[String], record: AoiRecord) -> Option<Assignment> {
        let first = candidates.first()?;
        let mut dict = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(known) = candidates.iter().find(|c| dict.contains_tile(c)) {
            dict.push(known.clone(), record);
            return Some(Assignment::Existing(known.clone()));
        }
        dict.push(first.clone(), record);
        Some(Assignment::New(first.clone()))
    }

    pub fn snapshot(&self) -> HitDictionary {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn into_inner(self) -> HitDictionary {
        self.inner.into_inner().unwrap_or_else(|p| p.into_inner())
    }
}
