use crate::{constants::MISS_CLASSIFICATION, geometry::Footprint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, btree_map};

/// One area of interest assigned to a tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AoiRecord {
    pub id: u64,
    pub footprint: Footprint,
    /// Confidence level for hits, [`MISS_CLASSIFICATION`] for misses
    pub classification: u8,
}

impl AoiRecord {
    pub fn hit(id: u64, footprint: Footprint, classification: u8) -> Self {
        Self {
            id,
            footprint,
            classification,
        }
    }

    pub fn miss(id: u64, footprint: Footprint) -> Self {
        Self {
            id,
            footprint,
            classification: MISS_CLASSIFICATION,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.classification == MISS_CLASSIFICATION
    }
}

/// Tile key → ordered AoI records on that tile.
///
/// Used for hits, misses and the merged view handed downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileDictionary {
    tiles: BTreeMap<String, Vec<AoiRecord>>,
}

pub type HitDictionary = TileDictionary;
pub type MissDictionary = TileDictionary;

impl TileDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_tile(&self, key: &str) -> bool {
        self.tiles.contains_key(key)
    }

    /// Register a tile with no records yet. Existing records are kept.
    pub fn ensure_tile(&mut self, key: impl Into<String>) {
        self.tiles.entry(key.into()).or_default();
    }

    pub fn push(&mut self, key: impl Into<String>, record: AoiRecord) {
        self.tiles.entry(key.into()).or_default().push(record);
    }

    /// Replace the record list of one tile.
    pub fn insert_tile(&mut self, key: impl Into<String>, records: Vec<AoiRecord>) {
        self.tiles.insert(key.into(), records);
    }

    pub fn records(&self, key: &str) -> &[AoiRecord] {
        self.tiles.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tile_keys(&self) -> impl Iterator<Item = &str> {
        self.tiles.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<AoiRecord>> {
        self.tiles.iter()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn total_records(&self) -> usize {
        self.tiles.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Append every list of `other` to the list under the same key.
    pub fn merge(&mut self, other: TileDictionary) {
        for (key, mut records) in other.tiles {
            self.tiles.entry(key).or_default().append(&mut records);
        }
    }
}

impl<'a> IntoIterator for &'a TileDictionary {
    type Item = (&'a String, &'a Vec<AoiRecord>);
    type IntoIter = btree_map::Iter<'a, String, Vec<AoiRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiles.iter()
    }
}

/// Union of hits and misses by tile key, hits first within each tile.
pub fn merge_dictionaries(hits: &HitDictionary, misses: &MissDictionary) -> TileDictionary {
    let mut merged = hits.clone();
    merged.merge(misses.clone());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(x: f64) -> Footprint {
        Footprint::from_bounds(x, 0.0, x + 1.0, 1.0)
    }

    #[test]
    fn test_push_keeps_insertion_order() {
        let mut dict = TileDictionary::new();
        dict.push("T1", AoiRecord::hit(0, fp(0.0), 1));
        dict.push("T1", AoiRecord::hit(1, fp(2.0), 2));
        let ids: Vec<u64> = dict.records("T1").iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(dict.total_records(), 2);
    }

    #[test]
    fn test_ensure_tile_does_not_clear() {
        let mut dict = TileDictionary::new();
        dict.push("T1", AoiRecord::hit(0, fp(0.0), 1));
        dict.ensure_tile("T1");
        dict.ensure_tile("T2");
        assert_eq!(dict.records("T1").len(), 1);
        assert!(dict.contains_tile("T2"));
        assert!(dict.records("T2").is_empty());
        assert_eq!(dict.tile_count(), 2);
    }

    #[test]
    fn test_merge_concatenates_by_key() {
        let mut hits = TileDictionary::new();
        hits.push("A", AoiRecord::hit(0, fp(0.0), 1));
        hits.push("B", AoiRecord::hit(1, fp(0.0), 2));

        let mut misses = TileDictionary::new();
        misses.push("A", AoiRecord::miss(2, fp(5.0)));
        misses.push("C", AoiRecord::miss(3, fp(5.0)));

        let merged = merge_dictionaries(&hits, &misses);
        assert_eq!(merged.tile_count(), 3);
        let a: Vec<(u64, bool)> = merged.records("A").iter().map(|r| (r.id, r.is_miss())).collect();
        assert_eq!(a, vec![(0, false), (2, true)]);
        assert_eq!(merged.records("C").len(), 1);
        // inputs untouched
        assert_eq!(hits.total_records(), 2);
    }
}
