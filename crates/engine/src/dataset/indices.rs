use super::Category;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use kiosk_pool::ResultSet;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Interpret a JSON number as a 32-bit hash, accepting both the unsigned
/// form and its signed reinterpretation.
pub(crate) fn as_hash(value: &Value) -> Option<u32> {
    if let Some(unsigned) = value.as_u64() {
        return u32::try_from(unsigned).ok();
    }
    value.as_i64().and_then(|signed| i32::try_from(signed).ok()).map(|signed| signed as u32)
}

/// Immutable per-category `hash → record` maps built from one content file.
///
/// Once built, an `Indices` is only ever shared behind an `Arc` and replaced
/// wholesale; it is never modified.
#[derive(Debug, Default)]
pub struct Indices {
    maps: HashMap<Category, HashMap<u32, Arc<Value>>>,
}

impl Indices {
    /// Parse the rows returned for each category.
    ///
    /// Any row whose payload is not valid JSON fails the whole build. Records
    /// without any recognisable hash are skipped.
    pub(crate) fn build(results: Vec<(Category, Vec<ResultSet>)>) -> Result<Self> {
        let mut maps = HashMap::with_capacity(Category::ALL.len());
        for (category, sets) in results {
            let map: &mut HashMap<u32, Arc<Value>> = maps.entry(category).or_default();
            let mut skipped = 0usize;
            for row in sets.into_iter().flatten() {
                let record: Value =
                    serde_json::from_str(&row.payload).or_raise(|| ErrorKind::InvalidRecord(category.as_str()))?;
                match category.hash_of(&record, row.id) {
                    Some(hash) => {
                        map.insert(hash, Arc::new(record));
                    },
                    None => skipped += 1,
                }
            }
            debug!(%category, records = map.len(), skipped, "indexed category");
        }
        Ok(Self { maps })
    }

    pub fn get(&self, category: Category, hash: u32) -> Option<&Arc<Value>> {
        self.maps.get(&category)?.get(&hash)
    }

    pub fn records(&self, category: Category) -> impl Iterator<Item = (u32, &Arc<Value>)> {
        self.maps.get(&category).into_iter().flatten().map(|(hash, record)| (*hash, record))
    }

    pub fn len(&self, category: Category) -> usize {
        self.maps.get(&category).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.values().all(HashMap::is_empty)
    }
}
