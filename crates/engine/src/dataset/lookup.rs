use super::indices::as_hash;
use super::{Category, Dataset};
use crate::error::Result;
use crate::upstream::absolute_url;
use rand::seq::IndexedRandom;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

// Content revisions disagree on where display fields live; newest layout first.
const NAME: &[&str] = &["/displayProperties/name", "/itemName"];
const DESCRIPTION: &[&str] = &["/displayProperties/description", "/itemDescription"];
const ICON: &[&str] = &["/displayProperties/icon", "/icon"];
const TIER: &[&str] = &["/inventory/tierTypeName", "/tierTypeName"];
const ITEM_TYPE: &[&str] = &["/itemTypeDisplayName", "/itemTypeName"];
const VENDOR_ICON: &[&str] = &["/displayProperties/icon", "/summary/vendorIcon", "/icon"];
const CATEGORY_NAME: &[&str] = &["/displayProperties/name", "/title"];

/// Item category shared by every weapon.
const WEAPON: u32 = 1;
/// Categories every weapon of a slot carries; they say nothing about the
/// weapon's kind.
const GENERIC_WEAPON_CATEGORIES: [u32; 4] = [1, 2, 3, 4];

/// An item whose name matched a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemMatch {
    pub hash: u32,
    pub name: String,
    pub description: Option<String>,
    /// Absolute icon URL.
    pub icon: Option<String>,
    pub tier: Option<String>,
    pub item_type: Option<String>,
    #[serde(skip)]
    pub record: Arc<Value>,
}

fn text<'a>(record: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|pointer| record.pointer(pointer)?.as_str().filter(|value| !value.trim().is_empty()))
}

/// Lookups. Each one reads a single published snapshot, waiting for the first
/// one according to the dataset's readiness policy.
impl Dataset {
    async fn record(&self, category: Category, hash: u32) -> Result<Option<Arc<Value>>> {
        Ok(self.indices().await?.get(category, hash).cloned())
    }

    pub async fn get_item_by_hash(&self, hash: u32) -> Result<Option<Arc<Value>>> {
        self.record(Category::Items, hash).await
    }

    pub async fn get_class_by_hash(&self, hash: u32) -> Result<Option<Arc<Value>>> {
        self.record(Category::Classes, hash).await
    }

    pub async fn get_damage_type_by_hash(&self, hash: u32) -> Result<Option<Arc<Value>>> {
        self.record(Category::DamageTypes, hash).await
    }

    pub async fn get_item_category(&self, hash: u32) -> Result<Option<Arc<Value>>> {
        self.record(Category::ItemCategories, hash).await
    }

    pub async fn get_lore(&self, hash: u32) -> Result<Option<Arc<Value>>> {
        self.record(Category::Lore, hash).await
    }

    /// Items whose display name contains `term`, ignoring case. Ordered by
    /// name, then hash. A blank term matches nothing.
    pub async fn get_item_by_name(&self, term: &str) -> Result<Vec<ItemMatch>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let indices = self.indices().await?;
        let mut matches: Vec<ItemMatch> = indices
            .records(Category::Items)
            .filter_map(|(hash, record)| {
                let name = text(record, NAME)?;
                name.to_lowercase().contains(&term).then(|| ItemMatch {
                    hash,
                    name: name.to_string(),
                    description: text(record, DESCRIPTION).map(str::to_string),
                    icon: text(record, ICON).map(|icon| absolute_url(&self.content_url, icon)),
                    tier: text(record, TIER).map(str::to_string),
                    item_type: text(record, ITEM_TYPE).map(str::to_string),
                    record: Arc::clone(record),
                })
            })
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then(a.hash.cmp(&b.hash)));
        Ok(matches)
    }

    /// Absolute icon URL of a vendor.
    pub async fn get_vendor_icon(&self, hash: u32) -> Result<Option<String>> {
        let indices = self.indices().await?;
        Ok(indices
            .get(Category::Vendors, hash)
            .and_then(|vendor| text(vendor, VENDOR_ICON))
            .map(|icon| absolute_url(&self.content_url, icon)))
    }

    /// Up to `count` distinct grimoire cards, chosen at random.
    pub async fn get_grimoire_cards(&self, count: usize) -> Result<Vec<Arc<Value>>> {
        let indices = self.indices().await?;
        let cards: Vec<&Arc<Value>> = indices.records(Category::GrimoireCards).map(|(_, card)| card).collect();
        Ok(cards.choose_multiple(&mut rand::rng(), count).map(|card| Arc::clone(card)).collect())
    }

    /// The specific kind of a weapon ("Auto Rifle", "Sniper Rifle", ...).
    ///
    /// `None` when the item is unknown, is not a weapon, or carries only the
    /// generic weapon categories.
    pub async fn get_weapon_category(&self, hash: u32) -> Result<Option<String>> {
        let indices = self.indices().await?;
        let Some(item) = indices.get(Category::Items, hash) else {
            return Ok(None);
        };
        let categories: Vec<u32> = item
            .pointer("/itemCategoryHashes")
            .and_then(Value::as_array)
            .map(|hashes| hashes.iter().filter_map(as_hash).collect())
            .unwrap_or_default();
        if !categories.contains(&WEAPON) {
            return Ok(None);
        }
        Ok(categories
            .iter()
            .rev()
            .filter(|category| !GENERIC_WEAPON_CATEGORIES.contains(category))
            .find_map(|category| text(indices.get(Category::ItemCategories, *category)?, CATEGORY_NAME))
            .map(str::to_string))
    }
}
