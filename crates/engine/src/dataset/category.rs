use super::indices::as_hash;
use crate::error::ErrorKind;
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// The fixed set of record categories a dataset can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Items,
    Classes,
    DamageTypes,
    ItemCategories,
    Lore,
    Vendors,
    GrimoireCards,
}

impl Category {
    pub const ALL: [Self; 7] = [
        Self::Items,
        Self::Classes,
        Self::DamageTypes,
        Self::ItemCategories,
        Self::Lore,
        Self::Vendors,
        Self::GrimoireCards,
    ];

    /// Content table holding this category's records.
    pub fn table(self) -> &'static str {
        match self {
            Self::Items => "DestinyInventoryItemDefinition",
            Self::Classes => "DestinyClassDefinition",
            Self::DamageTypes => "DestinyDamageTypeDefinition",
            Self::ItemCategories => "DestinyItemCategoryDefinition",
            Self::Lore => "DestinyLoreDefinition",
            Self::Vendors => "DestinyVendorDefinition",
            Self::GrimoireCards => "DestinyGrimoireCardDefinition",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::Classes => "classes",
            Self::DamageTypes => "damage-types",
            Self::ItemCategories => "item-categories",
            Self::Lore => "lore",
            Self::Vendors => "vendors",
            Self::GrimoireCards => "grimoire-cards",
        }
    }

    pub(crate) fn query(self) -> String {
        format!("SELECT id, json FROM {}", self.table())
    }

    /// Where a record carries its own hash, most reliable first. Older
    /// content revisions name the field after the category.
    fn hash_pointers(self) -> &'static [&'static str] {
        match self {
            Self::Items => &["/hash", "/itemHash"],
            Self::Classes => &["/hash", "/classHash"],
            Self::DamageTypes => &["/hash", "/damageTypeHash"],
            Self::ItemCategories => &["/hash", "/itemCategoryHash"],
            Self::Lore => &["/hash"],
            Self::Vendors => &["/hash", "/vendorHash", "/summary/vendorHash"],
            Self::GrimoireCards => &["/hash", "/cardId"],
        }
    }

    /// The record's hash, falling back to the row id (stored as the signed
    /// 32-bit reinterpretation of the hash).
    pub(crate) fn hash_of(self, record: &Value, id: Option<i64>) -> Option<u32> {
        self.hash_pointers()
            .iter()
            .find_map(|pointer| record.pointer(pointer).and_then(as_hash))
            .or_else(|| id.and_then(|id| i32::try_from(id).ok()).map(|id| id as u32))
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = ErrorKind;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == name)
            .ok_or_else(|| ErrorKind::UnknownCategory(name.to_string()))
    }
}
