use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ItemId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemStats {
    pub hp: u32,
    pub attack: u32,
    pub defense: u32,
}

/// A catalog entry with its detail record merged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub name: String,
    #[serde(alias = "image", default)]
    pub image_url: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub stats: ItemStats,
}

/// One fetched batch of catalog items plus the cursor for the next batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub items: Vec<CatalogItem>,
    pub next_offset: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewTab {
    #[default]
    Discover,
    Collection,
}
