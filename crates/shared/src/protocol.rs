//! Wire shapes returned by the remote catalog API and the adapter that turns
//! a detail record into a [`CatalogItem`].

use serde::{Deserialize, Serialize};

use crate::{
    domain::{CatalogItem, ItemId, ItemStats},
    error::RecordError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListPageResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<NamedResource>,
}

impl ListPageResponse {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtworkSprites {
    #[serde(default)]
    pub front_default: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtherSprites {
    #[serde(rename = "official-artwork", default)]
    pub official_artwork: Option<ArtworkSprites>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sprites {
    #[serde(default)]
    pub front_default: Option<String>,
    #[serde(default)]
    pub other: Option<OtherSprites>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSlot {
    pub slot: u32,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatSlot {
    pub base_stat: u32,
    #[serde(default)]
    pub stat: Option<NamedResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sprites: Sprites,
    #[serde(default)]
    pub types: Vec<TypeSlot>,
    #[serde(default)]
    pub stats: Vec<StatSlot>,
}

impl DetailRecord {
    fn image_url(&self) -> String {
        self.sprites
            .other
            .as_ref()
            .and_then(|other| other.official_artwork.as_ref())
            .and_then(|artwork| artwork.front_default.clone())
            .or_else(|| self.sprites.front_default.clone())
            .unwrap_or_default()
    }

    // Named lookup first; older payloads only carry the positional order hp, attack, defense.
    fn stat(&self, name: &'static str, position: usize) -> Result<u32, RecordError> {
        self.stats
            .iter()
            .find(|slot| slot.stat.as_ref().is_some_and(|stat| stat.name == name))
            .or_else(|| {
                self.stats
                    .get(position)
                    .filter(|slot| slot.stat.is_none())
            })
            .map(|slot| slot.base_stat)
            .ok_or(RecordError::MissingStat { id: self.id, stat: name })
    }
}

impl TryFrom<DetailRecord> for CatalogItem {
    type Error = RecordError;

    fn try_from(record: DetailRecord) -> Result<Self, Self::Error> {
        if record.id <= 0 {
            return Err(RecordError::InvalidId(record.id));
        }
        if record.name.trim().is_empty() {
            return Err(RecordError::EmptyName);
        }

        let stats = ItemStats {
            hp: record.stat("hp", 0)?,
            attack: record.stat("attack", 1)?,
            defense: record.stat("defense", 2)?,
        };

        let mut slots = record.types.clone();
        slots.sort_by_key(|slot| slot.slot);
        let image_url = record.image_url();

        Ok(Self {
            id: ItemId(record.id),
            name: record.name,
            image_url,
            types: slots.into_iter().map(|slot| slot.kind.name).collect(),
            stats,
        })
    }
}
