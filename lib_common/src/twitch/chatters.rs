use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::presence::Identity;
use crate::retrieve::ky_http::{ApiClient, ClientOptions};

/// The chatter list endpoint's response:
/// `{"chatters": {"vips": [...], "moderators": [...], ...}}`.
///
/// Unknown fields (`chatter_count`, `_links`, extra categories) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChattersEnvelope {
    pub chatters: ChatterCategories,
}

/// Chatters grouped by role. A missing category reads as empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatterCategories {
    pub vips: Vec<Identity>,
    pub moderators: Vec<Identity>,
    pub staff: Vec<Identity>,
    pub admins: Vec<Identity>,
    pub global_mods: Vec<Identity>,
    pub viewers: Vec<Identity>,
}

impl ChatterCategories {
    /// Drops the role distinction: vips, moderators, staff, admins,
    /// global mods, then viewers. Identities listed in several roles appear
    /// several times; the differ collapses them.
    pub fn flatten(self) -> Vec<Identity> {
        let mut all = Vec::with_capacity(self.total());
        all.extend(self.vips);
        all.extend(self.moderators);
        all.extend(self.staff);
        all.extend(self.admins);
        all.extend(self.global_mods);
        all.extend(self.viewers);
        all
    }

    /// Listing count across all categories, duplicates included.
    pub fn total(&self) -> usize {
        self.vips.len()
            + self.moderators.len()
            + self.staff.len()
            + self.admins.len()
            + self.global_mods.len()
            + self.viewers.len()
    }
}

#[async_trait]
pub trait ChatterSource: Send + Sync {
    async fn chatters(&self) -> Result<ChattersEnvelope>;
}

/// Plain GET of a configured chatter list URL.
pub struct ChatterList {
    client: ApiClient,
}

impl ChatterList {
    pub fn new(chatters_url: &str, options: ClientOptions) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(chatters_url, options)?,
        })
    }
}

#[async_trait]
impl ChatterSource for ChatterList {
    async fn chatters(&self) -> Result<ChattersEnvelope> {
        self.client.get_json("").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_in_category_order() {
        let envelope: ChattersEnvelope = serde_json::from_value(json!({
            "chatter_count": 6,
            "chatters": {
                "broadcaster": ["shokztv"],
                "vips": ["v"],
                "moderators": ["m"],
                "staff": ["s"],
                "admins": ["a"],
                "global_mods": ["g"],
                "viewers": ["x", "v"]
            }
        }))
        .unwrap();

        assert_eq!(envelope.chatters.total(), 7);
        assert_eq!(envelope.chatters.flatten(), vec!["v", "m", "s", "a", "g", "x", "v"]);
    }

    #[test]
    fn missing_categories_are_empty() {
        let envelope: ChattersEnvelope =
            serde_json::from_value(json!({"chatters": {"viewers": ["only"]}})).unwrap();
        assert_eq!(envelope.chatters.flatten(), vec!["only"]);
    }

    #[test]
    fn missing_chatters_object_is_rejected() {
        let parsed = serde_json::from_value::<ChattersEnvelope>(json!({"chatter_count": 0}));
        assert!(parsed.is_err());
    }
}
