//! Feed data model: request keys, snapshots and news items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::form_urlencoded::byte_serialize;

use crate::custom_date::format_guid_stamp;

pub const DEFAULT_FEED_URL: &str = "https://www.hsb.se/nyheter";

/// Identity of a requested feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedKey {
    Default,
    Region(String),
    Cooperative(String, String),
}

impl FeedKey {
    /// Parses a request path (or a stored key) into a feed key.
    ///
    /// Leading, trailing and repeated slashes are ignored. More than two
    /// segments is not a valid feed.
    pub fn from_path(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Some(FeedKey::Default),
            [region] => Some(FeedKey::Region(region.to_string())),
            [region, brf] => Some(FeedKey::Cooperative(region.to_string(), brf.to_string())),
            _ => None,
        }
    }

    pub fn source_url(&self) -> String {
        match self {
            FeedKey::Default => DEFAULT_FEED_URL.to_string(),
            FeedKey::Region(region) => {
                format!("https://www.hsb.se/{}/om-hsb/nyheter", encode(region))
            }
            FeedKey::Cooperative(region, brf) => format!(
                "http://www.hsb.se/{}/brf/{}/nyheter",
                encode(region),
                encode(brf)
            ),
        }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKey::Default => Ok(()),
            FeedKey::Region(region) => write!(f, "{region}"),
            FeedKey::Cooperative(region, brf) => write!(f, "{region}/{brf}"),
        }
    }
}

fn encode(segment: &str) -> String {
    byte_serialize(segment.as_bytes()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub description: String,
}

impl NewsItem {
    pub fn guid(&self) -> Option<String> {
        let link = self.link.as_ref()?;

        Some(match self.publish_date {
            Some(date) => format!("{link}#{}", format_guid_stamp(date)),
            None => link.clone(),
        })
    }
}

/// Items compare by content only; the date is what gets stabilized.
impl PartialEq for NewsItem {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.link == other.link && self.description == other.description
    }
}

impl Eq for NewsItem {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub source_url: String,
    pub title: String,
    pub description: String,
    pub last_build_date: Option<DateTime<Utc>>,
    pub items: Vec<NewsItem>,
}

impl FeedSnapshot {
    pub fn find_by_link(&self, link: &str) -> Option<&NewsItem> {
        self.items
            .iter()
            .find(|item| item.link.as_deref() == Some(link))
    }
}

impl PartialEq for FeedSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.source_url == other.source_url
            && self.title == other.title
            && self.description == other.description
            && self.items == other.items
    }
}

impl Eq for FeedSnapshot {}
