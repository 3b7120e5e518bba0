//! Date reconciliation between consecutive snapshots of the same feed.
//!
//! News pages only show a publication *day*. Without reconciliation every
//! refresh would stamp today's items with a new time, so an item dated today
//! keeps the timestamp it was first seen with for as long as its content stays
//! the same.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::custom_date::{local_date, parse_news_date};
use crate::feed::{FeedSnapshot, NewsItem};
use crate::hsb::RawItem;

fn parse_date(text: Option<&str>) -> Option<DateTime<Utc>> {
    let text = text?;
    match parse_news_date(text) {
        Ok(date) => Some(date),
        Err(err) => {
            debug!(text, error = %err, "Unparseable news date");
            None
        }
    }
}

fn stabilize_item(raw: RawItem, previous: Option<&FeedSnapshot>, now: DateTime<Utc>) -> NewsItem {
    let mut item = NewsItem {
        title: raw.title.unwrap_or_default(),
        link: raw.link,
        publish_date: parse_date(raw.date_text.as_deref()),
        description: raw.description.unwrap_or_default(),
    };

    let Some(date) = item.publish_date else {
        return item;
    };
    if local_date(date) != local_date(now) {
        return item;
    }

    let matching = match (previous, item.link.as_deref()) {
        (Some(previous), Some(link)) => previous.find_by_link(link),
        _ => None,
    };

    item.publish_date = match matching {
        Some(seen) if *seen == item => seen.publish_date.or(Some(date)),
        _ => Some(now),
    };

    item
}

/// Turns raw listing entries into news items, reconciling today's dates
/// against the previous snapshot.
pub fn stabilize(
    raw_items: Vec<RawItem>,
    previous: Option<&FeedSnapshot>,
    now: DateTime<Utc>,
) -> Vec<NewsItem> {
    raw_items
        .into_iter()
        .map(|raw| stabilize_item(raw, previous, now))
        .collect()
}

pub fn last_build_date(items: &[NewsItem]) -> Option<DateTime<Utc>> {
    items.iter().filter_map(|item| item.publish_date).max()
}
