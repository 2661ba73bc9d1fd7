//! Ranked story projection

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ports::{ItemId, ItemRecord};

/// Public view of one ranked item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedStory {
    pub id: ItemId,
    pub title: String,
    pub url: String,
    pub author: String,
    pub time: DateTime<Utc>,
    pub score: u32,
    pub comments: u32,
}

/// Project an upstream record into its public shape.
///
/// Missing text fields become empty strings, missing numbers become zero and
/// a missing or unrepresentable timestamp becomes the Unix epoch.
pub fn assemble(item: &ItemRecord) -> RankedStory {
    let time = item
        .time
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default();

    RankedStory {
        id: item.id,
        title: item.title.clone().unwrap_or_default(),
        url: item.url.clone().unwrap_or_default(),
        author: item.by.clone().unwrap_or_default(),
        time,
        score: item.score.unwrap_or_default(),
        comments: item.descendants.unwrap_or_default(),
    }
}
