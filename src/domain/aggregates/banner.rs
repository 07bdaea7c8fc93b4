//! Storefront banners

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub id: String,
    pub title: String,
    pub image_url: String,
    pub link: Option<String>,
    pub position: u32,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Sorts by requested position (ties keep submission order) and renumbers from 0.
pub fn arrange(mut banners: Vec<Banner>) -> Vec<Banner> {
    banners.sort_by_key(|b| b.position);
    let now = Utc::now();
    for (i, b) in banners.iter_mut().enumerate() {
        b.position = u32::try_from(i).unwrap_or(u32::MAX);
        b.updated_at = now;
    }
    banners
}
