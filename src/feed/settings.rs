// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Channel-level metadata and URL scheme used when rendering feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Public base of the record store's file surface; audio URLs hang off it
    pub server_base: Url,
    /// Value of the channel `<link>`
    pub site_link: String,
    pub language: String,
    pub author: String,
    pub owner_name: String,
    pub owner_email: String,
    pub image_url: String,
    pub category: String,
    pub explicit: String,
    /// Reported for every item until real durations are recorded
    pub episode_duration: String,
    pub enclosure_length: u64,
    pub enclosure_type: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            server_base: Url::parse("http://127.0.0.1:8090").expect("valid default URL"),
            site_link: "https://guppy.jordan.matelsky.com".to_string(),
            language: "en-us".to_string(),
            author: "Guppy Courses".to_string(),
            owner_name: "Guppy Courses".to_string(),
            owner_email: "podcasts@example.com".to_string(),
            image_url: "https://example.com/podcast.jpg".to_string(),
            category: "Technology".to_string(),
            explicit: "no".to_string(),
            episode_duration: "00:02:00".to_string(),
            enclosure_length: 1_234_567,
            enclosure_type: "audio/mpeg".to_string(),
        }
    }
}

impl FeedSettings {
    /// Replace the server base, rejecting URLs that cannot carry a path
    pub fn set_server_base(&mut self, base: &str) -> Result<(), ConfigError> {
        let url = Url::parse(base)?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::UnroutableBase(base.to_string()));
        }
        self.server_base = url;
        Ok(())
    }
}
