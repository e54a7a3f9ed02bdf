// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A generated podcast show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub id: String,
    pub title: String,
    /// The generation brief; doubles as the feed summary
    pub prompt: String,
    pub creator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curriculum: Option<String>,
    /// The request this show was generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a show; the store assigns `id` and `created_at`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowDraft {
    pub title: String,
    pub prompt: String,
    pub creator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curriculum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

impl ShowDraft {
    pub fn into_show(self, id: String, created_at: DateTime<Utc>) -> Show {
        Show {
            id,
            title: self.title,
            prompt: self.prompt,
            creator: self.creator,
            curriculum: self.curriculum,
            request: self.request,
            created_at,
        }
    }
}
