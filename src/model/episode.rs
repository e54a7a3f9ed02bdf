use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One episode of a show; immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Owning show id
    pub show: String,
    pub creator: String,
    /// File name within the record store's file surface
    #[serde(default)]
    pub audio_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Listening order within the show, unique per show
    pub show_index: u32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an episode; the store assigns `id` and `created_at`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeDraft {
    pub title: String,
    pub summary: String,
    pub show: String,
    pub creator: String,
    pub audio_file: String,
    pub script: Option<String>,
    pub show_index: u32,
}

impl EpisodeDraft {
    pub fn into_episode(self, id: String, created_at: DateTime<Utc>) -> Episode {
        Episode {
            id,
            title: self.title,
            summary: self.summary,
            show: self.show,
            creator: self.creator,
            audio_file: self.audio_file,
            script: self.script,
            show_index: self.show_index,
            created_at,
        }
    }
}
