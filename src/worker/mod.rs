mod remote;

pub use remote::{GenerationJob, HttpWorker};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::WorkerError;
use crate::model::ShowRequest;

/// A show as produced by a generation worker, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedShow {
    /// Falls back to the request's title when absent or blank
    #[serde(default)]
    pub title: Option<String>,
    /// Falls back to the request's prompt when absent or blank
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub curriculum: Option<String>,
    #[serde(default)]
    pub episodes: Vec<GeneratedEpisode>,
}

/// One produced episode; its audio is already stored under `audio_file`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedEpisode {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub audio_file: String,
    #[serde(default)]
    pub script: Option<String>,
    /// Either every episode carries an index or none does
    #[serde(default)]
    pub show_index: Option<u32>,
}

/// Capability that turns a claimed request into show content.
///
/// Anything satisfying this contract (an LLM pipeline, a manual queue) can
/// back the lifecycle manager.
#[async_trait]
pub trait GenerationWorker: Send + Sync {
    async fn produce_show(&self, request: &ShowRequest) -> Result<GeneratedShow, WorkerError>;
}

/// A shared reference to a generation worker
pub type SharedWorker = Arc<dyn GenerationWorker>;

/// How to reach and brief the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub endpoint: Option<Url>,
    pub episode_count: u32,
    pub episode_length_minutes: f32,
    pub timeout_seconds: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            episode_count: 5,
            episode_length_minutes: 1.5,
            timeout_seconds: 1800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_show_tolerates_sparse_json() {
        let show: GeneratedShow = serde_json::from_str(
            r#"{"episodes": [{"title": "Episode 1: Bonn", "audio_file": "0.mp3"}]}"#,
        )
        .unwrap();

        assert!(show.title.is_none());
        assert_eq!(show.episodes.len(), 1);
        assert_eq!(show.episodes[0].summary, "");
        assert!(show.episodes[0].show_index.is_none());
    }

    #[test]
    fn worker_settings_defaults() {
        let settings: WorkerSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.endpoint.is_none());
        assert_eq!(settings.episode_count, 5);
        assert_eq!(settings.timeout_seconds, 1800);
    }
}
