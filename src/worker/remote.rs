// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use super::{GeneratedShow, GenerationWorker, WorkerSettings};
use crate::error::WorkerError;
use crate::http::HttpClient;
use crate::model::ShowRequest;

/// Body posted to the generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub request_id: String,
    pub title: String,
    pub prompt: String,
    pub creator: String,
    pub episode_count: u32,
    pub episode_length_minutes: f32,
}

/// Generation worker reached over HTTP.
///
/// Posts a [`GenerationJob`] as JSON and expects a [`GeneratedShow`] back.
pub struct HttpWorker<C: HttpClient> {
    client: C,
    endpoint: Url,
    episode_count: u32,
    episode_length_minutes: f32,
}

impl<C: HttpClient> HttpWorker<C> {
    pub fn new(client: C, endpoint: Url, settings: &WorkerSettings) -> Self {
        Self {
            client,
            endpoint,
            episode_count: settings.episode_count,
            episode_length_minutes: settings.episode_length_minutes,
        }
    }

    fn job_for(&self, request: &ShowRequest) -> GenerationJob {
        GenerationJob {
            request_id: request.id.clone(),
            title: request.title.clone(),
            prompt: request.prompt.clone(),
            creator: request.creator.clone(),
            episode_count: self.episode_count,
            episode_length_minutes: self.episode_length_minutes,
        }
    }
}

#[async_trait]
impl<C: HttpClient> GenerationWorker for HttpWorker<C> {
    async fn produce_show(&self, request: &ShowRequest) -> Result<GeneratedShow, WorkerError> {
        let url = self.endpoint.as_str();
        let body = serde_json::to_vec(&self.job_for(request))?;

        info!(request_id = %request.id, endpoint = %url, "requesting show generation");

        let response = self
            .client
            .post_json(url, body)
            .await
            .map_err(|e| WorkerError::Http {
                url: url.to_string(),
                source: e,
            })?;

        if !(200..300).contains(&response.status) {
            return Err(WorkerError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| WorkerError::InvalidResponse {
            url: url.to_string(),
            source: e,
        })
    }
}
