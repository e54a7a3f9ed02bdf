// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    EPISODES, RecordStore, RequestCondition, SHOW_REQUESTS, SHOWS, index_taken, new_record_id, new_request,
    sort_episodes, sort_requests,
};
use crate::error::StoreError;
use crate::model::{
    Episode, EpisodeDraft, RequestDraft, RequestPatch, RequestStatus, Show, ShowDraft, ShowRequest,
};

#[derive(Debug, Default)]
struct Collections {
    shows: BTreeMap<String, Show>,
    episodes: BTreeMap<String, Episode>,
    requests: BTreeMap<String, ShowRequest>,
}

/// In-process record store; every operation runs under one lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_show(&self, id: &str) -> Result<Option<Show>, StoreError> {
        Ok(self.lock()?.shows.get(id).cloned())
    }

    async fn get_request(&self, id: &str) -> Result<Option<ShowRequest>, StoreError> {
        Ok(self.lock()?.requests.get(id).cloned())
    }

    async fn list_episodes(&self, show_id: &str) -> Result<Vec<Episode>, StoreError> {
        let mut episodes: Vec<Episode> = self
            .lock()?
            .episodes
            .values()
            .filter(|episode| episode.show == show_id)
            .cloned()
            .collect();
        sort_episodes(&mut episodes);
        Ok(episodes)
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ShowRequest>, StoreError> {
        let mut requests: Vec<ShowRequest> = self
            .lock()?
            .requests
            .values()
            .filter(|request| status.is_none_or(|s| request.status == s))
            .cloned()
            .collect();
        sort_requests(&mut requests);
        Ok(requests)
    }

    async fn create_show(&self, draft: ShowDraft) -> Result<Show, StoreError> {
        let show = draft.into_show(new_record_id(), Utc::now());
        self.lock()?.shows.insert(show.id.clone(), show.clone());
        Ok(show)
    }

    async fn create_episode(&self, draft: EpisodeDraft) -> Result<Episode, StoreError> {
        let mut collections = self.lock()?;

        if !collections.shows.contains_key(&draft.show) {
            return Err(StoreError::NotFound {
                collection: SHOWS,
                id: draft.show,
            });
        }

        let taken = collections
            .episodes
            .values()
            .any(|e| e.show == draft.show && e.show_index == draft.show_index);
        if taken {
            return Err(index_taken(&draft.show, draft.show_index));
        }

        let episode = draft.into_episode(new_record_id(), Utc::now());
        collections
            .episodes
            .insert(episode.id.clone(), episode.clone());
        Ok(episode)
    }

    async fn create_request(&self, draft: RequestDraft) -> Result<ShowRequest, StoreError> {
        let request = new_request(draft, new_record_id(), Utc::now());
        self.lock()?
            .requests
            .insert(request.id.clone(), request.clone());
        Ok(request)
    }

    async fn replace_episode_audio(
        &self,
        episode_id: &str,
        audio_file: &str,
    ) -> Result<Episode, StoreError> {
        let mut collections = self.lock()?;
        let episode = collections
            .episodes
            .get_mut(episode_id)
            .ok_or_else(|| StoreError::NotFound {
                collection: EPISODES,
                id: episode_id.to_string(),
            })?;
        episode.audio_file = audio_file.to_string();
        Ok(episode.clone())
    }

    async fn delete_show(&self, id: &str) -> Result<usize, StoreError> {
        let mut collections = self.lock()?;
        if collections.shows.remove(id).is_none() {
            return Err(StoreError::NotFound {
                collection: SHOWS,
                id: id.to_string(),
            });
        }

        let before = collections.episodes.len();
        collections.episodes.retain(|_, episode| episode.show != id);
        Ok(before - collections.episodes.len())
    }

    async fn update_request(
        &self,
        id: &str,
        patch: RequestPatch,
    ) -> Result<ShowRequest, StoreError> {
        let mut collections = self.lock()?;
        let request = collections
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                collection: SHOW_REQUESTS,
                id: id.to_string(),
            })?;
        patch.apply(request, Utc::now());
        Ok(request.clone())
    }

    async fn update_request_if(
        &self,
        id: &str,
        condition: RequestCondition,
        patch: RequestPatch,
    ) -> Result<ShowRequest, StoreError> {
        let mut collections = self.lock()?;
        let request = collections
            .requests
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                collection: SHOW_REQUESTS,
                id: id.to_string(),
            })?;

        if !condition.matches(request) {
            return Err(condition.conflict(request));
        }

        patch.apply(request, Utc::now());
        Ok(request.clone())
    }
}

impl MemoryStore {
    pub fn show_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.shows.len())
    }

    /// Number of episodes across all shows
    pub fn episode_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.episodes.len())
    }

    /// Insert an episode verbatim, bypassing index checks.
    ///
    /// Used to load pre-existing data that may already carry index defects.
    pub fn import_episode(&self, episode: Episode) -> Result<(), StoreError> {
        self.lock()?
            .episodes
            .insert(episode.id.clone(), episode);
        Ok(())
    }
}
