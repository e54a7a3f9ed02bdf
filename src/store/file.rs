// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use fs4::fs_std::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::{
    EPISODES, RecordStore, RequestCondition, SHOW_REQUESTS, SHOWS, index_taken, new_record_id,
    new_request, sort_episodes, sort_requests,
};
use crate::error::StoreError;
use crate::model::{
    Episode, EpisodeDraft, RequestDraft, RequestPatch, RequestStatus, Show, ShowDraft, ShowRequest,
};

const LOCK_FILE: &str = ".lock";

/// Record store keeping one JSON file per record.
///
/// Layout: `{root}/{collection}/{id}.json`. Writes go through a temporary
/// file and a rename. They are serialized by an exclusive lock on
/// `{root}/.lock`, held across processes, so that conditional updates and
/// index checks see a consistent directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the collection directories
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for collection in [SHOWS, EPISODES, SHOW_REQUESTS] {
            let dir = root.join(collection);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::Io {
                    path: dir.clone(),
                    source: e,
                })?;
        }

        debug!(root = %root.display(), "opened file record store");

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serialize a write against every other task and process using `root`
    async fn lock_for_write(&self) -> Result<WriteGuard<'_>, StoreError> {
        // The in-process mutex keeps tasks from piling up on blocking threads
        let local = self.write_lock.lock().await;

        let path = self.root.join(LOCK_FILE);
        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok::<_, std::io::Error>(file)
        })
        .await
        .map_err(|e| StoreError::Io {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?
        .map_err(|e| StoreError::Io { path, source: e })?;

        Ok(WriteGuard {
            _local: local,
            _file: file,
        })
    }

    fn record_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }

    async fn read_record<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        // Ids come from URLs; never let one escape its collection directory
        if !is_safe_id(id) {
            return Ok(None);
        }
        read_json(&self.record_path(collection, id)).await
    }

    async fn write_record<T: Serialize>(
        &self,
        collection: &str,
        id: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        let path = self.record_path(collection, id);
        let json = serde_json::to_string_pretty(record)?;

        let partial = path.with_extension("json.partial");
        tokio::fs::write(&partial, json)
            .await
            .map_err(|e| StoreError::Io {
                path: partial.clone(),
                source: e,
            })?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| StoreError::Io { path, source: e })
    }

    async fn remove_record(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(collection, id);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::Io { path, source: e })
    }

    async fn read_collection<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>, StoreError> {
        let dir = self.root.join(collection);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            // One damaged record must not hide the rest of the collection
            match read_json(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(StoreError::Json { path, source }) => {
                    warn!(path = %path.display(), error = %source, "skipping unreadable record");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn get_show(&self, id: &str) -> Result<Option<Show>, StoreError> {
        self.read_record(SHOWS, id).await
    }

    async fn get_request(&self, id: &str) -> Result<Option<ShowRequest>, StoreError> {
        self.read_record(SHOW_REQUESTS, id).await
    }

    async fn list_episodes(&self, show_id: &str) -> Result<Vec<Episode>, StoreError> {
        let mut episodes: Vec<Episode> = self
            .read_collection::<Episode>(EPISODES)
            .await?
            .into_iter()
            .filter(|episode| episode.show == show_id)
            .collect();
        sort_episodes(&mut episodes);
        Ok(episodes)
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ShowRequest>, StoreError> {
        let mut requests: Vec<ShowRequest> = self
            .read_collection::<ShowRequest>(SHOW_REQUESTS)
            .await?
            .into_iter()
            .filter(|request| status.is_none_or(|s| request.status == s))
            .collect();
        sort_requests(&mut requests);
        Ok(requests)
    }

    async fn create_show(&self, draft: ShowDraft) -> Result<Show, StoreError> {
        let _guard = self.lock_for_write().await?;
        let show = draft.into_show(new_record_id(), Utc::now());
        self.write_record(SHOWS, &show.id, &show).await?;
        Ok(show)
    }

    async fn create_episode(&self, draft: EpisodeDraft) -> Result<Episode, StoreError> {
        let _guard = self.lock_for_write().await?;

        if self.read_record::<Show>(SHOWS, &draft.show).await?.is_none() {
            return Err(StoreError::NotFound {
                collection: SHOWS,
                id: draft.show,
            });
        }

        let taken = self
            .list_episodes(&draft.show)
            .await?
            .iter()
            .any(|e| e.show_index == draft.show_index);
        if taken {
            return Err(index_taken(&draft.show, draft.show_index));
        }

        let episode = draft.into_episode(new_record_id(), Utc::now());
        self.write_record(EPISODES, &episode.id, &episode).await?;
        Ok(episode)
    }

    async fn create_request(&self, draft: RequestDraft) -> Result<ShowRequest, StoreError> {
        let _guard = self.lock_for_write().await?;
        let request = new_request(draft, new_record_id(), Utc::now());
        self.write_record(SHOW_REQUESTS, &request.id, &request)
            .await?;
        Ok(request)
    }

    async fn replace_episode_audio(
        &self,
        episode_id: &str,
        audio_file: &str,
    ) -> Result<Episode, StoreError> {
        let _guard = self.lock_for_write().await?;
        let mut episode = self
            .read_record::<Episode>(EPISODES, episode_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: EPISODES,
                id: episode_id.to_string(),
            })?;

        episode.audio_file = audio_file.to_string();
        self.write_record(EPISODES, episode_id, &episode).await?;
        Ok(episode)
    }

    async fn delete_show(&self, id: &str) -> Result<usize, StoreError> {
        let _guard = self.lock_for_write().await?;
        if self.read_record::<Show>(SHOWS, id).await?.is_none() {
            return Err(StoreError::NotFound {
                collection: SHOWS,
                id: id.to_string(),
            });
        }

        // Episodes first, so a crash never leaves episodes without their show
        let episodes = self.list_episodes(id).await?;
        for episode in &episodes {
            self.remove_record(EPISODES, &episode.id).await?;
        }
        self.remove_record(SHOWS, id).await?;

        debug!(show_id = %id, episodes = episodes.len(), "deleted show");
        Ok(episodes.len())
    }

    async fn update_request(
        &self,
        id: &str,
        patch: RequestPatch,
    ) -> Result<ShowRequest, StoreError> {
        let _guard = self.lock_for_write().await?;
        let mut request = self.read_record::<ShowRequest>(SHOW_REQUESTS, id).await?.ok_or_else(
            || StoreError::NotFound {
                collection: SHOW_REQUESTS,
                id: id.to_string(),
            },
        )?;

        patch.apply(&mut request, Utc::now());
        self.write_record(SHOW_REQUESTS, id, &request).await?;
        Ok(request)
    }

    async fn update_request_if(
        &self,
        id: &str,
        condition: RequestCondition,
        patch: RequestPatch,
    ) -> Result<ShowRequest, StoreError> {
        let _guard = self.lock_for_write().await?;
        let mut request = self.read_record::<ShowRequest>(SHOW_REQUESTS, id).await?.ok_or_else(
            || StoreError::NotFound {
                collection: SHOW_REQUESTS,
                id: id.to_string(),
            },
        )?;

        if !condition.matches(&request) {
            return Err(condition.conflict(&request));
        }

        patch.apply(&mut request, Utc::now());
        self.write_record(SHOW_REQUESTS, id, &request).await?;
        Ok(request)
    }
}

/// Held for the duration of one write; dropping the file releases its lock
struct WriteGuard<'a> {
    _local: MutexGuard<'a, ()>,
    _file: File,
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::Json {
            path: path.to_path_buf(),
            source: e,
        })
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
