mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Episode, EpisodeDraft, RequestDraft, RequestPatch, RequestStatus, Show, ShowDraft, ShowRequest,
};

pub const SHOWS: &str = "shows";
pub const EPISODES: &str = "episodes";
pub const SHOW_REQUESTS: &str = "show_requests";

/// Length of generated record ids
const RECORD_ID_LENGTH: usize = 15;

/// Precondition checked atomically by [`RecordStore::update_request_if`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestCondition {
    /// The stored status equals this one
    Status(RequestStatus),
    /// `queued`, or `creating` with a lease that ran out before `now`
    Claimable { now: DateTime<Utc> },
    /// `creating` with a lease that ran out before `now`
    LeaseExpired { now: DateTime<Utc> },
    /// `creating` under the claim identified by `lease_token`.
    ///
    /// Lease expiry alone does not break this: only a takeover or a reclaim
    /// replaces the token.
    HeldBy { lease_token: String },
}

impl RequestCondition {
    pub fn matches(&self, request: &ShowRequest) -> bool {
        match self {
            Self::Status(status) => request.status == *status,
            Self::Claimable { now } => {
                request.status == RequestStatus::Queued || request.lease_expired(*now)
            }
            Self::LeaseExpired { now } => request.lease_expired(*now),
            Self::HeldBy { lease_token } => {
                request.status == RequestStatus::Creating
                    && request.lease_token.as_deref() == Some(lease_token.as_str())
            }
        }
    }

    pub(crate) fn conflict(&self, request: &ShowRequest) -> StoreError {
        let expected = match self {
            Self::Status(status) => format!("expected status {status}"),
            Self::Claimable { .. } => "expected a claimable request".to_string(),
            Self::LeaseExpired { .. } => "expected an expired lease".to_string(),
            Self::HeldBy { lease_token } => format!("expected the lease {lease_token}"),
        };
        StoreError::Conflict {
            collection: SHOW_REQUESTS,
            id: request.id.clone(),
            reason: format!("{expected}, found {}", request.status),
        }
    }
}

/// The keyed record store the core reads from and writes to.
///
/// Implementations must make [`update_request_if`](Self::update_request_if)
/// atomic with respect to every other write on the same request, and must
/// reject a second episode at an occupied `(show, show_index)` slot.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_show(&self, id: &str) -> Result<Option<Show>, StoreError>;

    async fn get_request(&self, id: &str) -> Result<Option<ShowRequest>, StoreError>;

    /// Episodes of `show_id`, ascending by `show_index` (ties by id)
    async fn list_episodes(&self, show_id: &str) -> Result<Vec<Episode>, StoreError>;

    /// Requests, optionally filtered by status, oldest first
    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ShowRequest>, StoreError>;

    async fn create_show(&self, draft: ShowDraft) -> Result<Show, StoreError>;

    async fn create_episode(&self, draft: EpisodeDraft) -> Result<Episode, StoreError>;

    async fn create_request(&self, draft: RequestDraft) -> Result<ShowRequest, StoreError>;

    /// Point an episode at a new audio file; episodes are otherwise immutable
    async fn replace_episode_audio(
        &self,
        episode_id: &str,
        audio_file: &str,
    ) -> Result<Episode, StoreError>;

    /// Delete a show and every episode belonging to it.
    ///
    /// Returns the number of episodes removed.
    async fn delete_show(&self, id: &str) -> Result<usize, StoreError>;

    async fn update_request(&self, id: &str, patch: RequestPatch)
    -> Result<ShowRequest, StoreError>;

    /// Compare-and-swap: apply `patch` only if the stored record satisfies `condition`
    async fn update_request_if(
        &self,
        id: &str,
        condition: RequestCondition,
        patch: RequestPatch,
    ) -> Result<ShowRequest, StoreError>;
}

/// A shared reference to a record store
pub type SharedStore = Arc<dyn RecordStore>;

/// Generate a new lowercase alphanumeric record id
pub fn new_record_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(RECORD_ID_LENGTH);
    id
}

/// Generate a token identifying one claim of a request
pub fn new_lease_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn new_request(draft: RequestDraft, id: String, now: DateTime<Utc>) -> ShowRequest {
    ShowRequest {
        id,
        title: draft.title,
        prompt: draft.prompt,
        creator: draft.creator,
        status: RequestStatus::Queued,
        show: None,
        failure_reason: None,
        claimed_by: None,
        lease_token: None,
        lease_expires_at: None,
        attempts: 0,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn sort_episodes(episodes: &mut [Episode]) {
    episodes.sort_by(|a, b| {
        a.show_index
            .cmp(&b.show_index)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn sort_requests(requests: &mut [ShowRequest]) {
    requests.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn index_taken(show_id: &str, show_index: u32) -> StoreError {
    StoreError::Conflict {
        collection: EPISODES,
        id: format!("{show_id}#{show_index}"),
        reason: format!("show_index {show_index} is already used in show {show_id}"),
    }
}
