// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a show request is in its generation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Created by a user, waiting for a worker
    Queued,
    /// Claimed by exactly one worker, which holds a lease on it
    Creating,
    /// A show was produced and linked to the request
    Published,
    /// Generation failed; `failure_reason` says why
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Creating => "creating",
            Self::Published => "published",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Error)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's request to have a show generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowRequest {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub creator: String,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    /// Unique per claim; a takeover always replaces it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShowRequest {
    /// Whether the request is `creating` and its lease ran out before `now`
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Creating
            && self.lease_expires_at.is_none_or(|expires| expires <= now)
    }
}

/// Input for creating a show request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    #[serde(default)]
    pub title: String,
    pub prompt: String,
    pub creator: String,
}

/// Field-level partial update of a show request.
///
/// `None` leaves the stored field untouched; for optional fields
/// `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub show: Option<Option<String>>,
    pub failure_reason: Option<Option<String>>,
    pub claimed_by: Option<Option<String>>,
    pub lease_token: Option<Option<String>>,
    pub lease_expires_at: Option<Option<DateTime<Utc>>>,
    pub attempts: Option<u32>,
}

impl RequestPatch {
    /// Hand the request to `worker_id` under `lease_token` until `lease_expires_at`
    pub fn claimed(
        worker_id: &str,
        lease_token: &str,
        lease_expires_at: DateTime<Utc>,
        attempts: u32,
    ) -> Self {
        Self {
            status: Some(RequestStatus::Creating),
            failure_reason: Some(None),
            claimed_by: Some(Some(worker_id.to_string())),
            lease_token: Some(Some(lease_token.to_string())),
            lease_expires_at: Some(Some(lease_expires_at)),
            attempts: Some(attempts),
            ..Default::default()
        }
    }

    /// Push the current holder's lease out to `lease_expires_at`
    pub fn renewed(lease_expires_at: DateTime<Utc>) -> Self {
        Self {
            lease_expires_at: Some(Some(lease_expires_at)),
            ..Default::default()
        }
    }

    pub fn published(show_id: &str) -> Self {
        Self {
            status: Some(RequestStatus::Published),
            show: Some(Some(show_id.to_string())),
            claimed_by: Some(None),
            lease_token: Some(None),
            lease_expires_at: Some(None),
            ..Default::default()
        }
    }

    pub fn failed(reason: &str) -> Self {
        Self {
            status: Some(RequestStatus::Error),
            failure_reason: Some(Some(reason.to_string())),
            claimed_by: Some(None),
            lease_token: Some(None),
            lease_expires_at: Some(None),
            ..Default::default()
        }
    }

    /// Back to `queued`, dropping any owner and previous failure
    pub fn requeued() -> Self {
        Self {
            status: Some(RequestStatus::Queued),
            failure_reason: Some(None),
            claimed_by: Some(None),
            lease_token: Some(None),
            lease_expires_at: Some(None),
            ..Default::default()
        }
    }

    /// Apply the patch in place and bump `updated_at`
    pub fn apply(&self, request: &mut ShowRequest, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(show) = &self.show {
            request.show = show.clone();
        }
        if let Some(reason) = &self.failure_reason {
            request.failure_reason = reason.clone();
        }
        if let Some(owner) = &self.claimed_by {
            request.claimed_by = owner.clone();
        }
        if let Some(token) = &self.lease_token {
            request.lease_token = token.clone();
        }
        if let Some(expires) = self.lease_expires_at {
            request.lease_expires_at = expires;
        }
        if let Some(attempts) = self.attempts {
            request.attempts = attempts;
        }
        request.updated_at = now;
    }
}
