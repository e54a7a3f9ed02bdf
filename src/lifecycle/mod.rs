// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Drives a show request from `queued` to `published` or `error`.
//!
//! ```text
//! queued ──claim──▶ creating ──publish──▶ published
//!   ▲                  │  │
//!   │   lease expiry   │  └──fail──▶ error
//!   └──────────────────┘               │
//!   ▲                                  │
//!   └───────────── requeue ────────────┘
//! ```
//!
//! Every transition is a compare-and-swap against the record store, so two
//! workers can never both own a request. Each claim carries its own lease
//! token, so a worker whose claim was taken over can no longer publish or
//! fail it, even under the same worker id.

mod plan;

pub use plan::{EpisodePlan, ShowPlan, check_request, plan_show};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::{GenerationError, LifecycleError, StoreError};
use crate::events::{LifecycleEvent, NoopReporter, SharedEventReporter};
use crate::model::{RequestDraft, RequestPatch, RequestStatus, Show, ShowRequest};
use crate::store::{RequestCondition, SharedStore, new_lease_token, sort_requests};
use crate::worker::GenerationWorker;

/// Maximum length of a title derived from the prompt
const DERIVED_TITLE_CHARS: usize = 60;

/// Tuning for the lifecycle manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleOptions {
    /// Identity recorded as `claimed_by`
    pub worker_id: String,
    /// How long a claim stays valid without being renewed
    pub lease_seconds: u64,
    /// `show_index` of a show's first episode
    pub episode_index_base: u32,
    /// Requests processed at once by [`RequestLifecycle::run_pending`]
    pub max_concurrent: usize,
    /// Pause between polling rounds in the background loop
    pub poll_interval_seconds: u64,
    /// Claims allowed before a request whose lease keeps expiring is failed
    pub max_attempts: u32,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            worker_id: "showfeed-worker".to_string(),
            lease_seconds: 900,
            episode_index_base: 0,
            max_concurrent: 2,
            poll_interval_seconds: 10,
            max_attempts: 3,
        }
    }
}

impl LifecycleOptions {
    pub fn lease(&self) -> Duration {
        let seconds = i64::try_from(self.lease_seconds).unwrap_or(i64::MAX);
        Duration::seconds(seconds.min(i64::MAX / 1000))
    }

    /// How often a running claim pushes its lease out; a third of the lease
    pub fn renew_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs((self.lease_seconds / 3).max(1))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_seconds.max(1))
    }
}

/// Source of the current time, swappable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Outcome of one polling round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Stuck requests returned to the queue
    pub reclaimed: usize,
    pub published: usize,
    /// Requests that ended in `error`, including those out of attempts
    pub failed: usize,
    /// Requests whose processing stopped without a recorded outcome
    pub aborted: usize,
}

/// The request lifecycle manager
#[derive(Clone)]
pub struct RequestLifecycle {
    store: SharedStore,
    options: LifecycleOptions,
    clock: Arc<dyn Clock>,
    reporter: SharedEventReporter,
}

impl RequestLifecycle {
    pub fn new(store: SharedStore, options: LifecycleOptions) -> Self {
        Self {
            store,
            options,
            clock: Arc::new(SystemClock),
            reporter: NoopReporter::shared(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: SharedEventReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Record a new request in `queued`.
    ///
    /// A blank title is derived from the prompt. An empty prompt is accepted
    /// here and rejected when the request is processed, so the reason ends up
    /// on the request itself.
    pub async fn submit(&self, draft: RequestDraft) -> Result<ShowRequest, LifecycleError> {
        let prompt = draft.prompt.trim().to_string();
        let title = match draft.title.trim() {
            "" => derive_title(&prompt),
            title => title.to_string(),
        };

        let request = self
            .store
            .create_request(RequestDraft {
                title,
                prompt,
                creator: draft.creator,
            })
            .await?;

        self.reporter.report(LifecycleEvent::Submitted {
            request_id: request.id.clone(),
            title: request.title.clone(),
        });

        Ok(request)
    }

    pub async fn get(&self, id: &str) -> Result<ShowRequest, LifecycleError> {
        self.store
            .get_request(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound { id: id.to_string() })
    }

    /// Take ownership of a request: `queued → creating`.
    ///
    /// Also takes over a `creating` request whose lease has run out, unless it
    /// already used up `max_attempts`; such a request is moved to `error`
    /// instead. Of any number of concurrent callers, exactly one succeeds;
    /// the rest get [`LifecycleError::AlreadyClaimed`].
    pub async fn claim(&self, id: &str) -> Result<ShowRequest, LifecycleError> {
        let current = self.get(id).await?;
        let now = self.clock.now();

        if current.lease_expired(now) && current.attempts >= self.options.max_attempts {
            return match self.abandon(&current, now).await? {
                Some(_) => Err(LifecycleError::AttemptsExhausted {
                    id: id.to_string(),
                    attempts: current.attempts,
                }),
                None => Err(self.claim_conflict(id, current.status).await?),
            };
        }

        let patch = RequestPatch::claimed(
            &self.options.worker_id,
            &new_lease_token(),
            now + self.options.lease(),
            current.attempts + 1,
        );

        match self
            .store
            .update_request_if(id, RequestCondition::Claimable { now }, patch)
            .await
        {
            Ok(claimed) => {
                if current.status == RequestStatus::Creating {
                    self.reporter.report(LifecycleEvent::Reclaimed {
                        request_id: claimed.id.clone(),
                        previous_owner: current.claimed_by,
                    });
                }
                self.reporter.report(LifecycleEvent::Claimed {
                    request_id: claimed.id.clone(),
                    worker_id: self.options.worker_id.clone(),
                    attempt: claimed.attempts,
                });
                Ok(claimed)
            }
            Err(StoreError::Conflict { .. }) => Err(self.claim_conflict(id, current.status).await?),
            Err(StoreError::NotFound { .. }) => Err(LifecycleError::NotFound { id: id.to_string() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Claim the oldest claimable request, if any
    pub async fn claim_next(&self) -> Result<Option<ShowRequest>, LifecycleError> {
        let now = self.clock.now();
        let mut candidates = self
            .store
            .list_requests(Some(RequestStatus::Queued))
            .await?;
        candidates.extend(
            self.store
                .list_requests(Some(RequestStatus::Creating))
                .await?
                .into_iter()
                .filter(|request| request.lease_expired(now)),
        );
        sort_requests(&mut candidates);

        for candidate in candidates {
            match self.claim(&candidate.id).await {
                Ok(claimed) => return Ok(Some(claimed)),
                Err(
                    LifecycleError::AlreadyClaimed { .. }
                    | LifecycleError::AttemptsExhausted { .. }
                    | LifecycleError::NotFound { .. },
                ) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Generate and publish a request this manager has claimed.
    ///
    /// The lease is renewed while the worker runs. Returns the request in its
    /// final state (`published` or `error`). Generation failures are recorded
    /// on the request, not returned; [`LifecycleError::LeaseLost`] means the
    /// claim was taken over or reclaimed, and nothing of this attempt is kept.
    pub async fn process(
        &self,
        worker: &dyn GenerationWorker,
        request: ShowRequest,
    ) -> Result<ShowRequest, LifecycleError> {
        if request.status != RequestStatus::Creating
            || request.lease_token.is_none()
            || request.claimed_by.as_deref() != Some(self.options.worker_id.as_str())
        {
            return Err(LifecycleError::LeaseLost { id: request.id });
        }

        let plan = match self.generate(worker, &request).await? {
            Ok(plan) => plan,
            Err(e) => return self.fail(&request, &e).await,
        };

        self.renew_lease(&request).await?;

        match self.write_show(&request, plan).await {
            Ok((show, episode_count)) => self.publish(&request, &show, episode_count).await,
            Err(e) => self.fail(&request, &GenerationError::Store(e)).await,
        }
    }

    /// Move a failed request back to `queued` for another attempt
    pub async fn requeue(&self, id: &str) -> Result<ShowRequest, LifecycleError> {
        match self
            .store
            .update_request_if(
                id,
                RequestCondition::Status(RequestStatus::Error),
                RequestPatch::requeued(),
            )
            .await
        {
            Ok(request) => {
                self.reporter.report(LifecycleEvent::Requeued {
                    request_id: request.id.clone(),
                });
                Ok(request)
            }
            Err(StoreError::Conflict { .. }) => {
                let current = self.get(id).await?;
                Err(LifecycleError::NotRequeueable {
                    id: id.to_string(),
                    status: current.status,
                })
            }
            Err(StoreError::NotFound { .. }) => Err(LifecycleError::NotFound { id: id.to_string() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve every `creating` request whose lease ran out.
    ///
    /// Requests with attempts left go back to `queued`; the rest end in
    /// `error`. Returns the updated requests.
    pub async fn reclaim_expired(&self) -> Result<Vec<ShowRequest>, LifecycleError> {
        let now = self.clock.now();
        let stuck: Vec<ShowRequest> = self
            .store
            .list_requests(Some(RequestStatus::Creating))
            .await?
            .into_iter()
            .filter(|request| request.lease_expired(now))
            .collect();

        let mut resolved = Vec::with_capacity(stuck.len());
        for request in stuck {
            if request.attempts >= self.options.max_attempts {
                if let Some(failed) = self.abandon(&request, now).await? {
                    resolved.push(failed);
                }
                continue;
            }

            match self
                .store
                .update_request_if(
                    &request.id,
                    RequestCondition::LeaseExpired { now },
                    RequestPatch::requeued(),
                )
                .await
            {
                Ok(updated) => {
                    self.reporter.report(LifecycleEvent::Reclaimed {
                        request_id: updated.id.clone(),
                        previous_owner: request.claimed_by,
                    });
                    resolved.push(updated);
                }
                // Renewed or taken over since we listed it
                Err(StoreError::Conflict { .. } | StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(resolved)
    }

    /// One polling round: resolve stuck requests, then claim and process up
    /// to `limit` requests, `max_concurrent` at a time.
    pub async fn run_pending(
        &self,
        worker: &dyn GenerationWorker,
        limit: usize,
    ) -> Result<RunSummary, LifecycleError> {
        let mut summary = RunSummary::default();
        for request in self.reclaim_expired().await? {
            match request.status {
                RequestStatus::Error => summary.failed += 1,
                _ => summary.reclaimed += 1,
            }
        }

        let mut claimed = Vec::new();
        while claimed.len() < limit {
            match self.claim_next().await? {
                Some(request) => claimed.push(request),
                None => break,
            }
        }

        if claimed.is_empty() {
            return Ok(summary);
        }

        debug!(count = claimed.len(), "processing claimed show requests");

        let results: Vec<Result<ShowRequest, LifecycleError>> = futures::stream::iter(claimed)
            .map(|request| self.process(worker, request))
            .buffer_unordered(self.options.max_concurrent.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(request) if request.status == RequestStatus::Published => summary.published += 1,
                Ok(_) => summary.failed += 1,
                Err(e) => {
                    warn!(error = %e, "show request processing aborted");
                    summary.aborted += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Run the worker and validate its output, renewing the lease meanwhile.
    ///
    /// The outer error means the lease was lost; the inner one is recorded
    /// on the request.
    async fn generate(
        &self,
        worker: &dyn GenerationWorker,
        request: &ShowRequest,
    ) -> Result<Result<ShowPlan, GenerationError>, LifecycleError> {
        if let Err(e) = check_request(request) {
            return Ok(Err(e));
        }

        let mut produce = worker.produce_show(request);

        let mut renewals = tokio::time::interval(self.options.renew_interval());
        renewals.set_missed_tick_behavior(MissedTickBehavior::Delay);
        renewals.tick().await;

        let generated = loop {
            tokio::select! {
                generated = &mut produce => break generated,
                _ = renewals.tick() => {
                    self.renew_lease(request).await?;
                }
            }
        };

        Ok(generated
            .map_err(GenerationError::from)
            .and_then(|generated| plan_show(request, generated, self.options.episode_index_base)))
    }

    async fn write_show(
        &self,
        request: &ShowRequest,
        plan: ShowPlan,
    ) -> Result<(Show, usize), StoreError> {
        let show = self.store.create_show(plan.show).await?;
        let episode_count = plan.episodes.len();

        // Indices for one show come from a single writer
        for episode in plan.episodes {
            let episode = match self
                .store
                .create_episode(episode.into_draft(&show.id, &request.creator))
                .await
            {
                Ok(episode) => episode,
                Err(e) => {
                    self.discard_show(request, &show).await;
                    return Err(e);
                }
            };
            self.reporter.report(LifecycleEvent::EpisodeCreated {
                request_id: request.id.clone(),
                show_id: show.id.clone(),
                episode_id: episode.id,
                show_index: episode.show_index,
            });
        }

        Ok((show, episode_count))
    }

    /// Remove a show this attempt wrote but cannot link to its request
    async fn discard_show(&self, request: &ShowRequest, show: &Show) {
        match self.store.delete_show(&show.id).await {
            Ok(episodes) => {
                debug!(request_id = %request.id, show_id = %show.id, episodes, "discarded unlinked show");
            }
            Err(e) => {
                warn!(
                    request_id = %request.id,
                    show_id = %show.id,
                    error = %e,
                    "failed to discard unlinked show"
                );
            }
        }
    }

    async fn renew_lease(&self, request: &ShowRequest) -> Result<ShowRequest, LifecycleError> {
        let now = self.clock.now();
        self.transition(request, RequestPatch::renewed(now + self.options.lease()))
            .await
            .inspect_err(|e| warn!(request_id = %request.id, error = %e, "lease renewal failed"))
    }

    async fn publish(
        &self,
        request: &ShowRequest,
        show: &Show,
        episode_count: usize,
    ) -> Result<ShowRequest, LifecycleError> {
        let published = match self
            .transition(request, RequestPatch::published(&show.id))
            .await
        {
            Ok(published) => published,
            Err(e) => {
                self.discard_show(request, show).await;
                return Err(e);
            }
        };

        self.reporter.report(LifecycleEvent::Published {
            request_id: published.id.clone(),
            show_id: show.id.clone(),
            episode_count,
        });
        Ok(published)
    }

    async fn fail(
        &self,
        request: &ShowRequest,
        error: &GenerationError,
    ) -> Result<ShowRequest, LifecycleError> {
        let reason = error.to_string();
        let failed = self
            .transition(request, RequestPatch::failed(&reason))
            .await?;

        self.reporter.report(LifecycleEvent::Failed {
            request_id: failed.id.clone(),
            reason,
        });
        Ok(failed)
    }

    /// Move an expired request that used up its attempts to `error`.
    ///
    /// Returns `None` when someone else got to it first.
    async fn abandon(
        &self,
        request: &ShowRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<ShowRequest>, LifecycleError> {
        let reason = format!(
            "gave up after {} attempts; the last lease expired before the show was published",
            request.attempts
        );

        match self
            .store
            .update_request_if(
                &request.id,
                RequestCondition::LeaseExpired { now },
                RequestPatch::failed(&reason),
            )
            .await
        {
            Ok(failed) => {
                self.reporter.report(LifecycleEvent::Failed {
                    request_id: failed.id.clone(),
                    reason,
                });
                Ok(Some(failed))
            }
            Err(StoreError::Conflict { .. } | StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn claim_conflict(
        &self,
        id: &str,
        last_seen: RequestStatus,
    ) -> Result<LifecycleError, LifecycleError> {
        let status = self
            .store
            .get_request(id)
            .await?
            .map_or(last_seen, |r| r.status);
        Ok(LifecycleError::AlreadyClaimed {
            id: id.to_string(),
            status,
        })
    }

    /// Apply `patch` only while this attempt's claim is still current
    async fn transition(
        &self,
        request: &ShowRequest,
        patch: RequestPatch,
    ) -> Result<ShowRequest, LifecycleError> {
        let Some(lease_token) = request.lease_token.clone() else {
            return Err(LifecycleError::LeaseLost {
                id: request.id.clone(),
            });
        };

        match self
            .store
            .update_request_if(&request.id, RequestCondition::HeldBy { lease_token }, patch)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(StoreError::Conflict { .. } | StoreError::NotFound { .. }) => {
                Err(LifecycleError::LeaseLost {
                    id: request.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn derive_title(prompt: &str) -> String {
    let mut title: String = prompt.chars().take(DERIVED_TITLE_CHARS).collect();
    if prompt.chars().count() > DERIVED_TITLE_CHARS {
        title = title.trim_end().to_string();
        title.push('…');
    }
    title
}
