use std::sync::Arc;

use tracing::{info, warn};

/// Events emitted as show requests move through their lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A user created a request
    Submitted { request_id: String, title: String },

    /// A worker took ownership of a request
    Claimed {
        request_id: String,
        worker_id: String,
        /// 1 for the first claim, higher after re-queues or reclaims
        attempt: u32,
    },

    /// A request whose lease ran out was returned to the queue
    Reclaimed {
        request_id: String,
        previous_owner: Option<String>,
    },

    /// An episode record was written for a show being published
    EpisodeCreated {
        request_id: String,
        show_id: String,
        episode_id: String,
        show_index: u32,
    },

    /// A request reached `published`
    Published {
        request_id: String,
        show_id: String,
        episode_count: usize,
    },

    /// A request reached `error`
    Failed { request_id: String, reason: String },

    /// A failed request was put back in the queue
    Requeued { request_id: String },
}

/// Trait for reporting lifecycle events.
///
/// Implementations can use this to log, display progress, or collect
/// statistics.
pub trait EventReporter: Send + Sync {
    /// Report a lifecycle event
    fn report(&self, event: LifecycleEvent);
}

/// A shared reference to an event reporter
pub type SharedEventReporter = Arc<dyn EventReporter>;

/// A no-op reporter that silently ignores all events.
/// Useful for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl EventReporter for NoopReporter {
    fn report(&self, _event: LifecycleEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedEventReporter {
        Arc::new(Self)
    }
}

/// Forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl TracingReporter {
    pub fn shared() -> SharedEventReporter {
        Arc::new(Self)
    }
}

impl EventReporter for TracingReporter {
    fn report(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Submitted { request_id, title } => {
                info!(%request_id, %title, "show request submitted");
            }
            LifecycleEvent::Claimed {
                request_id,
                worker_id,
                attempt,
            } => {
                info!(%request_id, %worker_id, attempt, "show request claimed");
            }
            LifecycleEvent::Reclaimed {
                request_id,
                previous_owner,
            } => {
                warn!(
                    %request_id,
                    previous_owner = previous_owner.as_deref().unwrap_or("unknown"),
                    "lease expired; show request returned to queue"
                );
            }
            LifecycleEvent::EpisodeCreated {
                request_id,
                show_id,
                episode_id,
                show_index,
            } => {
                info!(%request_id, %show_id, %episode_id, show_index, "episode created");
            }
            LifecycleEvent::Published {
                request_id,
                show_id,
                episode_count,
            } => {
                info!(%request_id, %show_id, episode_count, "show published");
            }
            LifecycleEvent::Failed { request_id, reason } => {
                warn!(%request_id, %reason, "show generation failed");
            }
            LifecycleEvent::Requeued { request_id } => {
                info!(%request_id, "show request re-queued");
            }
        }
    }
}
