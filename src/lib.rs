pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod server;
pub mod store;
pub mod worker;

// Re-export main types for convenience
pub use config::Settings;
pub use error::{
    ConfigError, FeedError, GenerationError, LifecycleError, RenderDefect, StoreError,
    WorkerError,
};
pub use events::{
    EventReporter, LifecycleEvent, NoopReporter, SharedEventReporter, TracingReporter,
};
pub use feed::{FeedSettings, RenderedFeed, episode_audio_url, generate_feed, render_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use lifecycle::{Clock, LifecycleOptions, RequestLifecycle, RunSummary, SystemClock};
pub use model::{
    Episode, EpisodeDraft, RequestDraft, RequestPatch, RequestStatus, Show, ShowDraft,
    ShowRequest,
};
pub use server::{AppState, router, serve};
pub use store::{FileStore, MemoryStore, RecordStore, RequestCondition, SharedStore};
pub use worker::{
    GeneratedEpisode, GeneratedShow, GenerationWorker, HttpWorker, SharedWorker, WorkerSettings,
};
