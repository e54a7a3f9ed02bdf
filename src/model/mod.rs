mod episode;
mod request;
mod show;

pub use episode::{Episode, EpisodeDraft};
pub use request::{RequestDraft, RequestPatch, RequestStatus, ShowRequest};
pub use show::{Show, ShowDraft};
