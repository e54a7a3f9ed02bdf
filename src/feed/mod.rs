mod generate;
mod render;
mod settings;

pub use generate::generate_feed;
pub(crate) use render::is_plain_file_name;
pub use render::{RenderedFeed, episode_audio_url, render_feed};
pub use settings::FeedSettings;
