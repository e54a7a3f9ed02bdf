// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::debug;

use super::render::{RenderedFeed, render_feed};
use super::settings::FeedSettings;
use crate::error::FeedError;
use crate::store::RecordStore;

/// Fetch a show and its episodes from the store and render its feed.
///
/// Read-only: safe to call concurrently and repeatedly for the same show.
pub async fn generate_feed<S: RecordStore + ?Sized>(
    store: &S,
    show_id: &str,
    settings: &FeedSettings,
) -> Result<RenderedFeed, FeedError> {
    let show = store
        .get_show(show_id)
        .await?
        .ok_or_else(|| FeedError::NotFound {
            show_id: show_id.to_string(),
        })?;

    let episodes = store.list_episodes(&show.id).await?;
    let feed = render_feed(&show, &episodes, settings);

    debug!(
        show_id = %show.id,
        items = feed.item_count,
        skipped = feed.defects.len(),
        "rendered feed"
    );

    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpisodeDraft, ShowDraft};
    use crate::store::MemoryStore;

    async fn seeded_store() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let show = store
            .create_show(ShowDraft {
                title: "S1".to_string(),
                prompt: "A show about things".to_string(),
                creator: "user1".to_string(),
                curriculum: None,
                request: None,
            })
            .await
            .unwrap();

        for (index, title) in [(1, "Deep Dive"), (0, "Intro")] {
            store
                .create_episode(EpisodeDraft {
                    title: title.to_string(),
                    summary: String::new(),
                    show: show.id.clone(),
                    creator: "user1".to_string(),
                    audio_file: format!("{index}.mp3"),
                    script: None,
                    show_index: index,
                })
                .await
                .unwrap();
        }

        (store, show.id)
    }

    #[tokio::test]
    async fn generate_feed_renders_items_in_order() {
        let (store, show_id) = seeded_store().await;

        let feed = generate_feed(&store, &show_id, &FeedSettings::default())
            .await
            .unwrap();

        let channel = rss::Channel::read_from(feed.xml.as_bytes()).unwrap();
        let titles: Vec<&str> = channel.items().iter().filter_map(|i| i.title()).collect();
        assert_eq!(titles, vec!["Intro", "Deep Dive"]);
    }

    #[tokio::test]
    async fn generate_feed_is_idempotent() {
        let (store, show_id) = seeded_store().await;
        let settings = FeedSettings::default();

        let first = generate_feed(&store, &show_id, &settings).await.unwrap();
        let second = generate_feed(&store, &show_id, &settings).await.unwrap();

        assert_eq!(first.xml, second.xml);
    }

    #[tokio::test]
    async fn unknown_show_is_not_found() {
        let store = MemoryStore::new();

        let result = generate_feed(&store, "zzz", &FeedSettings::default()).await;

        match result {
            Err(FeedError::NotFound { show_id }) => assert_eq!(show_id, "zzz"),
            other => panic!("Expected NotFound, got {other:?}"),
        }
    }
}
