// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use rss::extension::itunes::{
    self, ITunesCategory, ITunesChannelExtension, ITunesItemExtension, ITunesOwner,
};
use rss::{Channel, Enclosure, Guid, Item};
use tracing::warn;
use url::Url;

use super::settings::FeedSettings;
use crate::error::RenderDefect;
use crate::model::{Episode, Show};

const CONTENT_NAMESPACE: &str = "http://purl.org/rss/1.0/modules/content/";

/// A rendered feed document together with the episodes left out of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFeed {
    pub xml: String,
    pub item_count: usize,
    pub defects: Vec<RenderDefect>,
}

/// Render a show and its episodes as an RSS 2.0 document with iTunes tags.
///
/// Episodes are emitted ascending by `show_index` (ties by id) regardless of
/// input order, so the same set always yields the same bytes. Episodes whose
/// audio reference is unusable are skipped and reported in `defects`.
pub fn render_feed(show: &Show, episodes: &[Episode], settings: &FeedSettings) -> RenderedFeed {
    let mut ordered: Vec<&Episode> = episodes.iter().collect();
    ordered.sort_by(|a, b| {
        a.show_index
            .cmp(&b.show_index)
            .then_with(|| a.id.cmp(&b.id))
    });

    for pair in ordered.windows(2) {
        if pair[0].show_index == pair[1].show_index {
            warn!(
                show_id = %show.id,
                show_index = pair[0].show_index,
                "episodes share a show_index; ordering them by id"
            );
        }
    }

    let mut items = Vec::with_capacity(ordered.len());
    let mut defects = Vec::new();

    for episode in ordered {
        match render_item(episode, settings) {
            Ok(item) => items.push(item),
            Err(defect) => {
                warn!(show_id = %show.id, episode_id = %episode.id, "{defect}");
                defects.push(defect);
            }
        }
    }

    let item_count = items.len();
    let channel = render_channel(show, items, settings);

    RenderedFeed {
        xml: channel.to_string(),
        item_count,
        defects,
    }
}

/// Public URL of an episode's audio file.
///
/// Shape: `{base}/api/files/episodes/{episode_id}/{audio_file}`. Podcast
/// clients cache these, so the shape must not change.
pub fn episode_audio_url(base: &Url, episode: &Episode) -> Result<Url, RenderDefect> {
    let file = episode.audio_file.trim();
    if file.is_empty() {
        return Err(RenderDefect::MissingAudio {
            episode_id: episode.id.clone(),
            title: episode.title.clone(),
        });
    }
    if !is_plain_file_name(file) {
        return Err(RenderDefect::InvalidAudioReference {
            episode_id: episode.id.clone(),
            file: episode.audio_file.clone(),
        });
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| RenderDefect::UnroutableBase {
            base: base.to_string(),
        })?
        .pop_if_empty()
        .extend(["api", "files", "episodes", episode.id.as_str(), file]);
    Ok(url)
}

fn render_item(episode: &Episode, settings: &FeedSettings) -> Result<Item, RenderDefect> {
    let audio_url = episode_audio_url(&settings.server_base, episode)?.to_string();

    let mut enclosure = Enclosure::default();
    enclosure.set_url(audio_url.clone());
    enclosure.set_length(settings.enclosure_length.to_string());
    enclosure.set_mime_type(settings.enclosure_type.clone());

    // The audio URL doubles as the GUID; it is stable for the episode's lifetime
    let mut guid = Guid::default();
    guid.set_value(audio_url);
    guid.set_permalink(true);

    let mut itunes_ext = ITunesItemExtension::default();
    itunes_ext.set_author(Some(settings.author.clone()));
    itunes_ext.set_summary(Some(episode.summary.clone()));
    itunes_ext.set_duration(Some(settings.episode_duration.clone()));

    let mut item = Item::default();
    item.set_title(Some(episode.title.clone()));
    if !episode.summary.is_empty() {
        item.set_description(Some(episode.summary.clone()));
    }
    item.set_enclosure(Some(enclosure));
    item.set_guid(Some(guid));
    item.set_pub_date(Some(episode.created_at.to_rfc2822()));
    item.set_itunes_ext(Some(itunes_ext));
    Ok(item)
}

fn render_channel(show: &Show, items: Vec<Item>, settings: &FeedSettings) -> Channel {
    let mut owner = ITunesOwner::default();
    owner.set_name(Some(settings.owner_name.clone()));
    owner.set_email(Some(settings.owner_email.clone()));

    let mut category = ITunesCategory::default();
    category.set_text(settings.category.clone());

    let mut itunes_ext = ITunesChannelExtension::default();
    itunes_ext.set_author(Some(settings.author.clone()));
    itunes_ext.set_summary(Some(show.prompt.clone()));
    itunes_ext.set_owner(Some(owner));
    itunes_ext.set_image(Some(settings.image_url.clone()));
    itunes_ext.set_categories(vec![category]);
    itunes_ext.set_explicit(Some(settings.explicit.clone()));

    let mut namespaces = BTreeMap::new();
    namespaces.insert("itunes".to_string(), itunes::NAMESPACE.to_string());
    namespaces.insert("content".to_string(), CONTENT_NAMESPACE.to_string());

    let mut channel = Channel::default();
    channel.set_title(show.title.clone());
    channel.set_link(settings.site_link.clone());
    channel.set_description(show.prompt.clone());
    channel.set_language(Some(settings.language.clone()));
    channel.set_namespaces(namespaces);
    channel.set_itunes_ext(Some(itunes_ext));
    channel.set_items(items);
    channel
}

/// A single path segment: no separators, no control characters, not `.` or `..`
pub(crate) fn is_plain_file_name(file: &str) -> bool {
    file != "."
        && file != ".."
        && !file
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn make_show() -> Show {
        Show {
            id: "S1".to_string(),
            title: "Beethoven".to_string(),
            prompt: "The life and work of Ludwig van Beethoven".to_string(),
            creator: "user1".to_string(),
            curriculum: None,
            request: None,
            created_at: created(),
        }
    }

    fn make_episode(id: &str, show_index: u32, title: &str) -> Episode {
        Episode {
            id: id.to_string(),
            title: title.to_string(),
            summary: format!("About {title}"),
            show: "S1".to_string(),
            creator: "user1".to_string(),
            audio_file: format!("{show_index}_audio.mp3"),
            script: None,
            show_index,
            created_at: created() + Duration::minutes(show_index as i64),
        }
    }

    fn item_titles(xml: &str) -> Vec<String> {
        let channel = Channel::read_from(xml.as_bytes()).unwrap();
        channel
            .items()
            .iter()
            .map(|item| item.title().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn items_follow_show_index_order() {
        let episodes = vec![
            make_episode("ep2", 1, "Deep Dive"),
            make_episode("ep1", 0, "Intro"),
        ];

        let feed = render_feed(&make_show(), &episodes, &FeedSettings::default());

        assert_eq!(feed.item_count, 2);
        assert!(feed.defects.is_empty());
        assert_eq!(item_titles(&feed.xml), vec!["Intro", "Deep Dive"]);
    }

    #[test]
    fn rendering_is_byte_identical_across_runs() {
        let episodes = vec![
            make_episode("ep1", 0, "Intro"),
            make_episode("ep2", 1, "Deep Dive"),
            make_episode("ep3", 2, "Vienna"),
        ];
        let mut shuffled = episodes.clone();
        shuffled.reverse();

        let settings = FeedSettings::default();
        let first = render_feed(&make_show(), &episodes, &settings);
        let second = render_feed(&make_show(), &shuffled, &settings);

        assert_eq!(first.xml, second.xml);
    }

    #[test]
    fn special_characters_are_escaped() {
        let mut show = make_show();
        show.title = "Tom & Jerry's <\"Greatest\"> Hits".to_string();
        show.prompt = "Cats > mice & dogs".to_string();
        let mut episode = make_episode("ep1", 0, "A & B");
        episode.summary = "1 < 2 \"quoted\" 'single'".to_string();

        let feed = render_feed(&show, &[episode], &FeedSettings::default());

        assert!(feed.xml.contains("A &amp; B"));
        assert!(!feed.xml.contains("A & B"));

        let channel = Channel::read_from(feed.xml.as_bytes()).unwrap();
        assert_eq!(channel.title(), "Tom & Jerry's <\"Greatest\"> Hits");
        assert_eq!(channel.description(), "Cats > mice & dogs");
        let item = &channel.items()[0];
        assert_eq!(item.title(), Some("A & B"));
        assert_eq!(
            item.itunes_ext().and_then(|ext| ext.summary()),
            Some("1 < 2 \"quoted\" 'single'")
        );
    }

    #[test]
    fn enclosure_and_guid_share_the_audio_url() {
        let feed = render_feed(
            &make_show(),
            &[make_episode("abc123", 0, "Intro")],
            &FeedSettings::default(),
        );

        let channel = Channel::read_from(feed.xml.as_bytes()).unwrap();
        let item = &channel.items()[0];
        let expected = "http://127.0.0.1:8090/api/files/episodes/abc123/0_audio.mp3";

        let enclosure = item.enclosure().unwrap();
        assert_eq!(enclosure.url(), expected);
        assert_eq!(enclosure.mime_type(), "audio/mpeg");
        assert_eq!(enclosure.length(), "1234567");
        assert_eq!(item.guid().unwrap().value(), expected);
        assert_eq!(item.pub_date(), Some("Mon, 15 Jan 2024 12:00:00 +0000"));
        assert_eq!(
            item.itunes_ext().and_then(|ext| ext.duration()),
            Some("00:02:00")
        );
    }

    #[test]
    fn channel_carries_itunes_metadata() {
        let feed = render_feed(&make_show(), &[], &FeedSettings::default());

        assert!(feed.xml.contains("xmlns:itunes=\"http://www.itunes.com/dtds/podcast-1.0.dtd\""));
        assert!(feed.xml.contains("xmlns:content=\"http://purl.org/rss/1.0/modules/content/\""));

        let channel = Channel::read_from(feed.xml.as_bytes()).unwrap();
        assert_eq!(channel.title(), "Beethoven");
        assert_eq!(channel.link(), "https://guppy.jordan.matelsky.com");
        assert_eq!(channel.language(), Some("en-us"));
        assert!(channel.items().is_empty());

        let ext = channel.itunes_ext().unwrap();
        assert_eq!(ext.author(), Some("Guppy Courses"));
        assert_eq!(
            ext.summary(),
            Some("The life and work of Ludwig van Beethoven")
        );
        assert_eq!(ext.image(), Some("https://example.com/podcast.jpg"));
        assert_eq!(ext.explicit(), Some("no"));
        assert_eq!(ext.categories()[0].text(), "Technology");
        let owner = ext.owner().unwrap();
        assert_eq!(owner.name(), Some("Guppy Courses"));
        assert_eq!(owner.email(), Some("podcasts@example.com"));
    }

    #[test]
    fn broken_audio_skips_only_that_item() {
        let mut missing = make_episode("ep2", 1, "No Audio");
        missing.audio_file = String::new();
        let mut traversal = make_episode("ep3", 2, "Sneaky");
        traversal.audio_file = "../../etc/passwd".to_string();

        let episodes = vec![
            make_episode("ep1", 0, "Intro"),
            missing,
            traversal,
            make_episode("ep4", 3, "Outro"),
        ];

        let feed = render_feed(&make_show(), &episodes, &FeedSettings::default());

        assert_eq!(feed.item_count, 2);
        assert_eq!(item_titles(&feed.xml), vec!["Intro", "Outro"]);
        assert_eq!(
            feed.defects,
            vec![
                RenderDefect::MissingAudio {
                    episode_id: "ep2".to_string(),
                    title: "No Audio".to_string(),
                },
                RenderDefect::InvalidAudioReference {
                    episode_id: "ep3".to_string(),
                    file: "../../etc/passwd".to_string(),
                },
            ]
        );
    }

    #[test]
    fn duplicate_indices_still_render_deterministically() {
        let episodes = vec![
            make_episode("b", 0, "Second by id"),
            make_episode("a", 0, "First by id"),
        ];

        let feed = render_feed(&make_show(), &episodes, &FeedSettings::default());
        assert_eq!(item_titles(&feed.xml), vec!["First by id", "Second by id"]);
    }

    #[test]
    fn audio_url_keeps_base_path() {
        let base = Url::parse("https://pods.example.com/pb/").unwrap();
        let url = episode_audio_url(&base, &make_episode("ep1", 0, "Intro")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://pods.example.com/pb/api/files/episodes/ep1/0_audio.mp3"
        );
    }

    #[test]
    fn audio_url_percent_encodes_file_name() {
        let base = Url::parse("http://127.0.0.1:8090").unwrap();
        let mut episode = make_episode("ep1", 0, "Intro");
        episode.audio_file = "intro take 2.mp3".to_string();

        let url = episode_audio_url(&base, &episode).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8090/api/files/episodes/ep1/intro%20take%202.mp3"
        );
    }
}
