use crate::error::GenerationError;
use crate::feed::is_plain_file_name;
use crate::model::{EpisodeDraft, ShowDraft, ShowRequest};
use crate::worker::{GeneratedEpisode, GeneratedShow};

/// A validated show, ready to be written to the store
#[derive(Debug, Clone, PartialEq)]
pub struct ShowPlan {
    pub show: ShowDraft,
    /// Ascending, contiguous `show_index` values from the configured base
    pub episodes: Vec<EpisodePlan>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodePlan {
    pub show_index: u32,
    pub title: String,
    pub summary: String,
    pub audio_file: String,
    pub script: Option<String>,
}

impl EpisodePlan {
    pub fn into_draft(self, show_id: &str, creator: &str) -> EpisodeDraft {
        EpisodeDraft {
            title: self.title,
            summary: self.summary,
            show: show_id.to_string(),
            creator: creator.to_string(),
            audio_file: self.audio_file,
            script: self.script,
            show_index: self.show_index,
        }
    }
}

/// Reject requests that cannot be generated from
pub fn check_request(request: &ShowRequest) -> Result<(), GenerationError> {
    if request.prompt.trim().is_empty() {
        return Err(GenerationError::Validation(
            "request prompt is empty".to_string(),
        ));
    }
    Ok(())
}

/// Validate worker output against the request and lay out episode order.
///
/// Episodes either all carry a `show_index` (which must then be exactly
/// `base..base + n`) or none do, in which case they are numbered in the
/// order given.
pub fn plan_show(
    request: &ShowRequest,
    generated: GeneratedShow,
    index_base: u32,
) -> Result<ShowPlan, GenerationError> {
    let title = non_blank(generated.title).unwrap_or_else(|| request.title.trim().to_string());
    if title.is_empty() {
        return Err(invalid("generated show has no title"));
    }

    let prompt = non_blank(generated.prompt).unwrap_or_else(|| request.prompt.trim().to_string());
    if prompt.is_empty() {
        return Err(invalid("generated show has no prompt"));
    }

    if generated.episodes.is_empty() {
        return Err(invalid("generation produced no episodes"));
    }

    for (position, episode) in generated.episodes.iter().enumerate() {
        if episode.title.trim().is_empty() {
            return Err(invalid(format!("episode {} has no title", position + 1)));
        }
        let audio_file = episode.audio_file.trim();
        if audio_file.is_empty() {
            return Err(invalid(format!(
                "episode '{}' has no audio file",
                episode.title.trim()
            )));
        }
        // It becomes one segment of the enclosure URL
        if !is_plain_file_name(audio_file) {
            return Err(invalid(format!(
                "episode '{}' has an unusable audio file '{audio_file}'",
                episode.title.trim()
            )));
        }
    }

    let ordered = order_episodes(generated.episodes, index_base)?;
    let curriculum = non_blank(generated.curriculum).or_else(|| Some(curriculum_of(&ordered)));

    Ok(ShowPlan {
        show: ShowDraft {
            title,
            prompt,
            creator: request.creator.clone(),
            curriculum,
            request: Some(request.id.clone()),
        },
        episodes: ordered,
    })
}

fn order_episodes(
    episodes: Vec<GeneratedEpisode>,
    base: u32,
) -> Result<Vec<EpisodePlan>, GenerationError> {
    let indexed = episodes.iter().filter(|e| e.show_index.is_some()).count();
    let last = u32::try_from(episodes.len().saturating_sub(1))
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| {
            invalid(format!(
                "{} episodes do not fit above index {base}",
                episodes.len()
            ))
        })?;

    let mut numbered: Vec<(u32, GeneratedEpisode)> = if indexed == 0 {
        episodes
            .into_iter()
            .zip(base..=last)
            .map(|(episode, index)| (index, episode))
            .collect()
    } else if indexed == episodes.len() {
        episodes
            .into_iter()
            .filter_map(|episode| episode.show_index.map(|index| (index, episode)))
            .collect()
    } else {
        return Err(invalid("only some episodes carry a show_index"));
    };

    numbered.sort_by_key(|(index, _)| *index);

    for (expected, (index, _)) in (base..=last).zip(&numbered) {
        if *index != expected {
            return Err(invalid(format!(
                "episode indices must run contiguously from {base}; found {index} where {expected} was expected"
            )));
        }
    }

    Ok(numbered
        .into_iter()
        .map(|(show_index, episode)| EpisodePlan {
            show_index,
            title: episode.title.trim().to_string(),
            summary: episode.summary.trim().to_string(),
            audio_file: episode.audio_file.trim().to_string(),
            script: non_blank(episode.script),
        })
        .collect())
}

fn curriculum_of(episodes: &[EpisodePlan]) -> String {
    episodes
        .iter()
        .map(|episode| format!(" • {}: {}", episode.title, episode.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn invalid(reason: impl Into<String>) -> GenerationError {
    GenerationError::Validation(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestStatus;
    use chrono::Utc;

    fn make_request(title: &str, prompt: &str) -> ShowRequest {
        let now = Utc::now();
        ShowRequest {
            id: "req1".to_string(),
            title: title.to_string(),
            prompt: prompt.to_string(),
            creator: "user1".to_string(),
            status: RequestStatus::Creating,
            show: None,
            failure_reason: None,
            claimed_by: Some("worker-a".to_string()),
            lease_token: None,
            lease_expires_at: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn episode(title: &str, show_index: Option<u32>) -> GeneratedEpisode {
        GeneratedEpisode {
            title: title.to_string(),
            summary: format!("About {title}"),
            audio_file: format!("{title}.mp3"),
            script: None,
            show_index,
        }
    }

    fn generated(episodes: Vec<GeneratedEpisode>) -> GeneratedShow {
        GeneratedShow {
            title: None,
            prompt: None,
            curriculum: None,
            episodes,
        }
    }

    #[test]
    fn empty_prompt_fails_request_check() {
        let request = make_request("Beethoven", "   ");
        let err = check_request(&request).unwrap_err();
        assert_eq!(err.to_string(), "request prompt is empty");
    }

    #[test]
    fn unindexed_episodes_are_numbered_from_base() {
        let request = make_request("Beethoven", "The life of Beethoven");
        let plan = plan_show(
            &request,
            generated(vec![episode("Bonn", None), episode("Vienna", None)]),
            0,
        )
        .unwrap();

        let indices: Vec<u32> = plan.episodes.iter().map(|e| e.show_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(plan.episodes[0].title, "Bonn");
        assert_eq!(plan.show.title, "Beethoven");
        assert_eq!(plan.show.prompt, "The life of Beethoven");
        assert_eq!(plan.show.request.as_deref(), Some("req1"));
        assert_eq!(
            plan.show.curriculum.as_deref(),
            Some(" • Bonn: About Bonn\n • Vienna: About Vienna")
        );
    }

    #[test]
    fn indexed_episodes_are_sorted() {
        let request = make_request("Beethoven", "The life of Beethoven");
        let plan = plan_show(
            &request,
            generated(vec![episode("Vienna", Some(2)), episode("Bonn", Some(1))]),
            1,
        )
        .unwrap();

        let titles: Vec<&str> = plan.episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Bonn", "Vienna"]);
    }

    #[test]
    fn gaps_and_duplicates_are_rejected() {
        let request = make_request("Beethoven", "The life of Beethoven");

        let gap = plan_show(
            &request,
            generated(vec![episode("Bonn", Some(0)), episode("Vienna", Some(2))]),
            0,
        );
        assert!(matches!(gap, Err(GenerationError::Validation(_))));

        let duplicate = plan_show(
            &request,
            generated(vec![episode("Bonn", Some(0)), episode("Vienna", Some(0))]),
            0,
        );
        assert!(matches!(duplicate, Err(GenerationError::Validation(_))));
    }

    #[test]
    fn partial_indices_are_rejected() {
        let request = make_request("Beethoven", "The life of Beethoven");
        let result = plan_show(
            &request,
            generated(vec![episode("Bonn", Some(0)), episode("Vienna", None)]),
            0,
        );
        assert!(matches!(result, Err(GenerationError::Validation(_))));
    }

    #[test]
    fn no_episodes_is_rejected() {
        let request = make_request("Beethoven", "The life of Beethoven");
        let err = plan_show(&request, generated(vec![]), 0).unwrap_err();
        assert_eq!(err.to_string(), "generation produced no episodes");
    }

    #[test]
    fn missing_audio_is_rejected() {
        let request = make_request("Beethoven", "The life of Beethoven");
        let mut silent = episode("Bonn", None);
        silent.audio_file = String::new();

        let err = plan_show(&request, generated(vec![silent]), 0).unwrap_err();
        assert_eq!(err.to_string(), "episode 'Bonn' has no audio file");
    }

    #[test]
    fn audio_file_with_path_is_rejected() {
        let request = make_request("Beethoven", "The life of Beethoven");
        let mut nested = episode("Bonn", None);
        nested.audio_file = "a/b.mp3".to_string();

        let err = plan_show(&request, generated(vec![nested]), 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "episode 'Bonn' has an unusable audio file 'a/b.mp3'"
        );

        let mut parent = episode("Vienna", None);
        parent.audio_file = "..".to_string();
        assert!(plan_show(&request, generated(vec![parent]), 0).is_err());
    }

    #[test]
    fn indices_near_the_top_of_the_range() {
        let request = make_request("Beethoven", "The life of Beethoven");

        let plan = plan_show(&request, generated(vec![episode("Bonn", None)]), u32::MAX).unwrap();
        assert_eq!(plan.episodes[0].show_index, u32::MAX);

        let err = plan_show(
            &request,
            generated(vec![episode("Bonn", None), episode("Vienna", None)]),
            u32::MAX,
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));

        let indexed = plan_show(
            &request,
            generated(vec![
                episode("Bonn", Some(u32::MAX - 1)),
                episode("Vienna", Some(u32::MAX)),
            ]),
            u32::MAX - 1,
        )
        .unwrap();
        assert_eq!(indexed.episodes[1].show_index, u32::MAX);
    }

    #[test]
    fn blank_title_everywhere_is_rejected() {
        let request = make_request("", "The life of Beethoven");
        let mut show = generated(vec![episode("Bonn", None)]);
        show.title = Some("  ".to_string());

        let err = plan_show(&request, show, 0).unwrap_err();
        assert_eq!(err.to_string(), "generated show has no title");
    }

    #[test]
    fn worker_title_and_curriculum_win() {
        let request = make_request("beethoven", "The life of Beethoven");
        let mut show = generated(vec![episode("Bonn", None)]);
        show.title = Some("Beethoven: A Life".to_string());
        show.curriculum = Some("1. Bonn".to_string());

        let plan = plan_show(&request, show, 0).unwrap();
        assert_eq!(plan.show.title, "Beethoven: A Life");
        assert_eq!(plan.show.curriculum.as_deref(), Some("1. Bonn"));
    }
}
