//! Series materializer: turns an author's flat story records into works:
//! standalone posts and series/novel roots, each carrying its chapters in
//! reading order.

use crate::models::{ChapterLink, ChapterNavigation, Story, StoryType, StoryWithChapters};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;

/// Groups `stories` into top-level works.
///
/// A record is top-level when it is a one-time post or has no `series_id`;
/// every other record is a chapter of the work its `series_id` names.
/// Chapters are attached in ascending `chapter_number` order and works are
/// returned newest first by [`effective_date`]. Both sorts are stable, so
/// ties keep the order the records arrived in.
///
/// Chapters whose `series_id` matches no top-level record (deleted parents,
/// records pointing at themselves) are dropped without error.
pub fn materialize<I>(stories: I) -> Vec<StoryWithChapters>
where
    I: IntoIterator<Item = Story>,
{
    let mut works: Vec<StoryWithChapters> = Vec::new();
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut chapters: HashMap<i64, Vec<Story>> = HashMap::new();

    for story in stories {
        if story.is_top_level() {
            match positions.get(&story.id) {
                Some(&pos) => works[pos].story = story,
                None => {
                    positions.insert(story.id, works.len());
                    works.push(StoryWithChapters {
                        story,
                        chapters: Vec::new(),
                    });
                }
            }
        } else if let Some(series_id) = story.series_id {
            chapters.entry(series_id).or_default().push(story);
        }
    }

    for work in &mut works {
        if let Some(mut list) = chapters.remove(&work.story.id) {
            list.sort_by_key(|c| c.chapter_number);
            work.chapters = list;
        }
    }

    if !chapters.is_empty() {
        let orphans: usize = chapters.values().map(Vec::len).sum();
        tracing::debug!(orphans, "Dropping chapters without a top-level work");
    }

    works.sort_by(|a, b| effective_date(&b.story).cmp(&effective_date(&a.story)));
    works
}

/// Inverse of [`materialize`]: each work followed by its chapters.
pub fn flatten(works: Vec<StoryWithChapters>) -> Vec<Story> {
    let mut stories = Vec::new();
    for work in works {
        stories.push(work.story);
        stories.extend(work.chapters);
    }
    stories
}

/// Publish time when the story has one, creation time otherwise.
///
/// Returns `None` when the timestamp cannot be parsed; such works sort last.
pub fn effective_date(story: &Story) -> Option<DateTime<Utc>> {
    let raw = story
        .published_at
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(&story.created_at);
    parse_timestamp(raw)
}

/// Accepts RFC 3339, SQLite's `CURRENT_TIMESTAMP` format and bare dates.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Prev/next links for `current` among the chapters of its work.
///
/// `chapters` must include the root when the root counts as chapter 1.
/// Returns `None` for one-time posts, for works with fewer than two
/// chapters, and when `current` is not among `chapters`.
pub fn chapter_navigation(current: &Story, chapters: &[Story]) -> Option<ChapterNavigation> {
    if current.story_type == StoryType::OneTime || chapters.len() <= 1 {
        return None;
    }

    let mut ordered: Vec<&Story> = chapters.iter().collect();
    ordered.sort_by_key(|c| c.chapter_number);

    let index = ordered.iter().position(|c| c.id == current.id)?;

    Some(ChapterNavigation {
        chapter_number: current.chapter_number,
        total_chapters: ordered.len(),
        prev: index
            .checked_sub(1)
            .map(|i| ChapterLink::from(ordered[i])),
        next: ordered.get(index + 1).map(|c| ChapterLink::from(*c)),
    })
}
