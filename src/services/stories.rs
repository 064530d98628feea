use crate::config::ContentConfig;
use crate::error::{invalid, not_found, ServiceError};
use crate::models::{SaveMode, Story, StoryInput, StoryStatus, StoryType, StoryWithAuthor};
use crate::services::markdown::MarkdownRenderer;
use crate::services::now_timestamp;
use crate::services::profiles::profile_summary;
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

const STORY_COLUMNS: &str = "id, author_id, title, content, excerpt, cover_image_url, story_type, status, tags, genre, chapter_number, series_id, likes_count, comments_count, bookmarks_count, views_count, is_featured, published_at, created_at, updated_at";

/// Drafts are only ever shown to their author.
const VISIBLE: &str = "status != 'draft'";

/// Standalone posts and series/novel roots.
const TOP_LEVEL: &str = "(story_type = 'one_time' OR series_id IS NULL)";

const UNTITLED_DRAFT: &str = "Untitled Draft";
const MAX_TITLE_LENGTH: usize = 200;
const MAX_TAG_LENGTH: usize = 30;

/// Publishes or saves a new story.
///
/// With `input.series_id` set the story becomes the next chapter of that
/// work: the work must be a series or novel root owned by `author_id`, and
/// the chapter inherits its story type. Otherwise the story is chapter 1 of
/// itself with no series reference.
pub fn create_story(
    db: &Database,
    rules: &ContentConfig,
    author_id: i64,
    input: StoryInput,
    mode: SaveMode,
) -> Result<Story> {
    let fields = prepare_fields(rules, &input, mode)?;

    let mut conn = db.get()?;
    let tx = conn.transaction()?;

    let (story_type, series_id, chapter_number) = match input.series_id {
        Some(parent_id) => {
            let parent = load_story(&tx, parent_id)?
                .filter(|p| p.author_id == author_id)
                .ok_or_else(|| not_found("Series"))?;
            if !parent.is_series_root() {
                return Err(invalid(
                    "Chapters can only be added to a series or novel",
                ));
            }
            let next = next_chapter_number_in(&tx, parent_id)?;
            (parent.story_type, Some(parent_id), next)
        }
        None => (input.story_type, None, 1),
    };

    tx.execute(
        "INSERT INTO stories (author_id, title, content, excerpt, cover_image_url, story_type, status, tags, genre, chapter_number, series_id, published_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            author_id,
            fields.title,
            input.content,
            fields.excerpt,
            fields.cover_image_url,
            story_type.to_string(),
            fields.status.to_string(),
            fields.tags_json,
            fields.genre,
            chapter_number,
            series_id,
            fields.published_at,
            fields.now,
            fields.now,
        ],
    )?;
    let id = tx.last_insert_rowid();
    let story = load_story(&tx, id)?.ok_or_else(|| not_found("Story"))?;
    tx.commit()?;

    tracing::info!(
        story_id = id,
        author_id,
        series_id = ?series_id,
        chapter_number,
        status = %story.status,
        "Story saved"
    );
    Ok(story)
}

/// Edits a story owned by `author_id`. Stories owned by someone else are
/// reported as not found.
pub fn update_story(
    db: &Database,
    rules: &ContentConfig,
    author_id: i64,
    id: i64,
    input: StoryInput,
    mode: SaveMode,
) -> Result<Story> {
    let fields = prepare_fields(rules, &input, mode)?;

    let mut conn = db.get()?;
    let tx = conn.transaction()?;

    let current = load_story(&tx, id)?
        .filter(|s| s.author_id == author_id)
        .ok_or_else(|| not_found("Story"))?;

    if let Some(requested) = input.series_id {
        if requested == id {
            return Err(invalid("A story cannot be a chapter of itself"));
        }
        if Some(requested) != current.series_id {
            return Err(invalid("Chapters cannot be moved to another series"));
        }
    }

    let story_type = if current.is_top_level() {
        if input.story_type == StoryType::OneTime
            && current.story_type != StoryType::OneTime
            && count_chapters(&tx, id)? > 0
        {
            return Err(invalid(
                "A series with chapters cannot become a one-time story",
            ));
        }
        input.story_type
    } else {
        current.story_type
    };

    let chapter_number = match (current.series_id, input.chapter_number) {
        (Some(root), Some(n)) if !current.is_top_level() && n != current.chapter_number => {
            if n < 1 {
                return Err(invalid("Chapter number must be 1 or greater"));
            }
            if chapter_number_taken(&tx, root, n, id)? {
                return Err(invalid(format!(
                    "Chapter {} already exists in this series",
                    n
                )));
            }
            n
        }
        _ => current.chapter_number,
    };

    let (status, published_at) = match mode {
        SaveMode::Draft => (StoryStatus::Draft, None),
        SaveMode::Publish => {
            let status = match current.status {
                StoryStatus::Completed | StoryStatus::OnHold => current.status,
                _ => StoryStatus::Published,
            };
            (status, current.published_at.clone().or(fields.published_at))
        }
    };

    tx.execute(
        "UPDATE stories SET title = ?, content = ?, excerpt = ?, cover_image_url = ?, story_type = ?, status = ?, tags = ?, genre = ?, chapter_number = ?, published_at = ?, updated_at = ? WHERE id = ?",
        rusqlite::params![
            fields.title,
            input.content,
            fields.excerpt,
            fields.cover_image_url,
            story_type.to_string(),
            status.to_string(),
            fields.tags_json,
            fields.genre,
            chapter_number,
            published_at,
            fields.now,
            id,
        ],
    )?;
    let story = load_story(&tx, id)?.ok_or_else(|| not_found("Story"))?;
    tx.commit()?;

    tracing::info!(story_id = id, author_id, status = %story.status, "Story updated");
    Ok(story)
}

/// Marks a published series or novel as completed, on hold, or back to
/// published.
pub fn set_status(db: &Database, author_id: i64, id: i64, status: StoryStatus) -> Result<Story> {
    if status == StoryStatus::Draft {
        return Err(invalid("Use save as draft to unpublish a story"));
    }

    let conn = db.get()?;
    let current = load_story(&conn, id)?
        .filter(|s| s.author_id == author_id)
        .ok_or_else(|| not_found("Story"))?;

    if status != StoryStatus::Published && !current.is_series_root() {
        return Err(invalid(
            "Only a series or novel can be marked completed or on hold",
        ));
    }

    let now = now_timestamp();
    conn.execute(
        "UPDATE stories SET status = ?, published_at = COALESCE(published_at, ?), updated_at = ? WHERE id = ?",
        (status.to_string(), &now, &now, id),
    )?;
    load_story(&conn, id)?.ok_or_else(|| not_found("Story"))
}

/// Deletes a story owned by `author_id`. Deleting a series or novel root
/// also deletes its chapters. Returns the number of records removed.
pub fn delete_story(db: &Database, author_id: i64, id: i64) -> Result<usize> {
    let mut conn = db.get()?;
    let tx = conn.transaction()?;

    let story = load_story(&tx, id)?
        .filter(|s| s.author_id == author_id)
        .ok_or_else(|| not_found("Story"))?;

    let mut removed = 0;
    if story.is_top_level() {
        removed += tx.execute("DELETE FROM stories WHERE series_id = ?", [id])?;
    }
    removed += tx.execute("DELETE FROM stories WHERE id = ?", [id])?;
    tx.commit()?;

    tracing::info!(story_id = id, author_id, removed, "Story deleted");
    Ok(removed)
}

pub fn get_story(db: &Database, id: i64) -> Result<Option<Story>> {
    let conn = db.get()?;
    load_story(&conn, id)
}

/// The story if `author_id` owns it.
pub fn get_owned_story(db: &Database, author_id: i64, id: i64) -> Result<Option<Story>> {
    Ok(get_story(db, id)?.filter(|s| s.author_id == author_id))
}

/// A story of any status with its author embedded. Callers decide who may
/// see drafts.
pub fn get_story_with_author(db: &Database, id: i64) -> Result<Option<StoryWithAuthor>> {
    let conn = db.get()?;
    match load_story(&conn, id)? {
        Some(s) => Ok(Some(with_author(&conn, s)?)),
        None => Ok(None),
    }
}

pub fn record_view(db: &Database, id: i64) -> Result<()> {
    let conn = db.get()?;
    conn.execute(
        "UPDATE stories SET views_count = views_count + 1 WHERE id = ?",
        [id],
    )?;
    Ok(())
}

/// Every record the author owns, drafts and chapters included.
pub fn list_author_stories(db: &Database, author_id: i64) -> Result<Vec<Story>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM stories WHERE author_id = ? ORDER BY created_at DESC, id DESC",
        STORY_COLUMNS
    ))?;
    let stories = stmt
        .query_map([author_id], row_to_story)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stories)
}

/// Non-draft records by the author, chapters included.
pub fn list_visible_by_author(db: &Database, author_id: i64) -> Result<Vec<Story>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM stories WHERE author_id = ? AND {} ORDER BY published_at DESC, id DESC",
        STORY_COLUMNS, VISIBLE
    ))?;
    let stories = stmt
        .query_map([author_id], row_to_story)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stories)
}

/// Series and novel roots the author can add chapters to.
pub fn list_parent_series(db: &Database, author_id: i64) -> Result<Vec<Story>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM stories WHERE author_id = ? AND story_type IN ('series', 'novel') AND series_id IS NULL ORDER BY created_at DESC, id DESC",
        STORY_COLUMNS
    ))?;
    let stories = stmt
        .query_map([author_id], row_to_story)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stories)
}

/// Number the next chapter of `series_id` will get. The root counts as
/// chapter 1, so a work without chapters continues at 2.
pub fn next_chapter_number(db: &Database, series_id: i64) -> Result<i64> {
    let conn = db.get()?;
    next_chapter_number_in(&conn, series_id)
}

/// Latest visible top-level works across all authors.
pub fn list_published(db: &Database, limit: usize, offset: usize) -> Result<Vec<StoryWithAuthor>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM stories WHERE {} AND {} ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?",
        STORY_COLUMNS, VISIBLE, TOP_LEVEL
    ))?;
    let stories = stmt
        .query_map((limit, offset), row_to_story)?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    stories.into_iter().map(|s| with_author(&conn, s)).collect()
}

pub fn count_published(db: &Database) -> Result<i64> {
    let conn = db.get()?;
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM stories WHERE {} AND {}", VISIBLE, TOP_LEVEL),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn list_featured(db: &Database, limit: usize) -> Result<Vec<StoryWithAuthor>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM stories WHERE is_featured = 1 AND {} ORDER BY published_at DESC, id DESC LIMIT ?",
        STORY_COLUMNS, VISIBLE
    ))?;
    let stories = stmt
        .query_map([limit], row_to_story)?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    stories.into_iter().map(|s| with_author(&conn, s)).collect()
}

pub fn set_featured(db: &Database, id: i64, featured: bool) -> Result<()> {
    let conn = db.get()?;
    let affected = conn.execute(
        "UPDATE stories SET is_featured = ? WHERE id = ?",
        (featured, id),
    )?;
    if affected == 0 {
        return Err(not_found("Story"));
    }
    Ok(())
}

/// The root of a work plus its visible chapters, in chapter order.
pub fn series_chapters(db: &Database, root_id: i64) -> Result<Vec<Story>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM stories WHERE (id = ?1 OR (series_id = ?1 AND story_type != 'one_time')) AND {} ORDER BY chapter_number ASC, id ASC",
        STORY_COLUMNS, VISIBLE
    ))?;
    let stories = stmt
        .query_map([root_id], row_to_story)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stories)
}

/// Other visible works by the same author or sharing a tag, newest first.
pub fn related_stories(db: &Database, story: &Story, limit: usize) -> Result<Vec<StoryWithAuthor>> {
    let tags_json = serde_json::to_string(&story.tags)?;
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {} FROM stories
        WHERE {} AND {} AND id != ?1
          AND (author_id = ?2
               OR EXISTS (SELECT 1 FROM json_each(stories.tags) t
                          WHERE t.value IN (SELECT value FROM json_each(?3))))
        ORDER BY published_at DESC, id DESC
        LIMIT ?4
        "#,
        STORY_COLUMNS, VISIBLE, TOP_LEVEL
    ))?;
    let stories = stmt
        .query_map(
            rusqlite::params![story.root_id(), story.author_id, tags_json, limit],
            row_to_story,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    stories.into_iter().map(|s| with_author(&conn, s)).collect()
}

struct PreparedFields {
    title: String,
    excerpt: Option<String>,
    cover_image_url: Option<String>,
    tags_json: String,
    genre: Option<String>,
    status: StoryStatus,
    published_at: Option<String>,
    now: String,
}

fn prepare_fields(rules: &ContentConfig, input: &StoryInput, mode: SaveMode) -> Result<PreparedFields> {
    let title = input.title.trim();
    let title = match (title.is_empty(), mode) {
        (true, SaveMode::Draft) => UNTITLED_DRAFT.to_string(),
        (true, SaveMode::Publish) => return Err(invalid("Title cannot be empty")),
        (false, _) => title.to_string(),
    };
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(invalid(format!(
            "Title must be {} characters or less",
            MAX_TITLE_LENGTH
        )));
    }
    if mode == SaveMode::Publish && input.content.trim().is_empty() {
        return Err(invalid("Story content cannot be empty"));
    }

    let tags = normalize_tags(&input.tags, rules.max_tags)?;

    let excerpt = input
        .excerpt
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .or_else(|| {
            if input.content.trim().is_empty() {
                None
            } else {
                Some(MarkdownRenderer::new().generate_excerpt(&input.content, rules.excerpt_length))
            }
        });

    let now = now_timestamp();
    let (status, published_at) = match mode {
        SaveMode::Publish => (StoryStatus::Published, Some(now.clone())),
        SaveMode::Draft => (StoryStatus::Draft, None),
    };

    Ok(PreparedFields {
        title,
        excerpt,
        cover_image_url: trimmed(input.cover_image_url.as_deref()),
        tags_json: serde_json::to_string(&tags)?,
        genre: trimmed(input.genre.as_deref()),
        status,
        published_at,
        now,
    })
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Trims tags, drops a leading `#`, removes blanks and case-insensitive
/// duplicates, and enforces the per-story limit.
pub fn normalize_tags(tags: &[String], max_tags: usize) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(invalid(format!(
                "Tags must be {} characters or less",
                MAX_TAG_LENGTH
            )));
        }
        if out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        out.push(tag.to_string());
    }
    if out.len() > max_tags {
        return Err(invalid(format!(
            "A story can have at most {} tags",
            max_tags
        )));
    }
    Ok(out)
}

/// Splits a comma separated form field into tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',').map(|t| t.trim().to_string()).collect()
}

fn next_chapter_number_in(conn: &Connection, series_id: i64) -> Result<i64> {
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(chapter_number), 1) FROM stories WHERE id = ?1 OR series_id = ?1",
        [series_id],
        |row| row.get(0),
    )?;
    Ok(max.max(1) + 1)
}

fn count_chapters(conn: &Connection, root_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM stories WHERE series_id = ?",
        [root_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn chapter_number_taken(conn: &Connection, root_id: i64, number: i64, exclude_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM stories WHERE (id = ?1 OR series_id = ?1) AND chapter_number = ?2 AND id != ?3",
        (root_id, number, exclude_id),
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn load_story(conn: &Connection, id: i64) -> Result<Option<Story>> {
    let story = conn
        .query_row(
            &format!("SELECT {} FROM stories WHERE id = ?", STORY_COLUMNS),
            [id],
            row_to_story,
        )
        .optional()?;
    Ok(story)
}

fn with_author(conn: &Connection, story: Story) -> Result<StoryWithAuthor> {
    let author = profile_summary(conn, story.author_id)?;
    Ok(StoryWithAuthor { story, author })
}

fn row_to_story(row: &rusqlite::Row) -> rusqlite::Result<Story> {
    let tags: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default();

    Ok(Story {
        id: row.get(0)?,
        author_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get(4)?,
        cover_image_url: row.get(5)?,
        story_type: row
            .get::<_, String>(6)?
            .parse()
            .unwrap_or(StoryType::OneTime),
        status: row
            .get::<_, String>(7)?
            .parse()
            .unwrap_or(StoryStatus::Draft),
        tags,
        genre: row.get(9)?,
        chapter_number: row.get(10)?,
        series_id: row.get(11)?,
        likes_count: row.get(12)?,
        comments_count: row.get(13)?,
        bookmarks_count: row.get(14)?,
        views_count: row.get(15)?,
        is_featured: row.get(16)?,
        published_at: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

/// Checks a raw `status` form value for [`set_status`].
pub fn parse_status(raw: &str) -> Result<StoryStatus> {
    raw.parse()
        .map_err(|_| ServiceError::Invalid(format!("Unknown status '{}'", raw)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " #grief ".to_string(),
            "Grief".to_string(),
            "".to_string(),
            "letters".to_string(),
        ];
        assert_eq!(normalize_tags(&tags, 5).unwrap(), vec!["grief", "letters"]);
    }

    #[test]
    fn test_normalize_tags_limit() {
        let tags: Vec<String> = (0..6).map(|i| format!("tag{}", i)).collect();
        assert!(normalize_tags(&tags, 5).is_err());
        assert_eq!(normalize_tags(&tags[..5], 5).unwrap().len(), 5);
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("a, b ,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_prepare_fields_draft_defaults_title() {
        let rules = ContentConfig::default();
        let input = StoryInput::default();
        let fields = prepare_fields(&rules, &input, SaveMode::Draft).unwrap();
        assert_eq!(fields.title, UNTITLED_DRAFT);
        assert_eq!(fields.status, StoryStatus::Draft);
        assert!(fields.published_at.is_none());
        assert!(fields.excerpt.is_none());
    }

    #[test]
    fn test_prepare_fields_publish_requires_title_and_content() {
        let rules = ContentConfig::default();
        let mut input = StoryInput {
            content: "It rained.".into(),
            ..Default::default()
        };
        assert!(prepare_fields(&rules, &input, SaveMode::Publish).is_err());

        input.title = "Rain".into();
        input.content = "   ".into();
        assert!(prepare_fields(&rules, &input, SaveMode::Publish).is_err());

        input.content = "It rained all night.".into();
        let fields = prepare_fields(&rules, &input, SaveMode::Publish).unwrap();
        assert_eq!(fields.status, StoryStatus::Published);
        assert!(fields.published_at.is_some());
        assert_eq!(fields.excerpt.as_deref(), Some("It rained all night."));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("on_hold").unwrap(), StoryStatus::OnHold);
        assert!(parse_status("paused").is_err());
    }
}
