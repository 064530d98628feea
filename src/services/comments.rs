use crate::error::{invalid, not_found};
use crate::models::{Comment, CommentThread};
use crate::services::profiles::profile_summary;
use crate::Database;
use anyhow::Result;
use rusqlite::OptionalExtension;
use std::collections::HashMap;

const MAX_COMMENT_LENGTH: usize = 2000;

const COMMENT_COLUMNS: &str =
    "id, story_id, author_id, parent_id, content, likes_count, created_at, updated_at";

/// Top-level comments oldest first, each with its replies oldest first.
/// Replies whose parent is itself a reply are attached to the top-level
/// comment they hang under.
pub fn list_comments(db: &Database, story_id: i64) -> Result<Vec<CommentThread>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comments WHERE story_id = ? ORDER BY created_at ASC, id ASC",
        COMMENT_COLUMNS
    ))?;
    let comments = stmt
        .query_map([story_id], row_to_comment)?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut parent_of: HashMap<i64, Option<i64>> = HashMap::new();
    for c in &comments {
        parent_of.insert(c.id, c.parent_id);
    }
    let thread_root = |mut id: i64| {
        let mut hops = 0;
        while let Some(Some(parent)) = parent_of.get(&id) {
            id = *parent;
            hops += 1;
            if hops > parent_of.len() {
                break;
            }
        }
        id
    };

    let mut roots: Vec<CommentThread> = Vec::new();
    let mut replies: HashMap<i64, Vec<CommentThread>> = HashMap::new();
    for comment in comments {
        let author = profile_summary(&conn, comment.author_id)?;
        let parent_id = comment.parent_id;
        let thread = CommentThread {
            comment,
            author,
            replies: Vec::new(),
        };
        match parent_id {
            Some(parent) => replies.entry(thread_root(parent)).or_default().push(thread),
            None => roots.push(thread),
        }
    }

    for root in &mut roots {
        if let Some(children) = replies.remove(&root.comment.id) {
            root.replies = children;
        }
    }
    Ok(roots)
}

/// Adds a comment, or a reply when `parent_id` names a comment on the same
/// story.
pub fn post_comment(
    db: &Database,
    author_id: i64,
    story_id: i64,
    parent_id: Option<i64>,
    content: &str,
) -> Result<CommentThread> {
    let content = content.trim();
    if content.is_empty() {
        return Err(invalid("Comment cannot be empty"));
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        return Err(invalid(format!(
            "Comment must be {} characters or less",
            MAX_COMMENT_LENGTH
        )));
    }

    let mut conn = db.get()?;
    let tx = conn.transaction()?;

    let visible: Option<i64> = tx
        .query_row(
            "SELECT id FROM stories WHERE id = ? AND status != 'draft'",
            [story_id],
            |row| row.get(0),
        )
        .optional()?;
    if visible.is_none() {
        return Err(not_found("Story"));
    }

    if let Some(parent) = parent_id {
        let parent_story: Option<i64> = tx
            .query_row(
                "SELECT story_id FROM comments WHERE id = ?",
                [parent],
                |row| row.get(0),
            )
            .optional()?;
        if parent_story != Some(story_id) {
            return Err(not_found("Comment"));
        }
    }

    tx.execute(
        "INSERT INTO comments (story_id, author_id, parent_id, content) VALUES (?, ?, ?, ?)",
        (story_id, author_id, parent_id, content),
    )?;
    let id = tx.last_insert_rowid();
    let comment = tx.query_row(
        &format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS),
        [id],
        row_to_comment,
    )?;
    let author = profile_summary(&tx, author_id)?;
    tx.commit()?;

    tracing::info!(comment_id = id, story_id, author_id, "Comment posted");
    Ok(CommentThread {
        comment,
        author,
        replies: Vec::new(),
    })
}

fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        story_id: row.get(1)?,
        author_id: row.get(2)?,
        parent_id: row.get(3)?,
        content: row.get(4)?,
        likes_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
