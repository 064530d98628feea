use crate::error::{invalid, not_found};
use crate::models::{StoryType, Toggle, ViewerState};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

/// Reader actions that flip a row in a `(user_id, story_id)` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoryAction {
    Like,
    Bookmark,
    Subscribe,
}

impl StoryAction {
    fn table(self) -> &'static str {
        match self {
            StoryAction::Like => "likes",
            StoryAction::Bookmark => "bookmarks",
            StoryAction::Subscribe => "subscriptions",
        }
    }

    /// Count reported back to the caller after the toggle.
    fn count_sql(self) -> &'static str {
        match self {
            StoryAction::Like => "SELECT likes_count FROM stories WHERE id = ?",
            StoryAction::Bookmark => "SELECT bookmarks_count FROM stories WHERE id = ?",
            StoryAction::Subscribe => "SELECT COUNT(*) FROM subscriptions WHERE story_id = ?",
        }
    }
}

pub fn toggle_like(db: &Database, user_id: i64, story_id: i64) -> Result<Toggle> {
    toggle_story_action(db, StoryAction::Like, user_id, story_id)
}

pub fn toggle_bookmark(db: &Database, user_id: i64, story_id: i64) -> Result<Toggle> {
    toggle_story_action(db, StoryAction::Bookmark, user_id, story_id)
}

/// Subscribing is only offered on series and novels. Subscriptions belong
/// to the root of the work, so a chapter id subscribes to its root.
pub fn toggle_subscription(db: &Database, user_id: i64, story_id: i64) -> Result<Toggle> {
    toggle_story_action(db, StoryAction::Subscribe, user_id, story_id)
}

fn toggle_story_action(
    db: &Database,
    action: StoryAction,
    user_id: i64,
    story_id: i64,
) -> Result<Toggle> {
    let mut conn = db.get()?;
    let tx = conn.transaction()?;

    let (story_type, series_id) =
        visible_story(&tx, story_id)?.ok_or_else(|| not_found("Story"))?;
    let story_id = match action {
        StoryAction::Subscribe if story_type == StoryType::OneTime => {
            return Err(invalid("Only a series or novel can be subscribed to"));
        }
        StoryAction::Subscribe => match series_id {
            Some(root_id) => {
                visible_story(&tx, root_id)?.ok_or_else(|| not_found("Story"))?;
                root_id
            }
            None => story_id,
        },
        _ => story_id,
    };

    let table = action.table();
    let removed = tx.execute(
        &format!("DELETE FROM {} WHERE user_id = ? AND story_id = ?", table),
        (user_id, story_id),
    )?;
    if removed == 0 {
        tx.execute(
            &format!("INSERT INTO {} (user_id, story_id) VALUES (?, ?)", table),
            (user_id, story_id),
        )?;
    }

    let count: i64 = tx.query_row(action.count_sql(), [story_id], |row| row.get(0))?;
    tx.commit()?;

    let toggle = Toggle {
        active: removed == 0,
        count,
    };
    tracing::debug!(
        action = table,
        user_id,
        story_id,
        active = toggle.active,
        count = toggle.count,
        "Toggled"
    );
    Ok(toggle)
}

/// Follows or unfollows `following_id`. The count is the followed
/// author's follower total.
pub fn toggle_follow(db: &Database, follower_id: i64, following_id: i64) -> Result<Toggle> {
    if follower_id == following_id {
        return Err(invalid("You cannot follow yourself"));
    }

    let mut conn = db.get()?;
    let tx = conn.transaction()?;

    let exists: Option<i64> = tx
        .query_row("SELECT id FROM profiles WHERE id = ?", [following_id], |row| {
            row.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(not_found("Author"));
    }

    let removed = tx.execute(
        "DELETE FROM follows WHERE follower_id = ? AND following_id = ?",
        (follower_id, following_id),
    )?;
    if removed == 0 {
        tx.execute(
            "INSERT INTO follows (follower_id, following_id) VALUES (?, ?)",
            (follower_id, following_id),
        )?;
    }

    let count: i64 = tx.query_row(
        "SELECT followers_count FROM profiles WHERE id = ?",
        [following_id],
        |row| row.get(0),
    )?;
    tx.commit()?;

    tracing::debug!(follower_id, following_id, active = removed == 0, "Toggled follow");
    Ok(Toggle {
        active: removed == 0,
        count,
    })
}

pub fn is_following(db: &Database, follower_id: i64, following_id: i64) -> Result<bool> {
    let conn = db.get()?;
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM follows WHERE follower_id = ? AND following_id = ?",
            (follower_id, following_id),
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn viewer_state(db: &Database, user_id: i64, story_id: i64) -> Result<ViewerState> {
    let conn = db.get()?;
    Ok(ViewerState {
        liked: has_row(&conn, "likes", user_id, story_id)?,
        bookmarked: has_row(&conn, "bookmarks", user_id, story_id)?,
        subscribed: has_row(&conn, "subscriptions", user_id, story_id)?,
    })
}

fn has_row(conn: &Connection, table: &str, user_id: i64, story_id: i64) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {} WHERE user_id = ? AND story_id = ?", table),
            (user_id, story_id),
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn visible_story(conn: &Connection, story_id: i64) -> Result<Option<(StoryType, Option<i64>)>> {
    let row: Option<(String, Option<i64>)> = conn
        .query_row(
            "SELECT story_type, series_id FROM stories WHERE id = ? AND status != 'draft'",
            [story_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row.map(|(t, series_id)| (t.parse().unwrap_or(StoryType::OneTime), series_id)))
}
