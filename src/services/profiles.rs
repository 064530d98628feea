use crate::error::{invalid, not_found};
use crate::models::{Profile, ProfileSummary, UpdateProfile};
use crate::services::now_timestamp;
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub(crate) const PROFILE_COLUMNS: &str = "id, username, email, password_hash, display_name, bio, avatar_url, location, website, followers_count, following_count, stories_count, created_at, updated_at";

const MAX_BIO_LENGTH: usize = 500;
const MAX_FIELD_LENGTH: usize = 100;
const MAX_WEBSITE_LENGTH: usize = 2048;

pub fn get_profile(db: &Database, id: i64) -> Result<Option<Profile>> {
    let conn = db.get()?;
    let profile = conn
        .query_row(
            &format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS),
            [id],
            row_to_profile,
        )
        .optional()?;
    Ok(profile)
}

pub fn get_profile_by_username(db: &Database, username: &str) -> Result<Option<Profile>> {
    let conn = db.get()?;
    let profile = conn
        .query_row(
            &format!("SELECT {} FROM profiles WHERE username = ?", PROFILE_COLUMNS),
            [username.trim().to_lowercase()],
            row_to_profile,
        )
        .optional()?;
    Ok(profile)
}

/// Authors directory, newest accounts first.
pub fn list_authors(db: &Database, limit: usize, offset: usize) -> Result<Vec<Profile>> {
    let conn = db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM profiles ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        PROFILE_COLUMNS
    ))?;
    let profiles = stmt
        .query_map((limit, offset), row_to_profile)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}

pub fn count_authors(db: &Database) -> Result<i64> {
    let conn = db.get()?;
    let count = conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
    Ok(count)
}

struct ProfileFields {
    display_name: Option<String>,
    bio: Option<String>,
    location: Option<String>,
    website: Option<String>,
}

fn clean_fields(input: &UpdateProfile) -> Result<ProfileFields> {
    let website = clean_field(input.website.clone(), "Website", MAX_WEBSITE_LENGTH)?;
    if let Some(site) = &website {
        validate_website(site)?;
    }
    Ok(ProfileFields {
        display_name: clean_field(input.display_name.clone(), "Display name", MAX_FIELD_LENGTH)?,
        bio: clean_field(input.bio.clone(), "Bio", MAX_BIO_LENGTH)?,
        location: clean_field(input.location.clone(), "Location", MAX_FIELD_LENGTH)?,
        website,
    })
}

/// Checks the text fields of `input` without touching the database, so
/// callers can reject a form before storing an uploaded avatar.
pub fn validate_update(input: &UpdateProfile) -> Result<()> {
    clean_fields(input).map(|_| ())
}

/// Replaces the editable profile fields. Blank values clear the field.
pub fn update_profile(db: &Database, id: i64, input: UpdateProfile) -> Result<Profile> {
    let ProfileFields {
        display_name,
        bio,
        location,
        website,
    } = clean_fields(&input)?;

    let conn = db.get()?;
    let current_avatar: Option<Option<String>> = conn
        .query_row("SELECT avatar_url FROM profiles WHERE id = ?", [id], |row| {
            row.get(0)
        })
        .optional()?;
    let current_avatar = current_avatar.ok_or_else(|| not_found("Profile"))?;
    let avatar_url = input
        .avatar_url
        .filter(|u| !u.trim().is_empty())
        .or(current_avatar);

    conn.execute(
        "UPDATE profiles SET display_name = ?, bio = ?, location = ?, website = ?, avatar_url = ?, updated_at = ? WHERE id = ?",
        (
            &display_name,
            &bio,
            &location,
            &website,
            &avatar_url,
            now_timestamp(),
            id,
        ),
    )?;

    let profile = conn.query_row(
        &format!("SELECT {} FROM profiles WHERE id = ?", PROFILE_COLUMNS),
        [id],
        row_to_profile,
    )?;
    tracing::info!(user_id = id, "Profile updated");
    Ok(profile)
}

fn clean_field(value: Option<String>, name: &str, max_len: usize) -> Result<Option<String>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if let Some(v) = &value {
        if v.chars().count() > max_len {
            return Err(invalid(format!(
                "{} must be {} characters or less",
                name, max_len
            )));
        }
    }
    Ok(value)
}

fn validate_website(site: &str) -> Result<()> {
    match url::Url::parse(site) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        _ => Err(invalid("Website must be a full http:// or https:// address")),
    }
}

pub(crate) fn profile_summary(conn: &Connection, id: i64) -> Result<Option<ProfileSummary>> {
    let summary = conn
        .query_row(
            "SELECT id, username, display_name, avatar_url FROM profiles WHERE id = ?",
            [id],
            |row| {
                Ok(ProfileSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    display_name: row.get(2)?,
                    avatar_url: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(summary)
}

pub(crate) fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        display_name: row.get(4)?,
        bio: row.get(5)?,
        avatar_url: row.get(6)?,
        location: row.get(7)?,
        website: row.get(8)?,
        followers_count: row.get(9)?,
        following_count: row.get(10)?,
        stories_count: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_field_blank_becomes_none() {
        assert_eq!(clean_field(Some("   ".into()), "Bio", 10).unwrap(), None);
        assert_eq!(
            clean_field(Some(" Lisbon ".into()), "Location", 10).unwrap(),
            Some("Lisbon".to_string())
        );
        assert!(clean_field(Some("x".repeat(11)), "Bio", 10).is_err());
    }

    #[test]
    fn test_validate_update_checks_every_field() {
        assert!(validate_update(&UpdateProfile::default()).is_ok());
        assert!(validate_update(&UpdateProfile {
            website: Some("not a url".into()),
            ..Default::default()
        })
        .is_err());
        assert!(validate_update(&UpdateProfile {
            bio: Some("x".repeat(MAX_BIO_LENGTH + 1)),
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_validate_website() {
        assert!(validate_website("https://example.com").is_ok());
        assert!(validate_website("http://example.com/me").is_ok());
        assert!(validate_website("example.com").is_err());
        assert!(validate_website("javascript:alert(1)").is_err());
    }
}
