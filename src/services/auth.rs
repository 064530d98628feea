use crate::config::AuthConfig;
use crate::error::invalid;
use crate::models::{Profile, Signup};
use crate::services::profiles::{row_to_profile, PROFILE_COLUMNS};
use crate::Database;
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use rusqlite::{Connection, ErrorCode, OptionalExtension};

const MAX_USERNAME_LENGTH: usize = 30;
const MAX_EMAIL_LENGTH: usize = 254;
const MAX_DISPLAY_NAME_LENGTH: usize = 80;

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

fn validate_username(username: &str, min_len: usize) -> Result<()> {
    if username.chars().count() < min_len {
        return Err(invalid(format!(
            "Username must be at least {} characters",
            min_len
        )));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(invalid(format!(
            "Username must be {} characters or less",
            MAX_USERNAME_LENGTH
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid(
            "Username can only contain letters, numbers, underscores, and hyphens",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(invalid("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(invalid(format!(
            "Email must be {} characters or less",
            MAX_EMAIL_LENGTH
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(invalid("Invalid email format")),
    }
}

pub fn validate_password(password: &str, min_len: usize) -> Result<()> {
    if password.chars().count() < min_len {
        return Err(invalid(format!(
            "Password must be at least {} characters",
            min_len
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$dW5rbm93bg$0000000000000000000000000000000000000000000";

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => {
            if let Ok(dummy) = PasswordHash::new(DUMMY_HASH) {
                let _ = Argon2::default().verify_password(password.as_bytes(), &dummy);
            }
            return false;
        }
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn username_taken(db: &Database, username: &str) -> Result<bool> {
    let conn = db.get()?;
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM profiles WHERE username = ?",
            [normalize_username(username)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Registers a new account and its public profile. Returns the profile id.
pub fn signup(db: &Database, rules: &AuthConfig, input: &Signup) -> Result<i64> {
    if input.password != input.password_confirm {
        return Err(invalid("Passwords do not match"));
    }
    validate_password(&input.password, rules.min_password_length)?;

    let username = normalize_username(&input.username);
    validate_username(&username, rules.min_username_length)?;

    let email = input.email.trim().to_lowercase();
    validate_email(&email)?;

    let display_name = input.display_name.trim();
    if display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(invalid(format!(
            "Display name must be {} characters or less",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }

    if username_taken(db, &username)? {
        return Err(invalid("Username is already taken"));
    }

    let password_hash = hash_password(&input.password)?;

    let conn = db.get()?;
    let email_taken: Option<i64> = conn
        .query_row("SELECT id FROM profiles WHERE email = ?", [&email], |row| {
            row.get(0)
        })
        .optional()?;
    if email_taken.is_some() {
        return Err(invalid("An account with this email already exists"));
    }

    let id = insert_profile(
        &conn,
        &username,
        &email,
        &password_hash,
        Some(display_name).filter(|n| !n.is_empty()),
    )?;
    tracing::info!(user_id = id, username = %username, "Account created");
    Ok(id)
}

/// Inserts the profile row. A concurrent signup can claim the username or
/// email between the checks above and this insert; the UNIQUE constraints
/// catch it and it is reported like the earlier checks.
fn insert_profile(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
    display_name: Option<&str>,
) -> Result<i64> {
    let inserted = conn.execute(
        "INSERT INTO profiles (username, email, password_hash, display_name) VALUES (?, ?, ?, ?)",
        (username, email, password_hash, display_name),
    );
    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, msg)) if e.code == ErrorCode::ConstraintViolation => {
            if msg.as_deref().is_some_and(|m| m.contains("profiles.email")) {
                Err(invalid("An account with this email already exists"))
            } else {
                Err(invalid("Username is already taken"))
            }
        }
        Err(e) => Err(e.into()),
    }
}

pub fn update_password(db: &Database, rules: &AuthConfig, username: &str, password: &str) -> Result<()> {
    validate_password(password, rules.min_password_length)?;
    let password_hash = hash_password(password)?;
    let conn = db.get()?;
    let affected = conn.execute(
        "UPDATE profiles SET password_hash = ? WHERE username = ?",
        (&password_hash, normalize_username(username)),
    )?;
    if affected == 0 {
        return Err(crate::error::not_found("User"));
    }
    Ok(())
}

/// Signs in with either the account email or the username.
pub fn authenticate(db: &Database, login: &str, password: &str) -> Result<Option<Profile>> {
    let login = login.trim().to_lowercase();
    let conn = db.get()?;
    let profile: Option<Profile> = conn
        .query_row(
            &format!(
                "SELECT {} FROM profiles WHERE email = ?1 OR username = ?1",
                PROFILE_COLUMNS
            ),
            [&login],
            row_to_profile,
        )
        .optional()?;

    match profile {
        Some(p) if verify_password(password, &p.password_hash) => Ok(Some(p)),
        Some(_) => Ok(None),
        None => {
            // keep timing similar for unknown accounts
            verify_password(password, DUMMY_HASH);
            Ok(None)
        }
    }
}

pub fn create_session(db: &Database, user_id: i64, duration_days: i64) -> Result<String> {
    let token = generate_session_token();
    let expires_at = (chrono::Utc::now() + chrono::Duration::days(duration_days))
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let conn = db.get()?;
    conn.execute(
        "INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, ?)",
        (user_id, &token, &expires_at),
    )?;
    Ok(token)
}

pub fn validate_session(db: &Database, token: &str) -> Result<Option<Profile>> {
    let now = crate::services::now_timestamp();
    let conn = db.get()?;
    let profile = conn
        .query_row(
            &format!(
                "SELECT {} FROM profiles p JOIN sessions s ON s.user_id = p.id WHERE s.token = ? AND s.expires_at > ?",
                prefixed_columns("p")
            ),
            (token, &now),
            row_to_profile,
        )
        .optional()?;
    Ok(profile)
}

pub fn delete_session(db: &Database, token: &str) -> Result<()> {
    let conn = db.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(())
}

pub fn cleanup_expired_sessions(db: &Database) -> Result<usize> {
    let now = crate::services::now_timestamp();
    let conn = db.get()?;
    let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?", [&now])?;
    Ok(removed)
}

pub fn delete_user(db: &Database, username: &str) -> Result<bool> {
    let conn = db.get()?;
    let affected = conn.execute(
        "DELETE FROM profiles WHERE username = ?",
        [normalize_username(username)],
    )?;
    Ok(affected > 0)
}

fn prefixed_columns(alias: &str) -> String {
    PROFILE_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}
