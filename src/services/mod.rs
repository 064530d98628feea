pub mod auth;
pub mod comments;
pub mod engagement;
pub mod markdown;
pub mod media;
pub mod profiles;
pub mod series;
pub mod stories;

/// Current time in the RFC 3339 form every table stores.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
