use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: default_description(),
            url: default_url(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_size: default_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentConfig {
    #[serde(default = "default_stories_per_page")]
    pub stories_per_page: usize,
    #[serde(default = "default_excerpt_length")]
    pub excerpt_length: usize,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default = "default_featured_count")]
    pub featured_count: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            stories_per_page: default_stories_per_page(),
            excerpt_length: default_excerpt_length(),
            max_tags: default_max_tags(),
            featured_count: default_featured_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_max_upload")]
    pub max_upload_size: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_size: default_max_upload(),
        }
    }
}

impl MediaConfig {
    pub fn max_upload_bytes(&self) -> Result<usize> {
        parse_size(&self.max_upload_size)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_lifetime")]
    pub session_lifetime: String,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
    #[serde(default = "default_min_username_length")]
    pub min_username_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_lifetime: default_session_lifetime(),
            min_password_length: default_min_password_length(),
            min_username_length: default_min_username_length(),
        }
    }
}

impl AuthConfig {
    pub fn session_days(&self) -> Result<i64> {
        parse_days(&self.session_lifetime)
    }
}

fn default_title() -> String {
    "HeartEcho".to_string()
}

fn default_description() -> String {
    "Stories of heartbreak, healing and everything in between".to_string()
}

fn default_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_path() -> String {
    "./data/heartecho.db".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_stories_per_page() -> usize {
    12
}

fn default_excerpt_length() -> usize {
    200
}

fn default_max_tags() -> usize {
    5
}

fn default_featured_count() -> usize {
    3
}

fn default_upload_dir() -> String {
    "./data/media".to_string()
}

fn default_max_upload() -> String {
    "5MB".to_string()
}

fn default_session_lifetime() -> String {
    "7d".to_string()
}

fn default_min_password_length() -> usize {
    6
}

fn default_min_username_length() -> usize {
    3
}

/// Parses sizes such as `"512KB"`, `"5MB"` or a bare byte count.
pub fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim().to_uppercase();
    let (number, multiplier) = if let Some(n) = s.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };
    let value: usize = number
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid size '{}'", s))?;
    Ok(value * multiplier)
}

/// Parses lifetimes such as `"7d"` or `"2w"` into whole days.
pub fn parse_days(s: &str) -> Result<i64> {
    let s = s.trim().to_lowercase();
    let (number, factor) = if let Some(n) = s.strip_suffix('w') {
        (n, 7)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };
    let value: i64 = number
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid duration '{}'", s))?;
    if value <= 0 {
        anyhow::bail!("Duration '{}' must be positive", s);
    }
    Ok(value * factor)
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Could not read config file '{}': {}. Run 'heartecho init' first?",
                path.display(),
                e
            )
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.stories_per_page == 0 {
            anyhow::bail!("content.stories_per_page must be greater than 0");
        }
        if self.content.stories_per_page > 100 {
            anyhow::bail!("content.stories_per_page must be 100 or less");
        }
        if self.content.excerpt_length == 0 {
            anyhow::bail!("content.excerpt_length must be greater than 0");
        }
        if self.content.excerpt_length > 10000 {
            anyhow::bail!("content.excerpt_length must be 10000 or less");
        }
        if self.auth.min_password_length == 0 || self.auth.min_username_length == 0 {
            anyhow::bail!("auth minimum lengths must be greater than 0");
        }
        self.media.max_upload_bytes()?;
        self.auth.session_days()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [site]
            title = "Broken Hearts Club"

            [content]
            stories_per_page = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.site.title, "Broken Hearts Club");
        assert_eq!(config.content.stories_per_page, 20);
        assert_eq!(config.content.max_tags, 5);
        assert_eq!(config.auth.min_password_length, 6);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("5MB").unwrap(), 5 * 1024 * 1024);
        assert_eq!(parse_size("512kb").unwrap(), 512 * 1024);
        assert_eq!(parse_size("100").unwrap(), 100);
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days("7d").unwrap(), 7);
        assert_eq!(parse_days("2w").unwrap(), 14);
        assert!(parse_days("0d").is_err());
        assert!(parse_days("soon").is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.content.stories_per_page = 0;
        assert!(config.validate().is_err());
    }
}
