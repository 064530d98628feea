use crate::services::markdown::MarkdownRenderer;
use crate::services::series::parse_timestamp;
use crate::web::security::RateLimiter;
use crate::{Config, Database};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tera::{Tera, Value};

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub templates: Tera,
    pub markdown: MarkdownRenderer,
    pub media_dir: PathBuf,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let mut templates = Tera::default();

        templates.register_filter("format_date", format_date_filter);
        templates.register_filter("truncate_str", truncate_str_filter);
        templates.add_raw_templates(vec![
            ("css/style.css", include_str!("../../templates/css/style.css")),
            ("js/story.js", include_str!("../../templates/js/story.js")),
            ("base.html", include_str!("../../templates/base.html")),
            ("macros.html", include_str!("../../templates/macros.html")),
            ("home.html", include_str!("../../templates/home.html")),
            ("stories.html", include_str!("../../templates/stories.html")),
            ("story.html", include_str!("../../templates/story.html")),
            ("authors.html", include_str!("../../templates/authors.html")),
            ("profile.html", include_str!("../../templates/profile.html")),
            ("dashboard.html", include_str!("../../templates/dashboard.html")),
            ("write.html", include_str!("../../templates/write.html")),
            ("settings.html", include_str!("../../templates/settings.html")),
            ("auth/signup.html", include_str!("../../templates/auth/signup.html")),
            ("auth/signin.html", include_str!("../../templates/auth/signin.html")),
            ("404.html", include_str!("../../templates/404.html")),
        ])?;

        let media_dir = PathBuf::from(&config.media.upload_dir);

        Ok(Self {
            config,
            db,
            templates,
            markdown: MarkdownRenderer::new(),
            media_dir,
            rate_limiter: Arc::new(RateLimiter::default()),
        })
    }
}

fn format_date_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let date_str = match value.as_str() {
        Some(s) => s,
        None if value.is_null() => return Ok(Value::String(String::new())),
        None => return Err(tera::Error::msg("format_date requires a string")),
    };

    let format = args
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("%B %d, %Y");

    match parse_timestamp(date_str) {
        Some(dt) => Ok(Value::String(dt.format(format).to_string())),
        None => Ok(Value::String(date_str.to_string())),
    }
}

fn truncate_str_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value.as_str().ok_or_else(|| tera::Error::msg("truncate_str requires a string"))?;
    let len = args.get("len").and_then(|v| v.as_u64()).unwrap_or(16) as usize;
    if s.chars().count() > len {
        let cut: String = s.chars().take(len).collect();
        Ok(Value::String(format!("{}...", cut.trim_end())))
    } else {
        Ok(Value::String(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_format_date_filter() {
        let out = format_date_filter(&Value::String("2024-03-05T10:00:00Z".into()), &args(&[])).unwrap();
        assert_eq!(out, Value::String("March 05, 2024".into()));

        let out = format_date_filter(
            &Value::String("2024-03-05 10:00:00".into()),
            &args(&[("format", Value::String("%Y/%m/%d".into()))]),
        )
        .unwrap();
        assert_eq!(out, Value::String("2024/03/05".into()));

        let out = format_date_filter(&Value::Null, &args(&[])).unwrap();
        assert_eq!(out, Value::String(String::new()));
    }

    #[test]
    fn test_truncate_str_filter_respects_char_boundaries() {
        let out = truncate_str_filter(
            &Value::String("héllo wörld".into()),
            &args(&[("len", Value::from(5))]),
        )
        .unwrap();
        assert_eq!(out, Value::String("héllo...".into()));

        let out = truncate_str_filter(&Value::String("short".into()), &args(&[])).unwrap();
        assert_eq!(out, Value::String("short".into()));
    }
}
