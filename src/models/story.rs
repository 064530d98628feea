use super::ProfileSummary;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryType {
    #[default]
    OneTime,
    Series,
    Novel,
}

impl FromStr for StoryType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "one_time" => Ok(Self::OneTime),
            "series" => Ok(Self::Series),
            "novel" => Ok(Self::Novel),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for StoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneTime => write!(f, "one_time"),
            Self::Series => write!(f, "series"),
            Self::Novel => write!(f, "novel"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    #[default]
    Draft,
    Published,
    Completed,
    OnHold,
}

impl StoryStatus {
    /// Everything except drafts is readable by other users.
    pub fn is_visible(self) -> bool {
        self != Self::Draft
    }
}

impl FromStr for StoryStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "completed" => Ok(Self::Completed),
            "on_hold" => Ok(Self::OnHold),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Completed => write!(f, "completed"),
            Self::OnHold => write!(f, "on_hold"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Story {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub cover_image_url: Option<String>,
    pub story_type: StoryType,
    pub status: StoryStatus,
    pub tags: Vec<String>,
    pub genre: Option<String>,
    pub chapter_number: i64,
    /// `None` for standalone posts and for the root of a series or novel.
    pub series_id: Option<i64>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub bookmarks_count: i64,
    pub views_count: i64,
    pub is_featured: bool,
    pub published_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Story {
    /// Standalone posts and series/novel roots are listed on their own;
    /// everything else is a chapter of the work named by `series_id`.
    pub fn is_top_level(&self) -> bool {
        self.story_type == StoryType::OneTime || self.series_id.is_none()
    }

    pub fn is_series_root(&self) -> bool {
        self.story_type != StoryType::OneTime && self.series_id.is_none()
    }

    /// Id of the work this record belongs to.
    pub fn root_id(&self) -> i64 {
        match self.series_id {
            Some(id) if self.story_type != StoryType::OneTime => id,
            _ => self.id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoryWithAuthor {
    #[serde(flatten)]
    pub story: Story,
    pub author: Option<ProfileSummary>,
}

/// A top-level work with its chapters attached in reading order.
#[derive(Debug, Clone, Serialize)]
pub struct StoryWithChapters {
    #[serde(flatten)]
    pub story: Story,
    pub chapters: Vec<Story>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChapterLink {
    pub id: i64,
    pub title: String,
    pub chapter_number: i64,
}

impl From<&Story> for ChapterLink {
    fn from(story: &Story) -> Self {
        Self {
            id: story.id,
            title: story.title.clone(),
            chapter_number: story.chapter_number,
        }
    }
}

/// Prev/next context for a chapter within its work.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterNavigation {
    pub chapter_number: i64,
    pub total_chapters: usize,
    pub prev: Option<ChapterLink>,
    pub next: Option<ChapterLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    #[default]
    Publish,
    Draft,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoryInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub excerpt: Option<String>,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub story_type: StoryType,
    pub genre: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set when writing a new chapter of an existing work.
    pub series_id: Option<i64>,
    /// Only honoured when editing an existing chapter.
    pub chapter_number: Option<i64>,
}
