use super::ProfileSummary;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub story_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub likes_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<ProfileSummary>,
    pub replies: Vec<CommentThread>,
}
