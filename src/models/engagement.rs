use serde::Serialize;

/// Result of a toggle command, read back after the write committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Toggle {
    pub active: bool,
    pub count: i64,
}

/// What the signed-in reader has already done to a story.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewerState {
    pub liked: bool,
    pub bookmarked: bool,
    pub subscribed: bool,
}
