use crate::services::stories;
use crate::{Config, Database};
use anyhow::Result;
use std::path::Path;

pub async fn run(config_path: &Path, story_id: i64, off: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let db = Database::open(&config.database.path, config.database.pool_size)?;

    let story = stories::get_story(&db, story_id)?
        .ok_or_else(|| anyhow::anyhow!("Story {} not found", story_id))?;
    if !off && !story.status.is_visible() {
        anyhow::bail!("Story {} is a draft and cannot be featured", story_id);
    }

    stories::set_featured(&db, story_id, !off)?;
    if off {
        tracing::info!("'{}' is no longer featured", story.title);
    } else {
        tracing::info!("'{}' is now featured", story.title);
    }

    Ok(())
}
