use crate::Config;
use anyhow::Result;
use std::path::PathBuf;

pub async fn run(path: PathBuf, name: Option<String>) -> Result<()> {
    let config_path = path.join("heartecho.toml");
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    let mut config = Config::default();
    if let Some(name) = name {
        config.site.title = name;
    }

    std::fs::create_dir_all(&path)?;
    std::fs::create_dir_all(path.join("data"))?;
    std::fs::create_dir_all(path.join(&config.media.upload_dir))?;
    std::fs::write(&config_path, toml::to_string_pretty(&config)?)?;

    tracing::info!("Created new HeartEcho site at {:?}", path);
    tracing::info!("Run 'heartecho migrate' to set up the database");
    tracing::info!("Run 'heartecho serve' to start the server");

    Ok(())
}
