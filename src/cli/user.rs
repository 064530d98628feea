use crate::{services::auth, services::profiles, Config, Database};
use anyhow::Result;
use std::path::Path;

use super::UserCommand;

const LIST_PAGE: usize = 10_000;

pub async fn run(config_path: &Path, command: UserCommand) -> Result<()> {
    let config = Config::load(config_path)?;
    let db = Database::open(&config.database.path, config.database.pool_size)?;

    match command {
        UserCommand::List => {
            let authors = profiles::list_authors(&db, LIST_PAGE, 0)?;

            println!("{:<6} {:<24} {:<32} {:>8} {:>10}", "ID", "USERNAME", "EMAIL", "STORIES", "FOLLOWERS");
            println!("{}", "-".repeat(84));
            for p in authors {
                println!(
                    "{:<6} {:<24} {:<32} {:>8} {:>10}",
                    p.id, p.username, p.email, p.stories_count, p.followers_count
                );
            }
        }
        UserCommand::Remove { username } => {
            if auth::delete_user(&db, &username)? {
                tracing::info!("User '{}' removed along with their stories", username);
            } else {
                tracing::warn!("User '{}' not found", username);
            }
        }
        UserCommand::Passwd { username } => {
            let password = rpassword::prompt_password("New password: ")?;
            let password_confirm = rpassword::prompt_password("Confirm password: ")?;

            if password != password_confirm {
                anyhow::bail!("Passwords do not match");
            }

            auth::update_password(&db, &config.auth, &username, &password)?;
            tracing::info!("Password updated for '{}'", username);
        }
    }

    Ok(())
}
