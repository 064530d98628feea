pub mod feature;
pub mod init;
pub mod migrate;
pub mod serve;
pub mod user;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "heartecho")]
#[command(version)]
#[command(about = "A self-hosted home for stories, series and novels", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = "heartecho.toml", env = "HEARTECHO_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a config file and data directories
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the web server
    Serve {
        /// Overrides `server.host`
        #[arg(short = 'H', long)]
        host: Option<String>,
        /// Overrides `server.port`
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply pending database migrations
    Migrate {
        #[command(subcommand)]
        command: Option<MigrateCommand>,
    },
    /// Manage accounts
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Feature a story on the home page, or remove it with --off
    Feature {
        story_id: i64,
        #[arg(long)]
        off: bool,
    },
}

#[derive(Subcommand)]
pub enum MigrateCommand {
    /// Show which migrations have been applied
    Status,
}

#[derive(Subcommand)]
pub enum UserCommand {
    List,
    Remove { username: String },
    Passwd { username: String },
}
