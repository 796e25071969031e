use clap::Parser;
use std::path::PathBuf;

/// Toolsmith - tool registry, agent session server and self-learning runtime
#[derive(Parser, Debug, Clone)]
#[command(name = "toolsmith", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "TOOLSMITH_CONFIG", default_value = "toolsmith.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "TOOLSMITH_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "TOOLSMITH_PORT")]
    pub port: Option<u16>,

    /// SQLite URL of the learning store (e.g. "sqlite://toolsmith.db")
    #[arg(long, env = "TOOLSMITH_DATABASE_URL")]
    pub database_url: Option<String>,
}
