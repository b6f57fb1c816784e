use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "mediastack-setup")]
#[command(about = "Configure a running media-automation stack through its service APIs")]
pub struct CliArgs {
    /// Path to the stack configuration file
    #[arg(short, long, default_value = "stack.toml")]
    pub config: String,

    /// Stack directory that relative config_dir and env_files paths resolve against
    #[arg(long, default_value = ".")]
    pub root: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Wait for services, extract secrets, patch env files and configure services
    Run {
        /// Exit successfully as long as at least one action succeeded
        #[arg(long)]
        allow_partial: bool,

        /// Print the outcome ledger as JSON
        #[arg(long)]
        json: bool,
    },
    /// Probe service health once and exit
    Probe {
        /// Services to probe (defaults to every enabled service)
        services: Vec<String>,
    },
}

impl CliArgs {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run {
            allow_partial: false,
            json: false,
        })
    }
}
