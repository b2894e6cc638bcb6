//! toolgate CLI, the operator entry point.
//!
//! Commands:
//! - `onboard`: write a default config file
//! - `config`: show, validate or locate the config
//! - `tools`: list the tools a set of groups may use
//! - `run-tool`: run one tool call through the full pipeline
//! - `conversations`: browse conversations in the file store

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolgate",
    about = "toolgate: permissioned tool execution for LLM agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// List the tools visible to a set of groups
    Tools {
        /// Comma-separated group memberships
        #[arg(short, long, value_delimiter = ',')]
        groups: Vec<String>,
    },

    /// Run one tool call through authorization, validation, scoping and audit
    RunTool {
        /// Tool name
        #[arg(short, long)]
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Bearer token resolved against the configured users
        #[arg(long, env = "TOOLGATE_TOKEN", conflicts_with_all = ["user", "groups", "attr"])]
        token: Option<String>,

        /// User id to run as
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Comma-separated group memberships
        #[arg(short, long, value_delimiter = ',')]
        groups: Vec<String>,

        /// User attribute as key=value (repeatable)
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attr: Vec<String>,
    },

    /// Browse stored conversations
    Conversations {
        /// Owner whose conversations to list
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Print one conversation in full
        #[arg(long)]
        show: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run()?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
        Commands::Tools { groups } => commands::tools::run(groups)?,
        Commands::RunTool {
            name,
            args,
            token,
            user,
            groups,
            attr,
        } => {
            let caller = match token {
                Some(token) => commands::run_tool::Caller::Token(token),
                None => commands::run_tool::Caller::Explicit {
                    id: user,
                    groups,
                    attributes: attr,
                },
            };
            commands::run_tool::run(&name, &args, caller).await?
        }
        Commands::Conversations { user, show, limit } => {
            commands::conversations::run(&user, show.as_deref(), limit).await?
        }
    }

    Ok(())
}
