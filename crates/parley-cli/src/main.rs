use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley - inspect and append to conversation history", long_about = None)]
struct Cli {
    #[command(flatten)]
    target: Target,

    #[command(subcommand)]
    command: Commands,
}

/// Which history to open.
#[derive(Args)]
pub struct Target {
    /// Workspace the project belongs to
    #[arg(long, global = true, default_value = "default")]
    pub workspace: String,

    /// Project whose history is read
    #[arg(long, global = true, default_value = "default")]
    pub project: String,

    /// Use this directory instead of the platform config/data directories
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Explicit config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print stored records instead of grouped messages
    #[arg(long, global = true)]
    pub raw: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Most recent messages
    Latest {
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Messages preceding a message
    Before {
        message_id: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
        /// Day the message is expected in (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Messages following a message
    After {
        message_id: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// A message with its neighbours
    Around {
        message_id: String,
        #[arg(long, default_value_t = 10)]
        before: usize,
        #[arg(long, default_value_t = 10)]
        after: usize,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Every message of one day
    Date { date: NaiveDate },
    /// Days that have history
    Dates,
    /// Append a text fragment
    Append {
        /// Message to append to (a new id is generated when omitted)
        #[arg(long)]
        message_id: Option<String>,
        #[arg(long, default_value = "user")]
        sender_id: String,
        #[arg(long, default_value = "You")]
        sender_name: String,
        /// Content id of the fragment (defaults to the message id)
        #[arg(long)]
        content_id: Option<String>,
        /// Replace the stored record instead of adding to it
        #[arg(long)]
        overwrite: bool,
        text: String,
    },
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let history = commands::history::open(&cli.target).await?;
    let raw = cli.target.raw;

    match cli.command {
        Commands::Latest { count } => commands::history::latest(&history, count, raw).await?,
        Commands::Before {
            message_id,
            count,
            date,
        } => commands::history::before(&history, &message_id, count, date, raw).await?,
        Commands::After {
            message_id,
            count,
            date,
        } => commands::history::after(&history, &message_id, count, date, raw).await?,
        Commands::Around {
            message_id,
            before,
            after,
            date,
        } => commands::history::around(&history, &message_id, before, after, date, raw).await?,
        Commands::Date { date } => commands::history::by_date(&history, date, raw).await?,
        Commands::Dates => commands::history::dates(&history).await?,
        Commands::Append {
            message_id,
            sender_id,
            sender_name,
            content_id,
            overwrite,
            text,
        } => {
            let message_id = message_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let content_id = content_id.unwrap_or_else(|| message_id.clone());
            commands::history::append(
                &history,
                commands::history::AppendArgs {
                    message_id,
                    sender_id,
                    sender_name,
                    content_id,
                    text,
                    append_mode: !overwrite,
                },
            )
            .await?
        }
    }

    Ok(())
}
