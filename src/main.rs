use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use fxr::core::log::init_logging;
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fxr::AppCommand {
    fn from(cmd: Commands) -> fxr::AppCommand {
        match cmd {
            Commands::Rate {
                source,
                target,
                date,
                from,
                to,
            } => fxr::AppCommand::Rate {
                source,
                target,
                date,
                from,
                to,
            },
            Commands::Convert {
                amount,
                source,
                target,
                date,
            } => fxr::AppCommand::Convert {
                amount,
                source,
                target,
                date,
            },
            Commands::Backfill {
                source,
                target,
                from,
                to,
                wait,
            } => fxr::AppCommand::Backfill {
                source,
                target,
                from,
                to,
                wait,
            },
            Commands::Refresh { base, date } => fxr::AppCommand::Refresh { base, date },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Resolve an exchange rate for a date or a date range
    Rate {
        /// Source currency code
        source: String,
        /// Target currency code
        target: String,
        /// Valuation date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Start of a date range
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        /// End of a date range
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },
    /// Convert an amount between two currencies
    Convert {
        /// Amount in the source currency
        amount: Decimal,
        /// Source currency code
        source: String,
        /// Target currency code
        target: String,
        /// Valuation date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Fetch and store a historical range in the background
    Backfill {
        /// Source currency code
        source: String,
        /// Target currency code
        target: String,
        /// First date of the window
        #[arg(long)]
        from: NaiveDate,
        /// Last date of the window
        #[arg(long)]
        to: NaiveDate,
        /// Watch the job until it finishes
        #[arg(long)]
        wait: bool,
    },
    /// Refresh the configured currencies against the base currency
    Refresh {
        /// Base currency (defaults to the configured one)
        #[arg(long)]
        base: Option<String>,
        /// Valuation date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fxr::cli::setup::setup(),
        Some(cmd) => fxr::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
