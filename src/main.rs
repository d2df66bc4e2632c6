use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use kurs::core::log::{LogMode, init_logging};

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

impl From<Commands> for kurs::AppCommand {
    fn from(cmd: Commands) -> kurs::AppCommand {
        match cmd {
            Commands::Rates => kurs::AppCommand::Rates,
            Commands::Convert { amount, from, to } => {
                kurs::AppCommand::Convert { amount, from, to }
            }
            Commands::Session => kurs::AppCommand::Session,
            Commands::Serve => kurs::AppCommand::Serve,
            Commands::Subscribe { user_id } => kurs::AppCommand::Subscribe(user_id),
            Commands::Unsubscribe { user_id } => kurs::AppCommand::Unsubscribe(user_id),
            Commands::Subscribers => kurs::AppCommand::Subscribers,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display current exchange rates
    Rates,
    /// Convert an amount into one or more currencies
    Convert {
        /// Amount to convert, `,` or `.` as decimal separator
        amount: String,
        /// Source currency code
        from: String,
        /// Target currency codes, in display order
        #[arg(required = true)]
        to: Vec<String>,
    },
    /// Interactive conversion session on stdin
    Session,
    /// Run the refresh loop and the daily digest until Ctrl-C
    Serve,
    /// Add a user to the daily digest
    Subscribe {
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },
    /// Remove a user from the daily digest
    Unsubscribe {
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },
    /// List digest subscribers
    Subscribers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mode = if matches!(cli.command, Some(Commands::Serve)) {
        LogMode::Daemon
    } else {
        LogMode::Cli
    };
    init_logging(cli.verbose, mode);

    let result = match cli.command {
        Some(Commands::Setup) => kurs::cli::setup::setup(cli.config_path.as_deref()),
        Some(cmd) => kurs::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
