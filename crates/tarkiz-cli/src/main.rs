use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "tarkiz", version, about = "Tarkiz prayer-time focus CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's prayer times
    Times(commands::times::TimesArgs),
    /// Calculation methods
    Methods {
        #[command(subcommand)]
        action: commands::methods::MethodsAction,
    },
    /// Location used for prayer times
    Location {
        #[command(subcommand)]
        action: commands::location::LocationAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Blocking session control
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Blocked apps
    Apps {
        #[command(subcommand)]
        action: commands::apps::AppsAction,
    },
    /// Protected-time statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TARKIZ_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Times(args) => commands::times::run(args),
        Commands::Methods { action } => commands::methods::run(action),
        Commands::Location { action } => commands::location::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Session { action } => commands::session::run(action),
        Commands::Apps { action } => commands::apps::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "tarkiz", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
