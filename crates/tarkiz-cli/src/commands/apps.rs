use chrono::Utc;
use clap::Subcommand;
use tarkiz_core::blocklist::ALL_CATEGORIES;
use tarkiz_core::storage::Database;
use tarkiz_core::Config;

use super::{load_blocklist, load_machine, CmdResult};

#[derive(Subcommand)]
pub enum AppsAction {
    /// List apps
    List {
        /// Only show one category
        #[arg(long, default_value = ALL_CATEGORIES)]
        category: String,
        /// Case-insensitive name filter
        #[arg(long, default_value = "")]
        search: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flip whether an app is blocked
    Toggle { id: String },
    /// Block every app
    BlockAll,
    /// Unblock every app
    UnblockAll,
    /// Apps blocked right now
    Enforced,
}

pub fn run(action: AppsAction) -> CmdResult {
    let db = Database::open()?;
    let mut blocklist = load_blocklist(&db);

    match action {
        AppsAction::List {
            category,
            search,
            json,
        } => {
            let apps = blocklist.filter(&category, &search);
            if json {
                println!("{}", serde_json::to_string_pretty(&apps)?);
                return Ok(());
            }
            for app in apps {
                let mark = if app.blocked { "[x]" } else { "[ ]" };
                let usage = app.daily_average.as_deref().unwrap_or("-");
                println!(
                    "{mark} {:<12} {:<14} {:<14} {usage}",
                    app.id, app.display_name, app.category
                );
            }
            println!("{} blocked", blocklist.blocked_count());
        }
        AppsAction::Toggle { id } => {
            let blocked = blocklist.toggle(&id)?;
            db.save_blocklist(&blocklist)?;
            println!("{id}: {}", if blocked { "blocked" } else { "allowed" });
        }
        AppsAction::BlockAll => {
            blocklist.set_all(true);
            db.save_blocklist(&blocklist)?;
            println!("{} blocked", blocklist.blocked_count());
        }
        AppsAction::UnblockAll => {
            blocklist.set_all(false);
            db.save_blocklist(&blocklist)?;
            println!("all apps allowed");
        }
        AppsAction::Enforced => {
            let config = Config::load()?;
            let machine = load_machine(&db, &config, Utc::now())?;
            let enforced = blocklist.enforced(machine.state());
            if enforced.is_empty() {
                println!("nothing blocked right now");
            }
            for app in enforced {
                println!("{}", app.id);
            }
        }
    }
    Ok(())
}
