use chrono::Utc;
use clap::Subcommand;
use tarkiz_core::stats::{day_summary, format_minutes, week_summary, DAILY_GOAL_MINUTES};
use tarkiz_core::storage::Database;
use tarkiz_core::Config;

use super::{local_today, CmdResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Protected time today
    Today {
        #[arg(long)]
        json: bool,
    },
    /// The current week, Monday first
    Week {
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: StatsAction) -> CmdResult {
    let config = Config::load()?;
    let db = Database::open()?;
    let events = db.events()?;
    let now = Utc::now();
    let offset = config.location.timezone_offset_minutes;
    let today = local_today(&config, now);

    match action {
        StatsAction::Today { json } => {
            let summary = day_summary(&events, offset, today, now);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{}: {} protected in {} session(s)",
                    summary.label(),
                    format_minutes(summary.protected_minutes),
                    summary.sessions
                );
            }
        }
        StatsAction::Week { json } => {
            let week = week_summary(&events, offset, today, now);
            if json {
                println!("{}", serde_json::to_string_pretty(&week)?);
                return Ok(());
            }
            for day in &week.days {
                let filled = (day.progress * 20.0).round() as usize;
                println!(
                    "{} {:<20} {}",
                    day.label,
                    "#".repeat(filled.min(20)),
                    format_minutes(day.protected_minutes)
                );
            }
            println!(
                "total {} · average {} · goal {}",
                format_minutes(week.total_minutes),
                format_minutes(week.daily_average_minutes),
                format_minutes(DAILY_GOAL_MINUTES)
            );
        }
    }
    Ok(())
}
