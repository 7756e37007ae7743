use chrono::Utc;
use clap::Args;
use tarkiz_core::prayer::{parse_date, PrayerName};
use tarkiz_core::{Config, MethodRegistry};

use super::{local_today, schedule_for, CmdResult};

#[derive(Args)]
pub struct TimesArgs {
    /// Day to compute (YYYY-MM-DD), defaults to today at the configured location
    #[arg(long)]
    date: Option<String>,
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: TimesArgs) -> CmdResult {
    let config = Config::load()?;
    let now = Utc::now();
    let date = match args.date.as_deref() {
        Some(s) => parse_date(s)?,
        None => local_today(&config, now),
    };
    let schedule = schedule_for(&config, date)?;
    let method = config.method(&MethodRegistry::new())?;

    if args.json {
        let times: Vec<serde_json::Value> = schedule
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "at": t.at,
                    "local": schedule.format_local(t.name),
                })
            })
            .collect();
        let out = serde_json::json!({
            "date": schedule.date(),
            "location": config.location.city,
            "timezone_offset_minutes": schedule.timezone_offset_minutes(),
            "method": method.id,
            "times": times,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let place = config.location.city.clone().unwrap_or_else(|| {
        format!("{:.4}, {:.4}", config.location.latitude, config.location.longitude)
    });
    println!("{} · {} · {}", schedule.date(), place, method.name);
    let current = schedule.current(now).map(|t| t.name);
    for name in PrayerName::ALL {
        let marker = if Some(name) == current { "▶" } else { " " };
        println!(
            "{marker} {:<8} {:>8}  {}",
            name.as_str(),
            schedule.format_local(name),
            name.arabic_name()
        );
    }
    if let Some(next) = schedule.next(now) {
        let minutes = (next.at - now).num_minutes();
        println!("next: {} in {}h {:02}m", next.name, minutes / 60, minutes % 60);
    }
    Ok(())
}
