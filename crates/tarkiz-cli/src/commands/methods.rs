use clap::Subcommand;
use tarkiz_core::prayer::IshaRule;
use tarkiz_core::MethodRegistry;

use super::CmdResult;

#[derive(Subcommand)]
pub enum MethodsAction {
    /// List built-in calculation methods
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one method in detail
    Show {
        /// Method id or name (e.g. "mwl", "Umm al-Qura")
        id: String,
    },
}

pub fn run(action: MethodsAction) -> CmdResult {
    let registry = MethodRegistry::new();
    match action {
        MethodsAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(registry.list())?);
            } else {
                for method in registry.list() {
                    println!("{:<8} {:<28} {}", method.id, method.name, method.description());
                }
            }
        }
        MethodsAction::Show { id } => {
            let method = registry.get(&id)?;
            println!("id:          {}", method.id);
            println!("name:        {}", method.name);
            println!("region:      {}", method.region);
            println!("fajr angle:  {}°", method.fajr_angle);
            match method.isha {
                IshaRule::Angle(a) => println!("isha angle:  {a}°"),
                IshaRule::Interval(m) => println!("isha:        {m} min after maghrib"),
            }
            println!("asr:         {:?}", method.asr);
            println!("high lat:    {:?}", method.high_latitude_rule);
            println!("dhuhr:       +{} min", method.dhuhr_margin_minutes);
        }
    }
    Ok(())
}
