use clap::Subcommand;
use tarkiz_core::prayer::{find_city, popular_cities, GeoCoordinate};
use tarkiz_core::Config;

use super::CmdResult;

#[derive(Subcommand)]
pub enum LocationAction {
    /// List popular cities
    Cities,
    /// Use a popular city
    Use {
        /// City name (e.g. "Cairo")
        city: String,
    },
    /// Set coordinates by hand
    Set {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Metres above sea level
        #[arg(long, default_value = "0")]
        elevation: f64,
        /// Offset from UTC in minutes (e.g. -300 for New York)
        #[arg(long, allow_hyphen_values = true)]
        tz_minutes: i32,
    },
    /// Show the current location
    Show,
}

pub fn run(action: LocationAction) -> CmdResult {
    match action {
        LocationAction::Cities => {
            for city in popular_cities() {
                println!(
                    "{:<10} {:<14} {:>9.4} {:>9.4}  UTC{:+}",
                    city.name,
                    city.country,
                    city.latitude,
                    city.longitude,
                    city.timezone_offset_minutes as f64 / 60.0
                );
            }
        }
        LocationAction::Use { city } => {
            let city = find_city(&city)?;
            let mut config = Config::load()?;
            config.use_city(city);
            config.save()?;
            println!("location set to {}", city.label());
        }
        LocationAction::Set {
            lat,
            lon,
            elevation,
            tz_minutes,
        } => {
            let coord = GeoCoordinate::new(lat, lon, elevation, tz_minutes)?;
            let mut config = Config::load()?;
            config.location.city = None;
            config.location.latitude = coord.latitude;
            config.location.longitude = coord.longitude;
            config.location.elevation_m = coord.elevation_m;
            config.location.timezone_offset_minutes = coord.timezone_offset_minutes;
            config.save()?;
            println!("location set to {lat:.4}, {lon:.4}");
        }
        LocationAction::Show => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config.location)?);
        }
    }
    Ok(())
}
