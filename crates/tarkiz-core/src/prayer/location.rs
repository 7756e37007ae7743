//! Popular cities offered during onboarding.
//!
//! Offsets are standard time; daylight saving is not modelled.

use serde::Serialize;

use super::GeoCoordinate;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct City {
    pub name: &'static str,
    pub country: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_m: f64,
    pub timezone_offset_minutes: i32,
}

impl City {
    pub fn coordinate(&self) -> GeoCoordinate {
        GeoCoordinate {
            latitude: self.latitude,
            longitude: self.longitude,
            elevation_m: self.elevation_m,
            timezone_offset_minutes: self.timezone_offset_minutes,
        }
    }

    pub fn label(&self) -> String {
        format!("{}, {}", self.name, self.country)
    }
}

const fn city(
    name: &'static str,
    country: &'static str,
    latitude: f64,
    longitude: f64,
    elevation_m: f64,
    timezone_offset_minutes: i32,
) -> City {
    City {
        name,
        country,
        latitude,
        longitude,
        elevation_m,
        timezone_offset_minutes,
    }
}

const CITIES: [City; 8] = [
    city("New York", "USA", 40.7128, -74.0060, 10.0, -300),
    city("London", "UK", 51.5074, -0.1278, 11.0, 0),
    city("Dubai", "UAE", 25.2048, 55.2708, 5.0, 240),
    city("Makkah", "Saudi Arabia", 21.3891, 39.8579, 277.0, 180),
    city("Cairo", "Egypt", 30.0444, 31.2357, 23.0, 120),
    city("Istanbul", "Turkey", 41.0082, 28.9784, 39.0, 180),
    city("Karachi", "Pakistan", 24.8607, 67.0011, 8.0, 300),
    city("Toronto", "Canada", 43.6532, -79.3832, 76.0, -300),
];

pub fn popular_cities() -> &'static [City] {
    &CITIES
}

/// Match on city name, or on the `City, Country` label, ignoring case.
pub fn find_city(name: &str) -> Result<&'static City> {
    let key = name.trim();
    CITIES
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(key) || c.label().eq_ignore_ascii_case(key))
        .ok_or_else(|| CoreError::not_found("city", name))
}
