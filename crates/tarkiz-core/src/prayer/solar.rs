//! Low-precision solar position.
//!
//! Times here are fractional hours of *local apparent longitude time*
//! (UT + longitude/15) on the requested day. The engine converts them to
//! instants.

use chrono::{Datelike, NaiveDate};

/// Sun declination (degrees) and equation of time (hours).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SunPosition {
    pub declination: f64,
    pub equation_of_time: f64,
}

/// Julian day number at 00:00 UT of `date`.
pub(crate) fn julian_day(date: NaiveDate) -> f64 {
    let (mut year, mut month) = (date.year() as f64, date.month() as f64);
    let day = date.day() as f64;
    if month <= 2.0 {
        year -= 1.0;
        month += 12.0;
    }
    let a = (year / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();
    (365.25 * (year + 4716.0)).floor() + (30.6001 * (month + 1.0)).floor() + day + b - 1524.5
}

pub(crate) fn sun_position(jd: f64) -> SunPosition {
    let d = jd - 2451545.0;
    let g = fix_angle(357.529 + 0.98560028 * d);
    let q = fix_angle(280.459 + 0.98564736 * d);
    let l = fix_angle(q + 1.915 * dsin(g) + 0.020 * dsin(2.0 * g));
    let e = 23.439 - 0.00000036 * d;

    let ra = darctan2(dcos(e) * dsin(l), dcos(l)) / 15.0;
    SunPosition {
        declination: darcsin(dsin(e) * dsin(l)),
        equation_of_time: q / 15.0 - fix_hour(ra),
    }
}

/// Solar geometry for one day and observer.
pub(crate) struct SolarDay {
    /// Julian day at local longitude midnight.
    jd: f64,
    latitude: f64,
}

impl SolarDay {
    pub fn new(date: NaiveDate, latitude: f64, longitude: f64) -> Self {
        Self {
            jd: julian_day(date) - longitude / 360.0,
            latitude,
        }
    }

    fn position_at(&self, hours: f64) -> SunPosition {
        sun_position(self.jd + hours / 24.0)
    }

    /// True solar noon near `hours`.
    pub fn mid_day(&self, hours: f64) -> f64 {
        let eqt = self.position_at(hours).equation_of_time;
        fix_hour(12.0 - eqt)
    }

    /// Time at which the sun sits `angle` degrees below the horizon, before
    /// (`before_noon`) or after noon. Negative angles are above the horizon.
    /// `None` when the sun never reaches that altitude on this day.
    pub fn sun_angle_time(&self, angle: f64, hours: f64, before_noon: bool) -> Option<f64> {
        let decl = self.position_at(hours).declination;
        let noon = self.mid_day(hours);
        let cos_h = (-dsin(angle) - dsin(decl) * dsin(self.latitude))
            / (dcos(decl) * dcos(self.latitude));
        if !cos_h.is_finite() || !(-1.0..=1.0).contains(&cos_h) {
            return None;
        }
        let t = darccos(cos_h) / 15.0;
        Some(if before_noon { noon - t } else { noon + t })
    }

    /// Asr: shadow length = `factor` * object length + noon shadow.
    pub fn asr_time(&self, factor: f64, hours: f64) -> Option<f64> {
        let decl = self.position_at(hours).declination;
        let angle = -darccot(factor + dtan((self.latitude - decl).abs()));
        self.sun_angle_time(angle, hours, false)
    }
}

/// Rise/set depression including refraction and horizon dip for elevation.
pub(crate) fn rise_set_angle(elevation_m: f64) -> f64 {
    0.833 + 0.0347 * elevation_m.max(0.0).sqrt()
}

pub(crate) fn fix_angle(a: f64) -> f64 {
    a.rem_euclid(360.0)
}

pub(crate) fn fix_hour(h: f64) -> f64 {
    h.rem_euclid(24.0)
}

fn dsin(d: f64) -> f64 {
    d.to_radians().sin()
}

fn dcos(d: f64) -> f64 {
    d.to_radians().cos()
}

fn dtan(d: f64) -> f64 {
    d.to_radians().tan()
}

fn darcsin(x: f64) -> f64 {
    x.asin().to_degrees()
}

fn darccos(x: f64) -> f64 {
    x.acos().to_degrees()
}

fn darctan2(y: f64, x: f64) -> f64 {
    y.atan2(x).to_degrees()
}

fn darccot(x: f64) -> f64 {
    (1.0 / x).atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn julian_day_of_j2000() {
        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(julian_day(date), 2451544.5);
    }

    #[test]
    fn declination_near_solstices_and_equinox() {
        let june = sun_position(julian_day(NaiveDate::from_ymd_opt(2024, 6, 21).unwrap()));
        assert!((june.declination - 23.44).abs() < 0.1, "{}", june.declination);

        let december = sun_position(julian_day(NaiveDate::from_ymd_opt(2024, 12, 21).unwrap()));
        assert!((december.declination + 23.44).abs() < 0.1, "{}", december.declination);

        let march = sun_position(julian_day(NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()));
        assert!(march.declination.abs() < 0.6, "{}", march.declination);
    }

    #[test]
    fn equation_of_time_early_november_peak() {
        // Sundials run about 16 minutes fast in early November.
        let pos = sun_position(julian_day(NaiveDate::from_ymd_opt(2024, 11, 3).unwrap()));
        let minutes = pos.equation_of_time * 60.0;
        assert!((minutes - 16.4).abs() < 0.5, "{minutes}");
    }

    #[test]
    fn sun_never_sets_at_midsummer_in_the_arctic() {
        let day = SolarDay::new(NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(), 78.2, 15.6);
        assert!(day.sun_angle_time(rise_set_angle(0.0), 6.0, true).is_none());
    }

    #[test]
    fn elevation_deepens_rise_set_angle() {
        assert_eq!(rise_set_angle(0.0), 0.833);
        assert!(rise_set_angle(400.0) > rise_set_angle(0.0));
        assert_eq!(rise_set_angle(-20.0), 0.833);
    }
}
