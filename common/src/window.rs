use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::config::{ActiveWindow, Coordinates, HourSpec, SolarEvent};

/// Zenith used for sunset: 90 degrees plus atmospheric refraction and the
/// apparent solar radius.
const SUNSET_ZENITH_DEG: f64 = 90.833;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WindowError {
    #[error("the sun does not set on {date} at ({latitude}, {longitude})")]
    NoSunset {
        date: NaiveDate,
        latitude: f64,
        longitude: f64,
    },
}

impl HourSpec {
    /// Wall-clock time this boundary falls on for the day of `now`, in
    /// `now`'s offset.
    pub fn resolve(&self, now: DateTime<FixedOffset>) -> Result<NaiveTime, WindowError> {
        match *self {
            Self::Fixed { hour } => {
                Ok(NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
            }
            Self::Event {
                event: SolarEvent::Sunset,
                coordinates,
            } => Ok(local_sunset(now.date_naive(), coordinates, *now.offset())?.time()),
        }
    }
}

impl ActiveWindow {
    pub fn resolve(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Result<(NaiveTime, NaiveTime), WindowError> {
        Ok((self.begin.resolve(now)?, self.end.resolve(now)?))
    }

    /// Inclusive `begin <= now <= end` on the time of day only. A window
    /// whose end is earlier than its begin (spanning midnight) never matches.
    pub fn contains(&self, now: DateTime<FixedOffset>) -> Result<bool, WindowError> {
        let (begin, end) = self.resolve(now)?;
        let time = now.time();
        Ok(begin <= time && time <= end)
    }
}

/// Sunset on the local calendar day `date`, expressed in `offset`.
pub fn local_sunset(
    date: NaiveDate,
    coordinates: Coordinates,
    offset: FixedOffset,
) -> Result<DateTime<FixedOffset>, WindowError> {
    let local = sunset_utc(date, coordinates)?.with_timezone(&offset);
    let shift = local.date_naive().signed_duration_since(date);
    if shift.is_zero() {
        return Ok(local);
    }

    // Far from the zone's meridian the UTC result can land on a neighbouring
    // local day; step the UTC date back by the same amount.
    let Some(adjusted) = date.checked_sub_signed(shift) else {
        return Ok(local);
    };
    Ok(sunset_utc(adjusted, coordinates)?.with_timezone(&offset))
}

/// Sunset for the UTC calendar day `date` (NOAA solar position approximation).
pub fn sunset_utc(
    date: NaiveDate,
    coordinates: Coordinates,
) -> Result<DateTime<Utc>, WindowError> {
    let no_sunset = || WindowError::NoSunset {
        date,
        latitude: coordinates.latitude,
        longitude: coordinates.longitude,
    };

    let jd = julian_day(date);
    let mut century = julian_century(jd);
    let mut minutes = 0.0;

    // First pass estimates the time, second pass recomputes the solar
    // position at that estimate.
    for _ in 0..2 {
        let hour_angle = sunset_hour_angle(coordinates.latitude, sun_declination(century))
            .ok_or_else(no_sunset)?;
        let delta = -coordinates.longitude - hour_angle;
        minutes = 720.0 + 4.0 * delta - equation_of_time(century);
        century = julian_century(jd + minutes / 1440.0);
    }

    let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    Ok(midnight + Duration::milliseconds((minutes * 60_000.0).round() as i64))
}

fn julian_day(date: NaiveDate) -> f64 {
    let (mut year, mut month) = (date.year() as f64, date.month() as f64);
    if month <= 2.0 {
        year -= 1.0;
        month += 12.0;
    }
    let a = (year / 100.0).floor();
    let b = 2.0 - a + (a / 4.0).floor();
    (365.25 * (year + 4716.0)).floor() + (30.6001 * (month + 1.0)).floor() + date.day() as f64 + b
        - 1524.5
}

fn julian_century(jd: f64) -> f64 {
    (jd - 2_451_545.0) / 36_525.0
}

fn geom_mean_long_sun(t: f64) -> f64 {
    (280.46646 + t * (36000.76983 + 0.0003032 * t)).rem_euclid(360.0)
}

fn geom_mean_anomaly_sun(t: f64) -> f64 {
    357.52911 + t * (35999.05029 - 0.0001537 * t)
}

fn eccentricity_earth_orbit(t: f64) -> f64 {
    0.016708634 - t * (0.000042037 + 0.0000001267 * t)
}

fn sun_equation_of_center(t: f64) -> f64 {
    let m = geom_mean_anomaly_sun(t).to_radians();
    m.sin() * (1.914602 - t * (0.004817 + 0.000014 * t))
        + (2.0 * m).sin() * (0.019993 - 0.000101 * t)
        + (3.0 * m).sin() * 0.000289
}

fn sun_apparent_long(t: f64) -> f64 {
    let true_long = geom_mean_long_sun(t) + sun_equation_of_center(t);
    true_long - 0.00569 - 0.00478 * (125.04 - 1934.136 * t).to_radians().sin()
}

fn obliquity_correction(t: f64) -> f64 {
    let seconds = 21.448 - t * (46.815 + t * (0.00059 - t * 0.001813));
    let mean = 23.0 + (26.0 + seconds / 60.0) / 60.0;
    mean + 0.00256 * (125.04 - 1934.136 * t).to_radians().cos()
}

fn sun_declination(t: f64) -> f64 {
    let e = obliquity_correction(t).to_radians();
    let lambda = sun_apparent_long(t).to_radians();
    (e.sin() * lambda.sin()).asin().to_degrees()
}

/// Minutes between apparent and mean solar time.
fn equation_of_time(t: f64) -> f64 {
    let e = obliquity_correction(t).to_radians();
    let l0 = geom_mean_long_sun(t).to_radians();
    let ecc = eccentricity_earth_orbit(t);
    let m = geom_mean_anomaly_sun(t).to_radians();
    let y = (e / 2.0).tan().powi(2);

    let value = y * (2.0 * l0).sin() - 2.0 * ecc * m.sin()
        + 4.0 * ecc * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * ecc * ecc * (2.0 * m).sin();
    value.to_degrees() * 4.0
}

/// Hour angle of sunset in degrees (negative, west of the meridian), or
/// `None` when the sun stays above or below the horizon all day.
fn sunset_hour_angle(latitude: f64, declination: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let dec = declination.to_radians();
    let cos_ha =
        (SUNSET_ZENITH_DEG.to_radians().cos() - lat.sin() * dec.sin()) / (lat.cos() * dec.cos());
    if !cos_ha.is_finite() || !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    Some(-cos_ha.acos().to_degrees())
}
