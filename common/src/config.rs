use std::{collections::BTreeMap, fmt};

use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config")]
    Parse(#[from] serde_yaml::Error),
    #[error("hours must list exactly two entries, got {0}")]
    HoursLength(usize),
    #[error("hour {0} is outside 0..24")]
    HourOutOfRange(f64),
    #[error("invalid astral time config: expected one event, got {0}")]
    EventEntries(usize),
    #[error("invalid astral event: {0}")]
    UnknownEvent(String),
    #[error("coordinates must be [latitude, longitude], got {0:?}")]
    CoordinatesShape(Vec<f64>),
    #[error("coordinates out of range: latitude {latitude}, longitude {longitude}")]
    CoordinatesRange { latitude: f64, longitude: f64 },
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolarEvent {
    Sunset,
}

impl SolarEvent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sunset" => Some(Self::Sunset),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sunset => "sunset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ConfigError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::CoordinatesRange {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// One boundary of the active window: a wall-clock hour or a solar event
/// observed at a location.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawHourSpec")]
pub enum HourSpec {
    Fixed {
        hour: u32,
    },
    Event {
        event: SolarEvent,
        coordinates: Coordinates,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawHourSpec {
    Hour(f64),
    Event(BTreeMap<String, Vec<f64>>),
}

impl TryFrom<RawHourSpec> for HourSpec {
    type Error = ConfigError;

    fn try_from(raw: RawHourSpec) -> Result<Self, Self::Error> {
        match raw {
            RawHourSpec::Hour(value) => {
                if !value.is_finite() || !(0.0..24.0).contains(&value) {
                    return Err(ConfigError::HourOutOfRange(value));
                }
                Ok(Self::Fixed {
                    hour: value.trunc() as u32,
                })
            }
            RawHourSpec::Event(entries) => {
                if entries.len() != 1 {
                    return Err(ConfigError::EventEntries(entries.len()));
                }
                let Some((name, coordinates)) = entries.into_iter().next() else {
                    return Err(ConfigError::EventEntries(0));
                };
                let event =
                    SolarEvent::from_name(&name).ok_or(ConfigError::UnknownEvent(name))?;
                if coordinates.len() != 2 {
                    return Err(ConfigError::CoordinatesShape(coordinates));
                }
                Ok(Self::Event {
                    event,
                    coordinates: Coordinates::new(coordinates[0], coordinates[1])?,
                })
            }
        }
    }
}

impl fmt::Display for HourSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { hour } => write!(f, "{hour:02}:00"),
            Self::Event { event, coordinates } => write!(
                f,
                "{} at ({}, {})",
                event.as_str(),
                coordinates.latitude,
                coordinates.longitude
            ),
        }
    }
}

/// Daily interval in which the light may be switched on automatically.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Vec<HourSpec>")]
pub struct ActiveWindow {
    pub begin: HourSpec,
    pub end: HourSpec,
}

impl TryFrom<Vec<HourSpec>> for ActiveWindow {
    type Error = ConfigError;

    fn try_from(hours: Vec<HourSpec>) -> Result<Self, Self::Error> {
        match hours[..] {
            [begin, end] => Ok(Self { begin, end }),
            _ => Err(ConfigError::HoursLength(hours.len())),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    pub auth: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("auth_set", &!self.auth.is_empty())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub devices: Vec<String>,
    pub hours: ActiveWindow,
    pub gateway: GatewayConfig,
    #[serde(default, deserialize_with = "deserialize_timezone")]
    pub timezone: Option<Tz>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Config {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn deserialize_timezone<'de, D>(deserializer: D) -> Result<Option<Tz>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(name) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    name.parse::<Tz>()
        .map(Some)
        .map_err(|_| serde::de::Error::custom(ConfigError::UnknownTimezone(name)))
}
