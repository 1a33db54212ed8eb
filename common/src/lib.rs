pub mod config;
pub mod engine;
pub mod presence;
pub mod types;
pub mod window;

pub use config::{
    ActiveWindow, Config, ConfigError, Coordinates, GatewayConfig, HourSpec, SolarEvent,
};
pub use engine::{LightEngine, ABSENCE_TICKS_BEFORE_OFF};
pub use presence::{count_present, is_present, PRESENCE_RSSI_THRESHOLD};
pub use types::{LightCommand, LightState};
pub use window::WindowError;
