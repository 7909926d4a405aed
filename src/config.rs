//! Server and game configuration.
//!
//! Defaults live in the `Default` impls; `ServerConfig::load_or_default`
//! overlays environment variables (after loading an optional `.env`).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A rate must be positive.
    #[error("{name} must be > 0 Hz (got {value})")]
    InvalidRate {
        /// Setting name.
        name: &'static str,
        /// Rejected value.
        value: u32,
    },

    /// Proximity factor outside the accepted band.
    #[error("proximity factor must be within 1.0..=1.5 (got {0})")]
    InvalidProximityFactor(f32),

    /// Arena geometry cannot hold the largest piece.
    #[error("arena too small: inner width {inner_width} < largest piece diameter {diameter}")]
    ArenaTooSmall {
        /// Width between the walls.
        inner_width: f32,
        /// Diameter of the largest rank.
        diameter: f32,
    },

    /// Danger line must sit inside the arena.
    #[error("danger line y={0} is outside the arena")]
    InvalidDangerLine(f32),
}

/// Arena geometry and gravity.
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaConfig {
    /// Total arena width (px).
    pub width: f32,
    /// Total arena height (px).
    pub height: f32,
    /// Thickness of walls and floor (px).
    pub border: f32,
    /// Y coordinate of the danger line; smaller y is higher up.
    pub danger_line_y: f32,
    /// Gap between the top border and a freshly spawned piece (px).
    pub spawn_margin: f32,
    /// Gravity acceleration (px/s², +Y is down).
    pub gravity: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 600.0,
            border: 10.0,
            danger_line_y: 100.0,
            spawn_margin: 2.0,
            gravity: 980.0,
        }
    }
}

/// Tunables for the simulation, merge, combo and broadcast loops.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Simulation clock rate (Hz).
    pub sim_rate_hz: u32,
    /// Broadcast scheduler rate (Hz).
    pub broadcast_rate_hz: u32,
    /// Interval of the combo decay check.
    pub combo_decay_interval: Duration,
    /// Window within which consecutive merges extend the combo.
    pub combo_window: Duration,
    /// Grace period a settled violation must persist before game over.
    pub game_over_grace: Duration,
    /// Pieces younger than this never count as violations.
    pub spawn_grace: Duration,
    /// Contact test slack: merge when distance < (rA + rB) * factor.
    pub proximity_factor: f32,
    /// Upward speed given to a freshly merged piece (px/s).
    pub merge_pop_speed: f32,
    /// Linear speed below which a piece counts as settled (px/s).
    pub settle_speed: f32,
    /// Linear speed above which a piece counts as moving for broadcasts (px/s).
    pub motion_threshold: f32,
    /// Push a snapshot to everyone right after each drop.
    pub broadcast_on_drop: bool,
    /// Arena geometry.
    pub arena: ArenaConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            sim_rate_hz: crate::TICK_RATE,
            broadcast_rate_hz: crate::BROADCAST_RATE,
            combo_decay_interval: Duration::from_millis(100),
            combo_window: Duration::from_millis(2000),
            game_over_grace: Duration::from_millis(3000),
            spawn_grace: Duration::from_millis(1000),
            proximity_factor: 1.1,
            merge_pop_speed: 120.0,
            settle_speed: 12.0,
            motion_threshold: 3.0,
            broadcast_on_drop: true,
            arena: ArenaConfig::default(),
        }
    }
}

impl GameConfig {
    /// Fixed simulation timestep.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.sim_rate_hz.max(1) as u64)
    }

    /// Fixed simulation timestep in seconds.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.sim_rate_hz.max(1) as f32
    }

    /// Broadcast period.
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.broadcast_rate_hz.max(1) as u64)
    }

    /// Check invariants the simulation relies on.
    pub fn validate(&self, largest_radius: f32) -> Result<(), ConfigError> {
        if self.sim_rate_hz == 0 {
            return Err(ConfigError::InvalidRate { name: "sim_rate_hz", value: 0 });
        }
        if self.broadcast_rate_hz == 0 {
            return Err(ConfigError::InvalidRate { name: "broadcast_rate_hz", value: 0 });
        }
        if !(1.0..=1.5).contains(&self.proximity_factor) {
            return Err(ConfigError::InvalidProximityFactor(self.proximity_factor));
        }

        let inner_width = self.arena.width - 2.0 * self.arena.border;
        if inner_width < largest_radius * 2.0 {
            return Err(ConfigError::ArenaTooSmall {
                inner_width,
                diameter: largest_radius * 2.0,
            });
        }

        let y = self.arena.danger_line_y;
        if y <= self.arena.border || y >= self.arena.height - self.arena.border {
            return Err(ConfigError::InvalidDangerLine(y));
        }

        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the servers to.
    pub bind_address: IpAddr,
    /// WebSocket port.
    pub port: u16,
    /// Health endpoint port.
    pub health_port: u16,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
    /// Game tunables.
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            health_port: 8081,
            max_connections: 1000,
            version: crate::VERSION.to_string(),
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// WebSocket listen address.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Health endpoint listen address.
    pub fn health_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.health_port)
    }

    /// Load config from environment or use defaults.
    pub fn load_or_default() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.overlay(|key| std::env::var(key).ok());
        config
    }

    /// Overlay settings read through `lookup`. Values that do not parse or
    /// fall outside their accepted range keep the current setting.
    pub fn overlay(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let vars = EnvOverlay { lookup };

        if let Some(addr) = vars.parse::<IpAddr>("BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Some(port) = vars.in_range("PORT", 1..=u16::MAX) {
            self.port = port;
        }
        if let Some(port) = vars.in_range("HEALTH_PORT", 1..=u16::MAX) {
            self.health_port = port;
        }
        if let Some(max) = vars.in_range("MAX_CONNECTIONS", 1..=usize::MAX) {
            self.max_connections = max;
        }

        let game = &mut self.game;
        if let Some(hz) = vars.in_range("SIM_RATE_HZ", 1..=240) {
            game.sim_rate_hz = hz;
        }
        if let Some(hz) = vars.in_range("BROADCAST_RATE_HZ", 1..=120) {
            game.broadcast_rate_hz = hz;
        }
        if let Some(ms) = vars.in_range("COMBO_WINDOW_MS", 1..=u64::MAX) {
            game.combo_window = Duration::from_millis(ms);
        }
        if let Some(ms) = vars.in_range("GAME_OVER_GRACE_MS", 2000..=3000) {
            game.game_over_grace = Duration::from_millis(ms);
        }
        if let Some(factor) = vars.in_range("PROXIMITY_FACTOR", 1.0..=1.5) {
            game.proximity_factor = factor;
        }
    }
}

/// Variable source for [`ServerConfig::overlay`].
struct EnvOverlay<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvOverlay<F> {
    /// Read and parse a variable, warning on malformed values.
    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = (self.lookup)(key)?;
        match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Invalid {} '{}', using default", key, raw);
                None
            }
        }
    }

    /// Like `parse`, but also rejects values outside `range` (NaN included).
    fn in_range<T>(&self, key: &str, range: RangeInclusive<T>) -> Option<T>
    where
        T: FromStr + PartialOrd + fmt::Display,
    {
        let value = self.parse::<T>(key)?;
        if range.contains(&value) {
            Some(value)
        } else {
            warn!(
                "{}={} outside {}..={}, using default",
                key,
                value,
                range.start(),
                range.end()
            );
            None
        }
    }
}
