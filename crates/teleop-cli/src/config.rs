//! Rig configuration – reads/writes `~/.teleop/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use teleop_runtime::SessionConfig;
use teleop_types::{ChannelConfig, REGISTER_MAX, TeleopError};

/// Which actuator bus to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Dynamixel Protocol 1.0 over a serial device.
    #[default]
    Serial,
    /// The in-process simulated bus.
    Sim,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::Serial => write!(f, "serial"),
            LinkKind::Sim => write!(f, "sim"),
        }
    }
}

impl std::str::FromStr for LinkKind {
    type Err = TeleopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(LinkKind::Serial),
            "sim" => Ok(LinkKind::Sim),
            other => Err(TeleopError::Config(format!(
                "unknown link kind {other:?} (expected \"serial\" or \"sim\")"
            ))),
        }
    }
}

/// Persisted rig configuration stored in `~/.teleop/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Serial device the actuators hang off.
    #[serde(default = "default_device")]
    pub device: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub link: LinkKind,

    /// Read timeout of a single bus transaction.
    #[serde(default = "default_link_timeout_ms")]
    pub link_timeout_ms: u64,

    /// Telemetry CSV destination; truncated on every run.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Wait for Enter between homing and teleoperation.
    #[serde(default = "default_confirm")]
    pub confirm_before_active: bool,

    #[serde(default = "default_homing_velocity")]
    pub homing_velocity: u16,

    #[serde(default = "default_active_velocity")]
    pub active_velocity: u16,

    #[serde(default = "default_homing_timeout_ms")]
    pub homing_timeout_ms: u64,

    #[serde(default = "default_control_period_ms")]
    pub control_period_ms: u64,

    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    #[serde(default = "default_log_period_ms")]
    pub log_period_ms: u64,

    #[serde(default = "ChannelConfig::steering")]
    pub steering: ChannelConfig,

    #[serde(default = "ChannelConfig::yawing")]
    pub yawing: ChannelConfig,
}

fn default_device() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    1_000_000
}
fn default_link_timeout_ms() -> u64 {
    50
}
fn default_log_path() -> PathBuf {
    PathBuf::from("motor_data.csv")
}
fn default_confirm() -> bool {
    true
}
fn default_homing_velocity() -> u16 {
    teleop_runtime::config::HOMING_VELOCITY
}
fn default_active_velocity() -> u16 {
    teleop_runtime::config::ACTIVE_VELOCITY
}
fn default_homing_timeout_ms() -> u64 {
    10_000
}
fn default_control_period_ms() -> u64 {
    10
}
fn default_sample_period_ms() -> u64 {
    20
}
fn default_log_period_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: default_device(),
            baud_rate: default_baud_rate(),
            link: LinkKind::default(),
            link_timeout_ms: default_link_timeout_ms(),
            log_path: default_log_path(),
            confirm_before_active: default_confirm(),
            homing_velocity: default_homing_velocity(),
            active_velocity: default_active_velocity(),
            homing_timeout_ms: default_homing_timeout_ms(),
            control_period_ms: default_control_period_ms(),
            sample_period_ms: default_sample_period_ms(),
            log_period_ms: default_log_period_ms(),
            steering: ChannelConfig::steering(),
            yawing: ChannelConfig::yawing(),
        }
    }
}

impl Config {
    /// Reject values the session cannot run with.  Channel geometry is
    /// checked again when the session builds its channels.
    ///
    /// # Errors
    ///
    /// Returns [`TeleopError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<(), TeleopError> {
        for (field, velocity) in [
            ("homing_velocity", self.homing_velocity),
            ("active_velocity", self.active_velocity),
        ] {
            if velocity > REGISTER_MAX {
                return Err(TeleopError::Config(format!(
                    "{field} {velocity} exceeds {REGISTER_MAX}"
                )));
            }
        }
        for (field, ms) in [
            ("sample_period_ms", self.sample_period_ms),
            ("log_period_ms", self.log_period_ms),
            ("link_timeout_ms", self.link_timeout_ms),
        ] {
            if ms == 0 {
                return Err(TeleopError::Config(format!("{field} must be positive")));
            }
        }
        if self.baud_rate == 0 {
            return Err(TeleopError::Config("baud_rate must be positive".to_string()));
        }
        Ok(())
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    /// Runtime settings derived from this file.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            steering: self.steering.clone(),
            yawing: self.yawing.clone(),
            homing_velocity: self.homing_velocity,
            active_velocity: self.active_velocity,
            homing_timeout: Duration::from_millis(self.homing_timeout_ms),
            control_period: Duration::from_millis(self.control_period_ms),
            sample_period: Duration::from_millis(self.sample_period_ms),
            log_period: Duration::from_millis(self.log_period_ms),
            ..SessionConfig::default()
        }
    }
}

/// Return the config path: `$TELEOP_CONFIG` when set, otherwise
/// `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("TELEOP_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop").join("config.toml")
}

/// Load the config from a specific path, applying environment overrides.
/// Returns `None` if the file does not exist.
///
/// # Errors
///
/// Returns [`TeleopError::Config`] when the file cannot be read or parsed.
pub fn load_from(path: &Path) -> Result<Option<Config>, TeleopError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        TeleopError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| TeleopError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg)?;
    Ok(Some(cfg))
}

/// Load the config at `path`, writing the defaults there first when the file
/// does not exist.  Returns the config and whether it was just created.
///
/// # Errors
///
/// Returns [`TeleopError::Config`] when the file cannot be read, parsed or
/// created.
pub fn load_or_init(path: &Path) -> Result<(Config, bool), TeleopError> {
    if let Some(cfg) = load_from(path)? {
        return Ok((cfg, false));
    }
    let mut cfg = Config::default();
    save_to(&cfg, path)?;
    apply_env_overrides(&mut cfg)?;
    Ok((cfg, true))
}

/// Apply `TELEOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELEOP_DEVICE` | `device` |
/// | `TELEOP_BAUD` | `baud_rate` |
/// | `TELEOP_LINK` | `link` |
/// | `TELEOP_LOG_PATH` | `log_path` |
///
/// # Errors
///
/// Returns [`TeleopError::Config`] when a numeric or enumerated override
/// does not parse.
pub fn apply_env_overrides(cfg: &mut Config) -> Result<(), TeleopError> {
    apply_overrides(cfg, |name| std::env::var(name).ok())
}

/// Override source abstracted so tests need not mutate the process
/// environment.
pub(crate) fn apply_overrides(
    cfg: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), TeleopError> {
    if let Some(v) = lookup("TELEOP_DEVICE") {
        cfg.device = v;
    }
    if let Some(v) = lookup("TELEOP_BAUD") {
        cfg.baud_rate = v
            .trim()
            .parse()
            .map_err(|_| TeleopError::Config(format!("TELEOP_BAUD {v:?} is not a baud rate")))?;
    }
    if let Some(v) = lookup("TELEOP_LINK") {
        cfg.link = v.parse()?;
    }
    if let Some(v) = lookup("TELEOP_LOG_PATH") {
        cfg.log_path = PathBuf::from(v);
    }
    Ok(())
}

/// Save the config to a specific path, creating its directory if necessary.
/// Only a directory created here is restricted to its owner; an existing
/// parent keeps its permissions.
///
/// # Errors
///
/// Returns [`TeleopError::Config`] on any filesystem or encoding failure.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), TeleopError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        let created = !parent.exists();
        fs::create_dir_all(parent).map_err(|e| {
            TeleopError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
        #[cfg(unix)]
        if created {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                TeleopError::Config(format!("failed to restrict {}: {e}", parent.display()))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TeleopError::Config(format!("failed to serialize config: {e}")))?;
    let write_failed =
        |e: std::io::Error| TeleopError::Config(format!("failed to write {}: {e}", path.display()));
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_failed)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_failed)?;
    Ok(())
}
