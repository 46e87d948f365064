#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use reactgate_domain::{ChannelId, EmojiId, ParseIdError};
use reactgate_platform::SecretString;
use reactgate_platform::discord::{DEFAULT_API_BASE_URL, DEFAULT_GATEWAY_URL};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::gate::DEFAULT_MIN_TENURE_DAYS;

pub const TOKEN_ENV: &str = "TOKEN";
pub const REACT_ID_ENV: &str = "REACT_ID";
pub const CHANNEL_ID_ENV: &str = "CHANNEL_ID";
pub const CONFIG_PATH_ENV: &str = "REACTGATE_CONFIG";

/// Environment lookup; `std::env::var` in production, a map in tests.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("missing required environment variable {0}")]
	MissingEnv(&'static str),

	#[error("invalid {name}")]
	InvalidId {
		name: &'static str,
		#[source]
		source: ParseIdError,
	},

	#[error("read config from {path}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("parse TOML config {path}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

fn process_env(name: &str) -> Option<String> {
	std::env::var(name).ok()
}

/// Config path: `$REACTGATE_CONFIG`, else `~/.reactgate/config.toml`.
pub fn config_path(env: EnvLookup<'_>) -> Option<PathBuf> {
	if let Some(v) = env(CONFIG_PATH_ENV).map(|v| v.trim().to_string())
		&& !v.is_empty()
	{
		return Some(PathBuf::from(v));
	}
	dirs::home_dir().map(|home| home.join(".reactgate").join("config.toml"))
}

/// Load `.env`, then the bot config from TOML and the process environment.
pub fn load_bot_config() -> Result<BotConfig, ConfigError> {
	match dotenvy::dotenv() {
		Ok(path) => debug!(path = %path.display(), "loaded .env"),
		Err(e) if e.not_found() => {}
		Err(e) => warn!(error = %e, "failed to load .env"),
	}

	let path = config_path(&process_env);
	load_bot_config_from(path.as_deref(), &process_env)
}

/// Same as `load_bot_config` with an explicit path and environment.
pub fn load_bot_config_from(path: Option<&Path>, env: EnvLookup<'_>) -> Result<BotConfig, ConfigError> {
	let required = RequiredSettings::from_env(env)?;

	let file_cfg = match path {
		Some(path) => read_toml_if_exists(path)?.unwrap_or_default(),
		None => FileConfig::default(),
	};

	let mut cfg = BotConfig::from_parts(required, file_cfg);
	apply_env_overrides(&mut cfg, env);

	Ok(cfg)
}

/// Bot config.
#[derive(Debug, Clone)]
pub struct BotConfig {
	/// Bot credential.
	pub token: SecretString,
	/// The gatekept emoji.
	pub react_id: EmojiId,
	/// Forum channel whose threads are policed.
	pub channel_id: ChannelId,
	pub gate: GateSettings,
	pub discord: DiscordSettings,
	pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct GateSettings {
	/// Minimum time since joining the guild.
	pub min_tenure: TimeDelta,
	/// Register threads created after startup.
	pub track_new_threads: bool,
	/// Include public archived threads in the startup sweep.
	pub include_archived_threads: bool,
	/// Attempts per guarded call (1 = no retry).
	pub removal_max_attempts: u32,
	pub removal_retry_delay: Duration,
}

impl Default for GateSettings {
	fn default() -> Self {
		Self {
			min_tenure: TimeDelta::days(DEFAULT_MIN_TENURE_DAYS),
			track_new_threads: false,
			include_archived_threads: false,
			removal_max_attempts: 1,
			removal_retry_delay: Duration::from_millis(250),
		}
	}
}

#[derive(Debug, Clone)]
pub struct DiscordSettings {
	pub api_base_url: String,
	pub gateway_url: String,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
}

impl Default for DiscordSettings {
	fn default() -> Self {
		Self {
			api_base_url: DEFAULT_API_BASE_URL.to_string(),
			gateway_url: DEFAULT_GATEWAY_URL.to_string(),
			reconnect_min_delay: Duration::from_millis(500),
			reconnect_max_delay: Duration::from_secs(30),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct TelemetrySettings {
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

struct RequiredSettings {
	token: SecretString,
	react_id: EmojiId,
	channel_id: ChannelId,
}

impl RequiredSettings {
	fn from_env(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
		let required = |name: &'static str| -> Result<String, ConfigError> {
			env(name)
				.map(|v| v.trim().to_string())
				.filter(|v| !v.is_empty())
				.ok_or(ConfigError::MissingEnv(name))
		};

		let token = SecretString::new(required(TOKEN_ENV)?);
		let react_id = EmojiId::new(required(REACT_ID_ENV)?).map_err(|source| ConfigError::InvalidId {
			name: REACT_ID_ENV,
			source,
		})?;
		let channel_id = ChannelId::new(required(CHANNEL_ID_ENV)?).map_err(|source| ConfigError::InvalidId {
			name: CHANNEL_ID_ENV,
			source,
		})?;

		Ok(Self {
			token,
			react_id,
			channel_id,
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	gate: FileGateSettings,

	#[serde(default)]
	discord: FileDiscordSettings,

	#[serde(default)]
	telemetry: FileTelemetrySettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileGateSettings {
	min_tenure_days: Option<u32>,
	track_new_threads: Option<bool>,
	include_archived_threads: Option<bool>,
	removal_max_attempts: Option<u32>,
	removal_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileDiscordSettings {
	api_base_url: Option<String>,
	gateway_url: Option<String>,
	reconnect_min_delay_ms: Option<u64>,
	reconnect_max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileTelemetrySettings {
	metrics_bind: Option<String>,
}

impl BotConfig {
	fn from_parts(required: RequiredSettings, file: FileConfig) -> Self {
		let gate_defaults = GateSettings::default();
		let gate = GateSettings {
			min_tenure: file
				.gate
				.min_tenure_days
				.map(|d| TimeDelta::days(i64::from(d)))
				.unwrap_or(gate_defaults.min_tenure),
			track_new_threads: file.gate.track_new_threads.unwrap_or(gate_defaults.track_new_threads),
			include_archived_threads: file
				.gate
				.include_archived_threads
				.unwrap_or(gate_defaults.include_archived_threads),
			removal_max_attempts: file
				.gate
				.removal_max_attempts
				.filter(|v| *v > 0)
				.unwrap_or(gate_defaults.removal_max_attempts),
			removal_retry_delay: file
				.gate
				.removal_retry_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(gate_defaults.removal_retry_delay),
		};

		let discord_defaults = DiscordSettings::default();
		let discord = DiscordSettings {
			api_base_url: file
				.discord
				.api_base_url
				.filter(|s| !s.trim().is_empty())
				.unwrap_or(discord_defaults.api_base_url),
			gateway_url: file
				.discord
				.gateway_url
				.filter(|s| !s.trim().is_empty())
				.unwrap_or(discord_defaults.gateway_url),
			reconnect_min_delay: file
				.discord
				.reconnect_min_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(discord_defaults.reconnect_min_delay),
			reconnect_max_delay: file
				.discord
				.reconnect_max_delay_ms
				.map(Duration::from_millis)
				.unwrap_or(discord_defaults.reconnect_max_delay),
		};

		Self {
			token: required.token,
			react_id: required.react_id,
			channel_id: required.channel_id,
			gate,
			discord,
			telemetry: TelemetrySettings {
				metrics_bind: file.telemetry.metrics_bind.filter(|s| !s.trim().is_empty()),
			},
		}
	}
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).map_err(|source| ConfigError::Parse {
				path: path.to_path_buf(),
				source,
			})?;
			info!(path = %path.display(), "loaded config file");
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(source) => Err(ConfigError::Read {
			path: path.to_path_buf(),
			source,
		}),
	}
}

fn apply_env_overrides(cfg: &mut BotConfig, env: EnvLookup<'_>) {
	if let Some(v) = env("REACTGATE_MIN_TENURE_DAYS")
		&& let Ok(days) = v.trim().parse::<u32>()
	{
		cfg.gate.min_tenure = TimeDelta::days(i64::from(days));
		info!(days, "gate config: min_tenure overridden by env");
	}

	if let Some(v) = env("REACTGATE_TRACK_NEW_THREADS")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.gate.track_new_threads = enabled;
		info!(enabled, "gate config: track_new_threads overridden by env");
	}

	if let Some(v) = env("REACTGATE_INCLUDE_ARCHIVED_THREADS")
		&& let Some(enabled) = parse_env_bool(&v)
	{
		cfg.gate.include_archived_threads = enabled;
		info!(enabled, "gate config: include_archived_threads overridden by env");
	}

	if let Some(v) = env("REACTGATE_REMOVAL_MAX_ATTEMPTS")
		&& let Ok(attempts) = v.trim().parse::<u32>()
		&& attempts > 0
	{
		cfg.gate.removal_max_attempts = attempts;
		info!(attempts, "gate config: removal_max_attempts overridden by env");
	}

	if let Some(v) = env("REACTGATE_REMOVAL_RETRY_DELAY_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.gate.removal_retry_delay = Duration::from_millis(ms);
		info!(ms, "gate config: removal_retry_delay overridden by env");
	}

	if let Some(v) = env("REACTGATE_API_BASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.discord.api_base_url = v;
			info!("discord config: api_base_url overridden by env");
		}
	}

	if let Some(v) = env("REACTGATE_GATEWAY_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.discord.gateway_url = v;
			info!("discord config: gateway_url overridden by env");
		}
	}

	if let Some(v) = env("REACTGATE_RECONNECT_MIN_DELAY_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.discord.reconnect_min_delay = Duration::from_millis(ms);
		debug!("discord config: reconnect_min_delay overridden by env");
	}

	if let Some(v) = env("REACTGATE_RECONNECT_MAX_DELAY_MS")
		&& let Ok(ms) = v.trim().parse::<u64>()
	{
		cfg.discord.reconnect_max_delay = Duration::from_millis(ms);
		debug!("discord config: reconnect_max_delay overridden by env");
	}

	if let Some(v) = env("REACTGATE_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.telemetry.metrics_bind = Some(v);
			info!("telemetry config: metrics_bind overridden by env");
		}
	}

	if cfg.discord.reconnect_min_delay > cfg.discord.reconnect_max_delay {
		warn!(
			min_ms = cfg.discord.reconnect_min_delay.as_millis(),
			max_ms = cfg.discord.reconnect_max_delay.as_millis(),
			"discord config: reconnect_min_delay > reconnect_max_delay; swapping"
		);
		std::mem::swap(
			&mut cfg.discord.reconnect_min_delay,
			&mut cfg.discord.reconnect_max_delay,
		);
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
		let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		move |name: &str| map.get(name).cloned()
	}

	fn required_env() -> Vec<(&'static str, &'static str)> {
		vec![(TOKEN_ENV, "bot-token"), (REACT_ID_ENV, "555"), (CHANNEL_ID_ENV, "100")]
	}

	fn temp_config(name: &str, contents: &str) -> PathBuf {
		let dir = std::env::temp_dir().join(format!("reactgate-config-{name}-{}", std::process::id()));
		fs::create_dir_all(&dir).expect("create temp dir");
		let path = dir.join("config.toml");
		fs::write(&path, contents).expect("write config");
		path
	}

	#[test]
	fn loads_required_env_with_defaults() {
		let env = env_of(&required_env());
		let cfg = load_bot_config_from(None, &env).expect("config loads");

		assert_eq!(cfg.token.expose(), "bot-token");
		assert_eq!(cfg.react_id.as_str(), "555");
		assert_eq!(cfg.channel_id.as_str(), "100");
		assert_eq!(cfg.gate.min_tenure, TimeDelta::days(30));
		assert!(!cfg.gate.track_new_threads);
		assert_eq!(cfg.gate.removal_max_attempts, 1);
		assert_eq!(cfg.discord.api_base_url, DEFAULT_API_BASE_URL);
		assert!(cfg.telemetry.metrics_bind.is_none());
	}

	#[test]
	fn each_required_variable_is_enforced() {
		for missing in [TOKEN_ENV, REACT_ID_ENV, CHANNEL_ID_ENV] {
			let pairs: Vec<_> = required_env().into_iter().filter(|(k, _)| *k != missing).collect();
			let env = env_of(&pairs);
			match load_bot_config_from(None, &env) {
				Err(ConfigError::MissingEnv(name)) => assert_eq!(name, missing),
				other => panic!("expected MissingEnv({missing}), got: {other:?}"),
			}
		}
	}

	#[test]
	fn blank_required_variable_counts_as_missing() {
		let env = env_of(&[(TOKEN_ENV, "t"), (REACT_ID_ENV, "   "), (CHANNEL_ID_ENV, "100")]);
		assert!(matches!(
			load_bot_config_from(None, &env),
			Err(ConfigError::MissingEnv(REACT_ID_ENV))
		));
	}

	#[test]
	fn file_values_apply_and_env_overrides_win() {
		let path = temp_config(
			"overrides",
			r#"
[gate]
min_tenure_days = 7
track_new_threads = true
removal_max_attempts = 3

[discord]
gateway_url = "ws://127.0.0.1:9999"
reconnect_min_delay_ms = 5000
reconnect_max_delay_ms = 1000

[telemetry]
metrics_bind = "127.0.0.1:9100"
"#,
		);

		let mut pairs = required_env();
		pairs.push(("REACTGATE_MIN_TENURE_DAYS", "14"));
		pairs.push(("REACTGATE_INCLUDE_ARCHIVED_THREADS", "yes"));
		let env = env_of(&pairs);

		let cfg = load_bot_config_from(Some(&path), &env).expect("config loads");
		assert_eq!(cfg.gate.min_tenure, TimeDelta::days(14));
		assert!(cfg.gate.track_new_threads);
		assert!(cfg.gate.include_archived_threads);
		assert_eq!(cfg.gate.removal_max_attempts, 3);
		assert_eq!(cfg.discord.gateway_url, "ws://127.0.0.1:9999");
		assert_eq!(cfg.discord.reconnect_min_delay, Duration::from_millis(1000));
		assert_eq!(cfg.discord.reconnect_max_delay, Duration::from_millis(5000));
		assert_eq!(cfg.telemetry.metrics_bind.as_deref(), Some("127.0.0.1:9100"));
	}

	#[test]
	fn missing_file_is_not_an_error() {
		let env = env_of(&required_env());
		let path = std::env::temp_dir().join("reactgate-config-does-not-exist/config.toml");
		assert!(load_bot_config_from(Some(&path), &env).is_ok());
	}

	#[test]
	fn malformed_file_is_reported() {
		let path = temp_config("malformed", "[gate\nmin_tenure_days = ");
		let env = env_of(&required_env());
		assert!(matches!(
			load_bot_config_from(Some(&path), &env),
			Err(ConfigError::Parse { .. })
		));
	}

	#[test]
	fn config_path_prefers_env() {
		let env = env_of(&[(CONFIG_PATH_ENV, "/etc/reactgate.toml")]);
		assert_eq!(config_path(&env), Some(PathBuf::from("/etc/reactgate.toml")));
	}
}
