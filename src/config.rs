//! Explicitly constructed configuration, passed down from [`LiveServer`](`crate::server::LiveServer`) to every session and page.
//!
//! Durations are written in milliseconds:
//!
//! ```toml
//! [sessions]
//! max_sessions = 512
//! grace_period = 30000
//!
//! [connection]
//! heartbeat_interval = 15000
//! ```

use crate::error::Error;
use core::time::Duration;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	pub render: RenderConfig,
	pub sessions: SessionConfig,
	pub connection: ConnectionConfig,
}

impl Config {
	pub fn from_toml_str(source: &str) -> Result<Self, Error> {
		Ok(toml::from_str(source)?)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
	/// Maximum nesting depth the differ descends into.
	pub depth_limit: usize,
	/// How often a single render may be restarted by stages that invalidated the in-flight snapshot.
	pub max_restarts: usize,
}

impl Default for RenderConfig {
	fn default() -> Self {
		Self { depth_limit: 256, max_restarts: 8 }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	pub max_sessions: usize,
	/// How long a disconnected (or never connected) session is kept around.
	#[serde(with = "millis")]
	pub grace_period: Duration,
	#[serde(with = "millis")]
	pub sweep_interval: Duration,
	/// How long [`SessionRegistry::create`](`crate::registry::SessionRegistry::create`) waits for a free slot.
	#[serde(with = "millis")]
	pub acquire_timeout: Duration,
	/// Patch frames retained while no connection is attached.
	pub pending_frames: usize,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			max_sessions: 1024,
			grace_period: Duration::from_secs(30),
			sweep_interval: Duration::from_secs(5),
			acquire_timeout: Duration::from_secs(10),
			pending_frames: 256,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
	#[serde(with = "millis")]
	pub heartbeat_interval: Duration,
	/// Refreshed on every received frame.
	#[serde(with = "millis")]
	pub read_deadline: Duration,
	#[serde(with = "millis")]
	pub write_deadline: Duration,
	pub outbound_capacity: usize,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			heartbeat_interval: Duration::from_secs(15),
			read_deadline: Duration::from_secs(45),
			write_deadline: Duration::from_secs(10),
			outbound_capacity: 64,
		}
	}
}

mod millis {
	use core::time::Duration;
	use serde::{Deserialize, Deserializer};

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
