#![forbid(unsafe_code)]

mod adapter;


pub use adapter::{DEFAULT_GATEWAY_URL, DiscordGateway, GatewayConfig, GatewayError};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::models::{Channel, ReactionAdd, User};

/// `GUILDS | GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS`.
pub const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 10);

/// Gateway operation codes used by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum OpCode {
	Dispatch,
	Heartbeat,
	Identify,
	Resume,
	Reconnect,
	InvalidSession,
	Hello,
	HeartbeatAck,
}

impl OpCode {
	pub(crate) fn from_u8(value: u8) -> Option<Self> {
		match value {
			0 => Some(Self::Dispatch),
			1 => Some(Self::Heartbeat),
			2 => Some(Self::Identify),
			6 => Some(Self::Resume),
			7 => Some(Self::Reconnect),
			9 => Some(Self::InvalidSession),
			10 => Some(Self::Hello),
			11 => Some(Self::HeartbeatAck),
			_ => None,
		}
	}

	pub(crate) const fn as_u8(self) -> u8 {
		match self {
			Self::Dispatch => 0,
			Self::Heartbeat => 1,
			Self::Identify => 2,
			Self::Resume => 6,
			Self::Reconnect => 7,
			Self::InvalidSession => 9,
			Self::Hello => 10,
			Self::HeartbeatAck => 11,
		}
	}
}

/// Close codes after which reconnecting cannot succeed.
pub(crate) fn is_fatal_close_code(code: u16) -> bool {
	matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}

pub(crate) fn close_code_description(code: u16) -> &'static str {
	match code {
		4000 => "unknown error",
		4001 => "unknown opcode",
		4002 => "decode error",
		4003 => "not authenticated",
		4004 => "authentication failed",
		4005 => "already authenticated",
		4007 => "invalid seq",
		4008 => "rate limited",
		4009 => "session timed out",
		4010 => "invalid shard",
		4011 => "sharding required",
		4012 => "invalid api version",
		4013 => "invalid intents",
		4014 => "disallowed intents",
		_ => "unrecognized close code",
	}
}

/// Raw gateway frame.
#[derive(Debug, Deserialize)]
pub(crate) struct GatewayPayload {
	pub(crate) op: u8,
	#[serde(default)]
	pub(crate) d: serde_json::Value,
	#[serde(default)]
	pub(crate) s: Option<u64>,
	#[serde(default)]
	pub(crate) t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HelloData {
	pub(crate) heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadyData {
	pub(crate) user: User,
	pub(crate) session_id: String,
	#[serde(default)]
	pub(crate) resume_gateway_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutboundFrame<T: Serialize> {
	op: u8,
	d: T,
}

#[derive(Debug, Serialize)]
struct IdentifyData<'a> {
	token: &'a str,
	intents: u64,
	properties: IdentifyProperties,
}

#[derive(Debug, Serialize)]
struct IdentifyProperties {
	os: &'static str,
	browser: &'static str,
	device: &'static str,
}

#[derive(Debug, Serialize)]
struct ResumeData<'a> {
	token: &'a str,
	session_id: &'a str,
	seq: Option<u64>,
}

/// Parsed dispatch relevant to the bot.
#[derive(Debug)]
pub(crate) enum Dispatch {
	Ready(ReadyData),
	Resumed,
	ReactionAdd(ReactionAdd),
	ThreadCreate(Channel),
	Other(String),
}

/// Parse a raw gateway text frame.
pub(crate) fn parse_payload(raw_json: &str) -> anyhow::Result<GatewayPayload> {
	serde_json::from_str(raw_json).context("parse gateway payload")
}

/// Parse the `d` of a `Hello` frame.
pub(crate) fn parse_hello(payload: &GatewayPayload) -> anyhow::Result<HelloData> {
	serde_json::from_value(payload.d.clone()).context("parse hello")
}

/// Decode a dispatch (`op` 0) by its event name.
pub(crate) fn parse_dispatch(payload: GatewayPayload) -> anyhow::Result<Dispatch> {
	let name = payload.t.unwrap_or_default();
	match name.as_str() {
		"READY" => Ok(Dispatch::Ready(serde_json::from_value(payload.d).context("parse READY")?)),
		"RESUMED" => Ok(Dispatch::Resumed),
		"MESSAGE_REACTION_ADD" => Ok(Dispatch::ReactionAdd(
			serde_json::from_value(payload.d).context("parse MESSAGE_REACTION_ADD")?,
		)),
		"THREAD_CREATE" => Ok(Dispatch::ThreadCreate(
			serde_json::from_value(payload.d).context("parse THREAD_CREATE")?,
		)),
		_ => Ok(Dispatch::Other(name)),
	}
}

pub(crate) fn heartbeat_frame(seq: Option<u64>) -> String {
	serde_json::to_string(&OutboundFrame {
		op: OpCode::Heartbeat.as_u8(),
		d: seq,
	})
	.unwrap_or_else(|_| r#"{"op":1,"d":null}"#.to_string())
}

pub(crate) fn identify_frame(token: &str, intents: u64) -> anyhow::Result<String> {
	serde_json::to_string(&OutboundFrame {
		op: OpCode::Identify.as_u8(),
		d: IdentifyData {
			token,
			intents,
			properties: IdentifyProperties {
				os: std::env::consts::OS,
				browser: "reactgate",
				device: "reactgate",
			},
		},
	})
	.context("serialize identify")
}

pub(crate) fn resume_frame(token: &str, session_id: &str, seq: Option<u64>) -> anyhow::Result<String> {
	serde_json::to_string(&OutboundFrame {
		op: OpCode::Resume.as_u8(),
		d: ResumeData { token, session_id, seq },
	})
	.context("serialize resume")
}
