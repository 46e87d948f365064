#![forbid(unsafe_code)]

pub mod discord;

use std::fmt;
use std::time::SystemTime;

use reactgate_domain::{ChannelId, GuildId, MessageId, UserId};
use tokio::sync::mpsc;
use uuid::Uuid;

pub use discord::models::{Channel, Emoji, Member, Message, ReactionAdd, ThreadMetadata, User};

/// Data-access capability the gatekeeper needs from the platform.
///
/// The REST client implements it for production; tests substitute a recording fake.
#[async_trait::async_trait]
pub trait DiscordApi: Send + Sync + 'static {
	/// The user the credential belongs to.
	async fn current_user(&self) -> anyhow::Result<User>;

	/// Fetch a channel by id. `None` when it does not exist.
	async fn fetch_channel(&self, channel_id: &ChannelId) -> anyhow::Result<Option<Channel>>;

	/// Threads whose parent is `forum`.
	///
	/// Active threads always; public archived threads too when `include_archived` is set.
	async fn fetch_forum_threads(&self, forum: &Channel, include_archived: bool) -> anyhow::Result<Vec<Channel>>;

	/// Oldest `limit` messages of a thread (messages after the zero id).
	async fn fetch_first_messages(&self, thread_id: &ChannelId, limit: u8) -> anyhow::Result<Vec<Message>>;

	/// Fetch a guild member. `None` when the user is not a member.
	async fn fetch_member(&self, guild_id: &GuildId, user_id: &UserId) -> anyhow::Result<Option<Member>>;

	/// Remove every reaction of `emoji` on the message.
	async fn remove_reaction(&self, channel_id: &ChannelId, message_id: &MessageId, emoji: &Emoji) -> anyhow::Result<()>;
}

/// Bot → gateway control message.
#[derive(Debug)]
pub enum GatewayControl {
	/// Close the socket and stop the run loop.
	Shutdown,
}

/// Gateway → bot event message.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
	/// Session established (`READY`).
	Ready { user: User, session_id: String },

	/// A reaction was added to a message.
	ReactionAdd(Box<ReactionAdd>),

	/// A thread was created (or the bot was added to one).
	ThreadCreate(Box<Channel>),

	/// Adapter status update.
	Status(GatewayStatus),
}

/// Gateway status event.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
	pub connected: bool,
	pub detail: String,
	pub last_error: Option<String>,
	pub time: SystemTime,
}

pub type GatewayControlTx = mpsc::Sender<GatewayControl>;
pub type GatewayControlRx = mpsc::Receiver<GatewayControl>;
pub type GatewayEventTx = mpsc::Sender<GatewayEvent>;
pub type GatewayEventRx = mpsc::Receiver<GatewayEvent>;

/// Build a standard bounded channel pair.
pub fn bounded_gateway_channels(
	control_capacity: usize,
	events_capacity: usize,
) -> (GatewayControlTx, GatewayControlRx, GatewayEventTx, GatewayEventRx) {
	let (control_tx, control_rx) = mpsc::channel(control_capacity);
	let (events_tx, events_rx) = mpsc::channel(events_capacity);
	(control_tx, control_rx, events_tx, events_rx)
}

/// Build a status event.
pub fn status(connected: bool, detail: impl Into<String>) -> GatewayEvent {
	GatewayEvent::Status(GatewayStatus {
		connected,
		detail: detail.into(),
		last_error: None,
		time: SystemTime::now(),
	})
}

/// Build an error status event.
pub fn status_error(detail: impl Into<String>, err: impl fmt::Display) -> GatewayEvent {
	GatewayEvent::Status(GatewayStatus {
		connected: false,
		detail: detail.into(),
		last_error: Some(err.to_string()),
		time: SystemTime::now(),
	})
}

/// Generate an opaque session id.
pub fn new_session_id() -> String {
	Uuid::new_v4().to_string()
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}
