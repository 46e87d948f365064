#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use reactgate_domain::{ChannelId, ChannelKind, EmojiId, GuildId, MessageId, UserId};
use serde::{Deserialize, Serialize};

/// Platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub username: String,
	#[serde(default)]
	pub global_name: Option<String>,
	#[serde(default)]
	pub bot: bool,
}

impl User {
	/// Display name, falling back to the username.
	pub fn display_name(&self) -> &str {
		self.global_name.as_deref().unwrap_or(&self.username)
	}
}

/// Channel or thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
	pub id: ChannelId,
	#[serde(rename = "type")]
	pub kind: ChannelKind,
	#[serde(default)]
	pub guild_id: Option<GuildId>,
	#[serde(default)]
	pub parent_id: Option<ChannelId>,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub thread_metadata: Option<ThreadMetadata>,
	/// Only set on `THREAD_CREATE` dispatches.
	#[serde(default)]
	pub newly_created: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMetadata {
	#[serde(default)]
	pub archived: bool,
	/// ISO8601; used as the `before` cursor when paging archived threads.
	#[serde(default)]
	pub archive_timestamp: Option<String>,
}

/// Message as returned by the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub id: MessageId,
	pub channel_id: ChannelId,
	#[serde(default)]
	pub guild_id: Option<GuildId>,
	#[serde(default)]
	pub author: Option<User>,
	#[serde(rename = "type", default)]
	pub kind: u8,
	#[serde(default)]
	pub timestamp: Option<DateTime<Utc>>,
}

/// Guild member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
	#[serde(default)]
	pub user: Option<User>,
	#[serde(default)]
	pub nick: Option<String>,
	/// Absent for guest members.
	#[serde(default)]
	pub joined_at: Option<DateTime<Utc>>,
}

/// Reaction emoji. Unicode emoji have no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
	#[serde(default)]
	pub id: Option<EmojiId>,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub animated: bool,
}

impl Emoji {
	/// Custom emoji reference.
	pub fn custom(id: EmojiId, name: impl Into<String>) -> Self {
		Self {
			id: Some(id),
			name: Some(name.into()),
			animated: false,
		}
	}

	/// Unicode emoji reference.
	pub fn unicode(name: impl Into<String>) -> Self {
		Self {
			id: None,
			name: Some(name.into()),
			animated: false,
		}
	}

	/// Percent-encoded path segment for reaction endpoints (`name:id` or the raw character).
	pub fn path_segment(&self) -> String {
		let name = self.name.as_deref().unwrap_or_default();
		match &self.id {
			Some(id) => urlencoding::encode(&format!("{name}:{id}")).into_owned(),
			None => urlencoding::encode(name).into_owned(),
		}
	}
}

/// `MESSAGE_REACTION_ADD` dispatch payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionAdd {
	pub user_id: UserId,
	pub channel_id: ChannelId,
	pub message_id: MessageId,
	#[serde(default)]
	pub guild_id: Option<GuildId>,
	pub emoji: Emoji,
	#[serde(default)]
	pub member: Option<Member>,
	#[serde(default)]
	pub message_author_id: Option<UserId>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ThreadListResponse {
	#[serde(default)]
	pub(crate) threads: Vec<Channel>,
	#[serde(default)]
	pub(crate) has_more: bool,
}
