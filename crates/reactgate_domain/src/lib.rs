#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
}

macro_rules! opaque_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Create a non-empty id.
			pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
				let id = id.into();
				if id.trim().is_empty() {
					return Err(ParseIdError::Empty);
				}
				Ok(Self(id))
			}
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				$name::new(s.to_string())
			}
		}
	};
}

opaque_id!(
	/// Guild (community) identifier.
	GuildId
);
opaque_id!(
	/// Channel identifier. Threads are channels too.
	ChannelId
);
opaque_id!(
	/// Platform-native message identifier.
	MessageId
);
opaque_id!(
	/// User identifier.
	UserId
);
opaque_id!(
	/// Custom emoji identifier.
	EmojiId
);

/// Channel kinds reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelKind {
	GuildText,
	Dm,
	GuildVoice,
	GroupDm,
	GuildCategory,
	GuildAnnouncement,
	AnnouncementThread,
	PublicThread,
	PrivateThread,
	GuildStageVoice,
	GuildDirectory,
	GuildForum,
	GuildMedia,
	Unknown(u8),
}

impl ChannelKind {
	pub const fn as_u8(self) -> u8 {
		match self {
			Self::GuildText => 0,
			Self::Dm => 1,
			Self::GuildVoice => 2,
			Self::GroupDm => 3,
			Self::GuildCategory => 4,
			Self::GuildAnnouncement => 5,
			Self::AnnouncementThread => 10,
			Self::PublicThread => 11,
			Self::PrivateThread => 12,
			Self::GuildStageVoice => 13,
			Self::GuildDirectory => 14,
			Self::GuildForum => 15,
			Self::GuildMedia => 16,
			Self::Unknown(v) => v,
		}
	}

	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::GuildText => "guild_text",
			Self::Dm => "dm",
			Self::GuildVoice => "guild_voice",
			Self::GroupDm => "group_dm",
			Self::GuildCategory => "guild_category",
			Self::GuildAnnouncement => "guild_announcement",
			Self::AnnouncementThread => "announcement_thread",
			Self::PublicThread => "public_thread",
			Self::PrivateThread => "private_thread",
			Self::GuildStageVoice => "guild_stage_voice",
			Self::GuildDirectory => "guild_directory",
			Self::GuildForum => "guild_forum",
			Self::GuildMedia => "guild_media",
			Self::Unknown(_) => "unknown",
		}
	}

	/// Only `GuildForum` qualifies; media channels are a different kind.
	pub const fn is_forum(self) -> bool {
		matches!(self, Self::GuildForum)
	}

	pub const fn is_thread(self) -> bool {
		matches!(self, Self::AnnouncementThread | Self::PublicThread | Self::PrivateThread)
	}
}

impl From<u8> for ChannelKind {
	fn from(v: u8) -> Self {
		match v {
			0 => Self::GuildText,
			1 => Self::Dm,
			2 => Self::GuildVoice,
			3 => Self::GroupDm,
			4 => Self::GuildCategory,
			5 => Self::GuildAnnouncement,
			10 => Self::AnnouncementThread,
			11 => Self::PublicThread,
			12 => Self::PrivateThread,
			13 => Self::GuildStageVoice,
			14 => Self::GuildDirectory,
			15 => Self::GuildForum,
			16 => Self::GuildMedia,
			other => Self::Unknown(other),
		}
	}
}

impl From<ChannelKind> for u8 {
	fn from(v: ChannelKind) -> Self {
		v.as_u8()
	}
}

impl fmt::Display for ChannelKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Unknown(v) => write!(f, "unknown({v})"),
			other => f.write_str(other.as_str()),
		}
	}
}
