#![forbid(unsafe_code)]

use std::collections::HashMap;

use futures::future::try_join_all;
use parking_lot::RwLock;
use reactgate_domain::{ChannelId, ChannelKind, GuildId, MessageId};
use reactgate_platform::{Channel, DiscordApi, Message};
use thiserror::Error;
use tracing::{debug, info};

/// Messages fetched per thread during the sweep: the single oldest one.
pub const FIRST_MESSAGE_LIMIT: u8 = 1;

#[derive(Debug, Error)]
pub enum InitError {
	#[error("channel {0} not found")]
	ChannelNotFound(ChannelId),

	#[error("channel {id} is not a forum channel (kind={kind})")]
	NotForum { id: ChannelId, kind: ChannelKind },

	#[error("catalog sweep failed")]
	Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
	/// Also sweep public archived threads.
	pub include_archived: bool,
}

/// Threads and first messages the gatekeeper polices.
#[derive(Debug, Default)]
pub struct EligibilityStore {
	threads: RwLock<HashMap<ChannelId, Channel>>,
	messages: RwLock<HashMap<MessageId, Message>>,
}

impl EligibilityStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sweep the forum channel and register each thread and its first message.
	///
	/// Fails if the channel is missing, is not a forum, or any fetch fails. Per-thread
	/// fetches run concurrently; nothing is retried.
	pub async fn initialize(
		&self,
		api: &dyn DiscordApi,
		forum_channel_id: &ChannelId,
		options: SweepOptions,
	) -> Result<Channel, InitError> {
		let forum = api
			.fetch_channel(forum_channel_id)
			.await
			.map_err(|e| InitError::Fetch(e.into()))?
			.ok_or_else(|| InitError::ChannelNotFound(forum_channel_id.clone()))?;

		if !forum.kind.is_forum() {
			return Err(InitError::NotForum {
				id: forum.id,
				kind: forum.kind,
			});
		}

		let threads = api
			.fetch_forum_threads(&forum, options.include_archived)
			.await
			.map_err(|e| InitError::Fetch(e.into()))?;

		try_join_all(threads.into_iter().map(|thread| async move {
			let thread_id = thread.id.clone();
			self.register_thread(thread);

			let messages = api.fetch_first_messages(&thread_id, FIRST_MESSAGE_LIMIT).await?;
			for message in messages {
				self.register_message(message);
			}
			Ok::<_, anyhow::Error>(())
		}))
		.await
		.map_err(|e| InitError::Fetch(e.into()))?;

		info!(
			channel_id = %forum.id,
			threads = self.thread_count(),
			messages = self.message_count(),
			"collected {} threads",
			self.thread_count()
		);

		Ok(forum)
	}

	/// O(1) membership test against the first-message map.
	pub fn is_eligible(&self, message_id: &MessageId) -> bool {
		self.messages.read().contains_key(message_id)
	}

	/// Guild of a registered message, if the platform reported one.
	pub fn guild_of(&self, message_id: &MessageId) -> Option<GuildId> {
		self.messages.read().get(message_id).and_then(|m| m.guild_id.clone())
	}

	/// Register a thread. Returns `false` if it was already known.
	pub fn register_thread(&self, thread: Channel) -> bool {
		let mut threads = self.threads.write();
		if threads.contains_key(&thread.id) {
			return false;
		}
		debug!(thread_id = %thread.id, name = thread.name.as_deref().unwrap_or_default(), "registered thread");
		threads.insert(thread.id.clone(), thread);
		true
	}

	/// Register an eligible message. Returns `false` if it was already known.
	pub fn register_message(&self, message: Message) -> bool {
		let mut messages = self.messages.write();
		if messages.contains_key(&message.id) {
			return false;
		}
		debug!(message_id = %message.id, thread_id = %message.channel_id, "registered first message");
		messages.insert(message.id.clone(), message);
		true
	}

	pub fn contains_thread(&self, thread_id: &ChannelId) -> bool {
		self.threads.read().contains_key(thread_id)
	}

	pub fn thread_count(&self) -> usize {
		self.threads.read().len()
	}

	pub fn message_count(&self) -> usize {
		self.messages.read().len()
	}
}
