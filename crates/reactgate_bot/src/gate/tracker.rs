#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use reactgate_domain::ChannelId;
use reactgate_platform::{Channel, DiscordApi, Message};
use tracing::{debug, info, warn};

use super::safe_call::{SafeCallPolicy, try_safe};
use super::store::{EligibilityStore, FIRST_MESSAGE_LIMIT};

/// Registers threads created in the forum after startup.
pub struct ThreadTracker {
	api: Arc<dyn DiscordApi>,
	store: Arc<EligibilityStore>,
	forum_id: ChannelId,
	safe_call: SafeCallPolicy,
	/// Wait before re-fetching when a new thread has no message yet.
	first_message_retry_delay: Duration,
}

impl ThreadTracker {
	pub fn new(api: Arc<dyn DiscordApi>, store: Arc<EligibilityStore>, forum_id: ChannelId) -> Self {
		Self {
			api,
			store,
			forum_id,
			safe_call: SafeCallPolicy::default(),
			first_message_retry_delay: Duration::from_secs(1),
		}
	}

	pub fn with_safe_call(mut self, safe_call: SafeCallPolicy) -> Self {
		self.safe_call = safe_call;
		self
	}

	pub fn with_first_message_retry_delay(mut self, delay: Duration) -> Self {
		self.first_message_retry_delay = delay;
		self
	}

	/// Handle a `THREAD_CREATE` dispatch. Returns `true` if a new thread was registered.
	///
	/// The thread is registered together with its first message. When no message can
	/// be fetched nothing is stored, so a later create for the same thread tries again.
	pub async fn handle_thread_create(&self, thread: Channel) -> bool {
		if thread.parent_id.as_ref() != Some(&self.forum_id) {
			return false;
		}

		if self.store.contains_thread(&thread.id) {
			debug!(thread_id = %thread.id, "thread already tracked");
			return false;
		}

		// The starter message can land slightly after the thread itself.
		let mut messages = self.fetch_first_message(&thread.id).await;
		if messages.is_empty() {
			tokio::time::sleep(self.first_message_retry_delay).await;
			messages = self.fetch_first_message(&thread.id).await;
		}

		if messages.is_empty() {
			warn!(thread_id = %thread.id, "no first message for new thread; not tracked");
			return false;
		}

		let thread_id = thread.id.clone();
		let added = self.store.register_thread(thread);
		for message in messages {
			self.store.register_message(message);
		}

		info!(%thread_id, "tracking new thread");
		added
	}

	async fn fetch_first_message(&self, thread_id: &ChannelId) -> Vec<Message> {
		let api: &dyn DiscordApi = self.api.as_ref();
		try_safe("fetch first message", &self.safe_call, || {
			api.fetch_first_messages(thread_id, FIRST_MESSAGE_LIMIT)
		})
		.await
		.unwrap_or_default()
	}
}
