#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reactgate_domain::{ChannelId, ChannelKind, EmojiId, GuildId, MessageId, UserId};
use reactgate_platform::{Channel, DiscordApi, Emoji, Member, Message, ReactionAdd, User};

pub const GUILD: &str = "1";
pub const FORUM: &str = "100";
pub const TARGET_EMOJI: &str = "555";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	CurrentUser,
	FetchChannel(ChannelId),
	FetchForumThreads { include_archived: bool },
	FetchFirstMessages { thread_id: ChannelId, limit: u8 },
	FetchMember(UserId),
	RemoveReaction { message_id: MessageId, emoji: Emoji },
}

/// Recording in-memory `DiscordApi`.
#[derive(Default)]
pub struct FakeDiscord {
	channels: Mutex<HashMap<ChannelId, Channel>>,
	threads: Mutex<Vec<Channel>>,
	messages: Mutex<HashMap<ChannelId, Vec<Message>>>,
	members: Mutex<HashMap<UserId, Member>>,
	failing_threads: Mutex<HashSet<ChannelId>>,
	fail_members: Mutex<bool>,
	fail_removals: Mutex<bool>,
	calls: Mutex<Vec<Call>>,
}

pub fn channel_id(id: &str) -> ChannelId {
	ChannelId::new(id).expect("valid ChannelId")
}

pub fn message_id(id: &str) -> MessageId {
	MessageId::new(id).expect("valid MessageId")
}

pub fn user_id(id: &str) -> UserId {
	UserId::new(id).expect("valid UserId")
}

pub fn guild_id() -> GuildId {
	GuildId::new(GUILD).expect("valid GuildId")
}

pub fn target_emoji() -> EmojiId {
	EmojiId::new(TARGET_EMOJI).expect("valid EmojiId")
}

pub fn channel(id: &str, kind: ChannelKind, parent: Option<&str>) -> Channel {
	Channel {
		id: channel_id(id),
		kind,
		guild_id: Some(guild_id()),
		parent_id: parent.map(channel_id),
		name: Some(format!("channel-{id}")),
		thread_metadata: None,
		newly_created: None,
	}
}

pub fn forum() -> Channel {
	channel(FORUM, ChannelKind::GuildForum, None)
}

pub fn thread(id: &str) -> Channel {
	channel(id, ChannelKind::PublicThread, Some(FORUM))
}

pub fn message(id: &str, thread_id: &str) -> Message {
	Message {
		id: message_id(id),
		channel_id: channel_id(thread_id),
		guild_id: Some(guild_id()),
		author: None,
		kind: 0,
		timestamp: None,
	}
}

pub fn member(id: &str, joined_at: Option<DateTime<Utc>>) -> Member {
	Member {
		user: Some(User {
			id: user_id(id),
			username: format!("user-{id}"),
			global_name: None,
			bot: false,
		}),
		nick: None,
		joined_at,
	}
}

pub fn reaction(message: &str, user: &str, emoji: Emoji) -> ReactionAdd {
	ReactionAdd {
		user_id: user_id(user),
		channel_id: channel_id("200"),
		message_id: message_id(message),
		guild_id: Some(guild_id()),
		emoji,
		member: None,
		message_author_id: None,
	}
}

pub fn target_reaction(message: &str, user: &str) -> ReactionAdd {
	reaction(message, user, Emoji::custom(target_emoji(), "gate"))
}

impl FakeDiscord {
	pub fn new() -> Self {
		Self::default()
	}

	/// A forum with one thread per `(thread_id, first_message_id)`.
	pub fn with_forum(threads: &[(&str, Option<&str>)]) -> Self {
		let fake = Self::new();
		fake.add_channel(forum());
		for (thread_id, first) in threads {
			fake.add_thread(thread(thread_id), first.map(|m| vec![message(m, thread_id)]).unwrap_or_default());
		}
		fake
	}

	pub fn add_channel(&self, channel: Channel) {
		self.channels.lock().insert(channel.id.clone(), channel);
	}

	pub fn add_thread(&self, thread: Channel, messages: Vec<Message>) {
		self.messages.lock().insert(thread.id.clone(), messages);
		self.threads.lock().push(thread);
	}

	pub fn set_messages(&self, thread_id: &str, messages: Vec<Message>) {
		self.messages.lock().insert(channel_id(thread_id), messages);
	}

	pub fn add_member(&self, user: &str, joined_at: Option<DateTime<Utc>>) {
		self.members.lock().insert(user_id(user), member(user, joined_at));
	}

	pub fn fail_first_messages_for(&self, thread_id: &str) {
		self.failing_threads.lock().insert(channel_id(thread_id));
	}

	pub fn recover_first_messages_for(&self, thread_id: &str) {
		self.failing_threads.lock().remove(&channel_id(thread_id));
	}

	pub fn fail_members(&self, fail: bool) {
		*self.fail_members.lock() = fail;
	}

	pub fn fail_removals(&self, fail: bool) {
		*self.fail_removals.lock() = fail;
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().clone()
	}

	pub fn clear_calls(&self) {
		self.calls.lock().clear();
	}

	pub fn member_fetches(&self) -> usize {
		self.calls().iter().filter(|c| matches!(c, Call::FetchMember(_))).count()
	}

	pub fn removals(&self) -> Vec<(MessageId, Emoji)> {
		self.calls()
			.into_iter()
			.filter_map(|c| match c {
				Call::RemoveReaction { message_id, emoji } => Some((message_id, emoji)),
				_ => None,
			})
			.collect()
	}

	fn record(&self, call: Call) {
		self.calls.lock().push(call);
	}
}

#[async_trait::async_trait]
impl DiscordApi for FakeDiscord {
	async fn current_user(&self) -> anyhow::Result<User> {
		self.record(Call::CurrentUser);
		Ok(User {
			id: user_id("42"),
			username: "gatebot".to_string(),
			global_name: None,
			bot: true,
		})
	}

	async fn fetch_channel(&self, channel_id: &ChannelId) -> anyhow::Result<Option<Channel>> {
		self.record(Call::FetchChannel(channel_id.clone()));
		Ok(self.channels.lock().get(channel_id).cloned())
	}

	async fn fetch_forum_threads(&self, forum: &Channel, include_archived: bool) -> anyhow::Result<Vec<Channel>> {
		self.record(Call::FetchForumThreads { include_archived });
		Ok(self
			.threads
			.lock()
			.iter()
			.filter(|t| t.parent_id.as_ref() == Some(&forum.id))
			.cloned()
			.collect())
	}

	async fn fetch_first_messages(&self, thread_id: &ChannelId, limit: u8) -> anyhow::Result<Vec<Message>> {
		self.record(Call::FetchFirstMessages {
			thread_id: thread_id.clone(),
			limit,
		});
		if self.failing_threads.lock().contains(thread_id) {
			anyhow::bail!("fetch messages for {thread_id} failed");
		}
		Ok(self
			.messages
			.lock()
			.get(thread_id)
			.map(|msgs| msgs.iter().take(usize::from(limit)).cloned().collect())
			.unwrap_or_default())
	}

	async fn fetch_member(&self, _guild_id: &GuildId, user_id: &UserId) -> anyhow::Result<Option<Member>> {
		self.record(Call::FetchMember(user_id.clone()));
		if *self.fail_members.lock() {
			anyhow::bail!("member fetch failed");
		}
		Ok(self.members.lock().get(user_id).cloned())
	}

	async fn remove_reaction(&self, _channel_id: &ChannelId, message_id: &MessageId, emoji: &Emoji) -> anyhow::Result<()> {
		self.record(Call::RemoveReaction {
			message_id: message_id.clone(),
			emoji: emoji.clone(),
		});
		if *self.fail_removals.lock() {
			anyhow::bail!("missing permissions");
		}
		Ok(())
	}
}
