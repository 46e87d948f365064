#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use reactgate_domain::{EmojiId, GuildId};
use reactgate_platform::{DiscordApi, ReactionAdd};
use tracing::{debug, info, warn};

use super::DEFAULT_MIN_TENURE_DAYS;
use super::safe_call::{SafeCallPolicy, try_safe};
use super::store::EligibilityStore;

/// Source of "now" for tenure checks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Acceptance policy for reactions on eligible messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePolicy {
	pub target_emoji: EmojiId,
	pub min_tenure: TimeDelta,
}

impl GatePolicy {
	pub fn new(target_emoji: EmojiId) -> Self {
		Self {
			target_emoji,
			min_tenure: TimeDelta::days(DEFAULT_MIN_TENURE_DAYS),
		}
	}

	pub fn with_min_tenure(mut self, min_tenure: TimeDelta) -> Self {
		self.min_tenure = min_tenure.max(TimeDelta::zero());
		self
	}

	/// `true` when the member has been in the guild for at least `min_tenure`.
	pub fn tenure_allows(&self, joined_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
		now.signed_duration_since(joined_at) >= self.min_tenure
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
	WrongEmoji,
	NoGuild,
	MemberUnavailable,
	NoJoinDate,
	TooNew,
}

impl RejectReason {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::WrongEmoji => "wrong_emoji",
			Self::NoGuild => "no_guild",
			Self::MemberUnavailable => "member_unavailable",
			Self::NoJoinDate => "no_join_date",
			Self::TooNew => "too_new",
		}
	}
}

impl fmt::Display for RejectReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Outcome of evaluating one reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
	/// Not a policed message; ignored.
	Drop,
	/// Reaction may stay.
	Accept,
	/// Reaction must be removed.
	Reject(RejectReason),
}

impl Verdict {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Drop => "drop",
			Self::Accept => "accept",
			Self::Reject(_) => "reject",
		}
	}
}

/// Decides per reaction whether it stays, and removes the rejected ones.
pub struct Gatekeeper {
	api: Arc<dyn DiscordApi>,
	store: Arc<EligibilityStore>,
	policy: GatePolicy,
	safe_call: SafeCallPolicy,
	clock: Clock,
}

impl fmt::Debug for Gatekeeper {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Gatekeeper")
			.field("policy", &self.policy)
			.field("safe_call", &self.safe_call)
			.field("tracked_messages", &self.store.message_count())
			.finish_non_exhaustive()
	}
}

impl Gatekeeper {
	pub fn new(api: Arc<dyn DiscordApi>, store: Arc<EligibilityStore>, policy: GatePolicy) -> Self {
		Self {
			api,
			store,
			policy,
			safe_call: SafeCallPolicy::default(),
			clock: Arc::new(Utc::now),
		}
	}

	pub fn with_clock(mut self, clock: Clock) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_safe_call(mut self, safe_call: SafeCallPolicy) -> Self {
		self.safe_call = safe_call;
		self
	}

	/// Run the decision procedure without side effects beyond the member fetch.
	pub async fn evaluate(&self, reaction: &ReactionAdd) -> Verdict {
		if !self.store.is_eligible(&reaction.message_id) {
			info!(message_id = %reaction.message_id, channel_id = %reaction.channel_id, "incorrect message");
			return Verdict::Drop;
		}

		if reaction.emoji.id.as_ref() != Some(&self.policy.target_emoji) {
			return Verdict::Reject(RejectReason::WrongEmoji);
		}

		let Some(guild_id) = self.resolve_guild(reaction) else {
			return Verdict::Reject(RejectReason::NoGuild);
		};

		let api: &dyn DiscordApi = self.api.as_ref();
		let user_id = &reaction.user_id;
		let member = try_safe("fetch member", &self.safe_call, || api.fetch_member(&guild_id, user_id)).await;

		let Some(Some(member)) = member else {
			debug!(user_id = %reaction.user_id, guild_id = %guild_id, "member unavailable");
			return Verdict::Reject(RejectReason::MemberUnavailable);
		};

		let Some(joined_at) = member.joined_at else {
			return Verdict::Reject(RejectReason::NoJoinDate);
		};

		if !self.policy.tenure_allows(joined_at, (self.clock)()) {
			return Verdict::Reject(RejectReason::TooNew);
		}

		Verdict::Accept
	}

	/// Evaluate a reaction and remove it when rejected.
	///
	/// Removal failures are logged and absorbed.
	pub async fn handle_reaction_add(&self, reaction: &ReactionAdd) -> Verdict {
		let verdict = self.evaluate(reaction).await;
		metrics::counter!("reactgate_reactions_total", "verdict" => verdict.as_str()).increment(1);

		let Verdict::Reject(reason) = verdict else {
			return verdict;
		};

		let api: &dyn DiscordApi = self.api.as_ref();
		let removed = try_safe("remove reaction", &self.safe_call, || {
			api.remove_reaction(&reaction.channel_id, &reaction.message_id, &reaction.emoji)
		})
		.await;

		match removed {
			Some(()) => info!(
				message_id = %reaction.message_id,
				user_id = %reaction.user_id,
				%reason,
				"reaction removed"
			),
			None => {
				metrics::counter!("reactgate_removal_failures_total").increment(1);
				warn!(message_id = %reaction.message_id, %reason, "reaction could not be removed");
			}
		}

		verdict
	}

	fn resolve_guild(&self, reaction: &ReactionAdd) -> Option<GuildId> {
		reaction
			.guild_id
			.clone()
			.or_else(|| self.store.guild_of(&reaction.message_id))
	}
}
