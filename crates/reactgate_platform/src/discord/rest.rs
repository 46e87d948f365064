#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::Context;
use reactgate_domain::{ChannelId, GuildId, MessageId, UserId};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::models::{Channel, Emoji, Member, Message, ThreadListResponse, User};
use crate::{DiscordApi, SecretString};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

const ARCHIVED_PAGE_LIMIT: u32 = 100;

/// Longest rate-limit wait honoured before the single retry.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
	for name in [RETRY_AFTER.as_str(), "X-RateLimit-Reset-After"] {
		if let Some(v) = headers.get(name)
			&& let Ok(s) = v.to_str()
			&& let Ok(secs) = s.trim().parse::<f64>()
			&& secs >= 0.0
		{
			let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_DELAY);
			return Some(delay.min(MAX_RETRY_DELAY));
		}
	}

	None
}

async fn send_with_retry(req: reqwest::RequestBuilder, label: &str) -> anyhow::Result<reqwest::Response> {
	let retry_builder = req.try_clone();
	let resp = req.send().await.with_context(|| format!("discord {label} send"))?;
	let status = resp.status();

	if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
		let body = resp.text().await.unwrap_or_default();
		anyhow::bail!("discord auth failed (status={status}) body={body}");
	}

	if status == StatusCode::TOO_MANY_REQUESTS
		&& let Some(delay) = retry_delay_from_headers(resp.headers())
		&& let Some(retry) = retry_builder
	{
		metrics::counter!("reactgate_rest_rate_limited_total").increment(1);
		debug!(delay_ms = delay.as_millis() as u64, %label, "discord rate limited; retrying once");
		tokio::time::sleep(delay).await;
		let retry_resp = retry.send().await.with_context(|| format!("discord {label} retry send"))?;
		return Ok(retry_resp);
	}

	if status.is_server_error()
		&& let Some(retry) = retry_builder
	{
		tokio::time::sleep(Duration::from_millis(250)).await;
		let retry_resp = retry.send().await.with_context(|| format!("discord {label} retry send"))?;
		return Ok(retry_resp);
	}

	Ok(resp)
}

/// Thin REST client over the Discord HTTP API.
#[derive(Clone, Debug)]
pub struct DiscordRestClient {
	http: reqwest::Client,
	base_url: Url,
	token: SecretString,
}

impl DiscordRestClient {
	pub fn new(base_url: &str, token: SecretString) -> anyhow::Result<Self> {
		let http = reqwest::Client::builder()
			.user_agent("DiscordBot (https://github.com/reactgate/reactgate, 0.1)")
			.build()
			.context("build reqwest client")?;

		// `Url::join` drops the last segment unless the base ends with a slash.
		let mut base = base_url.trim_end_matches('/').to_string();
		base.push('/');
		let base_url = Url::parse(&base).context("parse discord api_base_url")?;

		Ok(Self { http, base_url, token })
	}

	fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		req.header("Authorization", format!("Bot {}", self.token.expose()))
	}

	fn url(&self, path_and_query: &str) -> anyhow::Result<Url> {
		self.base_url
			.join(path_and_query.trim_start_matches('/'))
			.context("join discord url")
	}

	/// GET a JSON resource; `None` on 404.
	async fn get_json_optional<T: DeserializeOwned>(&self, path: &str, label: &str) -> anyhow::Result<Option<T>> {
		let url = self.url(path)?;
		let resp = send_with_retry(self.authed(self.http.get(url)), label)
			.await
			.with_context(|| format!("discord GET {label} send"))?;

		let status = resp.status();
		if status == StatusCode::NOT_FOUND {
			return Ok(None);
		}

		let body = resp.text().await.with_context(|| format!("discord GET {label} read body"))?;
		if !status.is_success() {
			anyhow::bail!("discord GET {label} failed: status={status} body={body}");
		}

		let parsed = serde_json::from_str(&body).with_context(|| format!("discord GET {label} parse json"))?;
		Ok(Some(parsed))
	}

	async fn get_json<T: DeserializeOwned>(&self, path: &str, label: &str) -> anyhow::Result<T> {
		self.get_json_optional(path, label)
			.await?
			.with_context(|| format!("discord GET {label} returned 404"))
	}

	async fn fetch_active_threads(&self, guild_id: &GuildId) -> anyhow::Result<Vec<Channel>> {
		let list: ThreadListResponse = self
			.get_json(&format!("guilds/{guild_id}/threads/active"), "/guilds/{id}/threads/active")
			.await?;
		Ok(list.threads)
	}

	async fn fetch_public_archived_threads(&self, channel_id: &ChannelId) -> anyhow::Result<Vec<Channel>> {
		let mut out = Vec::new();
		let mut before: Option<String> = None;

		loop {
			let mut path = format!("channels/{channel_id}/threads/archived/public?limit={ARCHIVED_PAGE_LIMIT}");
			if let Some(ts) = before.as_deref() {
				path.push_str("&before=");
				path.push_str(&urlencoding::encode(ts));
			}

			let page: ThreadListResponse = self
				.get_json(&path, "/channels/{id}/threads/archived/public")
				.await?;

			let next = page
				.threads
				.last()
				.and_then(|t| t.thread_metadata.as_ref())
				.and_then(|m| m.archive_timestamp.clone());
			let has_more = page.has_more;
			out.extend(page.threads);

			match next {
				Some(ts) if has_more => before = Some(ts),
				_ => break,
			}
		}

		Ok(out)
	}
}

#[async_trait::async_trait]
impl DiscordApi for DiscordRestClient {
	async fn current_user(&self) -> anyhow::Result<User> {
		self.get_json("users/@me", "/users/@me").await
	}

	async fn fetch_channel(&self, channel_id: &ChannelId) -> anyhow::Result<Option<Channel>> {
		self.get_json_optional(&format!("channels/{channel_id}"), "/channels/{id}")
			.await
	}

	async fn fetch_forum_threads(&self, forum: &Channel, include_archived: bool) -> anyhow::Result<Vec<Channel>> {
		let guild_id = forum
			.guild_id
			.as_ref()
			.with_context(|| format!("forum channel {} has no guild_id", forum.id))?;

		let mut threads: Vec<Channel> = self
			.fetch_active_threads(guild_id)
			.await?
			.into_iter()
			.filter(|t| t.parent_id.as_ref() == Some(&forum.id))
			.collect();

		if include_archived {
			for t in self.fetch_public_archived_threads(&forum.id).await? {
				if !threads.iter().any(|known| known.id == t.id) {
					threads.push(t);
				}
			}
		}

		Ok(threads)
	}

	async fn fetch_first_messages(&self, thread_id: &ChannelId, limit: u8) -> anyhow::Result<Vec<Message>> {
		let limit = limit.clamp(1, 100);
		self.get_json(
			&format!("channels/{thread_id}/messages?after=0&limit={limit}"),
			"/channels/{id}/messages",
		)
		.await
	}

	async fn fetch_member(&self, guild_id: &GuildId, user_id: &UserId) -> anyhow::Result<Option<Member>> {
		self.get_json_optional(&format!("guilds/{guild_id}/members/{user_id}"), "/guilds/{id}/members/{id}")
			.await
	}

	async fn remove_reaction(&self, channel_id: &ChannelId, message_id: &MessageId, emoji: &Emoji) -> anyhow::Result<()> {
		let url = self.url(&format!(
			"channels/{channel_id}/messages/{message_id}/reactions/{emoji}",
			emoji = emoji.path_segment()
		))?;

		let resp = send_with_retry(
			self.authed(self.http.delete(url)),
			"DELETE /channels/{id}/messages/{id}/reactions/{emoji}",
		)
		.await
		.context("discord DELETE reactions send")?;

		match resp.status() {
			StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
			status => {
				let body = resp.text().await.unwrap_or_default();
				anyhow::bail!("discord delete reactions failed: status={status} body={body}")
			}
		}
	}
}
