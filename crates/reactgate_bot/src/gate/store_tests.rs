#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use reactgate_domain::ChannelKind;

use crate::gate::fake::{Call, FORUM, FakeDiscord, channel, channel_id, message, message_id, thread};
use crate::gate::store::{EligibilityStore, InitError, SweepOptions};
use crate::gate::tracker::ThreadTracker;

#[tokio::test]
async fn initialize_registers_one_first_message_per_thread() {
	let api = FakeDiscord::with_forum(&[("10", Some("10")), ("11", Some("11")), ("12", Some("12"))]);
	let store = EligibilityStore::new();

	let forum = store
		.initialize(&api, &channel_id(FORUM), SweepOptions::default())
		.await
		.expect("sweep succeeds");

	assert_eq!(forum.id, channel_id(FORUM));
	assert_eq!(store.thread_count(), 3);
	assert_eq!(store.message_count(), 3);
	for id in ["10", "11", "12"] {
		assert!(store.contains_thread(&channel_id(id)));
		assert!(store.is_eligible(&message_id(id)));
	}
	assert!(!store.is_eligible(&message_id("999")));

	let limits: Vec<u8> = api
		.calls()
		.into_iter()
		.filter_map(|c| match c {
			Call::FetchFirstMessages { limit, .. } => Some(limit),
			_ => None,
		})
		.collect();
	assert_eq!(limits, vec![1, 1, 1], "one oldest-first fetch of a single message per thread");
}

#[tokio::test]
async fn only_the_oldest_message_is_registered() {
	let api = FakeDiscord::with_forum(&[("10", None)]);
	api.set_messages("10", vec![message("10", "10"), message("13", "10")]);
	let store = EligibilityStore::new();

	store
		.initialize(&api, &channel_id(FORUM), SweepOptions::default())
		.await
		.expect("sweep succeeds");

	assert!(store.is_eligible(&message_id("10")));
	assert!(!store.is_eligible(&message_id("13")));
}

#[tokio::test]
async fn empty_thread_contributes_thread_but_no_message() {
	let api = FakeDiscord::with_forum(&[("10", Some("10")), ("11", None)]);
	let store = EligibilityStore::new();

	store
		.initialize(&api, &channel_id(FORUM), SweepOptions::default())
		.await
		.expect("sweep succeeds");

	assert_eq!(store.thread_count(), 2);
	assert_eq!(store.message_count(), 1);
	assert!(store.contains_thread(&channel_id("11")));
}

#[tokio::test]
async fn missing_channel_is_fatal() {
	let api = FakeDiscord::new();
	let store = EligibilityStore::new();

	let err = store
		.initialize(&api, &channel_id(FORUM), SweepOptions::default())
		.await
		.expect_err("missing channel must fail");
	assert!(matches!(err, InitError::ChannelNotFound(id) if id == channel_id(FORUM)));
}

#[tokio::test]
async fn text_channel_is_rejected_before_any_thread_fetch() {
	let api = FakeDiscord::new();
	api.add_channel(channel(FORUM, ChannelKind::GuildText, None));
	let store = EligibilityStore::new();

	let err = store
		.initialize(&api, &channel_id(FORUM), SweepOptions::default())
		.await
		.expect_err("text channel must fail");

	match err {
		InitError::NotForum { kind, .. } => assert_eq!(kind, ChannelKind::GuildText),
		other => panic!("expected NotForum, got: {other:?}"),
	}
	assert_eq!(api.calls(), vec![Call::FetchChannel(channel_id(FORUM))]);
	assert_eq!(store.thread_count(), 0);
}

#[tokio::test]
async fn any_failed_thread_fetch_fails_the_sweep() {
	let api = FakeDiscord::with_forum(&[("10", Some("10")), ("11", Some("11"))]);
	api.fail_first_messages_for("11");
	let store = EligibilityStore::new();

	let err = store
		.initialize(&api, &channel_id(FORUM), SweepOptions::default())
		.await
		.expect_err("partial sweep must fail");
	assert!(matches!(err, InitError::Fetch(_)));
}

#[tokio::test]
async fn sweep_forwards_archived_option() {
	let api = FakeDiscord::with_forum(&[]);
	let store = EligibilityStore::new();

	store
		.initialize(&api, &channel_id(FORUM), SweepOptions { include_archived: true })
		.await
		.expect("sweep succeeds");

	assert!(
		api.calls()
			.contains(&Call::FetchForumThreads { include_archived: true })
	);
	assert_eq!(store.thread_count(), 0);
}

#[test]
fn registration_is_idempotent() {
	let store = EligibilityStore::new();
	assert!(store.register_thread(thread("10")));
	assert!(!store.register_thread(thread("10")));
	assert!(store.register_message(message("10", "10")));
	assert!(!store.register_message(message("10", "10")));
	assert_eq!(store.thread_count(), 1);
	assert_eq!(store.message_count(), 1);
}

#[tokio::test]
async fn tracker_registers_new_forum_threads() {
	let api = Arc::new(FakeDiscord::with_forum(&[]));
	let store = Arc::new(EligibilityStore::new());
	api.set_messages("20", vec![message("20", "20")]);

	let tracker = ThreadTracker::new(api.clone(), store.clone(), channel_id(FORUM));
	assert!(tracker.handle_thread_create(thread("20")).await);
	assert!(store.contains_thread(&channel_id("20")));
	assert!(store.is_eligible(&message_id("20")));

	assert!(!tracker.handle_thread_create(thread("20")).await, "second create is ignored");
}

#[tokio::test]
async fn tracker_ignores_threads_of_other_channels() {
	let api = Arc::new(FakeDiscord::with_forum(&[]));
	let store = Arc::new(EligibilityStore::new());

	let tracker = ThreadTracker::new(api.clone(), store.clone(), channel_id(FORUM));
	let other = channel("21", ChannelKind::PublicThread, Some("300"));
	assert!(!tracker.handle_thread_create(other).await);
	assert_eq!(store.thread_count(), 0);
	assert!(api.calls().is_empty());
}

#[tokio::test]
async fn tracker_retries_a_thread_whose_first_message_could_not_be_fetched() {
	let api = Arc::new(FakeDiscord::with_forum(&[]));
	api.fail_first_messages_for("22");
	let store = Arc::new(EligibilityStore::new());

	let tracker = ThreadTracker::new(api.clone(), store.clone(), channel_id(FORUM))
		.with_first_message_retry_delay(Duration::from_millis(1));
	assert!(!tracker.handle_thread_create(thread("22")).await);
	assert!(!store.contains_thread(&channel_id("22")));
	assert_eq!(store.message_count(), 0);

	api.recover_first_messages_for("22");
	api.set_messages("22", vec![message("22", "22")]);
	assert!(tracker.handle_thread_create(thread("22")).await);
	assert!(store.contains_thread(&channel_id("22")));
	assert!(store.is_eligible(&message_id("22")));
}

#[tokio::test(start_paused = true)]
async fn tracker_refetches_once_when_starter_message_is_late() {
	let api = Arc::new(FakeDiscord::with_forum(&[]));
	api.set_messages("23", Vec::new());
	let store = Arc::new(EligibilityStore::new());

	let tracker = ThreadTracker::new(api.clone(), store.clone(), channel_id(FORUM));
	assert!(!tracker.handle_thread_create(thread("23")).await);

	let fetches = api
		.calls()
		.into_iter()
		.filter(|c| matches!(c, Call::FetchFirstMessages { .. }))
		.count();
	assert_eq!(fetches, 2);
}
