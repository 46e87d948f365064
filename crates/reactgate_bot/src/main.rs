#![forbid(unsafe_code)]

mod config;
mod gate;

use std::sync::Arc;

use reactgate_platform::discord::{DiscordGateway, DiscordRestClient, GatewayConfig};
use reactgate_platform::{DiscordApi, GatewayControl, GatewayEvent, bounded_gateway_channels};
use tracing::{Instrument, debug, info, info_span, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::BotConfig;
use crate::gate::{EligibilityStore, GatePolicy, Gatekeeper, SafeCallPolicy, SweepOptions, ThreadTracker};

const GATEWAY_CONTROL_CAPACITY: usize = 8;
const GATEWAY_EVENTS_CAPACITY: usize = 1024;

fn init_rustls_crypto_provider() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,reactgate_bot=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("reactgate");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

fn gateway_config(cfg: &BotConfig) -> GatewayConfig {
	let mut gw = GatewayConfig::new(cfg.token.clone());
	gw.gateway_url = cfg.discord.gateway_url.clone();
	gw.reconnect_min_delay = cfg.discord.reconnect_min_delay;
	gw.reconnect_max_delay = cfg.discord.reconnect_max_delay;
	gw
}

fn dispatch_event(ev: GatewayEvent, gatekeeper: &Arc<Gatekeeper>, tracker: Option<&Arc<ThreadTracker>>) {
	match ev {
		GatewayEvent::ReactionAdd(reaction) => {
			let span = info_span!(
				"reaction_add",
				message_id = %reaction.message_id,
				user_id = %reaction.user_id
			);
			let gatekeeper = Arc::clone(gatekeeper);
			tokio::spawn(
				async move {
					let verdict = gatekeeper.handle_reaction_add(&reaction).await;
					debug!(verdict = verdict.as_str(), "reaction handled");
				}
				.instrument(span),
			);
		}
		GatewayEvent::ThreadCreate(thread) => {
			let Some(tracker) = tracker else {
				return;
			};
			let span = info_span!("thread_create", thread_id = %thread.id);
			let tracker = Arc::clone(tracker);
			tokio::spawn(
				async move {
					tracker.handle_thread_create(*thread).await;
				}
				.instrument(span),
			);
		}
		GatewayEvent::Ready { user, session_id } => {
			info!(user = %user.display_name(), %session_id, "gateway ready");
		}
		GatewayEvent::Status(s) => {
			if let Some(err) = s.last_error.as_deref() {
				warn!(detail = %s.detail, error = %err, "gateway status");
			} else {
				info!(connected = s.connected, detail = %s.detail, "gateway status");
			}
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_rustls_crypto_provider();
	init_tracing();

	let cfg = crate::config::load_bot_config()?;
	info!(
		channel_id = %cfg.channel_id,
		react_id = %cfg.react_id,
		min_tenure_days = cfg.gate.min_tenure.num_days(),
		track_new_threads = cfg.gate.track_new_threads,
		"loaded bot config (toml + env)"
	);

	init_metrics(cfg.telemetry.metrics_bind.as_deref());

	let rest = DiscordRestClient::new(&cfg.discord.api_base_url, cfg.token.clone())?;
	let api: Arc<dyn DiscordApi> = Arc::new(rest);

	let me = api.current_user().await?;
	info!(user_id = %me.id, "logged in as {}", me.display_name());

	let store = Arc::new(EligibilityStore::new());
	store
		.initialize(
			api.as_ref(),
			&cfg.channel_id,
			SweepOptions {
				include_archived: cfg.gate.include_archived_threads,
			},
		)
		.await?;

	let safe_call = SafeCallPolicy {
		max_attempts: cfg.gate.removal_max_attempts,
		retry_delay: cfg.gate.removal_retry_delay,
	};

	let policy = GatePolicy::new(cfg.react_id.clone()).with_min_tenure(cfg.gate.min_tenure);
	let gatekeeper = Arc::new(Gatekeeper::new(Arc::clone(&api), Arc::clone(&store), policy).with_safe_call(safe_call));

	let tracker = cfg.gate.track_new_threads.then(|| {
		Arc::new(ThreadTracker::new(Arc::clone(&api), Arc::clone(&store), cfg.channel_id.clone()).with_safe_call(safe_call))
	});

	let (control_tx, control_rx, events_tx, mut events_rx) =
		bounded_gateway_channels(GATEWAY_CONTROL_CAPACITY, GATEWAY_EVENTS_CAPACITY);
	let mut gateway = tokio::spawn(DiscordGateway::new(gateway_config(&cfg)).run(control_rx, events_tx));

	let shutdown = tokio::signal::ctrl_c();
	tokio::pin!(shutdown);

	loop {
		tokio::select! {
			ev = events_rx.recv() => {
				match ev {
					Some(ev) => dispatch_event(ev, &gatekeeper, tracker.as_ref()),
					None => break,
				}
			}
			res = &mut shutdown => {
				if let Err(e) = res {
					warn!(error = %e, "failed to listen for ctrl-c");
				}
				info!("shutting down");
				let _ = control_tx.send(GatewayControl::Shutdown).await;
				break;
			}
			res = &mut gateway => {
				return res?;
			}
		}
	}

	drop(events_rx);
	gateway.await?
}
