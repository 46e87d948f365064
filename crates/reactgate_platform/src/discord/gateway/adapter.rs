#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{
	DEFAULT_INTENTS, Dispatch, HelloData, OpCode, close_code_description, heartbeat_frame, identify_frame,
	is_fatal_close_code, parse_dispatch, parse_hello, parse_payload, resume_frame,
};
use crate::{GatewayControl, GatewayControlRx, GatewayEvent, GatewayEventTx, SecretString, new_session_id, status, status_error};

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";

pub(crate) type GatewayWs =
	tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors that end the gateway for good.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("gateway closed with fatal code {code} ({description}): {reason}")]
	FatalClose {
		code: u16,
		description: &'static str,
		reason: String,
	},
}

/// Discord gateway adapter configuration.
#[derive(Clone)]
pub struct GatewayConfig {
	pub token: SecretString,
	pub gateway_url: String,
	pub intents: u64,
	pub reconnect_min_delay: Duration,
	pub reconnect_max_delay: Duration,
	pub hello_timeout: Duration,
}

impl GatewayConfig {
	pub fn new(token: SecretString) -> Self {
		Self {
			token,
			gateway_url: DEFAULT_GATEWAY_URL.to_string(),
			intents: DEFAULT_INTENTS,
			reconnect_min_delay: Duration::from_millis(500),
			reconnect_max_delay: Duration::from_secs(30),
			hello_timeout: Duration::from_secs(15),
		}
	}
}

#[derive(Debug, Clone)]
struct ResumeState {
	session_id: String,
	resume_url: Option<String>,
}

enum SessionEnd {
	Reconnect,
	Shutdown,
}

/// Discord gateway adapter.
pub struct DiscordGateway {
	cfg: GatewayConfig,
	resume: Option<ResumeState>,
	seq: Option<u64>,
}

impl DiscordGateway {
	pub fn new(cfg: GatewayConfig) -> Self {
		Self {
			cfg,
			resume: None,
			seq: None,
		}
	}

	pub(crate) fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
		let pow = attempt.min(16);
		let ms = min.as_millis().saturating_mul(1u128 << pow);
		let d = Duration::from_millis(ms.min(u64::MAX as u128) as u64);
		d.min(max).max(min)
	}

	/// Append `v=10&encoding=json` unless the url already pins a version.
	pub(crate) fn ws_url(base: &str) -> anyhow::Result<Url> {
		let mut url = Url::parse(base).context("parse gateway url")?;
		if !url.query_pairs().any(|(k, _)| k == "v") {
			url.query_pairs_mut()
				.append_pair("v", "10")
				.append_pair("encoding", "json");
		}
		Ok(url)
	}

	/// Fraction in `[0, 1)` used to spread the first heartbeat.
	fn jitter() -> f64 {
		(Uuid::new_v4().as_u128() % 1000) as f64 / 1000.0
	}

	async fn connect_ws(url: Url) -> anyhow::Result<GatewayWs> {
		let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
			.await
			.context("connect_async to discord gateway")?;
		Ok(ws)
	}

	async fn read_hello(ws: &mut GatewayWs, wait: Duration) -> anyhow::Result<HelloData> {
		let read = async {
			while let Some(msg) = ws.next().await {
				match msg.context("gateway ws read before hello")? {
					Message::Text(t) => {
						let payload = parse_payload(&t)?;
						if OpCode::from_u8(payload.op) == Some(OpCode::Hello) {
							return parse_hello(&payload);
						}
					}
					Message::Close(frame) => {
						let (code, reason) = frame
							.map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
							.unwrap_or((1000, String::new()));
						if is_fatal_close_code(code) {
							return Err(GatewayError::FatalClose {
								code,
								description: close_code_description(code),
								reason,
							}
							.into());
						}
						anyhow::bail!("gateway closed before hello: {code} {reason}");
					}
					_ => {}
				}
			}
			anyhow::bail!("gateway ws ended before hello")
		};

		tokio::time::timeout(wait, read).await.context("timed out waiting for hello")?
	}

	async fn send_text(ws: &mut GatewayWs, frame: String, label: &'static str) -> anyhow::Result<()> {
		ws.send(Message::Text(frame.into()))
			.await
			.with_context(|| format!("send gateway {label}"))
	}

	async fn run_session(
		&mut self,
		ws: &mut GatewayWs,
		control_rx: &mut GatewayControlRx,
		events_tx: &GatewayEventTx,
		reconnect_attempt: &mut u32,
	) -> anyhow::Result<SessionEnd> {
		let hello = Self::read_hello(ws, self.cfg.hello_timeout).await?;
		let interval = Duration::from_millis(hello.heartbeat_interval.max(1));

		let handshake = match &self.resume {
			Some(resume) => resume_frame(self.cfg.token.expose(), &resume.session_id, self.seq)?,
			None => identify_frame(self.cfg.token.expose(), self.cfg.intents)?,
		};
		let label = if self.resume.is_some() { "resume" } else { "identify" };
		Self::send_text(ws, handshake, label).await?;
		debug!(handshake = label, heartbeat_ms = interval.as_millis() as u64, "gateway handshake sent");

		let mut next_beat = Instant::now() + interval.mul_f64(Self::jitter());
		let mut awaiting_ack = false;

		loop {
			tokio::select! {
				cmd = control_rx.recv() => {
					match cmd {
						Some(GatewayControl::Shutdown) | None => {
							info!("discord gateway received Shutdown");
							return Ok(SessionEnd::Shutdown);
						}
					}
				}

				_ = sleep_until(next_beat) => {
					if awaiting_ack {
						let _ = events_tx.try_send(status(false, "heartbeat ack missing; reconnecting"));
						return Ok(SessionEnd::Reconnect);
					}
					Self::send_text(ws, heartbeat_frame(self.seq), "heartbeat").await?;
					awaiting_ack = true;
					next_beat = Instant::now() + interval;
				}

				msg = ws.next() => {
					let Some(msg) = msg else {
						let _ = events_tx.try_send(status(false, "gateway ws ended"));
						return Ok(SessionEnd::Reconnect);
					};

					let msg = match msg {
						Ok(m) => m,
						Err(e) => {
							let _ = events_tx.try_send(status_error("gateway ws read error", e));
							return Ok(SessionEnd::Reconnect);
						}
					};

					match msg {
						Message::Text(t) => {
							let payload = match parse_payload(&t) {
								Ok(p) => p,
								Err(e) => {
									warn!(error = %e, "dropping undecodable gateway frame");
									continue;
								}
							};

							match OpCode::from_u8(payload.op) {
								Some(OpCode::Dispatch) => {
									if let Some(s) = payload.s {
										self.seq = Some(s);
									}

									let event = match parse_dispatch(payload) {
										Ok(Dispatch::Ready(ready)) => {
											*reconnect_attempt = 0;
											self.resume = Some(ResumeState {
												session_id: ready.session_id.clone(),
												resume_url: ready.resume_gateway_url,
											});
											let _ = events_tx.try_send(status(true, format!("gateway ready (session_id={})", ready.session_id)));
											Some(GatewayEvent::Ready {
												user: ready.user,
												session_id: ready.session_id,
											})
										}
										Ok(Dispatch::Resumed) => {
											*reconnect_attempt = 0;
											let _ = events_tx.try_send(status(true, "gateway session resumed"));
											None
										}
										Ok(Dispatch::ReactionAdd(r)) => Some(GatewayEvent::ReactionAdd(Box::new(r))),
										Ok(Dispatch::ThreadCreate(c)) => Some(GatewayEvent::ThreadCreate(Box::new(c))),
										Ok(Dispatch::Other(name)) => {
											debug!(event = %name, "ignoring dispatch");
											None
										}
										Err(e) => {
											let _ = events_tx.try_send(status_error("failed to decode dispatch", e));
											None
										}
									};

									if let Some(event) = event
										&& events_tx.send(event).await.is_err()
									{
										return Ok(SessionEnd::Shutdown);
									}
								}

								Some(OpCode::Heartbeat) => {
									Self::send_text(ws, heartbeat_frame(self.seq), "heartbeat").await?;
									awaiting_ack = true;
									next_beat = Instant::now() + interval;
								}

								Some(OpCode::HeartbeatAck) => {
									awaiting_ack = false;
								}

								Some(OpCode::Reconnect) => {
									let _ = events_tx.try_send(status(false, "gateway requested reconnect"));
									return Ok(SessionEnd::Reconnect);
								}

								Some(OpCode::InvalidSession) => {
									let resumable = payload.d.as_bool().unwrap_or(false);
									if !resumable {
										self.resume = None;
										self.seq = None;
									}
									let _ = events_tx.try_send(status(false, format!("gateway invalid session (resumable={resumable})")));
									sleep(Duration::from_millis(1000 + (Self::jitter() * 4000.0) as u64)).await;
									return Ok(SessionEnd::Reconnect);
								}

								_ => {
									debug!(op = payload.op, "ignoring gateway op");
								}
							}
						}

						Message::Ping(p) => {
							let _ = ws.send(Message::Pong(p)).await;
						}

						Message::Close(frame) => {
							let (code, reason) = frame
								.map(|f| (u16::from(f.code), f.reason.as_str().to_string()))
								.unwrap_or((1000, String::new()));

							if is_fatal_close_code(code) {
								return Err(GatewayError::FatalClose {
									code,
									description: close_code_description(code),
									reason,
								}
								.into());
							}

							if matches!(code, 4007 | 4009) {
								self.resume = None;
								self.seq = None;
							}

							let _ = events_tx.try_send(status(
								false,
								format!("gateway closed: {code} ({}) {reason}", close_code_description(code)),
							));
							return Ok(SessionEnd::Reconnect);
						}

						_ => {}
					}
				}
			}
		}
	}

	/// Run the adapter until shutdown or a fatal close.
	pub async fn run(mut self, mut control_rx: GatewayControlRx, events_tx: GatewayEventTx) -> anyhow::Result<()> {
		let adapter_session_id = new_session_id();
		let _ = events_tx.try_send(status(
			true,
			format!("discord gateway starting (session_id={adapter_session_id})"),
		));

		let mut reconnect_attempt: u32 = 0;

		loop {
			let delay = if reconnect_attempt == 0 {
				Duration::from_millis(0)
			} else {
				Self::backoff_delay(reconnect_attempt, self.cfg.reconnect_min_delay, self.cfg.reconnect_max_delay)
			};

			if delay > Duration::from_millis(0) {
				metrics::counter!("reactgate_gateway_reconnects_total").increment(1);
				let _ = events_tx.try_send(status(
					false,
					format!("reconnecting in {:?} (attempt={reconnect_attempt})", delay),
				));
				tokio::select! {
					_ = control_rx.recv() => break,
					_ = sleep(delay) => {}
				}
			}

			let base = self
				.resume
				.as_ref()
				.and_then(|r| r.resume_url.clone())
				.unwrap_or_else(|| self.cfg.gateway_url.clone());

			let url = match Self::ws_url(&base) {
				Ok(u) => u,
				Err(e) => {
					let _ = events_tx.try_send(status_error(format!("invalid gateway url: {base}"), e));
					self.resume = None;
					reconnect_attempt = reconnect_attempt.saturating_add(1);
					continue;
				}
			};

			let mut ws = match Self::connect_ws(url).await {
				Ok(ws) => ws,
				Err(e) => {
					reconnect_attempt = reconnect_attempt.saturating_add(1);
					let _ = events_tx.try_send(status_error("failed to connect discord gateway", e));
					continue;
				}
			};

			match self
				.run_session(&mut ws, &mut control_rx, &events_tx, &mut reconnect_attempt)
				.await
			{
				Ok(SessionEnd::Shutdown) => {
					let _ = ws.close(None).await;
					break;
				}
				Ok(SessionEnd::Reconnect) => {
					reconnect_attempt = reconnect_attempt.saturating_add(1);
				}
				Err(e) => {
					if e.downcast_ref::<GatewayError>().is_some() {
						let _ = events_tx.try_send(status_error("discord gateway stopped", &e));
						return Err(e);
					}
					let _ = events_tx.try_send(status_error("gateway session error", &e));
					reconnect_attempt = reconnect_attempt.saturating_add(1);
				}
			}
		}

		let _ = events_tx.try_send(status(false, "discord gateway stopped"));
		Ok(())
	}
}
