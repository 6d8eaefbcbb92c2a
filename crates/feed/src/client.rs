//! Feed client: handshake, subscription, and the reconnect loop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};

use gammaflow_core::clock;
use gammaflow_core::{FeedConfig, TradePrint};

use crate::error::FeedError;
use crate::message::FeedMessage;
use crate::stats::FeedStats;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the auth acknowledgment before treating the
/// credentials as rejected.
const AUTH_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Observer heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Subscription pattern covering every trade print on the feed.
const ALL_TRADES_PATTERN: &str = "T.*";

/// Events emitted to an optional observer channel. Send failures are
/// ignored; a slow or dead observer never affects ingestion.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Connected,
    Subscribed,
    Disconnected { reason: String },
    Reconnecting { attempt: u32, delay_secs: u64 },
    Heartbeat { trades_parsed: u64 },
}

/// Persistent client for the upstream trade feed.
///
/// `run` owns the socket for the life of the process: it connects,
/// authenticates, subscribes to all trades, and republishes decoded
/// prints. Any transport failure re-enters the handshake through the
/// backoff schedule; auth rejection is the only fatal exit.
pub struct FeedClient {
    config: FeedConfig,
    stats: Arc<FeedStats>,
    event_tx: Option<mpsc::Sender<FeedEvent>>,
}

impl FeedClient {
    /// Creates a new feed client.
    #[must_use]
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            stats: Arc::new(FeedStats::default()),
            event_tx: None,
        }
    }

    /// Sets the observer event channel.
    #[must_use]
    pub fn with_event_channel(mut self, tx: mpsc::Sender<FeedEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Returns a handle to the liveness counters.
    #[must_use]
    pub fn stats(&self) -> Arc<FeedStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the ingestion loop until shutdown or a fatal auth failure.
    ///
    /// Decoded prints are sent on `tx`; a closed receiver ends the loop
    /// cleanly. The shutdown signal is honored between reconnect attempts
    /// and between backoff sleeps.
    ///
    /// # Errors
    /// Returns `FeedError::Auth` when credentials are rejected. Transport
    /// errors are absorbed by the reconnect schedule.
    pub async fn run(
        &self,
        tx: mpsc::Sender<TradePrint>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), FeedError> {
        let mut attempt: usize = 0;

        loop {
            if *shutdown.borrow() {
                info!("Feed client shutting down");
                return Ok(());
            }

            let connected = tokio::select! {
                result = self.connect() => result,
                () = wait_for_shutdown(&mut shutdown) => return Ok(()),
            };

            match connected {
                Ok(stream) => {
                    attempt = 0;
                    self.emit(FeedEvent::Connected).await;
                    info!(url = %self.config.ws_url, "Feed connected and subscribed");

                    match self.consume(stream, &tx, &mut shutdown).await {
                        Ok(()) => {
                            info!("Feed client exiting cleanly");
                            return Ok(());
                        }
                        Err(e) => {
                            warn!(error = %e, "Feed stream interrupted");
                            self.emit(FeedEvent::Disconnected {
                                reason: e.to_string(),
                            })
                            .await;
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Feed authentication failed, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "Feed connect failed");
                }
            }

            if *shutdown.borrow() {
                return Ok(());
            }

            let delay = backoff_delay(&self.config.backoff_schedule_secs, attempt);
            attempt += 1;
            self.stats.record_reconnect();
            self.emit(FeedEvent::Reconnecting {
                attempt: attempt as u32,
                delay_secs: delay.as_secs(),
            })
            .await;
            info!(attempt, delay_secs = delay.as_secs(), "Reconnecting to feed");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = wait_for_shutdown(&mut shutdown) => return Ok(()),
            }
        }
    }

    /// Performs the transport handshake, the two-step auth exchange, and
    /// the blanket trade subscription.
    ///
    /// # Errors
    /// Returns `FeedError::Auth` when the acknowledgment is absent or
    /// malformed, `FeedError::Transport` on socket failures.
    async fn connect(&self) -> Result<WsStream, FeedError> {
        let url = url::Url::parse(&self.config.ws_url)
            .map_err(|e| FeedError::Transport(format!("invalid feed url: {e}")))?;
        let (mut stream, _) = connect_async(url.as_str()).await?;

        await_status(&mut stream, "connected").await?;

        let auth = json!({ "action": "auth", "params": self.config.api_key });
        stream.send(Message::Text(auth.to_string())).await?;

        match tokio::time::timeout(AUTH_ACK_TIMEOUT, await_status(&mut stream, "auth_success"))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(FeedError::Auth(
                    "auth acknowledgment not received".to_string(),
                ))
            }
        }

        let subscribe = json!({ "action": "subscribe", "params": ALL_TRADES_PATTERN });
        stream.send(Message::Text(subscribe.to_string())).await?;
        self.emit(FeedEvent::Subscribed).await;

        Ok(stream)
    }

    /// Consumes frames until the socket drops, the receiver closes, or
    /// shutdown is signalled.
    async fn consume(
        &self,
        mut stream: WsStream,
        tx: &mpsc::Sender<TradePrint>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), FeedError> {
        let mut last_heartbeat = tokio::time::Instant::now();

        loop {
            let msg = tokio::select! {
                msg = stream.next() => msg,
                () = wait_for_shutdown(shutdown) => {
                    let _ = stream.close(None).await;
                    return Ok(());
                }
            };

            let Some(msg) = msg else {
                return Err(FeedError::Closed("stream ended".to_string()));
            };

            match msg? {
                Message::Text(text) => {
                    let now = clock::now_ms();
                    self.stats.record_message(now);

                    match parse_frames(&text) {
                        Ok(frames) => {
                            for frame in frames {
                                if let FeedMessage::Trade(event) = frame {
                                    match event.to_trade_print() {
                                        Some(print) => {
                                            self.stats
                                                .record_trade(now.saturating_sub(print.timestamp_ms));
                                            if tx.send(print).await.is_err() {
                                                info!("Trade channel closed, exiting feed loop");
                                                return Ok(());
                                            }
                                        }
                                        None => self.stats.record_parse_error(),
                                    }
                                }
                            }
                        }
                        Err(_) => self.stats.record_parse_error(),
                    }

                    if last_heartbeat.elapsed() > HEARTBEAT_INTERVAL {
                        self.emit(FeedEvent::Heartbeat {
                            trades_parsed: self.stats.trades_parsed(),
                        })
                        .await;
                        last_heartbeat = tokio::time::Instant::now();
                    }
                }
                Message::Ping(payload) => {
                    let _ = stream.send(Message::Pong(payload)).await;
                }
                Message::Close(_) => {
                    return Err(FeedError::Closed("server closed connection".to_string()));
                }
                _ => {}
            }
        }
    }

    async fn emit(&self, event: FeedEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Picks the reconnect delay for an attempt; the schedule caps at its
/// last entry.
fn backoff_delay(schedule_secs: &[u64], attempt: usize) -> Duration {
    let secs = match schedule_secs {
        [] => 1,
        s => s[attempt.min(s.len() - 1)],
    };
    Duration::from_secs(secs)
}

/// Decodes one websocket text payload into event frames. The feed sends
/// arrays; single objects are tolerated.
fn parse_frames(text: &str) -> Result<Vec<FeedMessage>, FeedError> {
    if let Ok(frames) = serde_json::from_str::<Vec<FeedMessage>>(text) {
        return Ok(frames);
    }
    serde_json::from_str::<FeedMessage>(text)
        .map(|frame| vec![frame])
        .map_err(|e| FeedError::Parse(e.to_string()))
}

/// Waits for a specific status frame, failing on `auth_failed`.
async fn await_status(stream: &mut WsStream, expected: &str) -> Result<(), FeedError> {
    while let Some(msg) = stream.next().await {
        let Message::Text(text) = msg? else { continue };

        let Ok(frames) = serde_json::from_str::<Vec<FeedMessage>>(&text) else {
            continue;
        };
        for frame in frames {
            if let FeedMessage::Status { status, message } = frame {
                if status == expected {
                    return Ok(());
                }
                if status == "auth_failed" {
                    return Err(FeedError::Auth(message));
                }
            }
        }
    }

    Err(FeedError::Closed(
        "stream ended during handshake".to_string(),
    ))
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if shutdown.changed().await.is_err() {
            // Sender dropped: treat as shutdown.
            return;
        }
        if *shutdown.borrow() {
            return;
        }
    }
}
