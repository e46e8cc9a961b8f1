//! SSE-to-Kafka bridge.
//!
//! The streaming connection feeds decoded events into a bounded channel; a
//! separate worker drains the channel and publishes, so a publish-latency
//! spike never stalls the socket read. A publish failure is handled in
//! exactly one place (the worker) according to the configured
//! [`FailurePolicy`].
//!
//! One session is an explicit state machine:
//!
//! ```text
//! Connecting -> Streaming -> Backoff -> Connecting -> ...
//!      \------------\----------\--> Stopped (deadline or stop policy)
//! ```
//!
//! The whole session is bounded by a wall-clock deadline; at the deadline the
//! connection is torn down and no further events are forwarded until the
//! process is restarted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{Config, FailurePolicy};
use crate::error::AppResult;
use crate::publisher::EventSink;
use crate::sse::{EventStream, SseClient, SseEvent};

/// A connectable event source. Splitting connect from streaming lets the
/// session distinguish the `Connecting` and `Streaming` states.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> AppResult<Box<dyn EventFeed>>;
}

/// An open connection delivering events until it ends.
#[async_trait]
pub trait EventFeed: Send {
    async fn forward(self: Box<Self>, tx: mpsc::Sender<SseEvent>) -> AppResult<()>;
}

#[async_trait]
impl EventSource for SseClient {
    async fn connect(&self) -> AppResult<Box<dyn EventFeed>> {
        let stream = SseClient::connect(self).await?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl EventFeed for EventStream {
    async fn forward(self: Box<Self>, tx: mpsc::Sender<SseEvent>) -> AppResult<()> {
        EventStream::forward(*self, tx).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

/// What the worker did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishDisposition {
    Forwarded,
    Dropped,
    SessionStop,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SessionReport {
    pub forwarded: u64,
    pub dropped: u64,
    /// True when the stop failure policy ended the session early.
    pub stopped_by_policy: bool,
}

/// Apply the failure policy to a single publish. This is the only place that
/// decides drop vs retry vs stop.
async fn publish_with_policy(
    sink: &dyn EventSink,
    payload: &str,
    policy: FailurePolicy,
    max_attempts: u32,
    retry_delay: Duration,
) -> PublishDisposition {
    let first_err = match sink.publish(payload).await {
        Ok(()) => return PublishDisposition::Forwarded,
        Err(err) => err,
    };

    match policy {
        FailurePolicy::Drop => {
            warn!(error = %first_err, "publish failed, dropping event");
            PublishDisposition::Dropped
        }
        FailurePolicy::Stop => {
            error!(error = %first_err, "publish failed, stopping session");
            PublishDisposition::SessionStop
        }
        FailurePolicy::Retry => {
            if !first_err.is_retryable() {
                warn!(error = %first_err, "publish failed fatally, dropping event");
                return PublishDisposition::Dropped;
            }
            for attempt in 1..=max_attempts {
                sleep(retry_delay).await;
                match sink.publish(payload).await {
                    Ok(()) => {
                        debug!(attempt, "publish retry succeeded");
                        return PublishDisposition::Forwarded;
                    }
                    Err(err) if err.is_retryable() => {
                        warn!(attempt, error = %err, "publish retry failed");
                    }
                    Err(err) => {
                        warn!(attempt, error = %err, "publish failed fatally, dropping event");
                        return PublishDisposition::Dropped;
                    }
                }
            }
            warn!(max_attempts, "publish retries exhausted, dropping event");
            PublishDisposition::Dropped
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<SseEvent>,
    sink: Arc<dyn EventSink>,
    policy: FailurePolicy,
    max_attempts: u32,
    retry_delay: Duration,
    stop: Arc<AtomicBool>,
) -> SessionReport {
    let mut report = SessionReport::default();

    while let Some(event) = rx.recv().await {
        match publish_with_policy(sink.as_ref(), &event.data, policy, max_attempts, retry_delay)
            .await
        {
            PublishDisposition::Forwarded => report.forwarded += 1,
            PublishDisposition::Dropped => report.dropped += 1,
            PublishDisposition::SessionStop => {
                report.dropped += 1;
                report.stopped_by_policy = true;
                stop.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
    report
}

/// Exponential reconnect backoff, capped.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp).min(max)
}

/// One bounded streaming session: connect, stream, back off and reconnect on
/// transient failures, stop at the deadline.
pub struct StreamSession {
    config: Config,
    source: Arc<dyn EventSource>,
    sink: Arc<dyn EventSink>,
}

impl StreamSession {
    pub fn new(config: Config, source: Arc<dyn EventSource>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            source,
            sink,
        }
    }

    pub async fn run(&self) -> AppResult<SessionReport> {
        let deadline = Instant::now() + self.config.session_duration;
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let stop = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&self.sink),
            self.config.failure_policy,
            self.config.publish_retry_attempts,
            self.config.publish_retry_delay,
            Arc::clone(&stop),
        ));

        let mut state = SessionState::Connecting;
        let mut attempt: u32 = 0;

        while state != SessionState::Stopped {
            if stop.load(Ordering::SeqCst) {
                state = SessionState::Stopped;
                break;
            }

            match state {
                SessionState::Connecting => {
                    info!(attempt, "connecting to event stream");
                    match timeout_at(deadline, self.source.connect()).await {
                        Err(_) => state = SessionState::Stopped,
                        Ok(Ok(feed)) => {
                            state = SessionState::Streaming;
                            info!(state = ?state, "event stream connected");
                            match timeout_at(deadline, feed.forward(tx.clone())).await {
                                Err(_) => state = SessionState::Stopped,
                                Ok(Ok(())) => {
                                    debug!("stream ended, scheduling reconnect");
                                    state = SessionState::Backoff;
                                }
                                Ok(Err(err)) if err.is_retryable() => {
                                    warn!(error = %err, "stream failed, scheduling reconnect");
                                    state = SessionState::Backoff;
                                }
                                Ok(Err(err)) => {
                                    drop(tx);
                                    let report = worker.await.unwrap_or_default();
                                    warn!(
                                        forwarded = report.forwarded,
                                        dropped = report.dropped,
                                        "session aborted by fatal stream error"
                                    );
                                    return Err(err);
                                }
                            }
                        }
                        Ok(Err(err)) if err.is_retryable() => {
                            warn!(error = %err, "connect failed, scheduling reconnect");
                            state = SessionState::Backoff;
                        }
                        Ok(Err(err)) => {
                            drop(tx);
                            let _ = worker.await;
                            return Err(err);
                        }
                    }
                }
                SessionState::Backoff => {
                    attempt += 1;
                    let delay = backoff_delay(
                        attempt,
                        self.config.backoff_base,
                        self.config.backoff_max,
                    );
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
                    if Instant::now() + delay >= deadline {
                        tokio::time::sleep_until(deadline).await;
                        state = SessionState::Stopped;
                    } else {
                        sleep(delay).await;
                        state = SessionState::Connecting;
                    }
                }
                SessionState::Streaming | SessionState::Stopped => unreachable!(),
            }
        }

        // Closing the channel lets the worker drain whatever is queued and exit.
        drop(tx);
        let report = worker.await.unwrap_or_default();
        info!(
            forwarded = report.forwarded,
            dropped = report.dropped,
            stopped_by_policy = report.stopped_by_policy,
            "session stopped"
        );
        Ok(report)
    }
}
