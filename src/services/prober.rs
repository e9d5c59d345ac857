use chrono::Utc;
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{CatalogError, Result};
use crate::models::{report, Channel, ChannelStatus, ProgressEvent, ProgressSender};
use crate::services::m3u_parser::is_valid_stream_url;

/// Tunables for a probe run
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Maximum probes in flight at once
    pub concurrency: usize,
    pub connect_timeout: Duration,
    /// Total time allowed per request
    pub timeout: Duration,
    /// Successful probes at or above this are `slow`
    pub slow_threshold: Duration,
    /// How long in-flight probes may keep running after cancellation
    pub grace: Duration,
    pub user_agent: String,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            connect_timeout: Duration::from_secs(3),
            timeout: Duration::from_secs(5),
            slow_threshold: Duration::from_secs(2),
            grace: Duration::from_secs(5),
            user_agent: "VLC/3.0.20 LibVLC/3.0.20".to_string(),
        }
    }
}

/// What a single check observed, before timing is taken into account
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// 2xx from HEAD, or from the GET retry
    Success,
    /// Non-2xx answer to both HEAD and GET
    HttpStatus(u16),
    /// Network, timeout, TLS or URL failure
    Failed(String),
}

/// Map an outcome and its elapsed time to a channel status
pub fn classify(outcome: &ProbeOutcome, elapsed: Duration, slow_threshold: Duration) -> ChannelStatus {
    match outcome {
        ProbeOutcome::Success if elapsed < slow_threshold => ChannelStatus::Online,
        ProbeOutcome::Success => ChannelStatus::Slow,
        _ => ChannelStatus::Offline,
    }
}

/// Aggregate result of a probe run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSummary {
    pub total: usize,
    pub completed: usize,
    pub online: usize,
    pub slow: usize,
    pub offline: usize,
    /// Probes that were still running when the grace period ran out
    pub abandoned: usize,
    pub cancelled: bool,
}

impl ProbeSummary {
    fn tally(&mut self, status: ChannelStatus) {
        self.completed += 1;
        match status {
            ChannelStatus::Online => self.online += 1,
            ChannelStatus::Slow => self.slow += 1,
            _ => self.offline += 1,
        }
    }
}

/// HTTP availability prober
pub struct Prober {
    client: Client,
    options: ProbeOptions,
}

impl Prober {
    pub fn new(options: ProbeOptions) -> Result<Self> {
        // Streaming endpoints are user supplied, certificates are not verified
        let client = Client::builder()
            .user_agent(&options.user_agent)
            .connect_timeout(options.connect_timeout)
            .timeout(options.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &ProbeOptions {
        &self.options
    }

    /// HEAD first; a non-2xx answer is retried once with GET
    async fn check(&self, url: String) -> ProbeOutcome {
        let head = match self.client.head(&url).send().await {
            Ok(resp) => resp,
            Err(e) => return ProbeOutcome::Failed(CatalogError::from(e).to_string()),
        };

        if head.status().is_success() {
            return ProbeOutcome::Success;
        }

        tracing::debug!("HEAD {} answered {}, retrying with GET", url, head.status());

        match self.client.get(&url).send().await {
            Ok(mut resp) if resp.status().is_success() => {
                // First chunk is enough, never pull the whole stream
                match resp.chunk().await {
                    Ok(_) => ProbeOutcome::Success,
                    Err(e) => ProbeOutcome::Failed(CatalogError::from(e).to_string()),
                }
            }
            Ok(resp) => ProbeOutcome::HttpStatus(resp.status().as_u16()),
            Err(e) => ProbeOutcome::Failed(CatalogError::from(e).to_string()),
        }
    }

    /// Probe a single channel in place
    pub async fn probe_channel(&self, channel: &mut Channel) -> ChannelStatus {
        let started = Instant::now();
        let outcome = self.check(channel.url.clone()).await;
        apply_outcome(channel, &outcome, started.elapsed(), self.options.slow_threshold)
    }

    /// Probe every channel, at most `concurrency` at a time
    pub async fn probe_all(
        &self,
        channels: &mut [Channel],
        cancel: &CancellationToken,
        progress: Option<&ProgressSender>,
    ) -> ProbeSummary {
        run_probes(channels, &self.options, cancel, progress, |url| self.check(url)).await
    }
}

fn apply_outcome(
    channel: &mut Channel,
    outcome: &ProbeOutcome,
    elapsed: Duration,
    slow_threshold: Duration,
) -> ChannelStatus {
    let status = classify(outcome, elapsed, slow_threshold);
    channel.record_probe(status, Some(elapsed.as_secs_f64()), Utc::now());

    match outcome {
        ProbeOutcome::Failed(reason) => {
            tracing::debug!("Channel '{}' offline: {}", channel.name, reason)
        }
        ProbeOutcome::HttpStatus(code) => {
            tracing::debug!("Channel '{}' offline: HTTP {}", channel.name, code)
        }
        ProbeOutcome::Success => {
            tracing::debug!("Channel '{}' {} in {:.2}s", channel.name, status, elapsed.as_secs_f64())
        }
    }

    status
}

/// Probe one slot; a panicking check counts as offline
async fn probe_slot<Fut>(channel: &mut Channel, check: Fut, slow_threshold: Duration) -> (String, ChannelStatus)
where
    Fut: Future<Output = ProbeOutcome>,
{
    let started = Instant::now();
    let outcome = AssertUnwindSafe(check)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| ProbeOutcome::Failed("probe panicked".to_string()));
    let status = apply_outcome(channel, &outcome, started.elapsed(), slow_threshold);
    (channel.name.clone(), status)
}

/// Bounded fan-out over the channel slots.
///
/// Each probe owns exactly one `&mut Channel` and writes it once, on
/// completion. Slots whose URL cannot be valid are marked offline without
/// taking a connection slot. After `cancel` fires no new probe starts;
/// in-flight ones get `options.grace` to finish and are dropped (left
/// untouched) after that.
pub async fn run_probes<F, Fut>(
    channels: &mut [Channel],
    options: &ProbeOptions,
    cancel: &CancellationToken,
    progress: Option<&ProgressSender>,
    check: F,
) -> ProbeSummary
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = ProbeOutcome>,
{
    let total = channels.len();
    let mut summary = ProbeSummary {
        total,
        ..Default::default()
    };
    if total == 0 {
        return summary;
    }

    let concurrency = options.concurrency.max(1);
    let mut slots = channels.iter_mut();
    let mut in_flight = FuturesUnordered::new();
    let mut deadline: Option<Instant> = None;

    loop {
        // Top up to the concurrency cap
        while deadline.is_none() && !cancel.is_cancelled() && in_flight.len() < concurrency {
            let Some(channel) = slots.next() else {
                break;
            };

            if !is_valid_stream_url(&channel.url) {
                channel.mark_offline(Utc::now());
                tracing::debug!("Channel '{}' offline: malformed URL", channel.name);
                summary.tally(ChannelStatus::Offline);
                report(
                    progress,
                    ProgressEvent::Probe {
                        channel_name: channel.name.clone(),
                        completed: summary.completed,
                        total,
                    },
                );
                continue;
            }

            let pending = check(channel.url.clone());
            in_flight.push(probe_slot(channel, pending, options.slow_threshold));
        }

        if in_flight.is_empty() {
            break;
        }

        if deadline.is_none() && cancel.is_cancelled() {
            tracing::info!("Probe cancelled, waiting up to {:?} for in-flight probes", options.grace);
            deadline = Some(Instant::now() + options.grace);
        }

        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, in_flight.next()).await {
                Ok(next) => next,
                Err(_) => {
                    summary.abandoned = in_flight.len();
                    tracing::warn!("Abandoning {} probes after grace period", summary.abandoned);
                    break;
                }
            },
            None => tokio::select! {
                next = in_flight.next() => next,
                _ = cancel.cancelled() => continue,
            },
        };

        let Some((channel_name, status)) = next else {
            break;
        };

        summary.tally(status);
        report(
            progress,
            ProgressEvent::Probe {
                channel_name,
                completed: summary.completed,
                total,
            },
        );
    }

    summary.cancelled = cancel.is_cancelled();

    tracing::info!(
        "Probe finished: {} online, {} slow, {} offline ({} of {} probed{})",
        summary.online,
        summary.slow,
        summary.offline,
        summary.completed,
        total,
        if summary.cancelled { ", cancelled" } else { "" }
    );

    summary
}
