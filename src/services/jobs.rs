use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::{ProgressEvent, ProgressSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    Load,
    Probe,
    Unify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobPhase {
    Idle,
    Running,
    Complete,
    Cancelled,
    Failed,
}

/// Polled view of the current (or last) job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<JobKind>,
    pub phase: JobPhase,
    pub percent: f64,
    pub completed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub fn idle() -> Self {
        Self {
            kind: None,
            phase: JobPhase::Idle,
            percent: 0.0,
            completed: 0,
            total: 0,
            message: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn started(kind: JobKind) -> Self {
        Self {
            kind: Some(kind),
            phase: JobPhase::Running,
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == JobPhase::Running
    }

    /// Fold one progress event into the status
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Parse {
                percent,
                channels_found,
            } => {
                self.percent = *percent;
                self.completed = *channels_found;
                self.message = Some(format!("{} channels found", channels_found));
            }
            ProgressEvent::Probe {
                channel_name,
                completed,
                total,
            } => {
                // out-of-order delivery never moves the counter back
                self.completed = self.completed.max(*completed);
                self.total = *total;
                self.percent = if *total == 0 {
                    100.0
                } else {
                    self.completed as f64 * 100.0 / *total as f64
                };
                self.message = Some(format!("Checked {}", channel_name));
            }
            ProgressEvent::Unify { percent, message } => {
                self.percent = *percent;
                self.message = Some(message.clone());
            }
        }
    }

    fn finish(&mut self, phase: JobPhase, message: String) {
        self.phase = phase;
        if phase == JobPhase::Complete {
            self.percent = 100.0;
        }
        self.message = Some(message);
        self.finished_at = Some(Utc::now());
    }
}

/// How a job ended
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Complete(String),
    Cancelled(String),
    Failed(String),
}

/// Tracks the single catalog job and its cancellation token
pub struct JobTracker {
    status: RwLock<JobStatus>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self {
            status: RwLock::new(JobStatus::idle()),
            cancel: Mutex::new(None),
        }
    }
}

impl JobTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn status(&self) -> JobStatus {
        self.status.read().await.clone()
    }

    /// Start tracking a job. Progress sent through the handle is folded
    /// into the status until the handle is finished.
    pub async fn begin(self: &Arc<Self>, kind: JobKind) -> JobHandle {
        let token = CancellationToken::new();
        *self.cancel.lock().await = Some(token.clone());
        *self.status.write().await = JobStatus::started(kind);

        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let tracker = self.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracker.status.write().await.apply(&event);
            }
        });

        tracing::info!("Job {:?} started", kind);

        JobHandle {
            kind,
            token,
            progress: tx,
            forwarder,
            tracker: self.clone(),
        }
    }

    /// Request cancellation of the running job; false when nothing runs
    pub async fn cancel(&self) -> bool {
        let running = self.status.read().await.is_running();
        match self.cancel.lock().await.as_ref() {
            Some(token) if running => {
                token.cancel();
                tracing::info!("Job cancellation requested");
                true
            }
            _ => false,
        }
    }
}

/// A running job: its token, its progress sender and the status it feeds
pub struct JobHandle {
    kind: JobKind,
    token: CancellationToken,
    progress: ProgressSender,
    forwarder: JoinHandle<()>,
    tracker: Arc<JobTracker>,
}

impl JobHandle {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn progress(&self) -> &ProgressSender {
        &self.progress
    }

    /// Drain pending progress, then record the outcome
    pub async fn finish(self, outcome: JobOutcome) {
        let JobHandle {
            kind,
            progress,
            forwarder,
            tracker,
            ..
        } = self;

        drop(progress);
        if let Err(e) = forwarder.await {
            tracing::warn!("Progress forwarder for {:?} ended abnormally: {}", kind, e);
        }

        let (phase, message) = match outcome {
            JobOutcome::Complete(m) => (JobPhase::Complete, m),
            JobOutcome::Cancelled(m) => (JobPhase::Cancelled, m),
            JobOutcome::Failed(m) => {
                tracing::error!("Job {:?} failed: {}", kind, m);
                (JobPhase::Failed, m)
            }
        };

        tracing::info!("Job {:?} finished: {:?}", kind, phase);
        tracker.status.write().await.finish(phase, message);
        *tracker.cancel.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::report;

    #[test]
    fn test_probe_events_never_move_backwards() {
        let mut status = JobStatus::started(JobKind::Probe);
        let event = |completed| ProgressEvent::Probe {
            channel_name: "A".to_string(),
            completed,
            total: 4,
        };

        status.apply(&event(2));
        status.apply(&event(1));
        assert_eq!(status.completed, 2);
        assert_eq!(status.percent, 50.0);

        status.apply(&event(4));
        assert_eq!(status.percent, 100.0);
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let tracker = JobTracker::new();
        assert_eq!(tracker.status().await.phase, JobPhase::Idle);
        assert!(!tracker.cancel().await);

        let job = tracker.begin(JobKind::Load).await;
        report(
            Some(job.progress()),
            ProgressEvent::Parse {
                percent: 40.0,
                channels_found: 12,
            },
        );
        job.finish(JobOutcome::Complete("Loaded 12 channels".to_string())).await;

        let status = tracker.status().await;
        assert_eq!(status.phase, JobPhase::Complete);
        assert_eq!(status.completed, 12);
        assert_eq!(status.percent, 100.0);
        assert!(status.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_fires_token() {
        let tracker = JobTracker::new();
        let job = tracker.begin(JobKind::Probe).await;
        let token = job.token().clone();

        assert!(tracker.cancel().await);
        assert!(token.is_cancelled());

        job.finish(JobOutcome::Cancelled("Stopped".to_string())).await;
        assert_eq!(tracker.status().await.phase, JobPhase::Cancelled);
        assert!(!tracker.cancel().await);
    }
}
