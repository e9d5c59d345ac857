use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Progress reported by the long-running catalog stages.
///
/// Delivery is at-least-once per reporting point; `completed` in `Probe`
/// only ever increases within one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "camelCase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Parse { percent: f64, channels_found: usize },
    #[serde(rename_all = "camelCase")]
    Probe {
        channel_name: String,
        completed: usize,
        total: usize,
    },
    Unify { percent: f64, message: String },
}

pub type ProgressSender = UnboundedSender<ProgressEvent>;

/// Send an event if anyone is listening; a closed receiver is ignored
pub fn report(progress: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}
