//! JSON-line channel between the engine and the page-side agent.
//!
//! One JSON object per line. Inbound (stdin): workflow triggers, status
//! queries, and results for previously requested actions. Outbound
//! (stdout): action requests, workflow events, status replies, and
//! notices. Logs never go to stdout in channel mode; the protocol owns
//! that stream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::handlers::HandlerRegistry;
use crate::page::EnvSnapshot;
use crate::progress::{ProgressReporter, WorkflowEvent};
use crate::sink::{ActionError, ActionSink, NoticeLevel};
use crate::state::{FileStateStore, StateStore};
use crate::workflow::orchestrator::{WorkflowOrchestrator, WorkflowStatus};
use crate::workflow::probe::EnvironmentProbe;
use crate::workflow::retry::RetryPolicy;
use crate::workflow::run::ListingPayload;

/// One primitive effect the page agent is asked to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionRequest {
    Snapshot,
    SetField { field: String, value: String },
    Click { target: String },
    ClickChoice { group: String, label: String },
    SelectOption { field: String, value: String },
    AttachImage { source: String },
    ShowNotice { level: NoticeLevel, text: String },
}

/// Failure classification reported by the page agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    TargetNotFound,
    Rejected,
    AssetFetch,
}

/// Lines the page agent (or host) sends us.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    RunWorkflow {
        payload: ListingPayload,
    },
    GetStatus,
    Reset,
    ActionResult {
        id: u64,
        ok: bool,
        #[serde(default)]
        snapshot: Option<EnvSnapshot>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        error_kind: Option<WireErrorKind>,
    },
}

/// Lines we send that are not workflow events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    Action {
        id: u64,
        action: ActionRequest,
    },
    Status {
        status: Option<WorkflowStatus>,
    },
    Notice {
        level: NoticeLevel,
        text: String,
    },
    ProtocolError {
        error: String,
    },
}

/// Anything that can go out on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Event(WorkflowEvent),
    Message(ChannelMessage),
}

struct ActionReply {
    ok: bool,
    snapshot: Option<EnvSnapshot>,
    error: Option<String>,
    error_kind: Option<WireErrorKind>,
}

/// [`ActionSink`] backed by the JSON-line protocol.
///
/// Each request gets an id; the reader loop routes the matching
/// `action_result` back through a oneshot. A closed outbound channel or
/// a dropped reply reads as [`ActionError::ChannelClosed`].
pub struct ChannelSink {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ActionReply>>>,
    next_id: AtomicU64,
}

impl ChannelSink {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Route an `action_result` line to the waiting request, if any.
    fn resolve(&self, id: u64, reply: ActionReply) {
        let waiter = self.pending.lock().expect("pending lock poisoned").remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => warn!(id, "Action result for unknown request id"),
        }
    }

    async fn request(&self, action: ActionRequest) -> Result<ActionReply, ActionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(id, tx);

        let sent = self
            .outbound
            .send(Outbound::Message(ChannelMessage::Action { id, action }));
        if sent.is_err() {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id);
            return Err(ActionError::ChannelClosed);
        }

        rx.await.map_err(|_| ActionError::ChannelClosed)
    }

    fn reply_to_result(reply: ActionReply, target: &str) -> Result<ActionReply, ActionError> {
        if reply.ok {
            return Ok(reply);
        }
        let reason = reply.error.unwrap_or_else(|| "unspecified".to_string());
        Err(match reply.error_kind {
            Some(WireErrorKind::TargetNotFound) => ActionError::TargetNotFound {
                target: target.to_string(),
            },
            Some(WireErrorKind::AssetFetch) => ActionError::AssetFetch {
                asset: target.to_string(),
                reason,
            },
            Some(WireErrorKind::Rejected) | None => ActionError::Rejected {
                target: target.to_string(),
                reason,
            },
        })
    }

    async fn perform(&self, action: ActionRequest, target: &str) -> Result<(), ActionError> {
        let reply = self.request(action).await?;
        Self::reply_to_result(reply, target).map(|_| ())
    }
}

#[async_trait]
impl ActionSink for ChannelSink {
    async fn snapshot(&self) -> Result<EnvSnapshot, ActionError> {
        let reply = self.request(ActionRequest::Snapshot).await?;
        let reply = Self::reply_to_result(reply, "snapshot")?;
        reply.snapshot.ok_or(ActionError::Rejected {
            target: "snapshot".to_string(),
            reason: "result carried no snapshot".to_string(),
        })
    }

    async fn set_field(&self, field: &str, value: &str) -> Result<(), ActionError> {
        self.perform(
            ActionRequest::SetField {
                field: field.to_string(),
                value: value.to_string(),
            },
            field,
        )
        .await
    }

    async fn click(&self, target: &str) -> Result<(), ActionError> {
        self.perform(
            ActionRequest::Click {
                target: target.to_string(),
            },
            target,
        )
        .await
    }

    async fn click_choice(&self, group: &str, label: &str) -> Result<(), ActionError> {
        self.perform(
            ActionRequest::ClickChoice {
                group: group.to_string(),
                label: label.to_string(),
            },
            group,
        )
        .await
    }

    async fn select_option(&self, field: &str, value: &str) -> Result<(), ActionError> {
        self.perform(
            ActionRequest::SelectOption {
                field: field.to_string(),
                value: value.to_string(),
            },
            field,
        )
        .await
    }

    async fn attach_image(&self, source: &str) -> Result<(), ActionError> {
        self.perform(
            ActionRequest::AttachImage {
                source: source.to_string(),
            },
            source,
        )
        .await
    }

    async fn show_notice(&self, level: NoticeLevel, text: &str) {
        // Fire-and-forget, no reply expected.
        let _ = self.outbound.send(Outbound::Message(ChannelMessage::Notice {
            level,
            text: text.to_string(),
        }));
    }
}

/// Run the channel loop over stdin/stdout until stdin closes.
pub async fn run_channel(config: Config) -> Result<()> {
    let store: Arc<dyn StateStore> =
        Arc::new(FileStateStore::new(config.state_path()).context("Failed to open state store")?);
    let (reporter, events) = ProgressReporter::new();
    let hard = RetryPolicy::hard()
        .with_base_delay(config.hard_base_delay())
        .with_max_attempts(config.retry.hard_attempts as usize);
    let soft = RetryPolicy::soft().with_base_delay(config.soft_base_delay());
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        EnvironmentProbe::new(),
        HandlerRegistry::tuned(hard, soft),
        store.clone(),
        reporter,
        config.poll_settings(),
    ));

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink::new(outbound_tx.clone()));

    let writer = tokio::spawn(write_outbound(outbound_rx));
    let forwarder = forward_events(events, outbound_tx.clone());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    info!("Channel open, waiting for commands");
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(&line) {
            Ok(inbound) => {
                handle_inbound(inbound, &orchestrator, &store, &sink, &outbound_tx);
            }
            Err(err) => {
                debug!(line, "Unparseable inbound line");
                let _ = outbound_tx.send(Outbound::Message(ChannelMessage::ProtocolError {
                    error: format!("unparseable line: {err}"),
                }));
            }
        }
    }

    info!("Channel closed");
    // The forwarder holds an outbound sender and only exits once every
    // ProgressReporter clone is gone, so the orchestrator must go first
    // or the writer below never sees its channel close.
    drop(sink);
    drop(orchestrator);
    let _ = forwarder.await;
    drop(outbound_tx);
    let _ = writer.await;
    Ok(())
}

fn handle_inbound(
    inbound: Inbound,
    orchestrator: &Arc<WorkflowOrchestrator>,
    store: &Arc<dyn StateStore>,
    sink: &Arc<ChannelSink>,
    outbound: &mpsc::UnboundedSender<Outbound>,
) {
    match inbound {
        Inbound::RunWorkflow { payload } => {
            // The reader loop must keep running to route action results,
            // so the workflow itself runs on its own task.
            let orchestrator = Arc::clone(orchestrator);
            let sink: Arc<dyn ActionSink> = Arc::clone(sink) as Arc<dyn ActionSink>;
            tokio::spawn(async move {
                match orchestrator.run(&payload, sink).await {
                    Ok(report) => debug!(?report, "Workflow cycle finished"),
                    Err(err) => error!("Workflow cycle failed: {err:#}"),
                }
            });
        }
        Inbound::GetStatus => {
            let status = match orchestrator.status() {
                Ok(status) => status,
                Err(err) => {
                    error!("Status query failed: {err:#}");
                    None
                }
            };
            let _ = outbound.send(Outbound::Message(ChannelMessage::Status { status }));
        }
        Inbound::Reset => {
            if let Err(err) = store.clear() {
                error!("Reset failed: {err:#}");
            } else {
                info!("Run state cleared");
            }
            let _ = outbound.send(Outbound::Message(ChannelMessage::Status { status: None }));
        }
        Inbound::ActionResult {
            id,
            ok,
            snapshot,
            error,
            error_kind,
        } => {
            sink.resolve(
                id,
                ActionReply {
                    ok,
                    snapshot,
                    error,
                    error_kind,
                },
            );
        }
    }
}

/// Serialize outbound values one per line on stdout.
async fn write_outbound(mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let mut stdout = tokio::io::stdout();
    while let Some(outbound) = rx.recv().await {
        let line = match serde_json::to_string(&outbound) {
            Ok(line) => line,
            Err(err) => {
                error!("Failed to serialize outbound line: {err}");
                continue;
            }
        };
        if stdout.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdout.write_all(b"\n").await.is_err() {
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Forward workflow events onto the shared outbound writer. The task ends
/// when the last `ProgressReporter` clone is dropped.
fn forward_events(
    mut events: mpsc::UnboundedReceiver<WorkflowEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if outbound.send(Outbound::Event(event)).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_run_workflow_shape() {
        let line = r#"{"type":"run_workflow","payload":{"title":"Desk lamp","price":"15","description":"Barely used","postal_code":"94118"}}"#;
        let inbound: Inbound = serde_json::from_str(line).unwrap();
        match inbound {
            Inbound::RunWorkflow { payload } => {
                assert_eq!(payload.title, "Desk lamp");
                assert_eq!(payload.postal_code, "94118");
                assert!(payload.images.is_empty());
            }
            other => panic!("unexpected inbound: {other:?}"),
        }
    }

    #[test]
    fn test_inbound_action_result_shape() {
        let line = r#"{"type":"action_result","id":3,"ok":false,"error":"no such element","error_kind":"target_not_found"}"#;
        let inbound: Inbound = serde_json::from_str(line).unwrap();
        match inbound {
            Inbound::ActionResult {
                id,
                ok,
                error_kind,
                ..
            } => {
                assert_eq!(id, 3);
                assert!(!ok);
                assert_eq!(error_kind, Some(WireErrorKind::TargetNotFound));
            }
            other => panic!("unexpected inbound: {other:?}"),
        }
    }

    #[test]
    fn test_outbound_action_shape() {
        let msg = Outbound::Message(ChannelMessage::Action {
            id: 7,
            action: ActionRequest::Click {
                target: "form-continue".to_string(),
            },
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "action");
        assert_eq!(json["id"], 7);
        assert_eq!(json["action"]["kind"], "click");
        assert_eq!(json["action"]["target"], "form-continue");
    }

    #[test]
    fn test_outbound_event_keeps_own_tag() {
        let msg = Outbound::Event(WorkflowEvent::PostingComplete {
            requires_confirmation: true,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "posting_complete");
        assert_eq!(json["requires_confirmation"], true);
    }

    #[tokio::test]
    async fn test_sink_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink::new(tx));

        let worker = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { sink.click("form-continue").await })
        };

        // The page agent side: read the request, answer it.
        let Some(Outbound::Message(ChannelMessage::Action { id, action })) = rx.recv().await
        else {
            panic!("expected an action request");
        };
        assert_eq!(
            action,
            ActionRequest::Click {
                target: "form-continue".to_string(),
            }
        );
        sink.resolve(
            id,
            ActionReply {
                ok: true,
                snapshot: None,
                error: None,
                error_kind: None,
            },
        );

        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_sink_error_classification() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink::new(tx));

        let worker = {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move { sink.attach_image("broken.jpg").await })
        };

        let Some(Outbound::Message(ChannelMessage::Action { id, .. })) = rx.recv().await else {
            panic!("expected an action request");
        };
        sink.resolve(
            id,
            ActionReply {
                ok: false,
                snapshot: None,
                error: Some("404".to_string()),
                error_kind: Some(WireErrorKind::AssetFetch),
            },
        );

        let err = worker.await.unwrap().unwrap_err();
        assert!(matches!(err, ActionError::AssetFetch { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_closes_outbound() {
        use crate::handlers::PollSettings;
        use crate::state::MemoryStateStore;
        use std::time::Duration;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink::new(outbound_tx.clone()));
        let (reporter, events) = ProgressReporter::new();
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            EnvironmentProbe::new(),
            HandlerRegistry::standard(),
            store,
            reporter,
            PollSettings::default(),
        ));
        let forwarder = forward_events(events, outbound_tx.clone());

        // The shutdown order used after stdin EOF: the orchestrator owns
        // the last event sender, so it has to go before the forwarder can
        // finish and the outbound channel can close.
        drop(sink);
        drop(orchestrator);
        tokio::time::timeout(Duration::from_millis(500), forwarder)
            .await
            .expect("event forwarder must stop once the reporter is gone")
            .unwrap();

        drop(outbound_tx);
        let next = tokio::time::timeout(Duration::from_millis(500), outbound_rx.recv())
            .await
            .expect("outbound channel must close after the last sender drops");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_closed_channel_reads_as_channel_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = ChannelSink::new(tx);

        let err = sink.click("anything").await.unwrap_err();
        assert!(matches!(err, ActionError::ChannelClosed));
    }
}
