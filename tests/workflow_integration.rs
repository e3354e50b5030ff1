//! End-to-end workflow tests.
//!
//! Each orchestrator invocation models one page load: the fake sink is
//! pointed at the next wizard page, the orchestrator re-derives the phase
//! and dispatches exactly one step, and persisted state carries the run
//! across "reloads" (including brand-new orchestrator instances).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lister::handlers::{targets, HandlerRegistry, PollSettings};
use lister::page::{markers, EnvSnapshot, SelectOption};
use lister::progress::{ProgressReporter, WorkflowEvent};
use lister::sink::fake::{FakeSink, RecordedAction};
use lister::state::{MemoryStateStore, StateStore};
use lister::workflow::{
    EnvironmentProbe, ListingPayload, Phase, RunReport, WorkflowOrchestrator, MAX_ATTEMPTS,
};
use tokio::sync::mpsc::UnboundedReceiver;

fn car_payload() -> ListingPayload {
    ListingPayload {
        title: "Honda Civic".to_string(),
        price: "4500".to_string(),
        description: "Runs great, new tires".to_string(),
        postal_code: "94118".to_string(),
        condition: Some("good".to_string()),
        images: vec!["civic-front.jpg".to_string()],
        ..Default::default()
    }
}

fn fast_poll() -> PollSettings {
    PollSettings {
        timeout: Duration::from_millis(50),
        tick: Duration::from_millis(1),
    }
}

fn build_orchestrator(
    store: Arc<dyn StateStore>,
) -> (WorkflowOrchestrator, UnboundedReceiver<WorkflowEvent>) {
    let (reporter, rx) = ProgressReporter::new();
    (
        WorkflowOrchestrator::new(
            EnvironmentProbe::new(),
            HandlerRegistry::standard(),
            store,
            reporter,
            fast_poll(),
        ),
        rx,
    )
}

fn page(step: Option<&str>, marker_ids: &[&str]) -> EnvSnapshot {
    let location = match step {
        Some(step) => format!("https://post.example.org/c/sfo?s={step}"),
        None => "https://post.example.org/".to_string(),
    };
    EnvSnapshot {
        location,
        markers: marker_ids.iter().map(|m| (*m).to_string()).collect(),
        ..Default::default()
    }
}

fn with_choices(mut snapshot: EnvSnapshot, group: &str, labels: &[&str]) -> EnvSnapshot {
    snapshot
        .choice_labels
        .insert(group.to_string(), labels.iter().map(|l| (*l).to_string()).collect());
    snapshot
}

fn form_page() -> EnvSnapshot {
    let mut select_options = HashMap::new();
    select_options.insert(
        targets::LANGUAGE_FIELD.to_string(),
        vec![
            SelectOption::new("", "-"),
            SelectOption::new("en", "English"),
            SelectOption::new("es", "Español"),
        ],
    );
    select_options.insert(
        targets::CONDITION_FIELD.to_string(),
        vec![
            SelectOption::new("10", "new"),
            SelectOption::new("30", "good"),
        ],
    );
    let mut snapshot = page(Some("edit"), &[markers::TITLE_INPUT]);
    snapshot.select_options = select_options;
    snapshot
}

fn publish_page(body: &str) -> EnvSnapshot {
    let mut snapshot = page(None, &[markers::PUBLISH_CONFIRMATION]);
    snapshot.body_text = body.to_string();
    snapshot
}

fn drain(rx: &mut UnboundedReceiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn run_page(
    orchestrator: &WorkflowOrchestrator,
    payload: &ListingPayload,
    sink: &Arc<FakeSink>,
    snapshot: EnvSnapshot,
) -> RunReport {
    sink.set_snapshot(snapshot);
    orchestrator
        .run(payload, sink.clone() as Arc<dyn lister::sink::ActionSink>)
        .await
        .expect("orchestrator run failed")
}

#[tokio::test]
async fn test_full_wizard_walkthrough() {
    let payload = car_payload();
    let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());
    let (orchestrator, mut rx) = build_orchestrator(store.clone());
    let sink = Arc::new(FakeSink::new(EnvSnapshot::default()));

    let pages = vec![
        (Phase::InitialPage, page(None, &[markers::POSTING_LANDING])),
        (
            Phase::SubareaSelection,
            with_choices(
                page(Some("subarea"), &[]),
                targets::SUBAREA_GROUP,
                &["city of san francisco", "peninsula", "east bay area"],
            ),
        ),
        (
            Phase::HoodSelection,
            with_choices(
                page(Some("hood"), &[]),
                targets::HOOD_GROUP,
                &["outer richmond", "inner richmond", "inner sunset"],
            ),
        ),
        (
            Phase::TypeSelection,
            with_choices(
                page(Some("type"), &[]),
                targets::TYPE_GROUP,
                &["for sale by owner", "for sale by dealer", "wanted"],
            ),
        ),
        (
            Phase::CategorySelection,
            with_choices(
                page(Some("cat"), &[]),
                targets::CATEGORY_GROUP,
                &["general for sale", "cars & trucks", "furniture"],
            ),
        ),
        (Phase::FormFill, form_page()),
        (
            Phase::ImageUpload,
            page(Some("editimage"), &[markers::IMAGE_UPLOAD_WIDGET]),
        ),
        (
            Phase::MapLocation,
            page(Some("geoverify"), &[markers::MAP_CANVAS]),
        ),
        (Phase::Preview, page(Some("preview"), &[markers::PREVIEW_PANE])),
        (Phase::Publishing, publish_page("Thanks for posting!")),
    ];

    for (expected_phase, snapshot) in pages {
        let report = run_page(&orchestrator, &payload, &sink, snapshot).await;
        match report {
            RunReport::Dispatched { phase, outcome } => {
                assert_eq!(phase, expected_phase);
                assert!(outcome.is_success(), "{expected_phase} failed: {outcome:?}");
            }
            other => panic!("{expected_phase} produced {other:?}"),
        }
    }

    // Every page-side decision landed as a recorded action.
    let actions = sink.recorded();
    for expected in [
        RecordedAction::Click {
            target: targets::CREATE_POSTING_LINK.to_string(),
        },
        RecordedAction::ClickChoice {
            group: targets::SUBAREA_GROUP.to_string(),
            label: "city of san francisco".to_string(),
        },
        RecordedAction::ClickChoice {
            group: targets::HOOD_GROUP.to_string(),
            label: "inner richmond".to_string(),
        },
        RecordedAction::ClickChoice {
            group: targets::TYPE_GROUP.to_string(),
            label: "for sale by owner".to_string(),
        },
        RecordedAction::ClickChoice {
            group: targets::CATEGORY_GROUP.to_string(),
            label: "cars & trucks".to_string(),
        },
        RecordedAction::SetField {
            field: targets::TITLE_FIELD.to_string(),
            value: "Honda Civic".to_string(),
        },
        RecordedAction::SelectOption {
            field: targets::LANGUAGE_FIELD.to_string(),
            value: "en".to_string(),
        },
        RecordedAction::AttachImage {
            source: "civic-front.jpg".to_string(),
        },
        RecordedAction::Click {
            target: targets::PREVIEW_PUBLISH.to_string(),
        },
    ] {
        assert!(actions.contains(&expected), "missing action {expected:?}");
    }

    // One attempt, terminal Completed, flags accumulated across steps.
    let record = store.load().unwrap().unwrap();
    assert_eq!(record.workflow_phase, Phase::Completed);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(record.completion_flags.get("subarea_selected"), Some(&true));
    assert_eq!(record.completion_flags.get("title_filled"), Some(&true));
    assert_eq!(record.completion_flags.get("images_attached"), Some(&true));

    // Exactly one completion event, no email confirmation needed.
    let events = drain(&mut rx);
    let completes: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::PostingComplete {
                requires_confirmation,
            } => Some(*requires_confirmation),
            _ => None,
        })
        .collect();
    assert_eq!(completes, vec![false]);

    // Progress percentages only ever move forward.
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::UpdateProgress { current, .. } => Some(*current),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");

    // A further trigger on the confirmation page is absorbed.
    let report = run_page(
        &orchestrator,
        &payload,
        &sink,
        publish_page("Thanks for posting!"),
    )
    .await;
    assert_eq!(report, RunReport::Terminal(Phase::Completed));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_run_resumes_across_process_restart() {
    let payload = car_payload();
    let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());

    // First page lifetime: enter the wizard and fill the form.
    {
        let (orchestrator, _rx) = build_orchestrator(store.clone());
        let sink = Arc::new(FakeSink::new(EnvSnapshot::default()));
        run_page(
            &orchestrator,
            &payload,
            &sink,
            page(None, &[markers::POSTING_LANDING]),
        )
        .await;
        let report = run_page(&orchestrator, &payload, &sink, form_page()).await;
        assert!(matches!(
            report,
            RunReport::Dispatched {
                phase: Phase::FormFill,
                ..
            }
        ));
    }

    // Fresh orchestrator over the same store: the run continues with no
    // extra attempt and the earlier flags intact.
    let (orchestrator, _rx) = build_orchestrator(store.clone());
    let sink = Arc::new(FakeSink::new(EnvSnapshot::default()));
    let report = run_page(
        &orchestrator,
        &payload,
        &sink,
        page(Some("editimage"), &[markers::IMAGE_UPLOAD_WIDGET]),
    )
    .await;
    assert!(matches!(
        report,
        RunReport::Dispatched {
            phase: Phase::ImageUpload,
            ..
        }
    ));

    let record = store.load().unwrap().unwrap();
    assert_eq!(record.attempt_count, 1);
    assert_eq!(record.completion_flags.get("title_filled"), Some(&true));
    assert_eq!(record.completion_flags.get("images_attached"), Some(&true));
}

#[tokio::test]
async fn test_email_confirmation_reported_on_completion() {
    let payload = car_payload();
    let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());
    let (orchestrator, mut rx) = build_orchestrator(store.clone());
    let sink = Arc::new(FakeSink::new(EnvSnapshot::default()));

    let report = run_page(
        &orchestrator,
        &payload,
        &sink,
        publish_page("Almost done! Please confirm your email to finish."),
    )
    .await;
    assert!(matches!(
        report,
        RunReport::Dispatched {
            phase: Phase::Publishing,
            ..
        }
    ));

    let record = store.load().unwrap().unwrap();
    assert_eq!(record.workflow_phase, Phase::Completed);
    assert_eq!(
        record.completion_flags.get("requires_confirmation"),
        Some(&true)
    );

    let events = drain(&mut rx);
    assert!(events.contains(&WorkflowEvent::PostingComplete {
        requires_confirmation: true
    }));
}

#[tokio::test]
async fn test_attempt_ceiling_ends_the_run() {
    let payload = car_payload();
    let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());
    let (orchestrator, mut rx) = build_orchestrator(store.clone());
    let sink = Arc::new(FakeSink::new(EnvSnapshot::default()));
    let landing = || page(None, &[markers::POSTING_LANDING]);

    // The wizard keeps kicking us back to the landing page.
    for _ in 0..MAX_ATTEMPTS {
        let report = run_page(&orchestrator, &payload, &sink, landing()).await;
        assert!(matches!(report, RunReport::Dispatched { .. }));
    }

    let report = run_page(&orchestrator, &payload, &sink, landing()).await;
    assert_eq!(report, RunReport::AttemptLimitExceeded);

    let record = store.load().unwrap().unwrap();
    assert_eq!(record.workflow_phase, Phase::Error);

    let errors = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, WorkflowEvent::PostingError { .. }))
        .count();
    assert_eq!(errors, 1, "limit breach must be reported exactly once");

    // Absorbed from here on: no dispatch, no repeat report.
    let report = run_page(&orchestrator, &payload, &sink, landing()).await;
    assert_eq!(report, RunReport::Terminal(Phase::Error));
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_new_payload_supersedes_finished_run() {
    let payload = car_payload();
    let store: Arc<MemoryStateStore> = Arc::new(MemoryStateStore::new());
    let (orchestrator, mut rx) = build_orchestrator(store.clone());
    let sink = Arc::new(FakeSink::new(EnvSnapshot::default()));

    run_page(
        &orchestrator,
        &payload,
        &sink,
        publish_page("Thanks for posting!"),
    )
    .await;
    assert_eq!(
        store.load().unwrap().unwrap().workflow_phase,
        Phase::Completed
    );
    drain(&mut rx);

    // A different listing starts over from the landing page.
    let mut next = payload.clone();
    next.title = "Desk lamp".to_string();
    let report = run_page(
        &orchestrator,
        &next,
        &sink,
        page(None, &[markers::POSTING_LANDING]),
    )
    .await;
    assert!(matches!(
        report,
        RunReport::Dispatched {
            phase: Phase::InitialPage,
            ..
        }
    ));

    let record = store.load().unwrap().unwrap();
    assert_eq!(record.payload_fingerprint, next.fingerprint());
    assert_eq!(record.attempt_count, 1);
}
