use std::sync::Once;

use exporter_core::{update, Effect, Msg, PageStage, RunState};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(export_logging::initialize_for_tests);
}

fn apply(state: RunState, msgs: Vec<Msg>) -> (RunState, Vec<Effect>) {
    let mut all = Vec::new();
    let mut state = state;
    for msg in msgs {
        let (next, effects) = update(state, msg);
        state = next;
        all.extend(effects);
    }
    (state, all)
}

fn stage(page_id: &str, stage: PageStage) -> Msg {
    Msg::StageChanged {
        page_id: page_id.to_string(),
        stage,
    }
}

fn started(page_id: &str, title: &str) -> Msg {
    Msg::PageStarted {
        page_id: page_id.to_string(),
        title: title.to_string(),
    }
}

fn through_writing(page_id: &str) -> Vec<Msg> {
    vec![
        stage(page_id, PageStage::Fetching),
        stage(page_id, PageStage::Fetched),
        stage(page_id, PageStage::Converting),
        stage(page_id, PageStage::Converted),
        stage(page_id, PageStage::Writing),
    ]
}

#[test]
fn written_page_counts_as_success() {
    init_logging();
    let mut msgs = vec![Msg::Listed { total: 1 }, started("1", "Getting Started")];
    msgs.extend(through_writing("1"));
    msgs.push(Msg::PageWritten {
        page_id: "1".into(),
        file: "Getting Started.md".into(),
    });

    let (state, effects) = apply(RunState::default(), msgs);
    assert!(effects.is_empty());

    let record = state.page("1").unwrap();
    assert_eq!(record.stage, PageStage::Written);
    assert_eq!(record.file.as_deref(), Some("Getting Started.md"));

    let summary = state.summary();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(summary.is_success());
}

#[test]
fn warnings_do_not_fail_the_run() {
    init_logging();
    let mut msgs = vec![Msg::Listed { total: 1 }, started("1", "Page")];
    msgs.extend(through_writing("1"));
    msgs.insert(
        4,
        Msg::Warning {
            page_id: "1".into(),
            message: "attachment missing: logo.png".into(),
        },
    );
    msgs.push(Msg::PageWritten {
        page_id: "1".into(),
        file: "Page.md".into(),
    });

    let (state, effects) = apply(RunState::default(), msgs);
    assert!(effects.is_empty());

    let summary = state.summary();
    assert!(summary.is_success());
    assert_eq!(summary.warned.len(), 1);
    assert_eq!(
        summary.warned[0].warnings,
        vec!["attachment missing: logo.png".to_string()]
    );
    assert!(summary.render().contains("attachment missing: logo.png"));
}

#[test]
fn conversion_failure_is_recorded_and_run_continues() {
    init_logging();
    let mut msgs = vec![
        Msg::Listed { total: 2 },
        started("1", "Broken"),
        stage("1", PageStage::Fetching),
        stage("1", PageStage::Fetched),
        stage("1", PageStage::Converting),
        Msg::PageFailed {
            page_id: "1".into(),
            stage: PageStage::ConvertFailed,
            reason: "page has no storage body".into(),
        },
        started("2", "Fine"),
    ];
    msgs.extend(through_writing("2"));
    msgs.push(Msg::PageWritten {
        page_id: "2".into(),
        file: "Fine.md".into(),
    });

    let (state, effects) = apply(RunState::default(), msgs);
    assert!(effects.is_empty());

    let summary = state.summary();
    assert!(!summary.is_success());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].stage, PageStage::ConvertFailed);
    assert_eq!(summary.failed[0].reason, "page has no storage body");
    let rendered = summary.render();
    assert!(rendered.contains("2 pages: 1 succeeded, 1 failed"));
    assert!(rendered.contains("convert_failed"));
}

#[test]
fn invalid_transition_is_rejected_and_stage_kept() {
    init_logging();
    let msgs = vec![
        started("1", "Page"),
        stage("1", PageStage::Fetching),
        stage("1", PageStage::Writing),
    ];

    let (state, effects) = apply(RunState::default(), msgs);
    assert_eq!(
        effects,
        vec![Effect::RejectedTransition {
            page_id: "1".into(),
            from: PageStage::Fetching,
            to: PageStage::Writing,
        }]
    );
    assert_eq!(state.page("1").unwrap().stage, PageStage::Fetching);
}

#[test]
fn messages_for_unknown_pages_are_reported() {
    init_logging();
    let (_state, effects) = update(RunState::default(), stage("nope", PageStage::Fetching));
    assert_eq!(
        effects,
        vec![Effect::UnknownPage {
            page_id: "nope".into()
        }]
    );
}

#[test]
fn consecutive_write_failures_abort_the_run() {
    init_logging();
    let mut msgs = vec![Msg::Listed { total: 3 }];
    for id in ["1", "2"] {
        msgs.push(started(id, id));
        msgs.extend(through_writing(id));
        msgs.push(Msg::PageFailed {
            page_id: id.into(),
            stage: PageStage::WriteFailed,
            reason: "disk full".into(),
        });
    }

    let (state, effects) = apply(RunState::new(2), msgs);
    assert_eq!(effects.len(), 1);
    assert!(matches!(effects[0], Effect::AbortRun { .. }));
    assert!(state.is_aborted());

    let summary = state.summary();
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.skipped, 1);
    assert!(summary.aborted.is_some());
    assert!(!summary.is_success());
}

#[test]
fn successful_write_resets_failure_streak() {
    init_logging();
    let mut msgs = Vec::new();
    for (id, ok) in [("1", false), ("2", true), ("3", false)] {
        msgs.push(started(id, id));
        msgs.extend(through_writing(id));
        if ok {
            msgs.push(Msg::PageWritten {
                page_id: id.into(),
                file: format!("{id}.md"),
            });
        } else {
            msgs.push(Msg::PageFailed {
                page_id: id.into(),
                stage: PageStage::WriteFailed,
                reason: "permission denied".into(),
            });
        }
    }

    let (state, effects) = apply(RunState::new(2), msgs);
    assert!(effects.is_empty());
    assert!(!state.is_aborted());
}

#[test]
fn page_failed_with_non_failure_stage_is_rejected() {
    init_logging();
    let msgs = vec![
        started("1", "Page"),
        Msg::PageFailed {
            page_id: "1".into(),
            stage: PageStage::Written,
            reason: "nonsense".into(),
        },
    ];

    let (state, effects) = apply(RunState::default(), msgs);
    assert_eq!(
        effects,
        vec![Effect::RejectedTransition {
            page_id: "1".into(),
            from: PageStage::Pending,
            to: PageStage::Written,
        }]
    );
    assert_eq!(state.page("1").unwrap().failure, None);
}
