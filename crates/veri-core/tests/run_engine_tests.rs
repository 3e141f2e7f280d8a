//! Integración del RunEngine con pasos locales.

use serde_json::json;
use uuid::Uuid;
use veri_adapters::KindExecutor;
use veri_core::constants::ENVELOPE_VERSION;
use veri_core::{CallbackDisposition, CoreRunError, InMemoryEventStore, InMemoryReceiptStore, JobStatus, OutputEnvelope,
                PayloadTree, RejectReason, ReplayRunRepository, RunEngine, RunProgress, RunStatus, Severity, StepState};
use veri_domain::{AssertionSpec, SignalSet, SignalSpec, SignalStage, SignalType, ValidatorKind, ValidatorSpec, Workflow,
                  WorkflowStep};

type TestEngine = RunEngine<InMemoryEventStore, ReplayRunRepository, InMemoryReceiptStore>;

fn local_engine() -> TestEngine {
    let mut engine = RunEngine::in_memory();
    engine.set_executor(Box::new(KindExecutor));
    engine
}

/// Validador local con la aserción de escenario EUI: site < target.
fn eui_validator() -> ValidatorSpec {
    let signals = SignalSet::from_specs(vec![
        SignalSpec::new("site_eui_kwh_m2", SignalStage::Input, SignalType::Number).unwrap(),
        SignalSpec::new("target_eui_kwh_m2", SignalStage::Input, SignalType::Number).unwrap(),
    ]).unwrap();
    ValidatorSpec::new("eui_check", "EUI review",
                       ValidatorKind::DocumentCheck { required_paths: vec![],
                                                      forbidden_paths: vec![] },
                       signals, vec![]).unwrap()
}

fn eui_workflow() -> Workflow {
    let step_assertions = vec![AssertionSpec::expression("eui_under_target", SignalStage::Input,
                                                         "site_eui_kwh_m2 < target_eui_kwh_m2").unwrap()];
    Workflow::new("eui_review", vec![WorkflowStep::new(10, eui_validator(), step_assertions).unwrap()]).unwrap()
}

fn doc_validator(id: &str, required: &[&str]) -> ValidatorSpec {
    ValidatorSpec::new(id, id,
                       ValidatorKind::DocumentCheck { required_paths: required.iter().map(|s| s.to_string()).collect(),
                                                      forbidden_paths: vec![] },
                       SignalSet::new(), vec![]).unwrap()
}

#[test]
fn eui_scenario_passes_then_fails_when_swapped() {
    let wf = eui_workflow();

    let mut engine = local_engine();
    let ok = PayloadTree::Tree(json!({"site_eui_kwh_m2": 120, "target_eui_kwh_m2": 150}));
    let (run_id, progress) = engine.launch(&ok, &wf, None, "c1").expect("launch");
    assert_eq!(progress, RunProgress::Completed(RunStatus::Succeeded));
    assert!(engine.snapshot(run_id, &wf).expect("snapshot").findings.is_empty());

    // valores intercambiados: FAIL bloqueante, paso FAILED, run FAILED
    let mut engine = local_engine();
    let swapped = PayloadTree::Tree(json!({"site_eui_kwh_m2": 150, "target_eui_kwh_m2": 120}));
    let (run_id, progress) = engine.launch(&swapped, &wf, None, "c2").expect("launch");
    assert_eq!(progress, RunProgress::Completed(RunStatus::Failed));

    let snapshot = engine.snapshot(run_id, &wf).expect("snapshot");
    assert_eq!(snapshot.steps[0].state, StepState::Failed);
    assert_eq!(snapshot.findings.len(), 1);
    assert_eq!(snapshot.findings[0].severity, Severity::Error);
    assert_eq!(snapshot.findings[0].step_index, Some(10));
}

#[test]
fn blocking_failure_skips_later_steps() {
    let wf = Workflow::new("chained",
                           vec![WorkflowStep::new(10, doc_validator("first", &["missing.path"]), vec![]).unwrap(),
                                WorkflowStep::new(20, doc_validator("second", &[]), vec![]).unwrap(),
                                WorkflowStep::new(35, doc_validator("third", &[]), vec![]).unwrap()]).unwrap();
    let mut engine = local_engine();
    let tree = PayloadTree::Tree(json!({}));

    let (run_id, progress) = engine.launch(&tree, &wf, None, "c").expect("launch");
    assert_eq!(progress, RunProgress::Completed(RunStatus::Failed));

    let snapshot = engine.snapshot(run_id, &wf).expect("snapshot");
    assert_eq!(snapshot.steps[0].state, StepState::Failed);
    assert_eq!(snapshot.steps[1].state, StepState::Skipped);
    assert_eq!(snapshot.steps[2].state, StepState::Skipped);
}

#[test]
fn continue_on_failure_lets_later_steps_run() {
    let first = WorkflowStep::new(10, doc_validator("first", &["missing.path"]), vec![]).unwrap()
                                                                                        .with_continue_on_failure();
    let wf = Workflow::new("tolerant",
                           vec![first, WorkflowStep::new(20, doc_validator("second", &[]), vec![]).unwrap()]).unwrap();
    let mut engine = local_engine();
    let tree = PayloadTree::Tree(json!({}));

    let (run_id, progress) = engine.launch(&tree, &wf, None, "c").expect("launch");
    // el segundo paso corre igual; el run sigue FAILED porque un paso falló
    assert_eq!(progress, RunProgress::Completed(RunStatus::Failed));
    let snapshot = engine.snapshot(run_id, &wf).expect("snapshot");
    assert_eq!(snapshot.steps[0].state, StepState::Failed);
    assert_eq!(snapshot.steps[1].state, StepState::Passed);
}

#[test]
fn callback_guards_reject_without_mutating() {
    let wf = eui_workflow();
    let mut engine = local_engine();
    let tree = PayloadTree::Tree(json!({"site_eui_kwh_m2": 120, "target_eui_kwh_m2": 150}));
    let (run_id, _) = engine.launch(&tree, &wf, None, "c").expect("launch");
    let events_before = engine.events_for(run_id).len();

    // versión de sobre desconocida
    let bad_version = OutputEnvelope { envelope_version: ENVELOPE_VERSION + 9,
                                       callback_id: Uuid::new_v4(),
                                       status: JobStatus::Success,
                                       error_category: None,
                                       output_signals: Default::default(),
                                       findings: vec![] };
    assert_eq!(engine.handle_callback(run_id, &bad_version, &tree, &wf).expect("dispatch guard"),
               CallbackDisposition::Rejected { reason: RejectReason::VersionMismatch { got: ENVELOPE_VERSION + 9 } });

    // callback sin despacho correspondiente
    let unknown = OutputEnvelope { envelope_version: ENVELOPE_VERSION,
                                   callback_id: Uuid::new_v4(),
                                   status: JobStatus::Success,
                                   error_category: None,
                                   output_signals: Default::default(),
                                   findings: vec![] };
    assert_eq!(engine.handle_callback(run_id, &unknown, &tree, &wf).expect("unknown guard"),
               CallbackDisposition::Rejected { reason: RejectReason::UnknownCallback });

    // ningún rechazo mutó el log
    assert_eq!(engine.events_for(run_id).len(), events_before);
}

#[test]
fn run_not_found_and_workflow_mismatch_are_errors() {
    let wf = eui_workflow();
    let mut engine = local_engine();
    let tree = PayloadTree::Tree(json!({"site_eui_kwh_m2": 120, "target_eui_kwh_m2": 150}));

    assert!(matches!(engine.snapshot(Uuid::new_v4(), &wf), Err(CoreRunError::RunNotFound)));

    let (run_id, _) = engine.launch(&tree, &wf, None, "c").expect("launch");
    let other = Workflow::new("other", vec![WorkflowStep::new(1, doc_validator("x", &[]), vec![]).unwrap()]).unwrap();
    assert!(matches!(engine.snapshot(run_id, &other), Err(CoreRunError::WorkflowMismatch)));
}

#[test]
fn cancelling_a_terminal_run_is_rejected() {
    // los pasos locales completan dentro de launch; la cancelación en vivo
    // se ejercita en los tests e2e con despacho. Aquí el invariante de
    // terminalidad sobre cancel.
    let wf = eui_workflow();
    let mut engine = local_engine();
    let tree = PayloadTree::Tree(json!({"site_eui_kwh_m2": 120, "target_eui_kwh_m2": 150}));
    let (run_id, _) = engine.launch(&tree, &wf, None, "c").expect("launch");
    assert!(matches!(engine.cancel(run_id, &tree, &wf, None), Err(CoreRunError::RunAlreadyTerminal)));
}
