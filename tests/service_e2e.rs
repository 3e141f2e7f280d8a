//! E2E del servicio: concurrencia por celdas, entrega duplicada y
//! cancelación a través de la superficie pública.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;

use veri_adapters::LocalJobRunner;
use veri_core::{ErrorCategory, RunStatus, Severity, StepState};
use veri_domain::{AssertionOp, AssertionSpec, ContentType, OperatorParams, SignalSet, SignalSpec, SignalStage,
                  SignalType, Submission, ValidatorKind, ValidatorSpec, Workflow, WorkflowStep};
use veriflow_rust::{LocalSubstrate, RunService, ServiceConfig};

fn review_workflow() -> Workflow {
    let doc_signals = SignalSet::from_specs(vec![
        SignalSpec::new("site_eui_kwh_m2", SignalStage::Input, SignalType::Number).unwrap(),
        SignalSpec::new("target_eui_kwh_m2", SignalStage::Input, SignalType::Number).unwrap(),
    ]).unwrap();
    let doc = ValidatorSpec::new("doc_check", "Document check",
                                 ValidatorKind::DocumentCheck { required_paths: vec!["site_eui_kwh_m2".to_string()],
                                                                forbidden_paths: vec![] },
                                 doc_signals, vec![]).unwrap();
    let doc_step = WorkflowStep::new(10, doc,
                                     vec![AssertionSpec::expression("eui_under_target", SignalStage::Input,
                                                                    "site_eui_kwh_m2 < target_eui_kwh_m2").unwrap()])
        .unwrap();

    let cosim_signals = SignalSet::from_specs(vec![SignalSpec::new("converged", SignalStage::Output,
                                                                   SignalType::Boolean).unwrap()]).unwrap();
    let cosim_defaults = vec![AssertionSpec::operator("must_converge", SignalStage::Output, "converged", AssertionOp::Eq,
                                                      OperatorParams { value: Some(json!(true)),
                                                                       ..Default::default() }).unwrap()];
    let cosim = ValidatorSpec::new("fmu_run", "FMU run", ValidatorKind::CosimCheck { tool: "fmpy".to_string() },
                                   cosim_signals, cosim_defaults).unwrap();
    Workflow::new("review", vec![doc_step, WorkflowStep::new(20, cosim, vec![]).unwrap()]).unwrap()
}

fn submission(site: f64, target: f64) -> Submission {
    let payload = json!({"site_eui_kwh_m2": site, "target_eui_kwh_m2": target});
    Submission::new(serde_json::to_vec(&payload).unwrap(), Some(ContentType::Json)).unwrap()
}

fn converged_outputs() -> indexmap::IndexMap<String, serde_json::Value> {
    [("converged".to_string(), json!(true))].into_iter().collect()
}

async fn wait_terminal(service: &RunService, run_id: uuid::Uuid) -> veriflow_rust::RunSnapshot {
    for _ in 0..200 {
        let snapshot = service.get_run(run_id).await.expect("snapshot");
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} did not reach a terminal state in time");
}

#[tokio::test]
async fn duplicate_delivery_is_absorbed_and_run_succeeds() {
    let (tx, rx) = mpsc::channel(16);
    let substrate = LocalSubstrate::new(tx, LocalJobRunner::succeeding(converged_outputs()))
        .with_latency(Duration::from_millis(5))
        .with_duplicate_delivery();
    let service = RunService::new(Arc::new(substrate), ServiceConfig::default());
    service.clone().spawn_callback_pump(rx);

    let run_id = service.launch_run(&submission(120.0, 150.0), review_workflow()).await.expect("launch");
    let snapshot = wait_terminal(&service, run_id).await;

    assert_eq!(snapshot.status, RunStatus::Succeeded);
    assert!(snapshot.findings.is_empty(), "duplicate delivery must not duplicate findings");
    // exactamente un cierre de paso despachado en el log
    let events = service.event_log(run_id).await.expect("events");
    let finishes = events.iter()
                         .filter(|e| matches!(&e.kind, veri_core::RunEventKind::StepFinished { step_index: 20, .. }))
                         .count();
    assert_eq!(finishes, 1);
}

#[tokio::test]
async fn failing_submission_blocks_dispatch_and_fails_run() {
    let (tx, rx) = mpsc::channel(16);
    let substrate = LocalSubstrate::new(tx, LocalJobRunner::succeeding(converged_outputs()))
        .with_latency(Duration::from_millis(5));
    let service = RunService::new(Arc::new(substrate), ServiceConfig::default());
    service.clone().spawn_callback_pump(rx);

    // valores intercambiados: la aserción del paso 10 falla bloqueante
    let run_id = service.launch_run(&submission(150.0, 120.0), review_workflow()).await.expect("launch");
    let snapshot = wait_terminal(&service, run_id).await;

    assert_eq!(snapshot.status, RunStatus::Failed);
    assert_eq!(snapshot.steps[0].state, StepState::Failed);
    // cortocircuito: el paso co-simulado nunca se despachó
    assert_eq!(snapshot.steps[1].state, StepState::Skipped);
    assert!(snapshot.findings.iter().any(|f| f.severity == Severity::Error));
}

#[tokio::test]
async fn substrate_error_category_lands_on_the_step() {
    let (tx, rx) = mpsc::channel(16);
    let substrate = LocalSubstrate::new(tx, LocalJobRunner::failing(ErrorCategory::Oom, "solver out of memory"))
        .with_latency(Duration::from_millis(5));
    let service = RunService::new(Arc::new(substrate), ServiceConfig::default());
    service.clone().spawn_callback_pump(rx);

    let run_id = service.launch_run(&submission(120.0, 150.0), review_workflow()).await.expect("launch");
    let snapshot = wait_terminal(&service, run_id).await;

    assert_eq!(snapshot.status, RunStatus::Failed);
    assert_eq!(snapshot.steps[1].state, StepState::Failed);
    assert_eq!(snapshot.steps[1].error_category, Some(ErrorCategory::Oom));
}

#[tokio::test]
async fn silent_job_times_out_via_sweeper() {
    let (tx, rx) = mpsc::channel(16);
    let substrate = LocalSubstrate::new(tx, LocalJobRunner::silent()).with_latency(Duration::from_millis(1));
    // deadline corto para que el barrido lo venza enseguida
    let service = RunService::new(Arc::new(substrate),
                                  ServiceConfig { deadline_secs: -1,
                                                  ..Default::default() });
    service.clone().spawn_callback_pump(rx);

    let run_id = service.launch_run(&submission(120.0, 150.0), review_workflow()).await.expect("launch");
    sleep(Duration::from_millis(20)).await;
    let expired = service.expire_overdue().await;
    assert_eq!(expired, 1);

    let snapshot = wait_terminal(&service, run_id).await;
    assert_eq!(snapshot.status, RunStatus::TimedOut);
    assert_eq!(snapshot.steps[1].error_category, Some(ErrorCategory::Timeout));
}

#[tokio::test]
async fn cancellation_intent_finalizes_on_next_callback() {
    let (tx, rx) = mpsc::channel(16);
    // latencia alta: da ventana para cancelar con el despacho en vuelo
    let substrate = LocalSubstrate::new(tx, LocalJobRunner::succeeding(converged_outputs()))
        .with_latency(Duration::from_millis(200));
    let service = RunService::new(Arc::new(substrate), ServiceConfig::default());
    service.clone().spawn_callback_pump(rx);

    let run_id = service.launch_run(&submission(120.0, 150.0), review_workflow()).await.expect("launch");
    let status = service.cancel_run(run_id, Some("operator".to_string())).await.expect("cancel");
    assert_eq!(status, RunStatus::Running, "cancel with inflight dispatch only records intent");

    let snapshot = wait_terminal(&service, run_id).await;
    assert_eq!(snapshot.status, RunStatus::Canceled);
}

#[tokio::test]
async fn runs_are_isolated_from_each_other() {
    let (tx, rx) = mpsc::channel(64);
    let substrate = LocalSubstrate::new(tx, LocalJobRunner::succeeding(converged_outputs()))
        .with_latency(Duration::from_millis(5));
    let service = RunService::new(Arc::new(substrate), ServiceConfig::default());
    service.clone().spawn_callback_pump(rx);

    let ok = service.launch_run(&submission(120.0, 150.0), review_workflow()).await.expect("launch ok");
    let bad = service.launch_run(&submission(150.0, 120.0), review_workflow()).await.expect("launch bad");

    let ok_snapshot = wait_terminal(&service, ok).await;
    let bad_snapshot = wait_terminal(&service, bad).await;
    assert_eq!(ok_snapshot.status, RunStatus::Succeeded);
    assert_eq!(bad_snapshot.status, RunStatus::Failed);
    assert!(ok_snapshot.findings.is_empty());
}
