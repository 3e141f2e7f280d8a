//! Demo end-to-end: valida una entrega de modelo energético contra un
//! workflow de tres pasos (documento → métricas EUI → co-simulación
//! despachada) usando el sustrato local con entrega duplicada, y muestra el
//! log de eventos y los hallazgos resultantes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::sleep;

use veri_adapters::{LocalJobRunner, StorageLayout};
use veri_core::RunStatus;
use veri_domain::{AssertionOp, AssertionSpec, ContentType, DomainError, OperatorParams, SignalSet, SignalSpec,
                  SignalStage, SignalType, Submission, ValidatorKind, ValidatorSpec, Workflow, WorkflowStep};
use veriflow_rust::config::CONFIG;
use veriflow_rust::{LocalSubstrate, RunService, ServiceConfig};

fn energy_review_workflow() -> Result<Workflow, DomainError> {
    // paso 10: estructura del documento + escenario EUI declarado
    let doc_signals = SignalSet::from_specs(vec![
        SignalSpec::new("site_eui_kwh_m2", SignalStage::Input, SignalType::Number)?
            .with_data_path("targets.site_eui_kwh_m2"),
        SignalSpec::new("target_eui_kwh_m2", SignalStage::Input, SignalType::Number)?
            .with_data_path("targets.code_max_eui_kwh_m2"),
    ])?;
    let doc_defaults = vec![AssertionSpec::operator("declared_eui_positive", SignalStage::Input, "site_eui_kwh_m2",
                                                    AssertionOp::Gt,
                                                    OperatorParams { value: Some(json!(0.0)),
                                                                     ..Default::default() })?];
    let doc = ValidatorSpec::new("doc_structure", "Document structure",
                                 ValidatorKind::DocumentCheck { required_paths: vec!["building.name".to_string(),
                                                                                     "building.geometry.floor_area_m2".to_string()],
                                                                forbidden_paths: vec!["legacy_block".to_string()] },
                                 doc_signals, doc_defaults)?;
    let doc_step = WorkflowStep::new(10, doc,
                                     vec![AssertionSpec::expression("declared_eui_under_code", SignalStage::Input,
                                                                    "site_eui_kwh_m2 < target_eui_kwh_m2")?])?;

    // paso 20: métricas derivadas del modelo
    let energy_signals = SignalSet::from_specs(vec![
        SignalSpec::new("site_eui_kwh_m2", SignalStage::Output, SignalType::Number)?,
        SignalSpec::new("total_energy_kwh", SignalStage::Output, SignalType::Number)?,
    ])?;
    let energy_defaults = vec![AssertionSpec::operator("derived_eui_under_cap", SignalStage::Output, "site_eui_kwh_m2",
                                                       AssertionOp::Lt,
                                                       OperatorParams { value: Some(json!(200.0)),
                                                                        ..Default::default() })?];
    let energy = ValidatorSpec::new("energy_metrics", "Energy model metrics",
                                    ValidatorKind::EnergyModelCheck { area_path: "building.geometry.floor_area_m2".to_string(),
                                                                      end_use_paths: vec!["results.heating_kwh".to_string(),
                                                                                          "results.cooling_kwh".to_string(),
                                                                                          "results.lighting_kwh".to_string()] },
                                    energy_signals, energy_defaults)?;
    let energy_step = WorkflowStep::new(20, energy, vec![])?;

    // paso 30: co-simulación en el sustrato externo
    let cosim_signals = SignalSet::from_specs(vec![
        SignalSpec::new("converged", SignalStage::Output, SignalType::Boolean)?,
        SignalSpec::new("iterations", SignalStage::Output, SignalType::Number)?.optional(),
    ])?;
    let cosim_defaults = vec![AssertionSpec::operator("must_converge", SignalStage::Output, "converged",
                                                      AssertionOp::Eq,
                                                      OperatorParams { value: Some(json!(true)),
                                                                       ..Default::default() })?];
    let cosim = ValidatorSpec::new("fmu_cosim", "FMU co-simulation", ValidatorKind::CosimCheck { tool: "fmpy".to_string() },
                                   cosim_signals, cosim_defaults)?;
    let cosim_step = WorkflowStep::new(30, cosim, vec![])?;

    Workflow::new("energy_review", vec![doc_step, energy_step, cosim_step])
}

fn sample_submission() -> Result<Submission, DomainError> {
    let model = json!({
        "building": {
            "name": "Oficinas Norte",
            "geometry": { "floor_area_m2": 1000.0 }
        },
        "targets": {
            "site_eui_kwh_m2": 120.0,
            "code_max_eui_kwh_m2": 150.0
        },
        "results": {
            "heating_kwh": 60000.0,
            "cooling_kwh": 40000.0,
            "lighting_kwh": 20000.0
        }
    });
    Submission::new(serde_json::to_vec(&model)?, Some(ContentType::EnergyModelJson))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let workflow = energy_review_workflow().expect("workflow definition");
    let submission = sample_submission().expect("sample submission");
    println!("== VeriFlow demo ==");
    println!("{submission}");
    println!("workflow '{}' con {} pasos (hash {})",
             workflow.slug(),
             workflow.len(),
             &workflow.definition_hash()[..12]);

    // sustrato local: latencia simulada, storage materializado y entrega
    // duplicada para ejercitar la idempotencia del receptor
    let (tx, rx) = mpsc::channel(64);
    let cosim_outputs = [("converged".to_string(), json!(true)), ("iterations".to_string(), json!(12))]
        .into_iter()
        .collect();
    let substrate = LocalSubstrate::new(tx, LocalJobRunner::succeeding(cosim_outputs))
        .with_storage(StorageLayout::new(&CONFIG.storage_root))
        .with_latency(Duration::from_millis(50))
        .with_duplicate_delivery();

    let service = RunService::new(Arc::new(substrate),
                                  ServiceConfig { deadline_secs: CONFIG.deadline_secs,
                                                  eval_budget: CONFIG.eval_budget });
    service.clone().spawn_callback_pump(rx);
    service.clone().spawn_deadline_sweeper(Duration::from_secs(CONFIG.sweep_interval_secs));

    let run_id = service.launch_run(&submission, workflow).await.expect("launch run");
    println!("run lanzado: {run_id}");

    // esperar el cierre del run (el callback llega por la bomba)
    let mut snapshot = service.get_run(run_id).await.expect("snapshot");
    for _ in 0..100 {
        if snapshot.status.is_terminal() {
            break;
        }
        sleep(Duration::from_millis(50)).await;
        snapshot = service.get_run(run_id).await.expect("snapshot");
    }

    println!("\nestado final: {:?} (correlación {})", snapshot.status, snapshot.correlation_id);
    for step in &snapshot.steps {
        println!("  paso {:>3} [{}] -> {:?}{}",
                 step.step_index,
                 step.validator_id,
                 step.state,
                 step.error_category
                     .map(|c| format!(" ({c:?})"))
                     .unwrap_or_default());
    }
    if snapshot.findings.is_empty() {
        println!("sin hallazgos");
    } else {
        println!("hallazgos:");
        for finding in &snapshot.findings {
            println!("  [{:?}] {} ({})", finding.severity, finding.message, finding.path);
        }
    }

    let events = service.event_log(run_id).await.expect("event log");
    println!("\nlog de eventos ({}):", events.len());
    for ev in &events {
        println!("  #{:<2} {}", ev.seq, event_label(&ev.kind));
    }
    if snapshot.status != RunStatus::Succeeded {
        std::process::exit(1);
    }
}

fn event_label(kind: &veri_core::RunEventKind) -> String {
    use veri_core::RunEventKind::*;
    match kind {
        RunInitialized { step_count, .. } => format!("RunInitialized ({step_count} pasos)"),
        StepStarted { step_index, validator_id } => format!("StepStarted {step_index} [{validator_id}]"),
        StepDispatched { step_index, callback_id, .. } => format!("StepDispatched {step_index} (callback {callback_id})"),
        StepFinished { step_index, outcome, .. } => format!("StepFinished {step_index} -> {outcome:?}"),
        StepSkipped { step_index, reason, .. } => format!("StepSkipped {step_index} ({reason})"),
        CancelRequested { .. } => "CancelRequested".to_string(),
        RunFinished { status, .. } => format!("RunFinished -> {status:?}"),
    }
}
