//! Durabilidad: un run suspendido en un despacho sobrevive al reinicio del
//! proceso y se puede cerrar por callback desde un motor recién abierto.

use serde_json::json;
use veri_adapters::{KindExecutor, LocalJobRunner, QueueDispatcher};
use veri_core::{CallbackDisposition, PayloadTree, RunProgress, RunStatus, StepState};
use veri_domain::{AssertionOp, AssertionSpec, OperatorParams, SignalSet, SignalSpec, SignalStage, SignalType,
                  ValidatorKind, ValidatorSpec, Workflow, WorkflowStep};
use veri_persistence::{build_file_engine, StoreConfig};

fn cosim_workflow() -> Workflow {
    let signals = SignalSet::from_specs(vec![SignalSpec::new("converged", SignalStage::Output,
                                                             SignalType::Boolean).unwrap()]).unwrap();
    let defaults = vec![AssertionSpec::operator("must_converge", SignalStage::Output, "converged", AssertionOp::Eq,
                                                OperatorParams { value: Some(json!(true)),
                                                                 ..Default::default() }).unwrap()];
    let cosim = ValidatorSpec::new("fmu_run", "FMU run", ValidatorKind::CosimCheck { tool: "fmpy".to_string() },
                                   signals, defaults).unwrap();
    Workflow::new("cosim_only", vec![WorkflowStep::new(10, cosim, vec![]).unwrap()]).unwrap()
}

#[test]
fn inflight_run_survives_restart_and_finishes_on_callback() {
    let data_dir = std::env::temp_dir().join(format!("veriflow-replay-{}", uuid::Uuid::new_v4()));
    let config = StoreConfig { data_dir: data_dir.clone() };
    let wf = cosim_workflow();
    let tree = PayloadTree::Tree(json!({}));

    // primer proceso: lanza y queda suspendido en el despacho
    let (run_id, envelope) = {
        let mut engine = build_file_engine(&config).expect("open backend");
        engine.set_executor(Box::new(KindExecutor));
        let dispatcher = QueueDispatcher::new();
        let queue = dispatcher.queue();
        engine.set_dispatcher(Box::new(dispatcher));

        let (run_id, progress) = engine.launch(&tree, &wf, None, "checksum").expect("launch");
        assert!(matches!(progress, RunProgress::AwaitingCallback { .. }));
        let envelope = queue.lock().unwrap().pop().expect("envelope");
        (run_id, envelope)
        // el motor se descarta aquí: simula la caída del proceso
    };

    // segundo proceso: el replay del log restaura el estado en vuelo
    let mut engine = build_file_engine(&config).expect("reopen backend");
    engine.set_executor(Box::new(KindExecutor));

    let snapshot = engine.snapshot(run_id, &wf).expect("snapshot");
    assert_eq!(snapshot.status, RunStatus::Running);
    assert!(snapshot.steps[0].awaiting_callback());
    assert_eq!(snapshot.steps[0].callback_id, Some(envelope.callback_id));

    // y el callback cierra el run en el motor nuevo
    let out = LocalJobRunner::succeeding([("converged".to_string(), json!(true))].into_iter().collect())
        .run(&envelope)
        .expect("output");
    assert_eq!(engine.handle_callback(run_id, &out, &tree, &wf).expect("callback"), CallbackDisposition::Accepted);
    assert_eq!(engine.snapshot(run_id, &wf).expect("snapshot").status, RunStatus::Succeeded);
    assert_eq!(engine.snapshot(run_id, &wf).expect("snapshot").steps[0].state, StepState::Passed);

    // la guarda de idempotencia también es durable
    let mut engine = build_file_engine(&config).expect("reopen again");
    engine.set_executor(Box::new(KindExecutor));
    assert_eq!(engine.handle_callback(run_id, &out, &tree, &wf).expect("duplicate"),
               CallbackDisposition::DuplicateIgnored);

    let _ = std::fs::remove_dir_all(&data_dir);
}
