//! CLI de operador contra el backend durable.
//!
//! Subcomandos:
//!   veri-cli launch   --workflow <FILE> --submission <FILE> [--content-type <CT>]
//!   veri-cli status   --run <UUID> --workflow <FILE>
//!   veri-cli callback --run <UUID> --workflow <FILE> --submission <FILE> --envelope <FILE>
//!   veri-cli cancel   --run <UUID> --workflow <FILE> --submission <FILE> [--reason <TXT>]
//!   veri-cli sweep    --run <UUID> --workflow <FILE> --submission <FILE>
//!
//! `launch` imprime por stdout los sobres despachados (JSON, uno por
//! línea): el operador o el controlador externo los entrega al sustrato, y
//! el sobre de salida vuelve por `callback`. Un despacho rechazado o caído
//! se re-envía relanzando un run: el motor no reintenta solo.
//!
//! Códigos de salida: 0 ok / aceptado, 2 uso, 3 entrada inválida,
//! 4 rechazo/estado, 5 error de backend.

use uuid::Uuid;
use veri_adapters::{parse_submission, KindExecutor, QueueDispatcher};
use veri_core::{CallbackDisposition, OutputEnvelope, PayloadTree};
use veri_domain::{ContentType, Submission, Workflow};
use veri_persistence::{build_file_engine, FileBackedEngine, StoreConfig};

fn main() {
    // Cargar .env si existe para obtener VERIFLOW_DATA_DIR
    let _ = dotenvy::dotenv();
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("veri-cli: use 'launch', 'status', 'callback', 'cancel' or 'sweep'");
        std::process::exit(2);
    }

    let mut run: Option<Uuid> = None;
    let mut workflow_path: Option<String> = None;
    let mut submission_path: Option<String> = None;
    let mut envelope_path: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut reason: Option<String> = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--run" => {
                i += 1;
                if i < args.len() { run = Uuid::parse_str(&args[i]).ok(); }
            }
            "--workflow" => {
                i += 1;
                if i < args.len() { workflow_path = Some(args[i].clone()); }
            }
            "--submission" => {
                i += 1;
                if i < args.len() { submission_path = Some(args[i].clone()); }
            }
            "--envelope" => {
                i += 1;
                if i < args.len() { envelope_path = Some(args[i].clone()); }
            }
            "--content-type" => {
                i += 1;
                if i < args.len() { content_type = Some(args[i].clone()); }
            }
            "--reason" => {
                i += 1;
                if i < args.len() { reason = Some(args[i].clone()); }
            }
            _ => {}
        }
        i += 1;
    }

    match args[1].as_str() {
        "launch" => {
            let (Some(wf_path), Some(sub_path)) = (workflow_path, submission_path) else {
                eprintln!("Uso: veri-cli launch --workflow <FILE> --submission <FILE> [--content-type <CT>]");
                std::process::exit(2);
            };
            let workflow = load_workflow(&wf_path);
            let submission = load_submission(&sub_path, content_type.as_deref());
            let payload = match parse_submission(&submission) {
                Ok(p) => p,
                Err(e) => { eprintln!("[veri-cli launch] ingest error: {e}"); std::process::exit(3); }
            };
            let mut engine = open_engine();
            engine.set_executor(Box::new(KindExecutor));
            let dispatcher = QueueDispatcher::new();
            let queue = dispatcher.queue();
            engine.set_dispatcher(Box::new(dispatcher));

            match engine.launch(&payload, &workflow, None, submission.checksum()) {
                Ok((run_id, progress)) => {
                    eprintln!("run: {run_id}");
                    eprintln!("progreso: {progress:?}");
                    for envelope in queue.lock().map(|mut q| q.drain(..).collect::<Vec<_>>()).unwrap_or_default() {
                        match serde_json::to_string(&envelope) {
                            Ok(line) => println!("{line}"),
                            Err(e) => eprintln!("[veri-cli launch] cannot encode envelope: {e}"),
                        }
                    }
                    std::process::exit(0);
                }
                Err(e) => { eprintln!("[veri-cli launch] error: {e}"); std::process::exit(5); }
            }
        }
        "status" => {
            let (Some(run_id), Some(wf_path)) = (run, workflow_path) else {
                eprintln!("Uso: veri-cli status --run <UUID> --workflow <FILE>");
                std::process::exit(2);
            };
            let workflow = load_workflow(&wf_path);
            let engine = open_engine();
            match engine.snapshot(run_id, &workflow) {
                Ok(instance) => {
                    println!("run {run_id}: {:?} (correlación {})", instance.status, instance.correlation_id);
                    for slot in &instance.steps {
                        println!("  paso {:>3} [{}] -> {:?}{}",
                                 slot.step_index,
                                 slot.validator_id,
                                 slot.state,
                                 slot.error_category.map(|c| format!(" ({c:?})")).unwrap_or_default());
                    }
                    for finding in &instance.findings {
                        println!("  [{:?}] {} ({})", finding.severity, finding.message, finding.path);
                    }
                    std::process::exit(0);
                }
                Err(e) => { eprintln!("[veri-cli status] {e}"); std::process::exit(4); }
            }
        }
        "callback" => {
            let (Some(run_id), Some(wf_path), Some(sub_path), Some(env_path)) =
                (run, workflow_path, submission_path, envelope_path)
            else {
                eprintln!("Uso: veri-cli callback --run <UUID> --workflow <FILE> --submission <FILE> --envelope <FILE>");
                std::process::exit(2);
            };
            let workflow = load_workflow(&wf_path);
            let submission = load_submission(&sub_path, content_type.as_deref());
            let payload = payload_or_exit(&submission);
            let envelope: OutputEnvelope = match std::fs::read(&env_path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
            {
                Ok(envelope) => envelope,
                Err(e) => { eprintln!("[veri-cli callback] envelope parse error: {e}"); std::process::exit(3); }
            };
            let mut engine = open_engine();
            engine.set_executor(Box::new(KindExecutor));
            match engine.handle_callback(run_id, &envelope, &payload, &workflow) {
                Ok(CallbackDisposition::Accepted) => { println!("accepted"); std::process::exit(0); }
                Ok(CallbackDisposition::DuplicateIgnored) => { println!("duplicate ignored"); std::process::exit(3); }
                Ok(CallbackDisposition::Rejected { reason }) => {
                    eprintln!("rechazado: {reason:?}");
                    std::process::exit(4);
                }
                Err(e) => { eprintln!("[veri-cli callback] error: {e}"); std::process::exit(5); }
            }
        }
        "cancel" => {
            let (Some(run_id), Some(wf_path), Some(sub_path)) = (run, workflow_path, submission_path) else {
                eprintln!("Uso: veri-cli cancel --run <UUID> --workflow <FILE> --submission <FILE> [--reason <TXT>]");
                std::process::exit(2);
            };
            let workflow = load_workflow(&wf_path);
            let submission = load_submission(&sub_path, content_type.as_deref());
            let payload = payload_or_exit(&submission);
            let mut engine = open_engine();
            engine.set_executor(Box::new(KindExecutor));
            match engine.cancel(run_id, &payload, &workflow, reason) {
                Ok(status) => { println!("cancelado: estado {status:?}"); std::process::exit(0); }
                Err(e) => { eprintln!("[veri-cli cancel] rechazado: {e}"); std::process::exit(4); }
            }
        }
        "sweep" => {
            let (Some(run_id), Some(wf_path), Some(sub_path)) = (run, workflow_path, submission_path) else {
                eprintln!("Uso: veri-cli sweep --run <UUID> --workflow <FILE> --submission <FILE>");
                std::process::exit(2);
            };
            let workflow = load_workflow(&wf_path);
            let submission = load_submission(&sub_path, content_type.as_deref());
            let payload = payload_or_exit(&submission);
            let mut engine = open_engine();
            engine.set_executor(Box::new(KindExecutor));
            match engine.expire_overdue(run_id, chrono_now(), &payload, &workflow) {
                Ok(Some(progress)) => { println!("vencido: {progress:?}"); std::process::exit(0); }
                Ok(None) => { println!("sin deadlines vencidos"); std::process::exit(0); }
                Err(e) => { eprintln!("[veri-cli sweep] error: {e}"); std::process::exit(5); }
            }
        }
        other => {
            eprintln!("veri-cli: subcomando desconocido '{other}'");
            std::process::exit(2);
        }
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

fn open_engine() -> FileBackedEngine {
    match build_file_engine(&StoreConfig::from_env()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("[veri-cli] backend error: {e}");
            std::process::exit(5);
        }
    }
}

fn load_workflow(path: &str) -> Workflow {
    match std::fs::read(path).map_err(|e| e.to_string())
                             .and_then(|bytes| serde_json::from_slice::<Workflow>(&bytes).map_err(|e| e.to_string()))
    {
        Ok(workflow) => workflow,
        Err(e) => {
            eprintln!("[veri-cli] workflow parse error ({path}): {e}");
            std::process::exit(3);
        }
    }
}

fn parse_content_type(raw: &str) -> Option<ContentType> {
    match raw {
        "json" => Some(ContentType::Json),
        "xml" => Some(ContentType::Xml),
        "energy_model_json" => Some(ContentType::EnergyModelJson),
        "cosim_descriptor" => Some(ContentType::CosimDescriptor),
        _ => None,
    }
}

fn load_submission(path: &str, content_type: Option<&str>) -> Submission {
    let declared = match content_type {
        Some(raw) => match parse_content_type(raw) {
            Some(ct) => Some(ct),
            None => {
                eprintln!("[veri-cli] content-type desconocido: {raw}");
                std::process::exit(3);
            }
        },
        None => None,
    };
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("[veri-cli] cannot read submission ({path}): {e}");
            std::process::exit(3);
        }
    };
    match Submission::new(bytes, declared) {
        Ok(submission) => submission,
        Err(e) => {
            eprintln!("[veri-cli] submission inválida: {e}");
            std::process::exit(3);
        }
    }
}

fn payload_or_exit(submission: &Submission) -> PayloadTree {
    match parse_submission(submission) {
        Ok(payload) => payload,
        Err(e) => {
            eprintln!("[veri-cli] ingest error: {e}");
            std::process::exit(3);
        }
    }
}
