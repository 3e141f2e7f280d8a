use serde_json::json;
use veri_domain::{AssertionOp, AssertionSpec, ContentType, DomainError, OperatorParams, SignalSet, SignalSpec,
                  SignalStage, SignalType, Submission, ValidatorKind, ValidatorSpec, Workflow, WorkflowStep};

fn eui_validator() -> Result<ValidatorSpec, DomainError> {
    let signals = SignalSet::from_specs(vec![
        SignalSpec::new("site_eui_kwh_m2", SignalStage::Input, SignalType::Number)?,
        SignalSpec::new("target_eui_kwh_m2", SignalStage::Input, SignalType::Number)?,
    ])?;
    let defaults = vec![AssertionSpec::operator("eui_positive", SignalStage::Input, "site_eui_kwh_m2", AssertionOp::Gt,
                                                OperatorParams { value: Some(json!(0.0)),
                                                                 ..Default::default() })?];
    ValidatorSpec::new("eui_check", "EUI review", ValidatorKind::DocumentCheck { required_paths: vec![],
                                                                                 forbidden_paths: vec![] },
                       signals, defaults)
}

#[test]
fn full_workflow_composition_round_trips_through_serde() -> Result<(), DomainError> {
    let step = WorkflowStep::new(10, eui_validator()?, vec![])?;
    let wf = Workflow::new("energy_review", vec![step])?;

    let encoded = serde_json::to_string(&wf)?;
    let decoded: Workflow = serde_json::from_str(&encoded)?;
    assert_eq!(decoded.slug(), "energy_review");
    assert_eq!(decoded.definition_hash(), wf.definition_hash());
    Ok(())
}

#[test]
fn submission_checksum_detects_tampering() -> Result<(), DomainError> {
    let s = Submission::new(br#"{"site_eui_kwh_m2": 120}"#.to_vec(), None)?;
    assert!(s.verify_integrity());

    // una copia con bytes alterados debe delatar el cambio al verificar
    let mut value = serde_json::to_value(&s)?;
    value["payload"] = json!(b"{}".to_vec());
    let tampered: Submission = serde_json::from_value(value)?;
    assert!(!tampered.verify_integrity());
    Ok(())
}

#[test]
fn cosim_validator_declares_dispatched_mode() -> Result<(), DomainError> {
    let signals = SignalSet::from_specs(vec![SignalSpec::new("converged", SignalStage::Output, SignalType::Boolean)?])?;
    let v = ValidatorSpec::new("fmu_run", "FMU co-simulation", ValidatorKind::CosimCheck { tool: "fmpy".to_string() },
                               signals, vec![])?;
    assert_eq!(v.execution_mode(), veri_domain::ExecutionMode::Dispatched);
    Ok(())
}

#[test]
fn content_type_declaration_survives_serde() -> Result<(), DomainError> {
    let encoded = serde_json::to_string(&ContentType::EnergyModelJson)?;
    assert_eq!(encoded, "\"energy_model_json\"");
    Ok(())
}
