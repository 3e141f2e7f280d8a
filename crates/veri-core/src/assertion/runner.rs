//! Secuenciación de aserciones de una fase.
//!
//! Garantía de orden: las aserciones por defecto del validador se evalúan
//! estrictamente antes que las del paso, y dentro de cada grupo en su orden
//! estable de inserción. La traza se evalúa completa: un fallo bloqueante
//! marca la fase como fallida pero no corta las aserciones restantes (el
//! cortocircuito opera entre fases, al decidir si el paso se despacha).

use indexmap::IndexMap;
use serde_json::Value;
use veri_domain::{AssertionBody, AssertionSpec, SignalSet, SignalStage};

use super::expression::evaluate_expression;
use super::operator::apply_operator;
use super::Outcome;
use crate::finding::Finding;
use crate::payload::Resolved;
use crate::signal::ResolvedSignals;

/// Entrada de la traza de evaluación, en orden.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionTraceEntry {
    pub slug: String,
    pub outcome: Outcome,
    pub blocking: bool,
}

/// Resultado de evaluar todas las aserciones de una fase.
#[derive(Debug, Clone, Default)]
pub struct PhaseReport {
    pub trace: Vec<AssertionTraceEntry>,
    pub findings: Vec<Finding>,
    /// true si alguna aserción bloqueante terminó en FAIL o ERROR.
    pub blocking_failure: bool,
}

/// Evalúa defaults + aserciones de paso de la etapa dada contra las señales
/// resueltas.
pub fn evaluate_phase(stage: SignalStage,
                      defaults: &[AssertionSpec],
                      step_assertions: &[AssertionSpec],
                      signals: &SignalSet,
                      resolved: &ResolvedSignals,
                      budget: u32)
                      -> PhaseReport {
    let mut report = PhaseReport::default();

    for assertion in defaults.iter().chain(step_assertions.iter()) {
        if assertion.stage() != stage {
            continue;
        }
        let outcome = evaluate_one(assertion, signals, resolved, budget);
        record(&mut report, assertion, signals, outcome);
    }
    report
}

fn evaluate_one(assertion: &AssertionSpec, signals: &SignalSet, resolved: &ResolvedSignals, budget: u32) -> Outcome {
    match assertion.body() {
        AssertionBody::Operator { signal, op, params } => {
            let slot = match resolved.get(signal) {
                Some(r) => r,
                None => {
                    return Outcome::Error { reason: format!("signal '{signal}' was not resolved for this phase") };
                }
            };
            match slot {
                Resolved::Value(value) => apply_operator(*op, params, value),
                Resolved::NotFound => {
                    let required = signals.get(signal).map(|s| s.required()).unwrap_or(true);
                    if required {
                        Outcome::Error { reason: format!("required signal '{signal}' not found in payload") }
                    } else if assertion.treat_missing_as_null() {
                        apply_operator(*op, params, &Value::Null)
                    } else {
                        Outcome::Error { reason: format!("signal '{signal}' not found and missing is not treated as null") }
                    }
                }
            }
        }
        AssertionBody::Expression { source } => {
            let namespace = expression_namespace(assertion, resolved);
            match evaluate_expression(source, &namespace, budget) {
                Ok(true) => Outcome::Pass,
                Ok(false) => Outcome::Fail,
                Err(e) => Outcome::Error { reason: e.to_string() },
            }
        }
    }
}

/// Espacio de nombres visible para una expresión: las señales resueltas de
/// la fase. Una señal ausente entra como `null` sólo si la aserción lo
/// pidió; si no, queda fuera y su referencia produce ERROR.
fn expression_namespace(assertion: &AssertionSpec, resolved: &ResolvedSignals) -> IndexMap<String, Value> {
    let mut namespace = IndexMap::new();
    for (slug, slot) in resolved {
        match slot {
            Resolved::Value(v) => {
                namespace.insert(slug.clone(), v.clone());
            }
            Resolved::NotFound => {
                if assertion.treat_missing_as_null() {
                    namespace.insert(slug.clone(), Value::Null);
                }
            }
        }
    }
    namespace
}

fn record(report: &mut PhaseReport, assertion: &AssertionSpec, signals: &SignalSet, outcome: Outcome) {
    let path = assertion.target_signal()
                        .and_then(|slug| signals.get(slug))
                        .map(|spec| spec.effective_path().to_string())
                        .unwrap_or_else(|| assertion.slug().to_string());

    match &outcome {
        Outcome::Pass => {}
        Outcome::Fail => {
            let finding = if assertion.blocking() {
                report.blocking_failure = true;
                Finding::error(format!("assertion '{}' failed", assertion.slug()), path)
            } else {
                Finding::warning(format!("assertion '{}' failed", assertion.slug()), path)
            };
            report.findings.push(finding);
        }
        Outcome::Error { reason } => {
            if assertion.blocking() {
                report.blocking_failure = true;
            }
            report.findings
                  .push(Finding::error(format!("assertion '{}' errored: {reason}", assertion.slug()), path));
        }
    }
    report.trace.push(AssertionTraceEntry { slug: assertion.slug().to_string(),
                                            outcome,
                                            blocking: assertion.blocking() });
}
