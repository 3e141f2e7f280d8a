//! Evaluación de la forma operador.
//!
//! `apply_operator` recibe el valor ya resuelto de la señal objetivo y el
//! operador con sus parámetros. Las discordancias de tipo producen
//! `Outcome::Error`, nunca un FAIL silencioso; la coacción numérica sólo
//! ocurre si la aserción la pidió (`coerce_types`).

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use veri_domain::{AssertionOp, OperatorParams, ToleranceMode};

use super::Outcome;
use crate::payload::{PayloadTree, Resolved};
use crate::signal::resolve;

/// Aplica un operador sobre el valor resuelto.
pub fn apply_operator(op: AssertionOp, params: &OperatorParams, actual: &Value) -> Outcome {
    match eval(op, params, actual) {
        Ok(true) => Outcome::Pass,
        Ok(false) => Outcome::Fail,
        Err(reason) => Outcome::Error { reason },
    }
}

fn eval(op: AssertionOp, params: &OperatorParams, actual: &Value) -> Result<bool, String> {
    use AssertionOp::*;
    match op {
        Eq => Ok(values_equal(actual, expected(params)?, params)),
        Ne => Ok(!values_equal(actual, expected(params)?, params)),
        Lt => Ok(compare_order(actual, expected(params)?, params)? == Ordering::Less),
        Le => Ok(compare_order(actual, expected(params)?, params)? != Ordering::Greater),
        Gt => Ok(compare_order(actual, expected(params)?, params)? == Ordering::Greater),
        Ge => Ok(compare_order(actual, expected(params)?, params)? != Ordering::Less),
        LengthEq => length_compare(actual, params, Ordering::Equal),
        LengthGt => length_compare(actual, params, Ordering::Greater),
        LengthLt => length_compare(actual, params, Ordering::Less),
        In => membership(actual, params),
        NotIn => membership(actual, params).map(|found| !found),
        Subset => set_relation(actual, params, false),
        Superset => set_relation(actual, params, true),
        Contains => contains(actual, params),
        StartsWith => string_predicate(actual, params, |hay, needle| hay.starts_with(needle)),
        EndsWith => string_predicate(actual, params, |hay, needle| hay.ends_with(needle)),
        Matches => regex_match(actual, params),
        IsNull => Ok(actual.is_null()),
        NotNull => Ok(!actual.is_null()),
        IsEmpty => emptiness(actual),
        NotEmpty => emptiness(actual).map(|empty| !empty),
        ApproxEq => approx_eq(actual, params),
        Before => instant_compare(actual, params, Ordering::Less),
        After => instant_compare(actual, params, Ordering::Greater),
        Any => quantify(actual, params, Quantifier::Any),
        All => quantify(actual, params, Quantifier::All),
        None => quantify(actual, params, Quantifier::None),
    }
}

fn expected(params: &OperatorParams) -> Result<&Value, String> {
    params.value.as_ref().ok_or_else(|| "missing 'value' parameter".to_string())
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Interpretación numérica del valor. Con `coerce` también acepta strings
/// numéricos; sin él, sólo números JSON.
fn as_number(v: &Value, coerce: bool) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if coerce => s.trim().parse::<f64>().ok(),
        _ => Option::None,
    }
}

fn fold(s: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        s.to_lowercase()
    } else {
        s.to_string()
    }
}

/// Igualdad con opciones: numérica cuando ambos lados son interpretables
/// como número, de texto con plegado opcional, estructural en el resto.
fn values_equal(actual: &Value, expected: &Value, params: &OperatorParams) -> bool {
    if let (Some(a), Some(b)) = (as_number(actual, params.coerce_types), as_number(expected, params.coerce_types)) {
        return a == b;
    }
    if let (Value::String(a), Value::String(b)) = (actual, expected) {
        return fold(a, params.case_insensitive) == fold(b, params.case_insensitive);
    }
    actual == expected
}

fn compare_order(actual: &Value, expected: &Value, params: &OperatorParams) -> Result<Ordering, String> {
    if let (Some(a), Some(b)) = (as_number(actual, params.coerce_types), as_number(expected, params.coerce_types)) {
        return a.partial_cmp(&b).ok_or_else(|| "numeric comparison with NaN".to_string());
    }
    if let (Value::String(a), Value::String(b)) = (actual, expected) {
        return Ok(fold(a, params.case_insensitive).cmp(&fold(b, params.case_insensitive)));
    }
    Err(format!("cannot order {} against {}", type_name(actual), type_name(expected)))
}

fn length_of(v: &Value) -> Option<usize> {
    match v {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(map) => Some(map.len()),
        _ => Option::None,
    }
}

fn length_compare(actual: &Value, params: &OperatorParams, wanted: Ordering) -> Result<bool, String> {
    let len = length_of(actual).ok_or_else(|| format!("{} has no length", type_name(actual)))?;
    let expected = expected(params)?.as_u64().ok_or_else(|| "'value' must be a non-negative integer".to_string())?;
    Ok((len as u64).cmp(&expected) == wanted)
}

fn membership(actual: &Value, params: &OperatorParams) -> Result<bool, String> {
    let set = expected(params)?.as_array().ok_or_else(|| "'value' must be an array".to_string())?;
    Ok(set.iter().any(|candidate| values_equal(actual, candidate, params)))
}

fn set_relation(actual: &Value, params: &OperatorParams, superset: bool) -> Result<bool, String> {
    let left = actual.as_array().ok_or_else(|| format!("subset/superset needs an array, got {}", type_name(actual)))?;
    let right = expected(params)?.as_array().ok_or_else(|| "'value' must be an array".to_string())?;
    let (smaller, larger) = if superset { (right, left) } else { (left, right) };
    Ok(smaller.iter().all(|item| larger.iter().any(|candidate| values_equal(item, candidate, params))))
}

fn contains(actual: &Value, params: &OperatorParams) -> Result<bool, String> {
    match actual {
        Value::String(hay) => {
            let needle = expected(params)?.as_str().ok_or_else(|| "'value' must be a string".to_string())?;
            Ok(fold(hay, params.case_insensitive).contains(&fold(needle, params.case_insensitive)))
        }
        Value::Array(items) => {
            let needle = expected(params)?;
            Ok(items.iter().any(|item| values_equal(item, needle, params)))
        }
        other => Err(format!("contains needs a string or array, got {}", type_name(other))),
    }
}

fn string_predicate(actual: &Value, params: &OperatorParams, pred: impl Fn(&str, &str) -> bool) -> Result<bool, String> {
    let hay = actual.as_str().ok_or_else(|| format!("expected a string, got {}", type_name(actual)))?;
    let needle = expected(params)?.as_str().ok_or_else(|| "'value' must be a string".to_string())?;
    Ok(pred(&fold(hay, params.case_insensitive), &fold(needle, params.case_insensitive)))
}

fn regex_match(actual: &Value, params: &OperatorParams) -> Result<bool, String> {
    let hay = actual.as_str().ok_or_else(|| format!("expected a string, got {}", type_name(actual)))?;
    let pattern = expected(params)?.as_str().ok_or_else(|| "'value' must be a regex string".to_string())?;
    let re = regex::RegexBuilder::new(pattern).case_insensitive(params.case_insensitive)
                                              .build()
                                              .map_err(|e| format!("invalid regex: {e}"))?;
    Ok(re.is_match(hay))
}

fn emptiness(actual: &Value) -> Result<bool, String> {
    match actual {
        Value::String(s) => Ok(s.is_empty()),
        Value::Array(items) => Ok(items.is_empty()),
        Value::Object(map) => Ok(map.is_empty()),
        other => Err(format!("is_empty needs a string, array or object, got {}", type_name(other))),
    }
}

fn approx_eq(actual: &Value, params: &OperatorParams) -> Result<bool, String> {
    let a = as_number(actual, params.coerce_types).ok_or_else(|| format!("expected a number, got {}", type_name(actual)))?;
    let b = as_number(expected(params)?, params.coerce_types).ok_or_else(|| "'value' must be a number".to_string())?;
    let tolerance = params.tolerance.ok_or_else(|| "missing 'tolerance' parameter".to_string())?;
    if tolerance < 0.0 {
        return Err("'tolerance' must be non-negative".to_string());
    }
    let allowed = match params.tolerance_mode.unwrap_or(ToleranceMode::Absolute) {
        ToleranceMode::Absolute => tolerance,
        // relativo al comparando; un comparando 0 exige igualdad exacta
        ToleranceMode::Relative => tolerance * b.abs(),
    };
    Ok((a - b).abs() <= allowed)
}

fn parse_instant(v: &Value) -> Result<DateTime<Utc>, String> {
    let s = v.as_str().ok_or_else(|| format!("expected an RFC3339 string, got {}", type_name(v)))?;
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
                                   .map_err(|e| format!("invalid RFC3339 instant '{s}': {e}"))
}

fn instant_compare(actual: &Value, params: &OperatorParams, wanted: Ordering) -> Result<bool, String> {
    let a = parse_instant(actual)?;
    let b = parse_instant(expected(params)?)?;
    Ok(a.cmp(&b) == wanted)
}

enum Quantifier {
    Any,
    All,
    None,
}

/// Cuantificadores sobre una colección: aplica el sub-operador a cada
/// elemento (tras el `element_path` relativo, si hay). Un path ausente en
/// un elemento cuenta como predicado falso; un error de tipo en el
/// sub-operador aborta con Error.
fn quantify(actual: &Value, params: &OperatorParams, q: Quantifier) -> Result<bool, String> {
    let items = actual.as_array().ok_or_else(|| format!("quantifier needs an array, got {}", type_name(actual)))?;
    let sub = params.sub.as_ref().ok_or_else(|| "missing 'sub' parameter".to_string())?;

    let mut hits = 0usize;
    for item in items {
        let target = match &params.element_path {
            Some(path) => match resolve(&PayloadTree::Tree(item.clone()), path) {
                Resolved::Value(v) => v,
                Resolved::NotFound => {
                    continue; // elemento sin el path: predicado falso
                }
            },
            Option::None => item.clone(),
        };
        match apply_operator(sub.op, &sub.params, &target) {
            Outcome::Pass => hits += 1,
            Outcome::Fail => {}
            Outcome::Error { reason } => return Err(format!("quantifier element error: {reason}")),
        }
    }
    Ok(match q {
        Quantifier::Any => hits > 0,
        Quantifier::All => hits == items.len(),
        Quantifier::None => hits == 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use veri_domain::SubAssertion;

    fn with_value(v: Value) -> OperatorParams {
        OperatorParams { value: Some(v),
                         ..Default::default() }
    }

    #[test]
    fn numeric_ordering() {
        assert_eq!(apply_operator(AssertionOp::Lt, &with_value(json!(150)), &json!(120)), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::Lt, &with_value(json!(120)), &json!(150)), Outcome::Fail);
    }

    #[test]
    fn type_mismatch_is_error_not_fail() {
        let outcome = apply_operator(AssertionOp::Lt, &with_value(json!(10)), &json!("21.3"));
        assert!(matches!(outcome, Outcome::Error { .. }));
    }

    #[test]
    fn coercion_is_opt_in() {
        let mut params = with_value(json!(30));
        params.coerce_types = true;
        assert_eq!(apply_operator(AssertionOp::Lt, &params, &json!("21.3")), Outcome::Pass);
    }

    #[test]
    fn case_insensitive_equality() {
        let mut params = with_value(json!("ASHRAE"));
        params.case_insensitive = true;
        assert_eq!(apply_operator(AssertionOp::Eq, &params, &json!("ashrae")), Outcome::Pass);
    }

    #[test]
    fn membership_and_sets() {
        assert_eq!(apply_operator(AssertionOp::In, &with_value(json!(["a", "b"])), &json!("a")), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::NotIn, &with_value(json!(["a", "b"])), &json!("c")), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::Subset, &with_value(json!([1, 2, 3])), &json!([1, 3])), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::Superset, &with_value(json!([2])), &json!([1, 2])), Outcome::Pass);
    }

    #[test]
    fn approx_eq_modes() {
        let params = OperatorParams { value: Some(json!(100.0)),
                                      tolerance: Some(0.5),
                                      ..Default::default() };
        assert_eq!(apply_operator(AssertionOp::ApproxEq, &params, &json!(100.4)), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::ApproxEq, &params, &json!(101.0)), Outcome::Fail);

        let relative = OperatorParams { value: Some(json!(100.0)),
                                        tolerance: Some(0.02),
                                        tolerance_mode: Some(ToleranceMode::Relative),
                                        ..Default::default() };
        assert_eq!(apply_operator(AssertionOp::ApproxEq, &relative, &json!(101.5)), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::ApproxEq, &relative, &json!(103.0)), Outcome::Fail);
    }

    #[test]
    fn temporal_ordering() {
        let params = with_value(json!("2026-01-01T00:00:00Z"));
        assert_eq!(apply_operator(AssertionOp::Before, &params, &json!("2025-06-30T12:00:00Z")), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::After, &params, &json!("2025-06-30T12:00:00Z")), Outcome::Fail);
        assert!(matches!(apply_operator(AssertionOp::Before, &params, &json!("not a date")), Outcome::Error { .. }));
    }

    #[test]
    fn regex_matches() {
        let params = with_value(json!("^zone_[0-9]+$"));
        assert_eq!(apply_operator(AssertionOp::Matches, &params, &json!("zone_12")), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::Matches, &params, &json!("roof")), Outcome::Fail);
        let bad = with_value(json!("(unclosed"));
        assert!(matches!(apply_operator(AssertionOp::Matches, &bad, &json!("x")), Outcome::Error { .. }));
    }

    #[test]
    fn quantifiers_over_nested_collection() {
        let zones = json!([
            {"name": "north", "area_m2": 120.0},
            {"name": "south", "area_m2": 15.0}
        ]);
        let sub = SubAssertion { op: AssertionOp::Gt,
                                 params: with_value(json!(50.0)) };
        let params = OperatorParams { element_path: Some("area_m2".to_string()),
                                      sub: Some(Box::new(sub)),
                                      ..Default::default() };
        assert_eq!(apply_operator(AssertionOp::Any, &params, &zones), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::All, &params, &zones), Outcome::Fail);
        assert_eq!(apply_operator(AssertionOp::None, &params, &zones), Outcome::Fail);
    }

    #[test]
    fn empty_collection_quantifiers_are_vacuous() {
        let sub = SubAssertion { op: AssertionOp::Gt,
                                 params: with_value(json!(0)) };
        let params = OperatorParams { sub: Some(Box::new(sub)),
                                      ..Default::default() };
        assert_eq!(apply_operator(AssertionOp::All, &params, &json!([])), Outcome::Pass);
        assert_eq!(apply_operator(AssertionOp::Any, &params, &json!([])), Outcome::Fail);
        assert_eq!(apply_operator(AssertionOp::None, &params, &json!([])), Outcome::Pass);
    }
}
