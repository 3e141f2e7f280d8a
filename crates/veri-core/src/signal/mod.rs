//! Resolución de señales contra payloads.

pub mod resolver;

pub use resolver::resolve;

use indexmap::IndexMap;
use veri_domain::{SignalSpec, SignalStage};

use crate::payload::{PayloadTree, Resolved};

/// Mapa de señales resueltas, en el orden de inserción del conjunto de
/// señales del validador.
pub type ResolvedSignals = IndexMap<String, Resolved>;

/// Resuelve todas las señales de una etapa contra el árbol dado.
///
/// Siempre produce una entrada por señal: las ausentes quedan como
/// `Resolved::NotFound` y la política de la aserción decide qué hacer con
/// ellas.
pub fn resolve_stage<'a, I>(signals: I, tree: &PayloadTree) -> ResolvedSignals
    where I: Iterator<Item = &'a SignalSpec>
{
    let mut resolved = ResolvedSignals::new();
    for spec in signals {
        resolved.insert(spec.slug().to_string(), resolve(tree, spec.effective_path()));
    }
    resolved
}

/// Conveniencia: resuelve las señales de `stage` de un conjunto.
pub fn resolve_signal_set(set: &veri_domain::SignalSet, stage: SignalStage, tree: &PayloadTree) -> ResolvedSignals {
    resolve_stage(set.stage_iter(stage), tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use veri_domain::{SignalSet, SignalType};

    #[test]
    fn resolves_in_insertion_order_with_not_found_entries() {
        let set = SignalSet::from_specs(vec![
            SignalSpec::new("site_eui_kwh_m2", SignalStage::Input, SignalType::Number).unwrap(),
            SignalSpec::new("missing_signal", SignalStage::Input, SignalType::Number).unwrap().optional(),
        ]).unwrap();
        let tree = PayloadTree::Tree(json!({"site_eui_kwh_m2": 120}));

        let resolved = resolve_signal_set(&set, SignalStage::Input, &tree);
        let keys: Vec<&String> = resolved.keys().collect();
        assert_eq!(keys, vec!["site_eui_kwh_m2", "missing_signal"]);
        assert_eq!(resolved["site_eui_kwh_m2"], Resolved::Value(json!(120)));
        assert!(resolved["missing_signal"].is_not_found());
    }
}
