//! Recibos de callback: la guarda de idempotencia.
//!
//! La existencia de un recibo para un `callback_id` significa que ese
//! callback ya se aplicó; una segunda entrega se absorbe sin re-aplicar
//! hallazgos ni re-transicionar estado. Los recibos sólo los borra un
//! barrido de retención externo, nunca el motor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackReceipt {
    pub callback_id: Uuid,
    pub received_at: DateTime<Utc>,
    /// Hash del sobre canónico tal como se aplicó. Una entrega duplicada con
    /// bytes distintos se detecta comparando contra este hash.
    pub payload_hash: String,
}

/// Persistencia de recibos.
pub trait ReceiptStore {
    /// Registra el recibo si es nuevo. Devuelve false si ya existía uno
    /// para ese `callback_id` (duplicado): el llamador no debe aplicar nada.
    fn try_record(&mut self, receipt: CallbackReceipt) -> bool;
    fn contains(&self, callback_id: Uuid) -> bool;
    fn get(&self, callback_id: Uuid) -> Option<CallbackReceipt>;
}

#[derive(Debug, Default)]
pub struct InMemoryReceiptStore {
    inner: HashMap<Uuid, CallbackReceipt>,
}

impl ReceiptStore for InMemoryReceiptStore {
    fn try_record(&mut self, receipt: CallbackReceipt) -> bool {
        if self.inner.contains_key(&receipt.callback_id) {
            return false;
        }
        self.inner.insert(receipt.callback_id, receipt);
        true
    }

    fn contains(&self, callback_id: Uuid) -> bool {
        self.inner.contains_key(&callback_id)
    }

    fn get(&self, callback_id: Uuid) -> Option<CallbackReceipt> {
        self.inner.get(&callback_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_record_for_same_id_is_rejected() {
        let mut store = InMemoryReceiptStore::default();
        let id = Uuid::new_v4();
        let receipt = CallbackReceipt { callback_id: id,
                                        received_at: Utc::now(),
                                        payload_hash: "abc".to_string() };
        assert!(store.try_record(receipt.clone()));
        assert!(!store.try_record(receipt));
        assert!(store.contains(id));
    }
}
