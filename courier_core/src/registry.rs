use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Identity;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RevokeError {
    #[error("no authorization exists for this user and sender")]
    AuthorizationNotFound,
}

/// Key-exchange material supplied by the user at grant time. The core stores
/// and returns these strings unchanged and never inspects them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEnvelope {
    pub encrypted_data: String,
    pub encrypted_symmetric_key: String,
    pub iv: String,
}

/// A user's standing permission for one sender, plus the oracle delegated to
/// confirm delivery of messages sent under it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub sender: Identity,
    pub oracle: Identity,
    pub is_authorized: bool,
    pub message_count: u64,
    #[serde(flatten)]
    pub key_envelope: KeyEnvelope,
}

/// All authorization records, held per user in grant order. Records are never
/// removed; revoking only flips `is_authorized`, so the history of a pair
/// stays reachable through [`AuthorizationRegistry::authorization`].
#[derive(Default)]
pub struct AuthorizationRegistry {
    records: HashMap<Identity, Vec<Authorization>>,
}

impl AuthorizationRegistry {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Rebuild from journaled records, given per user in grant order.
    pub fn restore(records: Vec<(Identity, Authorization)>) -> Self {
        let mut registry = Self::new();
        for (user, authorization) in records {
            registry.records.entry(user).or_default().push(authorization);
        }
        registry
    }

    /// Create or overwrite the `(user, sender)` record and mark it
    /// authorized. A re-grant replaces the oracle and envelope but keeps the
    /// record's position in the user's grant order and its message count.
    pub fn grant(
        &mut self,
        user: &Identity,
        sender: &Identity,
        oracle: &Identity,
        key_envelope: KeyEnvelope,
    ) -> &Authorization {
        let user_records = self.records.entry(user.clone()).or_default();

        let idx = match user_records
            .iter()
            .position(|record| record.sender == *sender)
        {
            Some(idx) => {
                let record = &mut user_records[idx];
                record.oracle = oracle.clone();
                record.is_authorized = true;
                record.key_envelope = key_envelope;
                idx
            }
            None => {
                user_records.push(Authorization {
                    sender: sender.clone(),
                    oracle: oracle.clone(),
                    is_authorized: true,
                    message_count: 0,
                    key_envelope,
                });
                user_records.len() - 1
            }
        };

        &user_records[idx]
    }

    /// Mark the `(user, sender)` record unauthorized, keeping it for point
    /// lookups. Revoking an already revoked record is a no-op success.
    pub fn revoke(
        &mut self,
        user: &Identity,
        sender: &Identity,
    ) -> Result<&Authorization, RevokeError> {
        let record = self
            .records
            .get_mut(user)
            .and_then(|records| records.iter_mut().find(|record| record.sender == *sender))
            .ok_or(RevokeError::AuthorizationNotFound)?;

        record.is_authorized = false;
        Ok(&*record)
    }

    /// Point lookup regardless of status. `None` means the pair was never
    /// granted, which callers must distinguish from a revoked record.
    pub fn authorization(&self, user: &Identity, sender: &Identity) -> Option<&Authorization> {
        self.records
            .get(user)?
            .iter()
            .find(|record| record.sender == *sender)
    }

    /// The user's currently authorized records in original grant order.
    /// Revoked records are excluded entirely from this view.
    pub fn active_authorizations(&self, user: &Identity) -> Vec<&Authorization> {
        self.records
            .get(user)
            .into_iter()
            .flatten()
            .filter(|record| record.is_authorized)
            .collect()
    }

    pub(crate) fn increment_message_count(&mut self, user: &Identity, sender: &Identity) {
        if let Some(record) = self
            .records
            .get_mut(user)
            .and_then(|records| records.iter_mut().find(|record| record.sender == *sender))
        {
            record.message_count += 1;
        }
    }
}
