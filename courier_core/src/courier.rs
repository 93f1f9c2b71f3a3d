use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    identity::Identity,
    ledger::{DeliveryError, MessageLedger, SendError},
    message::{Message, MessageId},
    registry::{Authorization, AuthorizationRegistry, KeyEnvelope, RevokeError},
};

#[derive(Error, Debug)]
pub enum CourierError<E> {
    #[error(transparent)]
    Revoke(#[from] RevokeError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("{0}")]
    JournalFailure(E),
}

/// The one shared store: an authorization registry and a message ledger
/// behind a single facade, constructed once and injected wherever the state
/// is needed. Callers serialize access to it (the daemon keeps it behind one
/// mutex held for a whole logical operation), which makes every mutating
/// method an atomic transaction over both halves. Each mutation is appended
/// to the journal after it applies.
pub struct Courier<J: Journal<Error = E>, E> {
    registry: AuthorizationRegistry,
    ledger: MessageLedger,
    journal: J,
}

impl<J: Journal<Error = E>, E> Courier<J, E> {
    pub fn new(journal: J) -> Self {
        Self {
            registry: AuthorizationRegistry::new(),
            ledger: MessageLedger::new(),
            journal,
        }
    }

    /// Rebuild in-memory state from journaled records and messages, both in
    /// their original order.
    pub fn restore(
        journal: J,
        records: Vec<(Identity, Authorization)>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            registry: AuthorizationRegistry::restore(records),
            ledger: MessageLedger::restore(messages),
            journal,
        }
    }

    /// Authorize `sender` to message `user`, delegating delivery
    /// confirmation to `oracle`. Overwrites any prior record for the pair.
    pub async fn grant_authorization(
        &mut self,
        user: &Identity,
        sender: &Identity,
        oracle: &Identity,
        key_envelope: KeyEnvelope,
    ) -> Result<(), CourierError<E>> {
        let record = self.registry.grant(user, sender, oracle, key_envelope);
        self.journal
            .record_authorization(user, record)
            .await
            .map_err(CourierError::JournalFailure)
    }

    pub async fn revoke_authorization(
        &mut self,
        user: &Identity,
        sender: &Identity,
    ) -> Result<(), CourierError<E>> {
        let record = self.registry.revoke(user, sender)?;
        self.journal
            .record_authorization(user, record)
            .await
            .map_err(CourierError::JournalFailure)
    }

    pub fn authorization(&self, user: &Identity, sender: &Identity) -> Option<&Authorization> {
        self.registry.authorization(user, sender)
    }

    pub fn active_authorizations(&self, user: &Identity) -> Vec<&Authorization> {
        self.registry.active_authorizations(user)
    }

    pub async fn send_message(
        &mut self,
        sender: &Identity,
        recipients: &[Identity],
        subject: &str,
        body: &str,
    ) -> Result<(), CourierError<E>> {
        self.send_message_at_time(sender, recipients, subject, body, Utc::now())
            .await
    }

    pub async fn send_message_at_time(
        &mut self,
        sender: &Identity,
        recipients: &[Identity],
        subject: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CourierError<E>> {
        let created =
            self.ledger
                .send(&mut self.registry, sender, recipients, subject, body, now)?;
        self.journal
            .record_messages(created)
            .await
            .map_err(CourierError::JournalFailure)
    }

    pub fn messages_for(&self, user: &Identity) -> Vec<&Message> {
        self.ledger.messages_for(user)
    }

    pub async fn mark_message_delivered(
        &mut self,
        caller: &Identity,
        id: MessageId,
    ) -> Result<(), CourierError<E>> {
        self.ledger.mark_delivered(&self.registry, caller, id)?;
        self.journal
            .record_delivery(id)
            .await
            .map_err(CourierError::JournalFailure)
    }
}

/// Durable record of accepted mutations, appended to after each one applies.
/// The daemon backs this with sqlite; tests use an in-memory mock.
#[trait_variant::make(Journal: Send)]
pub trait JournalLocal {
    type Error;

    async fn record_authorization(
        &mut self,
        user: &Identity,
        authorization: &Authorization,
    ) -> Result<(), Self::Error>;

    async fn record_messages(&mut self, messages: &[Message]) -> Result<(), Self::Error>;

    async fn record_delivery(&mut self, id: MessageId) -> Result<(), Self::Error>;
}
