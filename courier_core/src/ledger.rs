use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    identity::Identity,
    message::{Message, MessageId, MessageStatus},
    registry::AuthorizationRegistry,
};

const FIRST_MESSAGE_ID: u64 = 1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SendError {
    #[error("sender {sender} is not authorized to message {recipient}")]
    NotAuthorizedToSend {
        sender: Identity,
        recipient: Identity,
    },
    #[error("no recipients given")]
    NoRecipients,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no message with id {0}")]
    MessageNotFound(MessageId),
    #[error("caller is not the oracle for this message")]
    UnauthorizedOracle,
}

/// The append-only message store, in ascending id order. Sends are gated by
/// the registry; the registry is threaded in explicitly so the two halves
/// share one state without ambient globals.
pub struct MessageLedger {
    messages: Vec<Message>,
    next_id: u64,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self {
            messages: vec![],
            next_id: FIRST_MESSAGE_ID,
        }
    }

    /// Rebuild from journaled messages, given in ascending id order.
    pub fn restore(messages: Vec<Message>) -> Self {
        let next_id = messages
            .last()
            .map_or(FIRST_MESSAGE_ID, |message| message.id.0 + 1);
        Self { messages, next_id }
    }

    /// All-or-nothing fan-out: every recipient is checked against the
    /// registry before any message is created, so a single unauthorized
    /// recipient aborts the whole send with nothing written. On success one
    /// message per recipient is created with status `Sent` and each
    /// recipient's message count is incremented once.
    pub fn send(
        &mut self,
        registry: &mut AuthorizationRegistry,
        sender: &Identity,
        recipients: &[Identity],
        subject: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<&[Message], SendError> {
        if recipients.is_empty() {
            return Err(SendError::NoRecipients);
        }

        for recipient in recipients {
            if !registry
                .authorization(recipient, sender)
                .is_some_and(|record| record.is_authorized)
            {
                return Err(SendError::NotAuthorizedToSend {
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                });
            }
        }

        let first_new = self.messages.len();

        for recipient in recipients {
            let id = MessageId(self.next_id);
            self.next_id += 1;

            self.messages.push(Message {
                id,
                sender: sender.clone(),
                recipient: recipient.clone(),
                subject: subject.to_owned(),
                body: body.to_owned(),
                status: MessageStatus::Sent,
                sent_at: now,
            });

            registry.increment_message_count(recipient, sender);
        }

        Ok(&self.messages[first_new..])
    }

    /// Every message addressed to `user`, in creation order.
    pub fn messages_for(&self, user: &Identity) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|message| message.recipient == *user)
            .collect()
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Only the oracle currently named by the `(recipient, sender)`
    /// authorization may confirm delivery. Confirming an already delivered
    /// message is a no-op success.
    pub fn mark_delivered(
        &mut self,
        registry: &AuthorizationRegistry,
        caller: &Identity,
        id: MessageId,
    ) -> Result<&Message, DeliveryError> {
        let idx = self
            .messages
            .iter()
            .position(|message| message.id == id)
            .ok_or(DeliveryError::MessageNotFound(id))?;

        let message = &self.messages[idx];
        let oracle = registry
            .authorization(&message.recipient, &message.sender)
            .map(|record| &record.oracle);

        if oracle != Some(caller) {
            return Err(DeliveryError::UnauthorizedOracle);
        }

        let message = &mut self.messages[idx];
        message.status = MessageStatus::Delivered;
        Ok(&*message)
    }
}

impl Default for MessageLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::KeyEnvelope;

    const SENDER: &str = "sender";
    const ORACLE: &str = "oracle";
    const RECIPIENT_A: &str = "recipient a";
    const RECIPIENT_B: &str = "recipient b";

    fn envelope() -> KeyEnvelope {
        KeyEnvelope {
            encrypted_data: "data".to_owned(),
            encrypted_symmetric_key: "key".to_owned(),
            iv: "iv".to_owned(),
        }
    }

    fn registry_with_grants(users: &[&str]) -> AuthorizationRegistry {
        let mut registry = AuthorizationRegistry::new();
        for user in users {
            registry.grant(&(*user).into(), &SENDER.into(), &ORACLE.into(), envelope());
        }
        registry
    }

    #[test]
    fn fanout_creates_one_message_per_recipient() {
        let mut registry = registry_with_grants(&[RECIPIENT_A, RECIPIENT_B]);
        let mut ledger = MessageLedger::new();

        let created = ledger
            .send(
                &mut registry,
                &SENDER.into(),
                &[RECIPIENT_A.into(), RECIPIENT_B.into()],
                "subject",
                "body",
                Utc::now(),
            )
            .unwrap();

        assert_eq!(created.len(), 2);
        assert_eq!(created[0].id, MessageId(1));
        assert_eq!(created[1].id, MessageId(2));
        assert!(
            created
                .iter()
                .all(|message| message.status == MessageStatus::Sent)
        );

        assert_eq!(ledger.messages_for(&RECIPIENT_A.into()).len(), 1);
        assert_eq!(ledger.messages_for(&RECIPIENT_B.into()).len(), 1);

        for recipient in [RECIPIENT_A, RECIPIENT_B] {
            let record = registry
                .authorization(&recipient.into(), &SENDER.into())
                .unwrap();
            assert_eq!(record.message_count, 1);
        }
    }

    #[test]
    fn one_unauthorized_recipient_aborts_the_whole_send() {
        let mut registry = registry_with_grants(&[RECIPIENT_A]);
        let mut ledger = MessageLedger::new();

        let result = ledger.send(
            &mut registry,
            &SENDER.into(),
            &[RECIPIENT_A.into(), RECIPIENT_B.into()],
            "subject",
            "body",
            Utc::now(),
        );

        assert_eq!(
            result.unwrap_err(),
            SendError::NotAuthorizedToSend {
                sender: SENDER.into(),
                recipient: RECIPIENT_B.into(),
            }
        );

        assert!(ledger.messages_for(&RECIPIENT_A.into()).is_empty());
        assert!(ledger.messages_for(&RECIPIENT_B.into()).is_empty());
        assert_eq!(
            registry
                .authorization(&RECIPIENT_A.into(), &SENDER.into())
                .unwrap()
                .message_count,
            0
        );
    }

    #[test]
    fn revoked_recipient_rejects_sends() {
        let mut registry = registry_with_grants(&[RECIPIENT_A]);
        let mut ledger = MessageLedger::new();

        registry
            .revoke(&RECIPIENT_A.into(), &SENDER.into())
            .unwrap();

        assert!(matches!(
            ledger.send(
                &mut registry,
                &SENDER.into(),
                &[RECIPIENT_A.into()],
                "subject",
                "body",
                Utc::now(),
            ),
            Err(SendError::NotAuthorizedToSend { .. })
        ));
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let mut registry = registry_with_grants(&[RECIPIENT_A]);
        let mut ledger = MessageLedger::new();

        assert_eq!(
            ledger.send(
                &mut registry,
                &SENDER.into(),
                &[],
                "subject",
                "body",
                Utc::now()
            ),
            Err(SendError::NoRecipients)
        );
    }

    #[test]
    fn only_the_bound_oracle_confirms_delivery() {
        let mut registry = registry_with_grants(&[RECIPIENT_A]);
        let mut ledger = MessageLedger::new();

        ledger
            .send(
                &mut registry,
                &SENDER.into(),
                &[RECIPIENT_A.into()],
                "subject",
                "body",
                Utc::now(),
            )
            .unwrap();

        assert_eq!(
            ledger.mark_delivered(&registry, &"not the oracle".into(), MessageId(1)),
            Err(DeliveryError::UnauthorizedOracle)
        );
        assert_eq!(
            ledger.message(MessageId(1)).unwrap().status,
            MessageStatus::Sent,
            "failed confirmation must not change the status"
        );

        let message = ledger
            .mark_delivered(&registry, &ORACLE.into(), MessageId(1))
            .unwrap();
        assert_eq!(message.status, MessageStatus::Delivered);

        // re-confirming is a harmless no-op
        ledger
            .mark_delivered(&registry, &ORACLE.into(), MessageId(1))
            .unwrap();
    }

    #[test]
    fn delivery_of_missing_message_fails() {
        let registry = registry_with_grants(&[RECIPIENT_A]);
        let mut ledger = MessageLedger::new();

        assert_eq!(
            ledger.mark_delivered(&registry, &ORACLE.into(), MessageId(7)),
            Err(DeliveryError::MessageNotFound(MessageId(7)))
        );
    }

    #[test]
    fn revocation_does_not_retract_sent_messages() {
        let mut registry = registry_with_grants(&[RECIPIENT_A]);
        let mut ledger = MessageLedger::new();

        ledger
            .send(
                &mut registry,
                &SENDER.into(),
                &[RECIPIENT_A.into()],
                "subject",
                "body",
                Utc::now(),
            )
            .unwrap();

        registry
            .revoke(&RECIPIENT_A.into(), &SENDER.into())
            .unwrap();

        assert_eq!(ledger.messages_for(&RECIPIENT_A.into()).len(), 1);
        // the oracle named by the (still present) record keeps its rights
        ledger
            .mark_delivered(&registry, &ORACLE.into(), MessageId(1))
            .unwrap();
    }

    #[test]
    fn restore_continues_the_id_sequence() {
        let mut registry = registry_with_grants(&[RECIPIENT_A]);
        let mut ledger = MessageLedger::new();

        ledger
            .send(
                &mut registry,
                &SENDER.into(),
                &[RECIPIENT_A.into(), RECIPIENT_A.into()],
                "subject",
                "body",
                Utc::now(),
            )
            .unwrap();

        assert_eq!(ledger.messages_for(&RECIPIENT_A.into()).len(), 2);

        let mut restored = MessageLedger::restore(
            ledger
                .messages_for(&RECIPIENT_A.into())
                .into_iter()
                .cloned()
                .collect(),
        );

        let created = restored
            .send(
                &mut registry,
                &SENDER.into(),
                &[RECIPIENT_A.into()],
                "subject",
                "body",
                Utc::now(),
            )
            .unwrap();
        assert_eq!(created[0].id, MessageId(3));
    }
}
