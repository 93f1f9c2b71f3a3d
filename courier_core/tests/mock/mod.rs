use std::{convert::Infallible, sync::Arc};

use courier_core::{
    courier::Journal,
    identity::Identity,
    message::{Message, MessageId},
    registry::Authorization,
};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalEntry {
    Authorization(Identity, Authorization),
    Messages(Vec<Message>),
    Delivery(MessageId),
}

/// Records every journal append; clones share the same entry list so tests
/// can keep a handle after handing the journal to the courier.
#[derive(Clone, Default)]
pub struct MockJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl MockJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }
}

impl Journal for MockJournal {
    type Error = Infallible;

    async fn record_authorization(
        &mut self,
        user: &Identity,
        authorization: &Authorization,
    ) -> Result<(), Self::Error> {
        self.entries
            .lock()
            .push(JournalEntry::Authorization(
                user.clone(),
                authorization.clone(),
            ));
        Ok(())
    }

    async fn record_messages(&mut self, messages: &[Message]) -> Result<(), Self::Error> {
        self.entries
            .lock()
            .push(JournalEntry::Messages(messages.to_vec()));
        Ok(())
    }

    async fn record_delivery(&mut self, id: MessageId) -> Result<(), Self::Error> {
        self.entries.lock().push(JournalEntry::Delivery(id));
        Ok(())
    }
}

#[derive(Error, Debug)]
#[error("journal is down")]
pub struct JournalDown;

/// Fails every append, for exercising the journal failure path.
pub struct FailingJournal;

impl Journal for FailingJournal {
    type Error = JournalDown;

    async fn record_authorization(
        &mut self,
        _: &Identity,
        _: &Authorization,
    ) -> Result<(), Self::Error> {
        Err(JournalDown)
    }

    async fn record_messages(&mut self, _: &[Message]) -> Result<(), Self::Error> {
        Err(JournalDown)
    }

    async fn record_delivery(&mut self, _: MessageId) -> Result<(), Self::Error> {
        Err(JournalDown)
    }
}
