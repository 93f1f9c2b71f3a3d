use std::sync::Arc;

use courier_core::{identity::Identity, message::MessageId};
use tokio::sync::Mutex;

pub enum Event {
    ListenerStartedListening(u16),
    AuthorizationGranted {
        user: Identity,
        sender: Identity,
        oracle: Identity,
    },
    AuthorizationRevoked {
        user: Identity,
        sender: Identity,
    },
    MessagesAccepted {
        sender: Identity,
        recipients: usize,
    },
    MessageDelivered {
        oracle: Identity,
        id: MessageId,
    },
    RequestRejected(String),
    DBError(String),
}

pub trait HandleEvent {
    fn handle_event(&mut self, event: Event);
}

pub(crate) async fn emit_event<E>(event_handler: &Arc<Mutex<E>>, event: Event)
where
    E: HandleEvent + Send + 'static,
{
    event_handler.lock().await.handle_event(event);
}
