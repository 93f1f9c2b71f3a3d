use std::sync::Arc;

use axum::{Router, routing};
use courier_core::courier::Courier;
use thiserror::Error;
use tokio::{net::TcpListener, sync::Mutex};

use crate::{
    config::DaemonConfig,
    event::{Event, HandleEvent, emit_event},
};

use journal::{DBError, DBJournal};

pub mod journal;
mod routes;

pub use routes::CALLER_HEADER;

pub const DEFAULT_LISTENING_PORT: u16 = 7171;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("cannot start db connection")]
    CannotConnectToDB,
    #[error("cannot restore state from db: {0}")]
    CannotRestoreState(DBError),
    #[error("cannot bind port {0} (is it in use?)")]
    CannotBindPort(u16),
}

/// Serves the courier over HTTP. All operations go through one mutex held
/// for the whole logical operation, so grants, sends and confirmations
/// apply one at a time and reads see a consistent snapshot.
pub struct Daemon<E>
where
    E: HandleEvent,
{
    courier: Arc<Mutex<Courier<DBJournal, DBError>>>,
    event_handler: Arc<Mutex<E>>,
    config: DaemonConfig,
}

impl<E> Daemon<E>
where
    E: HandleEvent + Send + 'static,
{
    pub async fn new(
        db_url: &str,
        config: DaemonConfig,
        event_handler: E,
    ) -> Result<Self, DaemonError> {
        let journal = DBJournal::new(db_url)
            .await
            .map_err(|_| DaemonError::CannotConnectToDB)?;

        let (records, messages) = journal
            .restore()
            .await
            .map_err(DaemonError::CannotRestoreState)?;

        Ok(Self {
            courier: Arc::new(Mutex::new(Courier::restore(journal, records, messages))),
            event_handler: Arc::new(Mutex::new(event_handler)),
            config,
        })
    }

    pub async fn start_listener(&self) -> Result<(), DaemonError> {
        let listener_state = Arc::new(ListenerState {
            courier: Arc::clone(&self.courier),
            event_handler: Arc::clone(&self.event_handler),
        });

        let router = Router::new()
            .route(
                "/authorizations",
                routing::post(routes::grant::<E>).get(routes::list_authorizations::<E>),
            )
            .route("/authorizations/{sender}", routing::delete(routes::revoke::<E>))
            .route(
                "/authorizations/{user}/{sender}",
                routing::get(routes::lookup_authorization::<E>),
            )
            .route(
                "/messages",
                routing::post(routes::send::<E>).get(routes::inbox::<E>),
            )
            .route(
                "/messages/{id}/delivered",
                routing::post(routes::mark_delivered::<E>),
            )
            .with_state(listener_state);

        let port = self.config.custom_port.unwrap_or(DEFAULT_LISTENING_PORT);
        let address = format!("0.0.0.0:{}", port);

        let listener = TcpListener::bind(address)
            .await
            .map_err(|_| DaemonError::CannotBindPort(port))?;

        tokio::spawn(async {
            axum::serve(listener, router.into_make_service())
                .await
                .expect("should run indefinitely");
        });

        emit_event(&self.event_handler, Event::ListenerStartedListening(port)).await;

        Ok(())
    }
}

struct ListenerState<E: HandleEvent> {
    courier: Arc<Mutex<Courier<DBJournal, DBError>>>,
    event_handler: Arc<Mutex<E>>,
}
