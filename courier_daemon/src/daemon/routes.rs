use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use courier_core::{
    courier::CourierError,
    identity::Identity,
    ledger::{DeliveryError, SendError},
    message::{Message, MessageId},
    registry::{Authorization, KeyEnvelope, RevokeError},
};
use serde::Deserialize;

use crate::event::{Event, HandleEvent, emit_event};

use super::{ListenerState, journal::DBError};

pub const CALLER_HEADER: &str = "x-courier-caller";

type Rejection = (StatusCode, String);

/// The transport in front of the daemon authenticates callers and passes the
/// identity along in a header; the daemon takes it verbatim.
fn caller_identity(headers: &HeaderMap) -> Result<Identity, Rejection> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(Identity::from)
        .ok_or((
            StatusCode::UNAUTHORIZED,
            format!("missing or unreadable {CALLER_HEADER} header"),
        ))
}

async fn reject<E>(state: &Arc<ListenerState<E>>, error: CourierError<DBError>) -> Rejection
where
    E: HandleEvent + Send + 'static,
{
    let rejection = match &error {
        CourierError::Revoke(RevokeError::AuthorizationNotFound) => {
            (StatusCode::NOT_FOUND, error.to_string())
        }
        CourierError::Send(SendError::NotAuthorizedToSend { .. }) => {
            (StatusCode::FORBIDDEN, error.to_string())
        }
        CourierError::Send(SendError::NoRecipients) => {
            (StatusCode::BAD_REQUEST, error.to_string())
        }
        CourierError::Delivery(DeliveryError::MessageNotFound(_)) => {
            (StatusCode::NOT_FOUND, error.to_string())
        }
        CourierError::Delivery(DeliveryError::UnauthorizedOracle) => {
            (StatusCode::FORBIDDEN, error.to_string())
        }
        CourierError::JournalFailure(db_error) => {
            emit_event(&state.event_handler, Event::DBError(db_error.to_string())).await;
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "db error sorry".to_owned(),
            );
        }
    };

    emit_event(&state.event_handler, Event::RequestRejected(error.to_string())).await;
    rejection
}

#[derive(Deserialize)]
pub struct GrantRequest {
    sender: Identity,
    oracle: Identity,
    encrypted_data: String,
    encrypted_symmetric_key: String,
    iv: String,
}

pub async fn grant<E>(
    State(state): State<Arc<ListenerState<E>>>,
    headers: HeaderMap,
    Json(request): Json<GrantRequest>,
) -> Result<StatusCode, Rejection>
where
    E: HandleEvent + Send + 'static,
{
    let user = caller_identity(&headers)?;

    let key_envelope = KeyEnvelope {
        encrypted_data: request.encrypted_data,
        encrypted_symmetric_key: request.encrypted_symmetric_key,
        iv: request.iv,
    };

    let result = state
        .courier
        .lock()
        .await
        .grant_authorization(&user, &request.sender, &request.oracle, key_envelope)
        .await;

    match result {
        Ok(()) => {
            emit_event(
                &state.event_handler,
                Event::AuthorizationGranted {
                    user,
                    sender: request.sender,
                    oracle: request.oracle,
                },
            )
            .await;
            Ok(StatusCode::NO_CONTENT)
        }
        Err(error) => Err(reject(&state, error).await),
    }
}

pub async fn revoke<E>(
    State(state): State<Arc<ListenerState<E>>>,
    Path(sender): Path<Identity>,
    headers: HeaderMap,
) -> Result<StatusCode, Rejection>
where
    E: HandleEvent + Send + 'static,
{
    let user = caller_identity(&headers)?;

    let result = state
        .courier
        .lock()
        .await
        .revoke_authorization(&user, &sender)
        .await;

    match result {
        Ok(()) => {
            emit_event(
                &state.event_handler,
                Event::AuthorizationRevoked { user, sender },
            )
            .await;
            Ok(StatusCode::NO_CONTENT)
        }
        Err(error) => Err(reject(&state, error).await),
    }
}

pub async fn lookup_authorization<E>(
    State(state): State<Arc<ListenerState<E>>>,
    Path((user, sender)): Path<(Identity, Identity)>,
) -> Result<Json<Authorization>, Rejection>
where
    E: HandleEvent + Send + 'static,
{
    state
        .courier
        .lock()
        .await
        .authorization(&user, &sender)
        .cloned()
        .map(Json)
        .ok_or((
            StatusCode::NOT_FOUND,
            "no authorization has ever been granted for this user and sender".to_owned(),
        ))
}

pub async fn list_authorizations<E>(
    State(state): State<Arc<ListenerState<E>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Authorization>>, Rejection>
where
    E: HandleEvent + Send + 'static,
{
    let user = caller_identity(&headers)?;

    let records = state
        .courier
        .lock()
        .await
        .active_authorizations(&user)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(records))
}

#[derive(Deserialize)]
pub struct SendRequest {
    recipients: Vec<Identity>,
    subject: String,
    body: String,
}

pub async fn send<E>(
    State(state): State<Arc<ListenerState<E>>>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<StatusCode, Rejection>
where
    E: HandleEvent + Send + 'static,
{
    let sender = caller_identity(&headers)?;

    let result = state
        .courier
        .lock()
        .await
        .send_message(&sender, &request.recipients, &request.subject, &request.body)
        .await;

    match result {
        Ok(()) => {
            emit_event(
                &state.event_handler,
                Event::MessagesAccepted {
                    sender,
                    recipients: request.recipients.len(),
                },
            )
            .await;
            Ok(StatusCode::NO_CONTENT)
        }
        Err(error) => Err(reject(&state, error).await),
    }
}

pub async fn inbox<E>(
    State(state): State<Arc<ListenerState<E>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Message>>, Rejection>
where
    E: HandleEvent + Send + 'static,
{
    let user = caller_identity(&headers)?;

    let messages = state
        .courier
        .lock()
        .await
        .messages_for(&user)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(messages))
}

pub async fn mark_delivered<E>(
    State(state): State<Arc<ListenerState<E>>>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<StatusCode, Rejection>
where
    E: HandleEvent + Send + 'static,
{
    let oracle = caller_identity(&headers)?;
    let id = MessageId(id);

    let result = state
        .courier
        .lock()
        .await
        .mark_message_delivered(&oracle, id)
        .await;

    match result {
        Ok(()) => {
            emit_event(&state.event_handler, Event::MessageDelivered { oracle, id }).await;
            Ok(StatusCode::NO_CONTENT)
        }
        Err(error) => Err(reject(&state, error).await),
    }
}
