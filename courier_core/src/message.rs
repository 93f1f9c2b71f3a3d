use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Identity;

/// Globally unique message id, assigned in increasing order starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug)]
#[error("unknown message status \"{0}\"")]
pub struct UnknownStatusError(String);

/// `Sent` is the initial status, `Delivered` the terminal one. The only
/// transition is `Sent` to `Delivered`, made by the bound oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = UnknownStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            other => Err(UnknownStatusError(other.to_owned())),
        }
    }
}

/// One deposited message. A send to several recipients fans out into one
/// `Message` per recipient. Everything except `status` is immutable after
/// creation; subject and body are opaque to the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Identity,
    pub recipient: Identity,
    pub subject: String,
    pub body: String,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
}
