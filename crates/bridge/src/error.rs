use std::time::Duration;

use shared::{domain::Verb, error::ProtocolError};
use thiserror::Error;

use crate::channel::REMOTE_FAILURE_MESSAGE;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The controller answered the call with `FAILED`, or the channel closed
    /// while the call was pending.
    #[error("{}", REMOTE_FAILURE_MESSAGE)]
    RemoteFailure { verb: Verb },
    #[error("no reply to {verb} within {after:?}")]
    Timeout { verb: Verb, after: Duration },
    #[error("skill bridge connection is closed")]
    Closed,
    #[error("unknown skill `{0}`")]
    UnknownSkill(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("skill bridge i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown method `{method}` for skill `{skill}`")]
    UnknownMethod { skill: String, method: String },
}
