//! Bridge line frames, device notifications and the HTTP/WS payloads built on them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{CallResult, Verb},
    error::ProtocolError,
};

pub const FIELD_SEPARATOR: char = ';';

const TAG_INIT: &str = "INIT";
const TAG_UPDATE: &str = "UPDATE";
const TAG_CALLRET: &str = "CALLRET";
const TAG_RET: &str = "RET";
const TAG_CALL: &str = "CALL";

/// Frames sent by a device controller to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Init {
        skill: String,
    },
    Update {
        skill: String,
        state: String,
        info: String,
    },
    CallReturn {
        skill: String,
        verb: Verb,
        result: CallResult,
    },
}

impl InboundFrame {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let fields = split_line(line)?;
        match fields[1] {
            TAG_INIT => {
                expect_fields(line, &fields, 2)?;
                Ok(InboundFrame::Init {
                    skill: fields[0].to_string(),
                })
            }
            TAG_UPDATE => {
                expect_fields(line, &fields, 4)?;
                Ok(InboundFrame::Update {
                    skill: fields[0].to_string(),
                    state: fields[2].to_string(),
                    info: fields[3].to_string(),
                })
            }
            TAG_CALLRET => {
                expect_fields(line, &fields, 4)?;
                Ok(InboundFrame::CallReturn {
                    skill: fields[0].to_string(),
                    verb: parse_verb(fields[2])?,
                    result: parse_result(fields[3])?,
                })
            }
            tag => Err(ProtocolError::UnknownTag {
                line: line.to_string(),
                tag: tag.to_string(),
            }),
        }
    }

    /// Encoded line without the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            InboundFrame::Init { skill } => format!("{skill};{TAG_INIT}"),
            InboundFrame::Update { skill, state, info } => {
                format!("{skill};{TAG_UPDATE};{state};{info}")
            }
            InboundFrame::CallReturn {
                skill,
                verb,
                result,
            } => format!("{skill};{TAG_CALLRET};{verb};{result}"),
        }
    }
}

/// Frames sent by the bridge to a device controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Ret {
        skill: String,
        result: CallResult,
    },
    Call {
        skill: String,
        verb: Verb,
        parameter: String,
    },
}

impl OutboundFrame {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let fields = split_line(line)?;
        match fields[1] {
            TAG_RET => {
                expect_fields(line, &fields, 3)?;
                Ok(OutboundFrame::Ret {
                    skill: fields[0].to_string(),
                    result: parse_result(fields[2])?,
                })
            }
            TAG_CALL => {
                expect_fields(line, &fields, 4)?;
                Ok(OutboundFrame::Call {
                    skill: fields[0].to_string(),
                    verb: parse_verb(fields[2])?,
                    parameter: fields[3].to_string(),
                })
            }
            tag => Err(ProtocolError::UnknownTag {
                line: line.to_string(),
                tag: tag.to_string(),
            }),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            OutboundFrame::Ret { skill, result } => format!("{skill};{TAG_RET};{result}"),
            OutboundFrame::Call {
                skill,
                verb,
                parameter,
            } => format!("{skill};{TAG_CALL};{verb};{parameter}"),
        }
    }
}

/// Rejects values that would shift the field layout of a frame.
pub fn validate_field(value: &str) -> Result<(), ProtocolError> {
    if value.contains(FIELD_SEPARATOR) || value.contains('\n') || value.contains('\r') {
        return Err(ProtocolError::InvalidField(value.to_string()));
    }
    Ok(())
}

fn split_line(line: &str) -> Result<Vec<&str>, ProtocolError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    if line.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() < 2 {
        return Err(ProtocolError::FieldCount {
            line: line.to_string(),
            expected: 2,
            actual: fields.len(),
        });
    }
    Ok(fields)
}

fn expect_fields(line: &str, fields: &[&str], expected: usize) -> Result<(), ProtocolError> {
    if fields.len() != expected {
        return Err(ProtocolError::FieldCount {
            line: line.trim_end_matches(&['\r', '\n'][..]).to_string(),
            expected,
            actual: fields.len(),
        });
    }
    Ok(())
}

fn parse_verb(raw: &str) -> Result<Verb, ProtocolError> {
    Verb::from_wire(raw).ok_or_else(|| ProtocolError::UnknownVerb(raw.to_string()))
}

fn parse_result(raw: &str) -> Result<CallResult, ProtocolError> {
    CallResult::from_wire(raw).ok_or_else(|| ProtocolError::UnknownResult(raw.to_string()))
}

/// Text notification a device publishes to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    StateChange {
        skill: String,
        state: String,
    },
    CallReturn {
        skill: String,
        verb: Verb,
        result: CallResult,
    },
    ServerMessage(String),
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::StateChange { skill, state } => write!(f, "StateChange;{skill};{state}"),
            Notification::CallReturn {
                skill,
                verb,
                result,
            } => write!(f, "CallReturn;{skill};{verb};{result}"),
            Notification::ServerMessage(text) => write!(f, "ServerMessage;{text}"),
        }
    }
}

/// Envelope carried on the device event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub device: String,
    pub event_id: u64,
    pub emitted_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub parameter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSummary {
    pub name: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device: String,
    pub bridge_ready: bool,
    pub skills: Vec<SkillSummary>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
