use shared::domain::{CallResult, Verb};
use thiserror::Error;

/// A message consumed by the control loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Shutdown,
    ChangeControlState(i64),
    SkillRecipe(String),
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
    Unrecognized(Vec<String>),
}

/// Strips parentheses and spaces, then splits on `;`.
pub fn normalize(text: &str) -> Vec<String> {
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ' '))
        .collect();
    stripped.split(';').map(str::to_string).collect()
}

impl ControlMessage {
    pub fn parse(text: &str) -> Self {
        Self::from_tokens(normalize(text))
    }

    pub fn from_tokens(tokens: Vec<String>) -> Self {
        let parsed = match tokens.as_slice() {
            [head, ..] if head == "Shutdown" => Some(ControlMessage::Shutdown),
            [head, target, ..] if head == "ChangeControlState" => {
                target.parse().ok().map(ControlMessage::ChangeControlState)
            }
            [head, name, ..] if head == "SkillRecipe" => {
                Some(ControlMessage::SkillRecipe(name.clone()))
            }
            [head, skill, state] if head == "StateChange" => Some(ControlMessage::StateChange {
                skill: skill.clone(),
                state: state.clone(),
            }),
            [head, skill, verb, result] if head == "CallReturn" => {
                match (Verb::from_wire(verb), CallResult::from_wire(result)) {
                    (Some(verb), Some(result)) => Some(ControlMessage::CallReturn {
                        skill: skill.clone(),
                        verb,
                        result,
                    }),
                    _ => None,
                }
            }
            [head, rest @ ..] if head == "ServerMessage" => {
                Some(ControlMessage::ServerMessage(rest.join(";")))
            }
            _ => None,
        };
        parsed.unwrap_or(ControlMessage::Unrecognized(tokens))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperatorInputError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}`; expected Shutdown, ChangeControlState;<1-5> or SkillRecipe;<name>")]
    UnknownCommand(String),
    #[error("`{command}` takes {expected} token(s), got {actual}")]
    TokenCount {
        command: String,
        expected: usize,
        actual: usize,
    },
}

/// Checks an operator console line before it is pushed to the control loop.
pub fn validate_operator_command(text: &str) -> Result<Vec<String>, OperatorInputError> {
    let tokens = normalize(text);
    let command = tokens.first().map(String::as_str).unwrap_or_default();
    let expected = match command {
        "" => return Err(OperatorInputError::Empty),
        "Shutdown" => 1,
        "ChangeControlState" | "SkillRecipe" => 2,
        other => return Err(OperatorInputError::UnknownCommand(other.to_string())),
    };
    if tokens.len() != expected {
        return Err(OperatorInputError::TokenCount {
            command: command.to_string(),
            expected,
            actual: tokens.len(),
        });
    }
    Ok(tokens)
}
