//! Pure transcript-construction helpers (§4.2 "Initializing/Pending →
//! ReadyForLLM", §8 "Transcript-building is pure").

use crate::acp::error::{AcpError, Result};
use crate::acp::resources::message::{Message, Role};

/// §3 Task invariant: exactly one of `user_message` / `context_window`.
pub fn validate_spec_exclusivity(user_message: &Option<String>, context_window: &Option<Vec<Message>>) -> Result<()> {
    match (user_message, context_window) {
        (Some(_), Some(_)) => Err(AcpError::SpecInvalid(
            "exactly one of userMessage or contextWindow must be set, both were provided".to_string(),
        )),
        (None, None) => Err(AcpError::SpecInvalid(
            "exactly one of userMessage or contextWindow must be set, neither was provided".to_string(),
        )),
        _ => Ok(()),
    }
}

/// §8 boundary behavior: a contextWindow with no user-role message is invalid.
fn validate_context_window(context_window: &[Message]) -> Result<()> {
    if !context_window.iter().any(|m| m.role == Role::User) {
        return Err(AcpError::SpecInvalid(
            "contextWindow must contain at least one user-role message".to_string(),
        ));
    }
    Ok(())
}

/// Build the initial transcript per §4.2:
/// - `contextWindow` with a leading system message is used verbatim;
/// - `contextWindow` without one gets the Agent's system prompt prepended;
/// - `userMessage` becomes `[{system: agent.system}, {user: userMessage}]`.
pub fn build_initial_transcript(
    user_message: &Option<String>,
    context_window: &Option<Vec<Message>>,
    agent_system_prompt: &str,
) -> Result<Vec<Message>> {
    validate_spec_exclusivity(user_message, context_window)?;

    if let Some(context_window) = context_window {
        validate_context_window(context_window)?;
        if context_window.first().map(|m| m.role) == Some(Role::System) {
            return Ok(context_window.clone());
        }
        let mut transcript = Vec::with_capacity(context_window.len() + 1);
        transcript.push(Message::system(agent_system_prompt));
        transcript.extend(context_window.iter().cloned());
        return Ok(transcript);
    }

    let user_message = user_message.as_ref().expect("exclusivity already validated");
    Ok(vec![Message::system(agent_system_prompt), Message::user(user_message.clone())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_set_is_spec_invalid() {
        let err = validate_spec_exclusivity(&Some("hi".to_string()), &Some(vec![Message::user("hi")])).unwrap_err();
        assert!(matches!(err, AcpError::SpecInvalid(_)));
    }

    #[test]
    fn neither_set_is_spec_invalid() {
        let err = validate_spec_exclusivity(&None, &None).unwrap_err();
        assert!(matches!(err, AcpError::SpecInvalid(_)));
    }

    #[test]
    fn user_message_becomes_system_then_user() {
        let transcript = build_initial_transcript(&Some("hello".to_string()), &None, "you are helpful").unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::System);
        assert_eq!(transcript[0].content, "you are helpful");
        assert_eq!(transcript[1].role, Role::User);
        assert_eq!(transcript[1].content, "hello");
    }

    #[test]
    fn context_window_without_system_gets_one_prepended() {
        let context_window = vec![Message::user("hi")];
        let transcript = build_initial_transcript(&None, &Some(context_window), "sys").unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::System);
        assert_eq!(transcript[0].content, "sys");
    }

    #[test]
    fn context_window_with_system_is_used_verbatim() {
        let context_window = vec![Message::system("already set"), Message::user("hi")];
        let transcript = build_initial_transcript(&None, &Some(context_window.clone()), "sys").unwrap();
        assert_eq!(transcript, context_window);
    }

    #[test]
    fn context_window_with_only_system_message_is_invalid() {
        let context_window = vec![Message::system("sys")];
        let err = build_initial_transcript(&None, &Some(context_window), "sys").unwrap_err();
        assert!(matches!(err, AcpError::SpecInvalid(_)));
    }
}
