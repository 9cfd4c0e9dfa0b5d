//! Error type for the message-processing agent.

use parley_core::ParleyError;
use parley_nlu::NluError;
use parley_policy::PolicyError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("custom action '{name}' failed: {message}")]
    Action { name: String, message: String },
    #[error("no handler registered for custom action '{0}'")]
    UnregisteredAction(String),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Nlu(#[from] NluError),
    #[error(transparent)]
    Core(#[from] ParleyError),
}

impl AgentError {
    pub fn action(name: impl Into<String>, message: impl Into<String>) -> Self {
        AgentError::Action {
            name: name.into(),
            message: message.into(),
        }
    }
}
