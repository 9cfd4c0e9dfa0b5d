//! Turning raw user text into intents and entities.
//!
//! The [`RegexInterpreter`] understands the structured `/intent{"entity": "value"}`
//! syntax used by buttons and test scripts; the [`HttpInterpreter`] asks a
//! remote NLU server.

pub mod error;
pub mod http;
pub mod interpreter;
pub mod regex_interpreter;

pub use error::NluError;
pub use http::HttpInterpreter;
pub use interpreter::{create_interpreter, DynInterpreter, Interpreter};
pub use regex_interpreter::RegexInterpreter;
