use std::future::Future;
use std::pin::Pin;

use parley_core::config::{InterpreterConfig, InterpreterKind};
use parley_core::ParseData;
use tracing::info;

use crate::error::NluError;
use crate::http::HttpInterpreter;
use crate::regex_interpreter::RegexInterpreter;

/// Converts user text into structured parse data.
///
/// Parsing is infallible by contract: an interpreter that cannot make sense
/// of a message, or cannot reach its backend, returns a zero-confidence
/// [`ParseData::empty`] instead of an error.
pub trait Interpreter: Send + Sync {
    fn parse(&self, text: &str) -> impl Future<Output = ParseData> + Send;
}

/// Object-safe version of [`Interpreter`] for dynamic dispatch.
///
/// A blanket implementation is provided so that every `Interpreter`
/// automatically implements `DynInterpreter`.
pub trait DynInterpreter: Send + Sync {
    fn parse_boxed<'a>(&'a self, text: &'a str)
        -> Pin<Box<dyn Future<Output = ParseData> + Send + 'a>>;
}

impl<T: Interpreter> DynInterpreter for T {
    fn parse_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = ParseData> + Send + 'a>> {
        Box::pin(self.parse(text))
    }
}

/// Build the interpreter selected in configuration.
pub fn create_interpreter(config: &InterpreterConfig) -> Result<Box<dyn DynInterpreter>, NluError> {
    match config.kind {
        InterpreterKind::Regex => {
            info!("Using regex interpreter");
            Ok(Box::new(RegexInterpreter::new()))
        }
        InterpreterKind::Http => {
            info!(server = %config.server, "Using HTTP NLU interpreter");
            Ok(Box::new(HttpInterpreter::from_config(config)?))
        }
    }
}
