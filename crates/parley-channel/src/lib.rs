//! Delivering bot responses.
//!
//! The [`Dispatcher`] turns actions and templates into messages and hands
//! them to an [`OutputChannel`]; channels only need to know how to send text.

pub mod channel;
pub mod console;
pub mod dispatcher;

pub use channel::{CollectingOutputChannel, OutgoingMessage, OutputChannel};
pub use console::{ConsoleInputChannel, ConsoleOutputChannel};
pub use dispatcher::{BotMessage, Dispatcher, TemplateVars};
