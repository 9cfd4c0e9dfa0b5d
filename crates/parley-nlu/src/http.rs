//! Interpreter backed by a remote NLU server's `/parse` endpoint.

use std::time::Duration;

use parley_core::config::InterpreterConfig;
use parley_core::{ParleyError, ParseData};
use tracing::{debug, error};

use crate::error::NluError;
use crate::interpreter::Interpreter;

/// Calls `GET {server}/parse?q=...` and degrades to an empty parse when the
/// server cannot be reached or answers with an error.
#[derive(Debug, Clone)]
pub struct HttpInterpreter {
    client: reqwest::Client,
    server: String,
    token: Option<String>,
    model: Option<String>,
    project: Option<String>,
}

impl HttpInterpreter {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Result<Self, NluError> {
        let server = server.into().trim_end_matches('/').to_string();
        if server.is_empty() {
            return Err(ParleyError::Config("NLU server URL is empty".into()).into());
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            server,
            token: None,
            model: None,
            project: None,
        })
    }

    pub fn from_config(config: &InterpreterConfig) -> Result<Self, NluError> {
        let mut interpreter =
            Self::new(config.server.clone(), Duration::from_secs(config.timeout_secs))?;
        interpreter.token = config.token.clone();
        interpreter.model = config.model.clone();
        interpreter.project = config.project.clone();
        Ok(interpreter)
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Query the server, surfacing every failure.
    pub async fn try_parse(&self, text: &str) -> Result<ParseData, NluError> {
        let url = format!("{}/parse", self.server);
        let mut params: Vec<(&str, &str)> = vec![("q", text)];
        for (key, value) in [
            ("token", &self.token),
            ("model", &self.model),
            ("project", &self.project),
        ] {
            if let Some(value) = value {
                params.push((key, value.as_str()));
            }
        }

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NluError::Status(status.as_u16()));
        }
        let mut data: ParseData = response.json().await?;
        if data.text.is_empty() {
            data.text = text.to_string();
        }
        debug!(intent = ?data.intent_name(), "NLU server parsed message");
        Ok(data)
    }
}

impl Interpreter for HttpInterpreter {
    async fn parse(&self, text: &str) -> ParseData {
        match self.try_parse(text).await {
            Ok(data) => data,
            Err(e) => {
                error!(server = %self.server, error = %e, "Failed to parse text using NLU server");
                ParseData::empty(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_server_rejected() {
        let err = HttpInterpreter::new("", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, NluError::Core(ParleyError::Config(_))));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let interpreter = HttpInterpreter::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(interpreter.server(), "http://localhost:5000");
    }

    #[tokio::test]
    async fn test_unreachable_server_degrades_to_empty_parse() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let interpreter =
            HttpInterpreter::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(interpreter.try_parse("hello").await.is_err());

        let data = interpreter.parse("hello").await;
        assert_eq!(data.text, "hello");
        assert_eq!(data.intent_name(), None);
        assert_eq!(data.intent.confidence, 0.0);
        assert!(data.entities.is_empty());
    }
}
