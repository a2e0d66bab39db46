use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RelayError;
use crate::models::Verdict;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub original_text: String,
}

/// The external classification service. It only ever sees text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, RelayError>;
}

#[derive(Debug, Serialize)]
struct ServiceRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    decision: Option<Verdict>,
    original_text: Option<String>,
}

/// POSTs `{ "text": ... }` to the configured endpoint and expects
/// `{ "decision": 0|1, "original_text": ... }` back.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, RelayError> {
        Self::new(settings.endpoint.clone(), settings.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> RelayError {
        if err.is_timeout() {
            RelayError::Timeout(self.timeout)
        } else {
            RelayError::Http(err)
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, RelayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ServiceRequest { text })
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.map_send_error(err))?;
        parse_response(&body)
    }
}

fn parse_response(body: &str) -> Result<Classification, RelayError> {
    let parsed: ServiceResponse = serde_json::from_str(body)
        .map_err(|err| RelayError::MalformedResponse(err.to_string()))?;

    match parsed {
        ServiceResponse {
            decision: Some(verdict),
            original_text: Some(original_text),
        } => Ok(Classification {
            verdict,
            original_text,
        }),
        ServiceResponse { decision: None, .. } => {
            Err(RelayError::MalformedResponse("missing field `decision`".into()))
        }
        ServiceResponse { original_text: None, .. } => Err(RelayError::MalformedResponse(
            "missing field `original_text`".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_body() {
        let parsed = parse_response(r#"{ "decision": 1, "original_text": "Buy now!!" }"#).unwrap();
        assert_eq!(
            parsed,
            Classification {
                verdict: Verdict::Highlight,
                original_text: "Buy now!!".into()
            }
        );
    }

    #[test]
    fn missing_fields_are_malformed() {
        for body in [
            r#"{ "original_text": "x" }"#,
            r#"{ "decision": 0 }"#,
            r#"{ "decision": 7, "original_text": "x" }"#,
            "<html>oops</html>",
        ] {
            assert!(
                matches!(parse_response(body), Err(RelayError::MalformedResponse(_))),
                "body {body} should be rejected"
            );
        }
    }
}
