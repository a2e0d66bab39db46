//! Messages exchanged between the observer and the relay.
//!
//! The JSON shape matches what a browser extension passes between its content
//! script and background script, so the same types can back a real
//! cross-context transport.

use serde::{Deserialize, Serialize};

use crate::error::ObserverError;
use crate::models::{Decision, PostId, Verdict};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Message {
    #[serde(rename = "classify")]
    Classify(ClassificationRequest),
    #[serde(rename = "classificationResult")]
    ClassificationResult(ResultMessage),
}

impl Message {
    pub fn action(&self) -> &'static str {
        match self {
            Message::Classify(_) => "classify",
            Message::ClassificationResult(_) => "classificationResult",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub text: String,
    #[serde(rename = "postId")]
    pub post_id: PostId,
}

impl ClassificationRequest {
    pub fn new(post_id: PostId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            post_id,
        }
    }
}

/// Result (or error) for one request. Either `result_data` or `error` is set;
/// the post id travels inside `result_data` on success and at the top level
/// on error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_data: Option<ResultData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(rename = "postId", default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
}

/// What a result message means for the tracked post.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Decided(Decision),
    Failed(String),
}

impl ResultMessage {
    pub fn success(post_id: PostId, verdict: Verdict, original_text: impl Into<String>) -> Self {
        Self {
            result_data: Some(ResultData {
                decision: Some(verdict),
                original_text: Some(original_text.into()),
                post_id: Some(post_id),
            }),
            error: None,
            post_id: None,
        }
    }

    pub fn failure(post_id: PostId, error: impl Into<String>) -> Self {
        Self {
            result_data: None,
            error: Some(error.into()),
            post_id: Some(post_id),
        }
    }

    pub fn correlation_id(&self) -> Option<&PostId> {
        let usable = |id: &&PostId| !id.is_empty();
        self.result_data
            .as_ref()
            .and_then(|data| data.post_id.as_ref())
            .filter(usable)
            .or_else(|| self.post_id.as_ref().filter(usable))
    }

    /// Splits the message into its post id and outcome. An error field wins
    /// over result data.
    pub fn into_outcome(self) -> Result<(PostId, Outcome), ObserverError> {
        let post_id = self
            .correlation_id()
            .cloned()
            .ok_or(ObserverError::ProtocolViolation)?;

        if let Some(error) = self.error {
            return Ok((post_id, Outcome::Failed(error)));
        }

        match self.result_data {
            Some(ResultData {
                decision: Some(verdict),
                original_text,
                ..
            }) => {
                let decision = Decision::new(verdict, original_text.unwrap_or_default());
                Ok((post_id, Outcome::Decided(decision)))
            }
            _ => Err(ObserverError::InvalidResult(post_id)),
        }
    }
}
