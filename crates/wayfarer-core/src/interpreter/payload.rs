//! Typed payload shapes, one per action.
//!
//! Raw step payloads stay `serde_json::Value` until they cross the
//! interpreter boundary; here they are deserialized into the shape the
//! action owns. A malformed or incomplete payload fails the step with
//! `InvalidPayload` instead of propagating missing fields downstream.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::StepError;
use crate::types::{ActionKind, Step};

/// Deserialize a payload for `action`, mapping any defect to
/// [`StepError::InvalidPayload`]. An absent payload is treated as an empty
/// map so actions with all-optional fields still parse.
pub(crate) fn parse<T: DeserializeOwned>(action: ActionKind, payload: &Value) -> Result<T, StepError> {
    let value = if payload.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        payload.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| StepError::invalid_payload(action.as_str(), e.to_string()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigatePayload {
    pub url: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickPayload {
    #[serde(default)]
    pub selector: Option<String>,
    /// Free-text fallback when no selector is given or it does not resolve.
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypePayload {
    pub selector: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractPayload {
    pub selector: String,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub multiple: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitPayload {
    /// Fixed delay in milliseconds.
    #[serde(default)]
    pub ms: Option<u64>,
    /// Wait until this selector resolves instead of a fixed delay.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchPayload {
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapePayload {
    pub selector: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParsePayload {
    /// Cap on extracted postings for the generic fallback.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopPayload {
    /// Container selector; one iteration per match.
    pub selector: String,
    /// Click each container before running substeps (open a card).
    #[serde(default)]
    pub open: bool,
    /// Scroll each container into view first.
    #[serde(default)]
    pub scroll: bool,
    /// Stop after this many containers.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Steps run once per container. Selectors prefixed with `$this` are
    /// scoped to the current container.
    pub substeps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPayload {
    pub selector: String,
    /// Exact substring the element's text must contain.
    #[serde(default)]
    pub contains: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitPayload {
    #[serde(default)]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApplyPayload {}
