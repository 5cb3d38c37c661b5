//! Request paths and JSON bodies of the lease authority.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use editlock_core::{DocumentId, Holder};

use crate::error::TransportError;

/// `documents/{id}` with the id escaped as one path segment.
fn document_path(document: &DocumentId) -> String {
    format!("documents/{}", urlencoding::encode(document.as_str()))
}

pub fn lock_path(document: &DocumentId) -> String {
    format!("{}/lock", document_path(document))
}

pub fn heartbeat_path(document: &DocumentId) -> String {
    format!("{}/lock/heartbeat", document_path(document))
}

pub fn force_take_path(document: &DocumentId) -> String {
    format!("{}/lock/force-take", document_path(document))
}

pub fn content_path(document: &DocumentId) -> String {
    format!("{}/content", document_path(document))
}

/// Body of `POST /lock`, `POST /lock/force-take` and `GET /lock`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LockBody {
    #[serde(default)]
    pub holder: Option<Holder>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveRequest<'a> {
    pub content: &'a str,
    pub version_token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaveResponse {
    pub version_token: u64,
}

/// Decode a reply body; a missing body decodes from `null`.
pub fn decode<T: DeserializeOwned>(body: Option<Value>) -> Result<T, TransportError> {
    Ok(serde_json::from_value(body.unwrap_or(Value::Null))?)
}
