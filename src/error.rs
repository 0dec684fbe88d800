//! Error types for the user-script bridge
//!
//! The bridge is deliberately quiet toward page script: adversarial paths
//! (refused writes, invalid callbacks, missing transport) surface as sentinel
//! values or rejected promises, never as thrown exceptions that would leak
//! internals through stack traces. These types exist for the embedder-facing
//! side of the crate:
//! - Detailed variants for the failure modes the installer can hit
//! - Error codes for programmatic handling
//! - A typed outcome for the capability store's write path

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wasm_bindgen::JsValue;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Transport errors (1xx)
    TransportUnavailable = 100,

    // Capability store errors (2xx)
    MutationRejected = 200,

    // Callback errors (3xx)
    InvalidCallback = 300,

    // Bootstrap errors (4xx)
    SnapshotFailed = 400,
    GlobalUnavailable = 401,

    // Internal errors (9xx)
    JsError = 900,
}

/// Main error type for the user-script bridge
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    // ===== Transport Errors =====
    #[error("webkit.messageHandlers is not available")]
    TransportUnavailable,

    #[error("no message handler named `{0}`")]
    UnknownHandler(String),

    // ===== Capability Store Errors =====
    #[error("mutation rejected for property `{0}`")]
    MutationRejected(String),

    // ===== Callback Errors =====
    #[error("callback is not a function")]
    InvalidCallback,

    // ===== Bootstrap Errors =====
    #[error("secure copy failed: {0}")]
    SnapshotFailed(String),

    #[error("global object unavailable: {0}")]
    GlobalUnavailable(String),

    // ===== Internal =====
    #[error("javascript error: {0}")]
    Js(String),
}

impl BridgeError {
    /// Error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::TransportUnavailable => ErrorCode::TransportUnavailable,
            BridgeError::UnknownHandler(_) => ErrorCode::TransportUnavailable,
            BridgeError::MutationRejected(_) => ErrorCode::MutationRejected,
            BridgeError::InvalidCallback => ErrorCode::InvalidCallback,
            BridgeError::SnapshotFailed(_) => ErrorCode::SnapshotFailed,
            BridgeError::GlobalUnavailable(_) => ErrorCode::GlobalUnavailable,
            BridgeError::Js(_) => ErrorCode::JsError,
        }
    }

    /// Whether the page-visible reaction is a sentinel value (`false`, a
    /// rejected promise) rather than an exception. Everything the page can
    /// trigger is silent; only bootstrap failures may propagate to the
    /// embedder.
    pub fn is_silent(&self) -> bool {
        !matches!(
            self,
            BridgeError::SnapshotFailed(_) | BridgeError::GlobalUnavailable(_) | BridgeError::Js(_)
        )
    }
}

impl From<JsValue> for BridgeError {
    fn from(value: JsValue) -> Self {
        let text = value
            .as_string()
            .or_else(|| {
                js_sys::Reflect::get(&value, &JsValue::from_str("message"))
                    .ok()
                    .and_then(|m| m.as_string())
            })
            .unwrap_or_else(|| String::from("unknown"));
        BridgeError::Js(text)
    }
}

impl From<BridgeError> for JsValue {
    fn from(err: BridgeError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}
