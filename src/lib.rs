//! # User-Script Bridge (WASM)
//!
//! A tamper-resistant user-script bridge compiled to WebAssembly.
//!
//! Injected into a page before any page script runs, the module installs a
//! single hardened global (`window.__firefox__`) through which trusted
//! user-script modules register one-time or repeated setup code and relay
//! messages to the native host, even when the page later tries to intercept,
//! spoof, or corrupt the bridge.
//!
//! ## Architecture
//!
//! ```text
//! Installer (WASM)
//!   ↓
//! Secure Copies ($Object / $Function / $Reflect / $Array / $MessageHandlers)
//!   ↓
//! Hardening Combinator ($) + Deep / Extensive Freeze
//!   ↓
//! Capability Proxy (includeOnce / execute, hidden + unshadowable)
//!   ↓
//! window.__firefox__
//! ```
//!
//! ## Properties
//!
//! - **Native `toString()`**: every installed function is a WASM closure, so
//!   probing `.toString()` yields `[native code]` with nothing to spoof
//! - **Empty enumeration**: `Object.keys`, `for...in` and `JSON.stringify`
//!   of the bridge reveal nothing; capabilities must be requested by name
//! - **Mediated writes**: everything placed on the bridge is frozen and
//!   `toString`/`call`/`apply`/`bind`-pinned before it becomes reachable
//! - **Severed relay**: native messages resolve through install-time
//!   snapshots while the live `window.webkit` path is cut and restored

use wasm_bindgen::prelude::*;

// Modules
pub mod bridge;
mod error;

pub use bridge::{
    check_bridge_status, install_user_script_bridge, BridgeConfig, InstallOutcome, GLOBAL_NAME,
};
pub use error::{BridgeError, ErrorCode, Result};

/// Initialize the bridge module.
///
/// This sets up logging; installation itself is an explicit call so the
/// embedder controls exactly when the page's built-ins are snapshotted.
#[wasm_bindgen(start)]
pub fn init() {
    // Quiet by default: the bridge never narrates where page script could
    // correlate timing, and warnings only fire on preflight failures.
    let _ = console_log::init_with_level(log::Level::Warn);

    log::debug!("user-script bridge module loaded");
}
