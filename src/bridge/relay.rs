//! Native message relay.
//!
//! Every native call resolves `postMessage` through the secured snapshot of
//! `webkit.messageHandlers` taken at install time. Around the call, the live
//! global path is severed step by step and then restored, so a shadow planted
//! anywhere along `window.webkit.messageHandlers[name].postMessage` never
//! sees the message. JS execution is not preemptible mid-statement, so no
//! synchronous page code can observe the severed state unless the native
//! handler itself re-enters the page, a narrow, accepted edge case.

use js_sys::{Array, Promise, Reflect, TypeError};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::js;
use crate::error::BridgeError;

/// Relay `message` to the native handler registered under `name`.
///
/// Always returns a promise: unavailability of the transport rejects with a
/// `TypeError`, it never throws synchronously. A synchronous throw from the
/// native `postMessage` also surfaces as a rejection; the global is restored
/// first on every path.
pub fn post_native_message(name: &JsValue, message: &JsValue, handlers_snapshot: &JsValue) -> Promise {
    match relay(name, message, handlers_snapshot) {
        Ok(result) => Promise::resolve(&result),
        Err(reason) => Promise::reject(&reason),
    }
}

fn relay(name: &JsValue, message: &JsValue, handlers_snapshot: &JsValue) -> Result<JsValue, JsValue> {
    let window = js::global();

    let webkit = js::get(&window, "webkit");
    if !webkit.is_object() {
        return Err(unavailable());
    }
    let live_handlers = js::get(&webkit, "messageHandlers");
    if !live_handlers.is_object() {
        return Err(unavailable());
    }

    let handler = js::get_key(handlers_snapshot, name);
    if !handler.is_object() {
        return Err(unavailable());
    }

    // Sever every step a hostile script could have monkey-patched. On a real
    // host the native properties are non-configurable and survive; only
    // page-planted shadows are removed. `postMessage` is resolved only after
    // this, so a shadow on the handler itself is gone before the lookup.
    let live_handler = js::get_key(&live_handlers, name);
    if live_handler.is_object() {
        let _ = Reflect::delete_property(
            live_handler.unchecked_ref::<js_sys::Object>(),
            &JsValue::from_str("postMessage"),
        );
    }
    let _ = Reflect::delete_property(live_handlers.unchecked_ref::<js_sys::Object>(), name);
    let _ = Reflect::delete_property(
        webkit.unchecked_ref::<js_sys::Object>(),
        &JsValue::from_str("messageHandlers"),
    );
    let _ = Reflect::delete_property(&window, &JsValue::from_str("webkit"));

    let post_message = js::get(&handler, "postMessage");
    let result = match post_message.dyn_ref::<js_sys::Function>() {
        Some(func) => js::apply_function(func, &handler, &Array::of1(message)),
        None => Err(unavailable()),
    };

    // Restore before surfacing either outcome, including a synchronous throw.
    let _ = Reflect::set(&window, &JsValue::from_str("webkit"), &webkit);

    result
}

fn unavailable() -> JsValue {
    TypeError::new(&BridgeError::TransportUnavailable.to_string()).into()
}
