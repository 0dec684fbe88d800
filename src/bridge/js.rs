//! Reflect/Proxy utility wrappers for building the hardened bridge surface.
//!
//! All closures installed via these helpers are WASM-compiled functions.
//! When page scripts call `.toString()` on them, browsers return
//! `"function() { [native code] }"` automatically, with nothing to spoof.

use js_sys::{Function, Object, Proxy, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// The global object (`window` in a page context).
pub fn global() -> Object {
    js_sys::global()
}

/// Get a property from the global scope.
pub fn get_global(prop: &str) -> JsValue {
    Reflect::get(&global(), &JsValue::from_str(prop)).unwrap_or(JsValue::UNDEFINED)
}

/// `target[prop]`, swallowing the (host-object) failure case.
pub fn get(target: &JsValue, prop: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(prop)).unwrap_or(JsValue::UNDEFINED)
}

/// `target[key]` with an arbitrary (possibly symbol) key.
pub fn get_key(target: &JsValue, key: &JsValue) -> JsValue {
    Reflect::get(target, key).unwrap_or(JsValue::UNDEFINED)
}

/// A fresh null-prototype object with nothing reachable through its chain.
pub fn null_proto_object() -> Object {
    Object::create(JsValue::NULL.unchecked_ref::<Object>())
}

/// Build `{ value, writable, enumerable, configurable }`.
pub fn data_descriptor(value: &JsValue, writable: bool, enumerable: bool, configurable: bool) -> Object {
    let descriptor = Object::new();
    let _ = Reflect::set(&descriptor, &JsValue::from_str("value"), value);
    let _ = Reflect::set(
        &descriptor,
        &JsValue::from_str("writable"),
        &JsValue::from_bool(writable),
    );
    let _ = Reflect::set(
        &descriptor,
        &JsValue::from_str("enumerable"),
        &JsValue::from_bool(enumerable),
    );
    let _ = Reflect::set(
        &descriptor,
        &JsValue::from_str("configurable"),
        &JsValue::from_bool(configurable),
    );
    descriptor
}

/// Whether a property descriptor object is frozen-shaped:
/// `configurable === false && writable === false`.
pub fn frozen_shaped(descriptor: &JsValue) -> bool {
    if !descriptor.is_object() {
        return false;
    }
    let configurable = get(descriptor, "configurable") == JsValue::FALSE;
    let writable = get(descriptor, "writable") == JsValue::FALSE;
    configurable && writable
}

/// Own-property descriptor, or `undefined`.
pub fn own_descriptor(target: &JsValue, key: &JsValue) -> JsValue {
    if !(target.is_object() || target.is_function()) {
        return JsValue::UNDEFINED;
    }
    Reflect::get_own_property_descriptor(target.unchecked_ref::<Object>(), key).unwrap_or(JsValue::UNDEFINED)
}

/// Construct a `Proxy` from a prebuilt handler object.
pub fn proxy_with_handler(target: &JsValue, handler: &Object) -> JsValue {
    Proxy::new(target, handler).into()
}

/// Install a trap function on a proxy handler object.
/// The closure is leaked: the proxy lives for the rest of the page's life.
pub fn set_trap(handler: &Object, name: &str, trap: &JsValue) {
    let _ = Reflect::set(handler, &JsValue::from_str(name), trap);
}

/// Call a captured JS function with an explicit `this` via Reflect.apply,
/// bypassing any `call`/`apply` shadowing on the function itself.
pub fn apply_function(
    func: &Function,
    this_arg: &JsValue,
    args: &js_sys::Array,
) -> Result<JsValue, JsValue> {
    Reflect::apply(func, this_arg, args)
}

/// Cast a value to `&Function`, or `None` when it is not callable.
pub fn as_function(value: &JsValue) -> Option<&Function> {
    value.dyn_ref::<Function>()
}
