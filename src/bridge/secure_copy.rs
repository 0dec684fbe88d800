//! Prototype-less snapshots of built-ins, taken before page script runs.
//!
//! A secured reference merges the own-property descriptors of a constructor
//! and of its prototype into a single null-prototype mirror, so consumers
//! resolve `freeze`, `keys`, `forEach` and friends without ever touching the
//! live (page-mutable) objects. A `get` trap keeps `$X.prototype`-style
//! lookups working against a separate descriptor snapshot instead of the
//! real, mutable prototype.

use js_sys::{Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::js;
use crate::error::{BridgeError, Result};

/// Snapshot a built-in into a secured reference.
///
/// Pure: descriptors are copied without reading property values, so no
/// page-installed getter runs during the snapshot. The caller hardens the
/// returned proxy afterwards; the factory leaves it extensible so the
/// hardening pass can pin `toString` on the mirror before freezing it.
pub fn secure_copy(source: &JsValue) -> Result<JsValue> {
    if !(source.is_object() || source.is_function()) {
        return Err(BridgeError::SnapshotFailed("source is not an object".into()));
    }

    let mirror = js::null_proto_object();
    let prototype_view = js::null_proto_object();

    copy_descriptors(source, &mirror, true)?;

    let prototype = js::get(source, "prototype");
    if prototype.is_object() || prototype.is_function() {
        // Instance members become reachable directly on the mirror, while the
        // synthetic `prototype` view preserves `$X.prototype.y` lookups.
        copy_descriptors(&prototype, &mirror, true)?;
        copy_descriptors(&prototype, &prototype_view, false)?;
    }

    let mirror_ref: JsValue = mirror.clone().into();
    let prototype_ref: JsValue = prototype_view.into();
    let get_trap = Closure::wrap(Box::new(
        move |_target: JsValue, prop: JsValue, _receiver: JsValue| -> JsValue {
            if prop.as_string().as_deref() == Some("prototype") {
                return prototype_ref.clone();
            }
            js::get_key(&mirror_ref, &prop)
        },
    )
        as Box<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>);

    let handler = Object::new();
    js::set_trap(&handler, "get", get_trap.as_ref());
    get_trap.forget();

    Ok(js::proxy_with_handler(&mirror.into(), &handler))
}

/// Copy every own-property descriptor of `source` onto `into`.
/// The `prototype` key is dropped when merging constructor members so the
/// real prototype object never leaks through the mirror.
fn copy_descriptors(source: &JsValue, into: &Object, skip_prototype: bool) -> Result<()> {
    let keys = Reflect::own_keys(source)?;
    for key in keys.iter() {
        if skip_prototype && key.as_string().as_deref() == Some("prototype") {
            continue;
        }
        let descriptor =
            Reflect::get_own_property_descriptor(source.unchecked_ref::<Object>(), &key)?;
        if descriptor.is_undefined() {
            continue;
        }
        let _ = Reflect::define_property(into, &key, descriptor.unchecked_ref());
    }
    Ok(())
}

/// The trusted Reflect operations, resolved once through a secured mirror.
/// Proxy traps route every store access through these captured functions so
/// later tampering with the global `Reflect` cannot redirect them.
pub struct SecuredReflect {
    get: Function,
    set: Function,
    delete_property: Function,
    define_property: Function,
    get_own_property_descriptor: Function,
    own_keys: Function,
}

impl SecuredReflect {
    /// Extract the operations from a secured `Reflect` mirror.
    pub fn from_mirror(mirror: &JsValue) -> Result<Self> {
        let pick = |name: &str| -> Result<Function> {
            js::get(mirror, name)
                .dyn_into::<Function>()
                .map_err(|_| BridgeError::SnapshotFailed(format!("Reflect.{name} missing")))
        };
        Ok(Self {
            get: pick("get")?,
            set: pick("set")?,
            delete_property: pick("deleteProperty")?,
            define_property: pick("defineProperty")?,
            get_own_property_descriptor: pick("getOwnPropertyDescriptor")?,
            own_keys: pick("ownKeys")?,
        })
    }

    pub fn get(&self, target: &JsValue, key: &JsValue) -> JsValue {
        self.call2(&self.get, target, key)
    }

    pub fn set(&self, target: &JsValue, key: &JsValue, value: &JsValue) -> bool {
        let args = js_sys::Array::of3(target, key, value);
        js::apply_function(&self.set, &JsValue::UNDEFINED, &args)
            .map(|v| v.is_truthy())
            .unwrap_or(false)
    }

    pub fn delete_property(&self, target: &JsValue, key: &JsValue) -> bool {
        self.call2(&self.delete_property, target, key).is_truthy()
    }

    pub fn define_property(&self, target: &JsValue, key: &JsValue, descriptor: &JsValue) -> bool {
        let args = js_sys::Array::of3(target, key, descriptor);
        js::apply_function(&self.define_property, &JsValue::UNDEFINED, &args)
            .map(|v| v.is_truthy())
            .unwrap_or(false)
    }

    pub fn own_descriptor(&self, target: &JsValue, key: &JsValue) -> JsValue {
        self.call2(&self.get_own_property_descriptor, target, key)
    }

    pub fn own_keys(&self, target: &JsValue) -> js_sys::Array {
        let args = js_sys::Array::of1(target);
        js::apply_function(&self.own_keys, &JsValue::UNDEFINED, &args)
            .ok()
            .and_then(|keys| keys.dyn_into::<js_sys::Array>().ok())
            .unwrap_or_else(js_sys::Array::new)
    }

    fn call2(&self, func: &Function, a: &JsValue, b: &JsValue) -> JsValue {
        let args = js_sys::Array::of2(a, b);
        js::apply_function(func, &JsValue::UNDEFINED, &args).unwrap_or(JsValue::UNDEFINED)
    }
}
