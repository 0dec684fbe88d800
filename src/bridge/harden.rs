//! The hardening combinator (`$`) and its one-hop deep freeze.
//!
//! Hardening a value pins the reflection surface a hostile page would spoof:
//! `toString` always, and for functions `call`/`apply`/`bind`, all replaced by
//! non-configurable data properties whose values were captured from the live
//! built-ins before any page script ran. The value is then frozen in place.

use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::js;
use crate::error::{BridgeError, Result};

/// What a hardened function's `toString()` reports, matching the host's own
/// rendering of native functions.
pub const MASKED_FUNCTION_SOURCE: &str = "function() {\n    [native code]\n}";

/// What a hardened plain object's `toString()` reports.
pub const MASKED_OBJECT_SOURCE: &str = "[object Object]";

/// Originals captured from the still-live globals at install time.
///
/// Construction must happen before page script runs; afterwards the captured
/// references are the only trusted path to these functions.
pub struct Hardener {
    fn_call: Function,
    fn_apply: Function,
    fn_bind: Function,
    object_ctor: JsValue,
    object_prototype: JsValue,
    function_prototype: JsValue,
    obj_proto_to_string: JsValue,
    // Object.toString resolves to Function.prototype.toString through the
    // chain, so this single capture also identifies the native function
    // stringifier in the custom-toString test below.
    obj_ctor_to_string: JsValue,
    // Values currently being hardened. Custom `toString` chains can point
    // back at a value that is still extensible mid-pass; the identity check
    // breaks the cycle.
    in_progress: js_sys::Set,
}

impl Hardener {
    pub fn capture() -> Result<Self> {
        let global = js::global();
        let object_ctor = Reflect::get(&global, &JsValue::from_str("Object"))?;
        let function_ctor = Reflect::get(&global, &JsValue::from_str("Function"))?;
        if !object_ctor.is_function() || !function_ctor.is_function() {
            return Err(BridgeError::GlobalUnavailable("Object/Function".into()));
        }

        let object_prototype = js::get(&object_ctor, "prototype");
        let function_prototype = js::get(&function_ctor, "prototype");

        let fn_call: Function = js::get(&function_prototype, "call").dyn_into()?;
        let fn_apply: Function = js::get(&function_prototype, "apply").dyn_into()?;
        let fn_bind: Function = js::get(&function_prototype, "bind").dyn_into()?;
        let obj_proto_to_string = js::get(&object_prototype, "toString");
        let obj_ctor_to_string = js::get(&object_ctor, "toString");

        Ok(Self {
            fn_call,
            fn_apply,
            fn_bind,
            object_ctor,
            object_prototype,
            function_prototype,
            obj_proto_to_string,
            obj_ctor_to_string,
            in_progress: js_sys::Set::new(&JsValue::UNDEFINED),
        })
    }

    /// The `$` combinator. Pins `toString` (and `call`/`apply`/`bind` for
    /// functions), then freezes the value and its prototype. Returns the same
    /// reference; values that are not extensible objects pass through
    /// untouched, which also makes repeated hardening a no-op.
    pub fn harden(&self, value: &JsValue) -> JsValue {
        if !(value.is_object() || value.is_function()) {
            return value.clone();
        }
        let target: &Object = value.unchecked_ref();
        if !Object::is_extensible(target) {
            return value.clone();
        }
        if self.in_progress.has(value) {
            return value.clone();
        }
        self.in_progress.add(value);

        let mut overrides: Vec<(&str, JsValue)> = Vec::with_capacity(4);
        overrides.push(("toString", self.to_string_override(value)));
        if value.is_function() {
            overrides.push(("call", self.fn_call.clone().into()));
            overrides.push(("apply", self.fn_apply.clone().into()));
            overrides.push(("bind", self.fn_bind.clone().into()));
        }

        for (key, replacement) in overrides {
            let key_js = JsValue::from_str(key);
            let current = js::own_descriptor(value, &key_js);
            let permitted = current.is_undefined()
                || js::get(&current, "configurable").is_truthy();
            if permitted {
                let descriptor = js::data_descriptor(&replacement, false, false, false);
                let _ = Reflect::define_property(target, &key_js, &descriptor);
            }
            self.deep_freeze(&replacement);
        }

        let frozen = self.deep_freeze(value);
        self.in_progress.delete(value);
        frozen
    }

    /// Freeze a value and its `prototype`, one hop only. Falsy input passes
    /// through unchanged; full-graph freezing lives in `extensive_freeze`.
    pub fn deep_freeze(&self, value: &JsValue) -> JsValue {
        if value.is_falsy() {
            return value.clone();
        }
        if value.is_object() || value.is_function() {
            Object::freeze(value.unchecked_ref::<Object>());
            let prototype = js::get(value, "prototype");
            if prototype.is_object() || prototype.is_function() {
                Object::freeze(prototype.unchecked_ref::<Object>());
            }
        }
        value.clone()
    }

    /// Pick the `toString` that a hardened value will carry: a legitimate
    /// custom stringifier is kept (hardened in place), anything else is
    /// masked behind a constant indistinguishable from a native function.
    fn to_string_override(&self, value: &JsValue) -> JsValue {
        let existing = js::get(value, "toString");
        let custom = existing.is_function()
            && existing != self.obj_proto_to_string
            && existing != self.obj_ctor_to_string;
        if custom {
            return self.harden(&existing);
        }
        masked_to_string(value.is_function())
    }

    /// Call a function through the captured `Function.prototype.call`-family
    /// machinery, immune to shadowed `call`/`apply` on the callee.
    pub fn invoke(&self, func: &Function, this_arg: &JsValue, args: &Array) -> std::result::Result<JsValue, JsValue> {
        js::apply_function(func, this_arg, args)
    }

    pub fn is_bare_object_instance(&self, value: &JsValue) -> bool {
        js::get(value, "constructor") == self.object_ctor
    }

    pub fn is_universal_prototype(&self, value: &JsValue) -> bool {
        *value == self.object_prototype || *value == self.function_prototype
    }
}

/// A WASM closure returning a constant source string. The closure itself
/// stringifies as `[native code]`, so even `toString.toString()` probing
/// sees a native function.
fn masked_to_string(is_function: bool) -> JsValue {
    let constant = if is_function {
        MASKED_FUNCTION_SOURCE
    } else {
        MASKED_OBJECT_SOURCE
    };
    let closure = Closure::wrap(
        Box::new(move || JsValue::from_str(constant)) as Box<dyn FnMut() -> JsValue>
    );
    let func = closure.as_ref().clone();
    closure.forget();
    func
}
