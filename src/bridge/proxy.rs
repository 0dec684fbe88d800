//! The capability proxy backing the public bridge object.
//!
//! Lookup precedence is a fixed chain: hidden capability map, then baked-in
//! frozen constants on the target, then the mediated `values` store. The
//! hidden map always wins and never shows up in enumeration, so the two
//! capabilities are unshadowable, undeletable and undiscoverable by walking
//! keys. Traps answer with booleans and never throw; strict-mode callers get
//! the language-mandated `TypeError` on a refused write.

use std::rc::Rc;

use js_sys::Object;
use wasm_bindgen::prelude::*;

use super::harden::Hardener;
use super::js;
use super::secure_copy::SecuredReflect;
use crate::error::{BridgeError, Result};

/// Build the proxy over an empty target plus a null-prototype value store.
///
/// `hidden` maps capability names to already-hardened functions. Every store
/// access inside the traps goes through `reflect`, operations captured from
/// the secured `Reflect` mirror, so replacing the global `Reflect` after
/// installation redirects nothing.
pub fn create_capability_proxy(
    hidden: &Object,
    reflect: Rc<SecuredReflect>,
    hardener: Rc<Hardener>,
) -> Result<JsValue> {
    let target = Object::new();
    let values = js::null_proto_object();
    let handler = Object::new();

    // get: hidden capability → frozen constant on target → values store
    {
        let hidden: JsValue = hidden.clone().into();
        let values: JsValue = values.clone().into();
        let reflect = reflect.clone();
        let trap = Closure::wrap(Box::new(
            move |target: JsValue, prop: JsValue, _receiver: JsValue| -> JsValue {
                let capability = reflect.get(&hidden, &prop);
                if !capability.is_undefined() {
                    return capability;
                }
                let descriptor = reflect.own_descriptor(&target, &prop);
                if js::frozen_shaped(&descriptor) {
                    return reflect.get(&target, &prop);
                }
                reflect.get(&values, &prop)
            },
        )
            as Box<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>);
        js::set_trap(&handler, "get", trap.as_ref());
        trap.forget();
    }

    // set: hardened write into the values store, or a refusal
    {
        let hidden: JsValue = hidden.clone().into();
        let values: JsValue = values.clone().into();
        let reflect = reflect.clone();
        let hardener = hardener.clone();
        let trap = Closure::wrap(Box::new(
            move |target: JsValue, prop: JsValue, value: JsValue, _receiver: JsValue| -> bool {
                write_value(&hidden, &values, &reflect, &hardener, &target, &prop, &value).is_ok()
            },
        )
            as Box<dyn FnMut(JsValue, JsValue, JsValue, JsValue) -> bool>);
        js::set_trap(&handler, "set", trap.as_ref());
        trap.forget();
    }

    // defineProperty: frozen-shaped descriptors become baked-in constants on
    // the target; everything else lands in the values store
    {
        let values: JsValue = values.clone().into();
        let reflect = reflect.clone();
        let hardener = hardener.clone();
        let trap = Closure::wrap(Box::new(
            move |target: JsValue, prop: JsValue, descriptor: JsValue| -> bool {
                // An absent `configurable` defaults to false at application
                // time, so it counts as non-configurable here.
                let non_configurable = !js::get(&descriptor, "configurable").is_truthy();
                let has_getter = js::get(&descriptor, "get").is_function();
                let has_setter = js::get(&descriptor, "set").is_function();
                // Permanent write-only trapdoors are never accepted.
                if non_configurable && has_setter && !has_getter {
                    return false;
                }
                let value = js::get(&descriptor, "value");
                if !value.is_undefined() {
                    let hardened = hardener.harden(&value);
                    if !reflect.set(&descriptor, &JsValue::from_str("value"), &hardened) {
                        return false;
                    }
                }
                if js::frozen_shaped(&descriptor) {
                    // Constants never join the enumerable surface.
                    let _ = reflect.set(
                        &descriptor,
                        &JsValue::from_str("enumerable"),
                        &JsValue::FALSE,
                    );
                    return reflect.define_property(&target, &prop, &descriptor);
                }
                if non_configurable {
                    // Anything non-configurable that is not frozen-shaped
                    // cannot be honored from the store without lying to the
                    // language about the target.
                    return false;
                }
                reflect.define_property(&values, &prop, &descriptor)
            },
        )
            as Box<dyn FnMut(JsValue, JsValue, JsValue) -> bool>);
        js::set_trap(&handler, "defineProperty", trap.as_ref());
        trap.forget();
    }

    // deleteProperty: best effort against target and store; hidden names are
    // untouched, which makes deleting them a silent no-op
    {
        let values: JsValue = values.clone().into();
        let reflect = reflect.clone();
        let trap = Closure::wrap(Box::new(move |target: JsValue, prop: JsValue| -> bool {
            let target_gone = reflect.delete_property(&target, &prop);
            let store_gone = reflect.delete_property(&values, &prop);
            target_gone && store_gone
        }) as Box<dyn FnMut(JsValue, JsValue) -> bool>);
        js::set_trap(&handler, "deleteProperty", trap.as_ref());
        trap.forget();
    }

    // getOwnPropertyDescriptor: same precedence as get, minus the hidden map
    {
        let values: JsValue = values.clone().into();
        let reflect = reflect.clone();
        let trap = Closure::wrap(Box::new(move |target: JsValue, prop: JsValue| -> JsValue {
            let descriptor = reflect.own_descriptor(&target, &prop);
            if js::frozen_shaped(&descriptor) {
                return descriptor;
            }
            reflect.own_descriptor(&values, &prop)
        }) as Box<dyn FnMut(JsValue, JsValue) -> JsValue>);
        js::set_trap(&handler, "getOwnPropertyDescriptor", trap.as_ref());
        trap.forget();
    }

    // ownKeys: the target only; the store and the hidden map never enumerate
    {
        let reflect = reflect.clone();
        let trap = Closure::wrap(Box::new(move |target: JsValue| -> js_sys::Array {
            reflect.own_keys(&target)
        }) as Box<dyn FnMut(JsValue) -> js_sys::Array>);
        js::set_trap(&handler, "ownKeys", trap.as_ref());
        trap.forget();
    }

    // preventExtensions: refused. The target must stay extensible or the
    // constant path and the store's descriptor reporting stop being
    // honorable answers to the language.
    {
        let trap = Closure::wrap(
            Box::new(move |_target: JsValue| -> bool { false }) as Box<dyn FnMut(JsValue) -> bool>,
        );
        js::set_trap(&handler, "preventExtensions", trap.as_ref());
        trap.forget();
    }

    Ok(js::proxy_with_handler(&target.into(), &handler))
}

/// The store's write path. Returns `MutationRejected` instead of relying on
/// a bare boolean, so refusals carry the property name for diagnostics; the
/// `set` trap collapses the outcome back to the boolean the language wants.
fn write_value(
    hidden: &JsValue,
    values: &JsValue,
    reflect: &SecuredReflect,
    hardener: &Hardener,
    target: &JsValue,
    prop: &JsValue,
    value: &JsValue,
) -> Result<()> {
    let rejected = || {
        BridgeError::MutationRejected(prop.as_string().unwrap_or_else(|| String::from("<symbol>")))
    };

    if !reflect.get(hidden, prop).is_undefined() {
        return Err(rejected());
    }
    let descriptor = reflect.own_descriptor(target, prop);
    if js::frozen_shaped(&descriptor) {
        return Err(rejected());
    }
    let hardened = hardener.harden(value);
    if reflect.set(values, prop, &hardened) {
        Ok(())
    } else {
        Err(rejected())
    }
}
