//! Whole-graph freezing, dispatched by runtime shape.
//!
//! Walks arrays, sets, maps, functions and generic objects, hardening every
//! reachable behavioral surface. Accessor pairs are hardened through their
//! descriptors, never invoked: running a page-supplied getter mid-walk could
//! fire side effects or hand back a spoofed value. An identity-keyed visited
//! set terminates the walk on cyclic graphs.

use js_sys::{Array, Object, Reflect, Set};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::harden::Hardener;
use super::js;

/// Recursively freeze and harden `root`. `exceptions` lists constructor
/// names whose instances are frozen but keep their own `toString`/`call`
/// behavior (classes the embedder still needs to stringify normally).
pub fn extensive_freeze(root: &JsValue, exceptions: &[String], hardener: &Hardener) -> JsValue {
    let visited = Set::new(&JsValue::UNDEFINED);
    freeze_value(root, exceptions, hardener, &visited);
    root.clone()
}

fn freeze_value(value: &JsValue, exceptions: &[String], hardener: &Hardener, visited: &Set) {
    if !(value.is_object() || value.is_function()) {
        // number | string | boolean | null | undefined: nothing to pin
        return;
    }
    if visited.has(value) {
        return;
    }
    visited.add(value);

    // Freezing the universal prototypes would break the whole page.
    if hardener.is_universal_prototype(value) {
        return;
    }
    // Typed arrays are opaque binary data with no behavioral surface.
    if js_sys::ArrayBuffer::is_view(value) {
        return;
    }

    if value.is_function() {
        hardener.harden(value);
        return;
    }

    if Array::is_array(value) {
        let array: &Array = value.unchecked_ref();
        for index in 0..array.length() {
            freeze_value(&array.get(index), exceptions, hardener, visited);
        }
        finish_container(value, exceptions, hardener);
        return;
    }

    if value.dyn_ref::<Set>().is_some() {
        if let Ok(Some(items)) = js_sys::try_iter(value) {
            for item in items.flatten() {
                freeze_value(&item, exceptions, hardener, visited);
            }
        }
        finish_container(value, exceptions, hardener);
        return;
    }

    if let Some(map) = value.dyn_ref::<js_sys::Map>() {
        // Values only; keys stay untouched so map lookups keep working.
        let values_iter: JsValue = map.values().into();
        if let Ok(Some(items)) = js_sys::try_iter(&values_iter) {
            for item in items.flatten() {
                freeze_value(&item, exceptions, hardener, visited);
            }
        }
        finish_container(value, exceptions, hardener);
        return;
    }

    freeze_generic_object(value, exceptions, hardener, visited);
}

/// Generic objects: walk the prototype chain, recurse into enumerable own
/// data values, then lock every own descriptor in place, hardening accessor
/// functions without calling them.
fn freeze_generic_object(value: &JsValue, exceptions: &[String], hardener: &Hardener, visited: &Set) {
    if let Ok(prototype) = Reflect::get_prototype_of(value) {
        if !prototype.is_null() && !hardener.is_universal_prototype(&prototype) {
            freeze_value(&prototype, exceptions, hardener, visited);
        }
    }

    let target: &Object = value.unchecked_ref();
    let names = Object::get_own_property_names(target);
    for name in names.iter() {
        let descriptor = js::own_descriptor(value, &name);
        if descriptor.is_undefined() {
            continue;
        }

        let getter = js::get(&descriptor, "get");
        let setter = js::get(&descriptor, "set");
        if getter.is_function() || setter.is_function() {
            if getter.is_function() {
                hardener.harden(&getter);
            }
            if setter.is_function() {
                hardener.harden(&setter);
            }
            let locked = Object::new();
            let _ = Reflect::set(&locked, &JsValue::from_str("get"), &getter);
            let _ = Reflect::set(&locked, &JsValue::from_str("set"), &setter);
            let _ = Reflect::set(&locked, &JsValue::from_str("enumerable"), &JsValue::FALSE);
            let _ = Reflect::set(&locked, &JsValue::from_str("configurable"), &JsValue::FALSE);
            let _ = Reflect::define_property(target, &name, &locked);
            continue;
        }

        let data = js::get(&descriptor, "value");
        if js::get(&descriptor, "enumerable").is_truthy() {
            freeze_value(&data, exceptions, hardener, visited);
        }
        let locked = js::data_descriptor(&data, false, false, false);
        let _ = Reflect::define_property(target, &name, &locked);
    }

    finish_object(value, exceptions, hardener);
}

/// Arrays, sets and maps get the full hardening treatment unless excepted.
fn finish_container(value: &JsValue, exceptions: &[String], hardener: &Hardener) {
    if is_excepted(value, exceptions) {
        Object::freeze(value.unchecked_ref::<Object>());
    } else {
        hardener.harden(value);
    }
}

/// Plain data bags are frozen without the `$` overrides: they carry no
/// executable surface worth masking. Class instances are hardened like
/// containers.
fn finish_object(value: &JsValue, exceptions: &[String], hardener: &Hardener) {
    if is_excepted(value, exceptions) || hardener.is_bare_object_instance(value) {
        Object::freeze(value.unchecked_ref::<Object>());
    } else {
        hardener.harden(value);
    }
}

fn is_excepted(value: &JsValue, exceptions: &[String]) -> bool {
    if exceptions.is_empty() {
        return false;
    }
    constructor_name(value)
        .map(|name| exceptions.iter().any(|exception| *exception == name))
        .unwrap_or(false)
}

fn constructor_name(value: &JsValue) -> Option<String> {
    let constructor = js::get(value, "constructor");
    let func = constructor.dyn_ref::<js_sys::Function>()?;
    Some(String::from(func.name()))
}
