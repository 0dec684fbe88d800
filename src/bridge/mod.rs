//! Tamper-resistant user-script bridge.
//!
//! Installs a single global entry point (`window.__firefox__`) through which
//! trusted user-script modules run privileged setup code and relay messages
//! to the native host. The bridge snapshots the built-ins it depends on
//! before any page script runs, hardens everything reachable from the public
//! surface, and hides its two capabilities behind a proxy that enumerates as
//! empty.
//!
//! ## Usage
//!
//! ```javascript
//! import init, { install_user_script_bridge } from './pkg/userscript_bridge_wasm.js';
//! await init();
//! install_user_script_bridge();                  // full install
//! install_user_script_bridge({ relay: false });  // without the native relay
//! ```
//!
//! Registered modules receive the secured primitives as arguments:
//!
//! ```javascript
//! window.__firefox__.includeOnce("MyScript", function($, $Object) {
//!   $.postNativeMessage("myHandler", { origin: $.windowOrigin });
//! });
//! ```

use std::rc::Rc;

use js_sys::{Array, Object, Promise, Reflect};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

pub mod freeze;
pub mod harden;
pub mod js;
pub mod proxy;
pub mod relay;
pub mod secure_copy;

use crate::error::{BridgeError, Result};
use harden::Hardener;
use secure_copy::{secure_copy, SecuredReflect};

/// Name of the public global. Existing user-script corpora address the
/// bridge by this name, so it is not configurable.
pub const GLOBAL_NAME: &str = "__firefox__";

/// Configuration for the installer. Everything is enabled by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Verify the built-ins still stringify as native before snapshotting.
    pub preflight: bool,
    /// Install `$.postNativeMessage` (the native message relay).
    pub relay: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            preflight: true,
            relay: true,
        }
    }
}

/// What an installation attempt did.
#[derive(Debug, Clone, Copy)]
pub struct InstallOutcome {
    pub installed: bool,
    pub already_installed: bool,
    pub preflight_ok: bool,
}

/// Install the bridge. Runs the whole sequence exactly once per page; a
/// second call observes the existing global and does nothing.
///
/// Returns `{ installed, alreadyInstalled, preflightOk }`.
#[wasm_bindgen]
pub fn install_user_script_bridge(options: JsValue) -> std::result::Result<JsValue, JsValue> {
    let config: BridgeConfig = if options.is_undefined() || options.is_null() {
        BridgeConfig::default()
    } else {
        serde_wasm_bindgen::from_value(options).unwrap_or_default()
    };

    let outcome = install(&config).map_err(JsValue::from)?;
    let result = Object::new();
    Reflect::set(
        &result,
        &JsValue::from_str("installed"),
        &JsValue::from_bool(outcome.installed),
    )?;
    Reflect::set(
        &result,
        &JsValue::from_str("alreadyInstalled"),
        &JsValue::from_bool(outcome.already_installed),
    )?;
    Reflect::set(
        &result,
        &JsValue::from_str("preflightOk"),
        &JsValue::from_bool(outcome.preflight_ok),
    )?;
    Ok(result.into())
}

/// Verify bridge status. Embedder-side diagnostics only.
#[wasm_bindgen]
pub fn check_bridge_status() -> JsValue {
    let status = Object::new();

    let probe = |key: &str, script: &str| {
        let value = js_sys::eval(script).unwrap_or(JsValue::FALSE);
        let _ = Reflect::set(
            &status,
            &JsValue::from_str(key),
            &JsValue::from_bool(value.is_truthy()),
        );
    };

    probe(
        "present",
        "typeof window.__firefox__ !== 'undefined' && window.__firefox__ !== null",
    );
    probe(
        "unenumerable",
        "window.__firefox__ ? Object.keys(window.__firefox__).length === 0 : false",
    );
    probe(
        "capabilities",
        "window.__firefox__ ? typeof window.__firefox__.includeOnce === 'function' \
         && typeof window.__firefox__.execute === 'function' : false",
    );
    probe(
        "masked",
        "window.__firefox__ && window.__firefox__.execute ? \
         window.__firefox__.execute.toString().includes('[native code]') : false",
    );
    probe(
        "pinned",
        "(function() { if (!window.__firefox__) return false; \
         var before = window.__firefox__; \
         try { window.__firefox__ = {}; } catch (e) {} \
         return window.__firefox__ === before; })()",
    );

    status.into()
}

/// The top-level installation sequence.
pub fn install(config: &BridgeConfig) -> Result<InstallOutcome> {
    let window = js::global();

    if js::get(&window, GLOBAL_NAME).is_truthy() {
        return Ok(InstallOutcome {
            installed: false,
            already_installed: true,
            preflight_ok: true,
        });
    }

    let preflight_ok = if config.preflight {
        preflight_builtins()
    } else {
        true
    };

    // Snapshots of the live built-ins. Ordering is the foundational trust
    // assumption: the embedder injects this module before any page script.
    let secured_object = secure_copy(&js::get_global("Object"))?;
    let secured_function = secure_copy(&js::get_global("Function"))?;
    let secured_reflect = secure_copy(&js::get_global("Reflect"))?;
    let secured_array = secure_copy(&js::get_global("Array"))?;
    let secured_handlers = secure_message_handlers()?;

    let hardener = Rc::new(Hardener::capture()?);
    let reflect = Rc::new(SecuredReflect::from_mirror(&secured_reflect)?);

    let dollar = build_dollar(&hardener, &secured_handlers, config)?;

    hardener.harden(&secured_object);
    hardener.harden(&secured_function);
    hardener.harden(&secured_reflect);
    hardener.harden(&secured_array);
    hardener.harden(&secured_handlers);

    let hidden = build_capabilities(
        &hardener,
        &dollar,
        &secured_object,
        &secured_function,
        &secured_array,
    )?;

    let bridge = proxy::create_capability_proxy(&hidden, reflect, hardener)?;

    let descriptor = js::data_descriptor(&bridge, false, false, false);
    Reflect::define_property(&window, &JsValue::from_str(GLOBAL_NAME), &descriptor)
        .map_err(BridgeError::from)?;

    log::debug!("user-script bridge installed");
    Ok(InstallOutcome {
        installed: true,
        already_installed: false,
        preflight_ok,
    })
}

/// Snapshot `window.webkit.messageHandlers`, or an empty secured namespace
/// when the transport is absent at injection time (the relay then rejects
/// every call, which is the documented unavailable-transport behavior).
fn secure_message_handlers() -> Result<JsValue> {
    let webkit = js::get_global("webkit");
    if webkit.is_object() {
        let handlers = js::get(&webkit, "messageHandlers");
        if handlers.is_object() {
            return secure_copy(&handlers);
        }
    }
    secure_copy(&js::null_proto_object().into())
}

/// Build the `$` function object handed to every registered module: the
/// hardening combinator itself, carrying its helpers as hardened properties.
fn build_dollar(
    hardener: &Rc<Hardener>,
    handlers_snapshot: &JsValue,
    config: &BridgeConfig,
) -> Result<JsValue> {
    let combinator = {
        let hardener = hardener.clone();
        let closure = Closure::wrap(
            Box::new(move |value: JsValue| hardener.harden(&value))
                as Box<dyn FnMut(JsValue) -> JsValue>,
        );
        let func = closure.as_ref().clone();
        closure.forget();
        func
    };

    let deep_freeze = {
        let hardener = hardener.clone();
        let closure = Closure::wrap(
            Box::new(move |value: JsValue| hardener.deep_freeze(&value))
                as Box<dyn FnMut(JsValue) -> JsValue>,
        );
        let func = closure.as_ref().clone();
        closure.forget();
        func
    };
    hardener.harden(&deep_freeze);
    Reflect::set(&combinator, &JsValue::from_str("deepFreeze"), &deep_freeze)?;

    let extensive_freeze = {
        let hardener = hardener.clone();
        let closure = Closure::wrap(Box::new(move |value: JsValue, exceptions: JsValue| {
            let names = exception_names(&exceptions);
            freeze::extensive_freeze(&value, &names, &hardener)
        })
            as Box<dyn FnMut(JsValue, JsValue) -> JsValue>);
        let func = closure.as_ref().clone();
        closure.forget();
        func
    };
    hardener.harden(&extensive_freeze);
    Reflect::set(
        &combinator,
        &JsValue::from_str("extensiveFreeze"),
        &extensive_freeze,
    )?;

    if config.relay {
        let post_native_message = {
            let snapshot = handlers_snapshot.clone();
            let closure = Closure::wrap(Box::new(move |name: JsValue, message: JsValue| {
                relay::post_native_message(&name, &message, &snapshot)
            })
                as Box<dyn FnMut(JsValue, JsValue) -> Promise>);
            let func = closure.as_ref().clone();
            closure.forget();
            func
        };
        hardener.harden(&post_native_message);
        Reflect::set(
            &combinator,
            &JsValue::from_str("postNativeMessage"),
            &post_native_message,
        )?;
    }

    Reflect::set(
        &combinator,
        &JsValue::from_str("windowOrigin"),
        &JsValue::from_str(&window_origin()),
    )?;

    hardener.harden(&combinator);
    Ok(combinator)
}

/// Build the hidden capability map: `includeOnce` and `execute`.
fn build_capabilities(
    hardener: &Rc<Hardener>,
    dollar: &JsValue,
    secured_object: &JsValue,
    secured_function: &JsValue,
    secured_array: &JsValue,
) -> Result<Object> {
    let module_args = Array::of4(dollar, secured_object, secured_function, secured_array);

    // Registration names live in a null-prototype object owned by this
    // closure alone; nothing on the public surface can reach it.
    let user_scripts: JsValue = js::null_proto_object().into();

    let include_once = {
        let hardener = hardener.clone();
        let args = module_args.clone();
        let closure = Closure::wrap(Box::new(
            move |name: JsValue, callback: JsValue| -> std::result::Result<JsValue, JsValue> {
                let callback = match js::as_function(&callback) {
                    Some(func) => func.clone(),
                    None => return Ok(JsValue::FALSE),
                };
                if js::get_key(&user_scripts, &name).is_truthy() {
                    return Ok(JsValue::FALSE);
                }
                Reflect::set(&user_scripts, &name, &JsValue::TRUE)?;
                hardener.invoke(&callback, &JsValue::UNDEFINED, &args)?;
                Ok(JsValue::TRUE)
            },
        )
            as Box<dyn FnMut(JsValue, JsValue) -> std::result::Result<JsValue, JsValue>>);
        let func = closure.as_ref().clone();
        closure.forget();
        func
    };

    let execute = {
        let hardener = hardener.clone();
        let args = module_args;
        let closure = Closure::wrap(Box::new(
            move |callback: JsValue| -> std::result::Result<JsValue, JsValue> {
                let callback = match js::as_function(&callback) {
                    Some(func) => func.clone(),
                    None => return Ok(JsValue::FALSE),
                };
                hardener.invoke(&callback, &JsValue::UNDEFINED, &args)?;
                Ok(JsValue::TRUE)
            },
        )
            as Box<dyn FnMut(JsValue) -> std::result::Result<JsValue, JsValue>>);
        let func = closure.as_ref().clone();
        closure.forget();
        func
    };

    let hidden = js::null_proto_object();
    Reflect::set(
        &hidden,
        &JsValue::from_str("includeOnce"),
        &hardener.harden(&include_once),
    )?;
    Reflect::set(
        &hidden,
        &JsValue::from_str("execute"),
        &hardener.harden(&execute),
    )?;
    hardener.harden(&hidden.clone().into());
    Ok(hidden)
}

/// Defense-in-depth only: the injection-ordering contract cannot be verified
/// from inside the page, but a built-in that no longer stringifies as native
/// at install time is proof the contract was already broken.
fn preflight_builtins() -> bool {
    let function_prototype = js::get(&js::get_global("Function"), "prototype");
    let stringify = js::get(&function_prototype, "toString");
    let stringify = match js::as_function(&stringify) {
        Some(func) => func.clone(),
        None => return false,
    };

    let looks_native = |value: &JsValue| -> bool {
        if !value.is_function() {
            return false;
        }
        js::apply_function(&stringify, value, &Array::new())
            .ok()
            .and_then(|source| source.as_string())
            .map(|source| source.contains("[native code]"))
            .unwrap_or(false)
    };

    let object_ctor = js::get_global("Object");
    let reflect_namespace = js::get_global("Reflect");
    let checks: [(&str, JsValue); 5] = [
        ("Object.create", js::get(&object_ctor, "create")),
        ("Object.freeze", js::get(&object_ctor, "freeze")),
        (
            "Object.getOwnPropertyDescriptor",
            js::get(&object_ctor, "getOwnPropertyDescriptor"),
        ),
        ("Reflect.get", js::get(&reflect_namespace, "get")),
        ("Proxy", js::get_global("Proxy")),
    ];

    let mut all_native = true;
    for (name, value) in checks.iter() {
        if !looks_native(value) {
            log::warn!("{} was tampered with before installation", name);
            all_native = false;
        }
    }
    all_native
}

fn window_origin() -> String {
    match web_sys::window() {
        Some(window) => window.location().origin().unwrap_or_default(),
        None => String::new(),
    }
}

fn exception_names(exceptions: &JsValue) -> Vec<String> {
    if !Array::is_array(exceptions) {
        return Vec::new();
    }
    let array: &Array = exceptions.unchecked_ref();
    (0..array.length())
        .filter_map(|index| array.get(index).as_string())
        .collect()
}
