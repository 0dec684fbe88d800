//! User-Script Bridge WASM Integration Tests
//!
//! Run with: wasm-pack test --headless --chrome
//! (or --firefox, --safari)

#![cfg(target_arch = "wasm32")]

use js_sys::{Promise, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

/// Plant a native-transport stand-in, then install. Handler properties are
/// defined non-configurable, mirroring a real host bridge whose native
/// properties survive `delete`. Installation is idempotent, so every test
/// can call this; the first caller wins and installs with the transport
/// already in place.
fn setup() {
    let _ = js_sys::eval(
        "if (!window.webkit) { \
            var echo = {}; \
            Object.defineProperty(echo, 'postMessage', { \
                value: function(m) { return Promise.resolve('ack:' + m); }, \
                enumerable: true, writable: false, configurable: false }); \
            var handlers = {}; \
            Object.defineProperty(handlers, 'echo', { \
                value: echo, enumerable: true, writable: false, configurable: false }); \
            var webkit = {}; \
            Object.defineProperty(webkit, 'messageHandlers', { \
                value: handlers, enumerable: true, writable: false, configurable: false }); \
            window.webkit = webkit; \
        }",
    );
    let _ = userscript_bridge_wasm::install_user_script_bridge(JsValue::UNDEFINED);
}

fn eval_bool(script: &str) -> bool {
    js_sys::eval(script)
        .unwrap_or(JsValue::FALSE)
        .is_truthy()
}

// ===== Installation Tests =====

#[wasm_bindgen_test]
fn install_is_idempotent() {
    setup();

    let before = js_sys::eval("window.__firefox__").unwrap();
    let outcome = userscript_bridge_wasm::install_user_script_bridge(JsValue::UNDEFINED)
        .expect("repeat install should not fail");
    let already = Reflect::get(&outcome, &JsValue::from_str("alreadyInstalled")).unwrap();
    assert_eq!(already, JsValue::TRUE, "second install should be a no-op");

    let after = js_sys::eval("window.__firefox__").unwrap();
    assert_eq!(before, after, "bridge identity should survive reinstallation");
}

#[wasm_bindgen_test]
fn global_cannot_be_replaced() {
    setup();

    assert!(
        eval_bool(
            "(function() { 'use strict'; \
             try { window.__firefox__ = {}; return false; } \
             catch (e) { return e instanceof TypeError; } })()"
        ),
        "strict-mode assignment should throw TypeError"
    );
    assert!(
        eval_bool(
            "(function() { var before = window.__firefox__; \
             try { delete window.__firefox__; } catch (e) {} \
             return window.__firefox__ === before; })()"
        ),
        "delete should not remove the bridge"
    );
    assert!(
        eval_bool(
            "(function() { var before = window.__firefox__; \
             try { Object.defineProperty(window, '__firefox__', { value: {} }); \
                   return false; } \
             catch (e) { return window.__firefox__ === before; } })()"
        ),
        "redefinition should throw and leave the bridge in place"
    );
}

// ===== Enumeration Tests =====

#[wasm_bindgen_test]
fn no_enumerable_keys_ever() {
    setup();

    let _ = js_sys::eval("window.__firefox__.someValue = { x: 1 };");

    assert!(
        eval_bool("Object.keys(window.__firefox__).length === 0"),
        "Object.keys should stay empty after writes"
    );
    assert!(
        eval_bool(
            "(function() { var n = 0; \
             for (var k in window.__firefox__) { n++; } \
             return n === 0; })()"
        ),
        "for...in should see nothing"
    );
    assert!(
        eval_bool("JSON.stringify(window.__firefox__) === '{}'"),
        "JSON.stringify should yield an empty object"
    );
}

// ===== Capability Tests =====

#[wasm_bindgen_test]
fn include_once_runs_exactly_once() {
    setup();

    let count = js_sys::eval(
        "window.__includeOnceCount = 0; \
         window.__firefox__.includeOnce('once-a', function($) { window.__includeOnceCount++; }); \
         window.__firefox__.includeOnce('once-a', function($) { window.__includeOnceCount++; }); \
         window.__firefox__.includeOnce('once-a', function($) { window.__includeOnceCount++; }); \
         window.__includeOnceCount",
    )
    .unwrap();
    assert_eq!(count.as_f64(), Some(1.0), "callback should run exactly once");
}

#[wasm_bindgen_test]
fn include_once_names_are_independent() {
    setup();

    let count = js_sys::eval(
        "window.__includeNameCount = 0; \
         window.__firefox__.includeOnce('name-a', function($) { window.__includeNameCount++; }); \
         window.__firefox__.includeOnce('name-b', function($) { window.__includeNameCount++; }); \
         window.__includeNameCount",
    )
    .unwrap();
    assert_eq!(count.as_f64(), Some(2.0), "each name should run its own callback");
}

#[wasm_bindgen_test]
fn execute_runs_every_call() {
    setup();

    let count = js_sys::eval(
        "window.__executeCount = 0; \
         window.__firefox__.execute(function($) { window.__executeCount++; }); \
         window.__firefox__.execute(function($) { window.__executeCount++; }); \
         window.__executeCount",
    )
    .unwrap();
    assert_eq!(count.as_f64(), Some(2.0), "execute should run on every call");
}

#[wasm_bindgen_test]
fn modules_receive_secured_primitives() {
    setup();

    assert!(
        eval_bool(
            "(function() { var seen = false; \
             window.__firefox__.execute(function($, $Object, $Function, $Array) { \
                 seen = typeof $ === 'function' \
                     && typeof $.deepFreeze === 'function' \
                     && typeof $.extensiveFreeze === 'function' \
                     && typeof $.postNativeMessage === 'function' \
                     && typeof $.windowOrigin === 'string' \
                     && typeof $Object.freeze === 'function' \
                     && typeof $Object.prototype === 'object' \
                     && typeof $Function.prototype === 'object' \
                     && typeof $Array.isArray === 'function'; \
             }); \
             return seen; })()"
        ),
        "modules should receive $, $Object, $Function, $Array"
    );
}

#[wasm_bindgen_test]
fn invalid_callbacks_return_false() {
    setup();

    assert!(
        eval_bool("window.__firefox__.execute('not a function') === false"),
        "execute with a non-function should return false"
    );
    assert!(
        eval_bool("window.__firefox__.includeOnce('reg-check', 123) === false"),
        "includeOnce with a non-function should return false"
    );
    // The failed call above must not have claimed the name.
    assert!(
        eval_bool("window.__firefox__.includeOnce('reg-check', function($) {}) === true"),
        "a rejected registration should not consume the name"
    );
    assert!(
        eval_bool("window.__firefox__.includeOnce('reg-check', function($) {}) === false"),
        "the name should now be registered"
    );
}

#[wasm_bindgen_test]
fn capabilities_are_unshadowable() {
    setup();

    assert!(
        eval_bool(
            "window.__firefox__.includeOnce = 5; \
             typeof window.__firefox__.includeOnce === 'function'"
        ),
        "assignment must not shadow includeOnce"
    );
    assert!(
        eval_bool(
            "delete window.__firefox__.execute; \
             typeof window.__firefox__.execute === 'function'"
        ),
        "delete must not remove execute"
    );
    assert!(
        eval_bool(
            "(function() { \
             try { Object.defineProperty(window.__firefox__, 'execute', \
                 { value: 5, configurable: true, writable: true }); } catch (e) {} \
             return typeof window.__firefox__.execute === 'function'; })()"
        ),
        "defineProperty must not shadow a capability"
    );
}

// ===== Capability Store Tests =====

#[wasm_bindgen_test]
fn stored_values_are_frozen_on_readback() {
    setup();

    assert!(
        eval_bool(
            "window.__firefox__.frozenCheck = { a: 1 }; \
             Object.isFrozen(window.__firefox__.frozenCheck)"
        ),
        "values set through the proxy should be frozen"
    );
    assert!(
        eval_bool("window.__firefox__.frozenCheck.a === 1"),
        "frozen values should stay readable"
    );
}

#[wasm_bindgen_test]
fn write_only_trapdoors_are_refused() {
    setup();

    assert!(
        eval_bool(
            "(function() { \
             try { Object.defineProperty(window.__firefox__, 'trapdoor', \
                 { set: function(v) {}, configurable: false }); } \
             catch (e) { return e instanceof TypeError; } \
             return false; })()"
        ),
        "a non-configurable setter-only descriptor should be refused"
    );
}

#[wasm_bindgen_test]
fn frozen_constants_are_baked_into_the_target() {
    setup();

    assert!(
        eval_bool(
            "Object.defineProperty(window.__firefox__, 'bridgeVersion', \
                 { value: '1.0', writable: false, configurable: false }); \
             window.__firefox__.bridgeVersion === '1.0'"
        ),
        "frozen-shaped constants should be definable and readable"
    );
    assert!(
        eval_bool("Object.keys(window.__firefox__).length === 0"),
        "constants must not join the enumerable surface"
    );
    assert!(
        eval_bool(
            "(function() { var d = Object.getOwnPropertyDescriptor(window.__firefox__, 'bridgeVersion'); \
             return d && d.configurable === false && d.writable === false; })()"
        ),
        "constants should report their frozen descriptor"
    );
}

// ===== Hardening Tests =====

#[wasm_bindgen_test]
fn tostring_native_code() {
    setup();

    assert!(
        eval_bool("window.__firefox__.execute.toString().includes('[native code]')"),
        "capability toString should read as native"
    );
    assert!(
        eval_bool(
            "!window.__firefox__.execute.toString().includes('.js') \
             && !window.__firefox__.execute.toString().includes('.rs')"
        ),
        "capability toString should not leak filenames"
    );
}

#[wasm_bindgen_test]
fn harden_is_idempotent_and_preserves_behavior() {
    setup();

    assert!(
        eval_bool(
            "(function() { var f = function() { return 7; }; \
             window.__firefox__.execute(function($) { $($(f)); }); \
             return Object.isFrozen(f) \
                 && f.call(null) === 7 \
                 && f.toString().includes('[native code]'); })()"
        ),
        "double hardening should be a no-op and the function should stay callable"
    );
}

#[wasm_bindgen_test]
fn custom_tostring_is_kept_but_locked() {
    setup();

    assert!(
        eval_bool(
            "(function() { var f = function() {}; \
             f.toString = function() { return 'custom-source'; }; \
             window.__firefox__.execute(function($) { $(f); }); \
             return f.toString() === 'custom-source' \
                 && Object.isFrozen(f.toString); })()"
        ),
        "a custom toString should survive hardening, frozen in place"
    );
}

#[wasm_bindgen_test]
fn deep_freeze_is_one_hop() {
    setup();

    assert!(
        eval_bool(
            "(function() { var obj = { nested: {} }; \
             window.__firefox__.execute(function($) { $.deepFreeze(obj); }); \
             return Object.isFrozen(obj) && !Object.isFrozen(obj.nested); })()"
        ),
        "deepFreeze should not recurse into nested values"
    );
}

// ===== Extensive Freeze Tests =====

#[wasm_bindgen_test]
fn extensive_freeze_reaches_nested_objects() {
    setup();

    assert!(
        eval_bool(
            "window.__extFreezeTarget = { a: { b: 1 } }; \
             window.__firefox__.execute(function($) { $.extensiveFreeze(window.__extFreezeTarget); }); \
             Object.isFrozen(window.__extFreezeTarget) \
                 && Object.isFrozen(window.__extFreezeTarget.a)"
        ),
        "both levels should be frozen"
    );
    assert!(
        eval_bool(
            "(function() { \
             try { window.__extFreezeTarget.a.b = 2; } catch (e) {} \
             return window.__extFreezeTarget.a.b === 1; })()"
        ),
        "writes into the frozen graph should be no-ops"
    );
}

#[wasm_bindgen_test]
fn extensive_freeze_terminates_on_cycles() {
    setup();

    assert!(
        eval_bool(
            "(function() { var x = {}; x.self = x; \
             window.__firefox__.execute(function($) { $.extensiveFreeze(x); }); \
             return Object.isFrozen(x); })()"
        ),
        "self-referential graphs should freeze without recursing forever"
    );
}

#[wasm_bindgen_test]
fn extensive_freeze_handles_containers() {
    setup();

    assert!(
        eval_bool(
            "(function() { var arr = [{ v: 1 }, { v: 2 }]; \
             window.__firefox__.execute(function($) { $.extensiveFreeze(arr); }); \
             return Object.isFrozen(arr) && Object.isFrozen(arr[0]) && arr[1].v === 2; })()"
        ),
        "arrays and their elements should freeze"
    );
    assert!(
        eval_bool(
            "(function() { var inner = { v: 1 }; \
             var map = new Map([['k', inner]]); \
             window.__firefox__.execute(function($) { $.extensiveFreeze(map); }); \
             return Object.isFrozen(map) && Object.isFrozen(inner) && map.get('k') === inner; })()"
        ),
        "map values should freeze while lookups keep working"
    );
}

#[wasm_bindgen_test]
fn extensive_freeze_exceptions_skip_hardening() {
    setup();

    assert!(
        eval_bool(
            "(function() { \
             function Widget() { this.n = 1; } \
             var w = new Widget(); \
             window.__firefox__.execute(function($) { $.extensiveFreeze(w, ['Widget']); }); \
             return Object.isFrozen(w) \
                 && !Object.getOwnPropertyNames(w).includes('toString'); })()"
        ),
        "excepted constructors should freeze without the toString override"
    );
}

// ===== Native Relay Tests =====

#[wasm_bindgen_test]
async fn relay_round_trips_and_restores_the_path() {
    setup();

    let promise = js_sys::eval(
        "(function() { var p; \
         window.__firefox__.execute(function($) { p = $.postNativeMessage('echo', 'hi'); }); \
         return p; })()",
    )
    .expect("relay call should produce a promise");
    let promise: Promise = promise.dyn_into().expect("result should be a promise");

    let resolved = JsFuture::from(promise).await.expect("relay should resolve");
    assert_eq!(resolved.as_string().as_deref(), Some("ack:hi"));

    assert!(
        eval_bool("typeof window.webkit.messageHandlers.echo.postMessage === 'function'"),
        "the live transport path should be intact after the call"
    );
}

#[wasm_bindgen_test]
async fn relay_rejects_for_unknown_handlers() {
    setup();

    let promise = js_sys::eval(
        "(function() { var p; \
         window.__firefox__.execute(function($) { p = $.postNativeMessage('missing', 'x'); }); \
         return p; })()",
    )
    .expect("relay call should produce a promise");
    let promise: Promise = promise.dyn_into().expect("result should be a promise");

    let rejection = JsFuture::from(promise).await;
    assert!(rejection.is_err(), "unknown handler names should reject");

    assert!(
        eval_bool("typeof window.webkit === 'object'"),
        "a rejected relay call should leave the global path alone"
    );
}

// ===== Status Check Tests =====

#[wasm_bindgen_test]
fn check_status_after_install() {
    setup();

    let status = userscript_bridge_wasm::check_bridge_status();
    for key in ["present", "unenumerable", "capabilities", "masked", "pinned"] {
        let value = Reflect::get(&status, &JsValue::from_str(key)).unwrap_or(JsValue::FALSE);
        assert_eq!(value, JsValue::TRUE, "status probe `{}` should pass", key);
    }
}
