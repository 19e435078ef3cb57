//! Capture-deterrence monitor.
//!
//! A fixed set of passive detectors runs for the page's entire lifetime,
//! independent of authentication and document state. Every detection funnels
//! into one shared response: block the default action, cover the viewport,
//! show a security notice, then wipe session storage and reload. The policy
//! is zero tolerance: the first incident is terminal, and the ledger makes
//! the response idempotent when detectors fire in the same tick.
//!
//! Detector installation failures are logged and degrade gracefully; the
//! remaining detectors still install. Cross-origin frame access is expected
//! to fail and never escalates.

use std::cell::RefCell;
use std::rc::Rc;

use docgate_core::{
    chrome_delta_exceeded, classify_chord, paste_types_contain_image, CaptureIncident,
    DeterrenceConfig, IncidentKind, IncidentLedger, KeyChord, VisibilityTracker,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    console, ClipboardEvent, Document, Element, Event, HtmlElement, HtmlIFrameElement,
    KeyboardEvent, MutationObserver, MutationObserverInit, Window,
};

use crate::persist;

struct MonitorCtx {
    window: Window,
    document: Document,
    overlay: HtmlElement,
    alert_box: HtmlElement,
    protected: Option<Element>,
    ledger: RefCell<IncidentLedger>,
    visibility: RefCell<VisibilityTracker>,
    config: DeterrenceConfig,
}

/// Installs the detectors and owns the shared incident state.
#[wasm_bindgen]
pub struct DeterrenceMonitor {
    ctx: Rc<MonitorCtx>,
}

#[wasm_bindgen]
impl DeterrenceMonitor {
    /// Build the blocking overlay and notice box, then install every
    /// detector. `protected_id` names the element that gets blurred when an
    /// incident trips (the document container).
    #[wasm_bindgen(constructor)]
    pub fn install(protected_id: &str) -> Result<DeterrenceMonitor, JsValue> {
        console_error_panic_hook::set_once();
        Self::install_with_config(protected_id, DeterrenceConfig::default())
    }

    pub fn install_with_config_json(
        protected_id: &str,
        config_json: &str,
    ) -> Result<DeterrenceMonitor, JsValue> {
        let config: DeterrenceConfig = serde_json::from_str(config_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid deterrence config: {}", e)))?;
        Self::install_with_config(protected_id, config)
    }

    #[wasm_bindgen(getter)]
    pub fn tripped(&self) -> bool {
        self.ctx.ledger.borrow().tripped()
    }

    #[wasm_bindgen(getter)]
    pub fn attempts(&self) -> u32 {
        self.ctx.ledger.borrow().attempts()
    }
}

impl DeterrenceMonitor {
    fn install_with_config(
        protected_id: &str,
        config: DeterrenceConfig,
    ) -> Result<DeterrenceMonitor, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("No document"))?;
        let body = document
            .body()
            .ok_or_else(|| JsValue::from_str("No body"))?;

        let overlay = document.create_element("div")?;
        overlay.set_class_name("capture-overlay");
        body.append_child(&overlay)?;
        let overlay: HtmlElement = overlay.dyn_into()?;

        let alert_box = document.create_element("div")?;
        alert_box.set_class_name("security-alert");
        body.append_child(&alert_box)?;
        let alert_box: HtmlElement = alert_box.dyn_into()?;

        let protected = document.get_element_by_id(protected_id);
        if let Some(surface) = &protected {
            surface.class_list().add_1("secure-mode")?;
        }

        let visibility = VisibilityTracker::new(config.hidden_threshold_ms);
        let ledger = IncidentLedger::new(config.max_attempts);

        let ctx = Rc::new(MonitorCtx {
            window,
            document,
            overlay,
            alert_box,
            protected,
            ledger: RefCell::new(ledger),
            visibility: RefCell::new(visibility),
            config,
        });

        // Each detector stands alone; one failing to install must not take
        // the others down with it.
        let installers: [(&str, fn(&Rc<MonitorCtx>) -> Result<(), JsValue>); 8] = [
            ("keyboard", install_keyboard),
            ("clipboard-copy", install_copy),
            ("clipboard-paste", install_paste),
            ("visibility", install_visibility),
            ("window-chrome", install_resize),
            ("print", install_print_guard),
            ("context-menu", install_context_menu),
            ("frame-guard", install_frame_guard),
        ];
        for (name, installer) in installers {
            if let Err(e) = installer(&ctx) {
                console::warn_2(&format!("Detector '{}' failed to install:", name).into(), &e);
            }
        }
        if let Err(e) = install_print_media_css(&ctx) {
            console::warn_1(&e);
        }

        console::log_1(&"Capture-deterrence monitor installed".into());
        Ok(DeterrenceMonitor { ctx })
    }
}

/// Route one detection through the shared response. Only the first incident
/// of the process lifetime has effect.
fn raise(ctx: &Rc<MonitorCtx>, kind: IncidentKind) {
    let incident = ctx.ledger.borrow_mut().record(kind, js_sys::Date::now());
    if let Some(incident) = incident {
        respond(ctx, &incident);
    }
}

/// Overlay, blur, notice, then delayed teardown: wipe session storage,
/// mark the page locked down, reload.
fn respond(ctx: &Rc<MonitorCtx>, incident: &CaptureIncident) {
    console::error_1(
        &format!(
            "Security violation (attempt {}): {}",
            incident.attempt,
            incident.kind.notice()
        )
        .into(),
    );

    if let Err(e) = ctx.overlay.class_list().add_1("active") {
        console::warn_1(&e);
    }
    if let Some(surface) = &ctx.protected {
        if let Err(e) = surface.class_list().add_1("capture-detected") {
            console::warn_1(&e);
        }
    }

    ctx.alert_box.set_inner_html(&format!(
        "<h3>Security Alert</h3>\
         <p>{}</p>\
         <p class=\"critical-alert\">This document is confidential. \
         The session will end immediately.</p>",
        incident.kind.notice()
    ));
    if let Err(e) = ctx.alert_box.class_list().add_1("active") {
        console::warn_1(&e);
    }

    let ctx_for_teardown = Rc::clone(ctx);
    let teardown = Closure::once_into_js(move || {
        if let Err(e) = persist::clear_all() {
            console::warn_1(&e);
        }
        if let Some(body) = ctx_for_teardown.document.body() {
            if let Err(e) = body.class_list().add_1("security-lockdown") {
                console::warn_1(&e);
            }
        }
        if let Err(e) = ctx_for_teardown.window.location().reload() {
            console::warn_1(&e);
        }
    });
    // Small delay so the user can read the notice before the reload.
    if let Err(e) = ctx
        .window
        .set_timeout_with_callback_and_timeout_and_arguments_0(
            teardown.unchecked_ref(),
            ctx.config.lockdown_delay_ms,
        )
    {
        console::warn_1(&e);
    }
}

/// Detector 2: screenshot and dev-tool key combinations, on both keydown
/// and keyup, in the capture phase.
fn install_keyboard(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    for event_name in ["keydown", "keyup"] {
        let ctx_key = Rc::clone(ctx);
        let handler = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
            let chord = KeyChord::new(
                &event.key(),
                event.ctrl_key(),
                event.meta_key(),
                event.shift_key(),
            );
            if let Some(kind) = classify_chord(&chord) {
                event.prevent_default();
                event.stop_propagation();
                raise(&ctx_key, kind);
            }
        });
        ctx.document.add_event_listener_with_callback_and_bool(
            event_name,
            handler.as_ref().unchecked_ref(),
            true,
        )?;
        handler.forget();
    }
    Ok(())
}

/// Detector 3: the copy command is blocked unconditionally.
fn install_copy(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let ctx_copy = Rc::clone(ctx);
    let handler = Closure::<dyn FnMut(ClipboardEvent)>::new(move |event: ClipboardEvent| {
        event.prevent_default();
        raise(&ctx_copy, IncidentKind::ClipboardCopy);
    });
    ctx.document
        .add_event_listener_with_callback("copy", handler.as_ref().unchecked_ref())?;
    handler.forget();
    Ok(())
}

/// Detector 4: an image or file on the pasted payload points at a
/// screenshot-then-paste workflow.
fn install_paste(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let ctx_paste = Rc::clone(ctx);
    let handler = Closure::<dyn FnMut(ClipboardEvent)>::new(move |event: ClipboardEvent| {
        let Some(data) = event.clipboard_data() else {
            return;
        };
        let types = data.types();
        let mut names = Vec::with_capacity(types.length() as usize);
        for i in 0..types.length() {
            if let Some(name) = types.get(i).as_string() {
                names.push(name);
            }
        }
        if paste_types_contain_image(&names) {
            raise(&ctx_paste, IncidentKind::ClipboardImagePaste);
        }
    });
    ctx.window
        .add_event_listener_with_callback("paste", handler.as_ref().unchecked_ref())?;
    handler.forget();
    Ok(())
}

/// Detector 5: a fast hidden-to-visible flip suggests alt-tabbing to an
/// external capture tool.
fn install_visibility(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let ctx_vis = Rc::clone(ctx);
    let handler = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
        let now = js_sys::Date::now();
        if ctx_vis.document.hidden() {
            ctx_vis.visibility.borrow_mut().page_hidden(now);
        } else if ctx_vis.visibility.borrow_mut().page_visible(now) {
            raise(&ctx_vis, IncidentKind::VisibilityHeuristic);
        }
    });
    ctx.document
        .add_event_listener_with_callback("visibilitychange", handler.as_ref().unchecked_ref())?;
    handler.forget();
    Ok(())
}

/// Detector 6: outer-vs-inner window delta on resize.
fn install_resize(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let ctx_resize = Rc::clone(ctx);
    let handler = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
        let dims = (
            ctx_resize.window.outer_width().ok().and_then(|v| v.as_f64()),
            ctx_resize.window.inner_width().ok().and_then(|v| v.as_f64()),
            ctx_resize.window.outer_height().ok().and_then(|v| v.as_f64()),
            ctx_resize.window.inner_height().ok().and_then(|v| v.as_f64()),
        );
        if let (Some(ow), Some(iw), Some(oh), Some(ih)) = dims {
            if chrome_delta_exceeded(
                ow as i32,
                iw as i32,
                oh as i32,
                ih as i32,
                ctx_resize.config.chrome_delta_px,
            ) {
                raise(&ctx_resize, IncidentKind::InspectionHeuristic);
            }
        }
    });
    ctx.window
        .add_event_listener_with_callback("resize", handler.as_ref().unchecked_ref())?;
    handler.forget();
    Ok(())
}

/// Detector 1: `beforeprint` in the capture phase plus a `window.print`
/// override, so both the browser command and direct calls are blocked.
fn install_print_guard(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let ctx_event = Rc::clone(ctx);
    let handler = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        event.prevent_default();
        event.stop_immediate_propagation();
        raise(&ctx_event, IncidentKind::PrintAttempt);
    });
    ctx.window.add_event_listener_with_callback_and_bool(
        "beforeprint",
        handler.as_ref().unchecked_ref(),
        true,
    )?;
    handler.forget();

    override_print(ctx, ctx.window.as_ref())?;
    Ok(())
}

/// Replace a window's `print` with one that raises instead of printing.
fn override_print(ctx: &Rc<MonitorCtx>, target: &JsValue) -> Result<(), JsValue> {
    let ctx_print = Rc::clone(ctx);
    let blocked = Closure::<dyn FnMut()>::new(move || {
        console::warn_1(&"window.print() call blocked".into());
        raise(&ctx_print, IncidentKind::PrintAttempt);
    });
    js_sys::Reflect::set(target, &"print".into(), blocked.as_ref())?;
    blocked.forget();
    Ok(())
}

/// Detector 8 (prevention only): no context menu, no text selection on the
/// protected surface. Raises nothing.
fn install_context_menu(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let suppress = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        event.prevent_default();
    });
    ctx.document.add_event_listener_with_callback(
        "contextmenu",
        suppress.as_ref().unchecked_ref(),
    )?;
    if let Some(surface) = &ctx.protected {
        surface
            .add_event_listener_with_callback("selectstart", suppress.as_ref().unchecked_ref())?;
    }
    suppress.forget();
    Ok(())
}

/// Detector 7: print/key/copy guards inside every same-origin iframe,
/// existing or inserted later. Cross-origin frames are skipped silently.
fn install_frame_guard(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let frames = ctx.document.query_selector_all("iframe")?;
    for i in 0..frames.length() {
        if let Some(node) = frames.get(i) {
            if let Ok(frame) = node.dyn_into::<HtmlIFrameElement>() {
                // A frame that finished loading before install never fires
                // `load` again; guard it right away.
                if frame.content_document().is_some() {
                    protect_frame(ctx, &frame);
                } else {
                    watch_frame_load(ctx, &frame)?;
                }
            }
        }
    }

    let ctx_observer = Rc::clone(ctx);
    let on_mutations =
        Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |records: js_sys::Array, _observer: MutationObserver| {
                for record in records.iter() {
                    let Ok(record) = record.dyn_into::<web_sys::MutationRecord>() else {
                        continue;
                    };
                    let added = record.added_nodes();
                    for i in 0..added.length() {
                        if let Some(node) = added.get(i) {
                            if let Ok(frame) = node.dyn_into::<HtmlIFrameElement>() {
                                if let Err(e) = watch_frame_load(&ctx_observer, &frame) {
                                    console::warn_1(&e);
                                }
                            }
                        }
                    }
                }
            },
        );
    let observer = MutationObserver::new(on_mutations.as_ref().unchecked_ref())?;
    on_mutations.forget();

    let body = ctx
        .document
        .body()
        .ok_or_else(|| JsValue::from_str("No body"))?;
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options.set_subtree(true);
    observer.observe_with_options(&body, &options)?;
    Ok(())
}

/// Wait for the frame to finish loading, then install guards inside it.
fn watch_frame_load(ctx: &Rc<MonitorCtx>, frame: &HtmlIFrameElement) -> Result<(), JsValue> {
    let ctx_load = Rc::clone(ctx);
    let frame_for_load = frame.clone();
    let on_load = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
        protect_frame(&ctx_load, &frame_for_load);
    });
    frame.add_event_listener_with_callback("load", on_load.as_ref().unchecked_ref())?;
    on_load.forget();
    Ok(())
}

/// Same-origin frames only: `contentWindow`/`contentDocument` come back
/// empty for cross-origin content, which is expected and non-fatal.
fn protect_frame(ctx: &Rc<MonitorCtx>, frame: &HtmlIFrameElement) {
    let Some(frame_window) = frame.content_window() else {
        console::log_1(&"Skipping cross-origin frame".into());
        return;
    };
    if let Err(e) = override_print(ctx, frame_window.as_ref()) {
        console::warn_1(&e);
    }

    let Some(frame_document) = frame.content_document() else {
        return;
    };

    let ctx_keys = Rc::clone(ctx);
    let key_handler = Closure::<dyn FnMut(KeyboardEvent)>::new(move |event: KeyboardEvent| {
        let chord = KeyChord::new(
            &event.key(),
            event.ctrl_key(),
            event.meta_key(),
            event.shift_key(),
        );
        if let Some(kind) = classify_chord(&chord) {
            event.prevent_default();
            event.stop_propagation();
            raise(&ctx_keys, kind);
        }
    });
    if let Err(e) = frame_document.add_event_listener_with_callback_and_bool(
        "keydown",
        key_handler.as_ref().unchecked_ref(),
        true,
    ) {
        console::warn_1(&e);
    }
    key_handler.forget();

    let ctx_copy = Rc::clone(ctx);
    let copy_handler = Closure::<dyn FnMut(ClipboardEvent)>::new(move |event: ClipboardEvent| {
        event.prevent_default();
        raise(&ctx_copy, IncidentKind::ClipboardCopy);
    });
    if let Err(e) = frame_document
        .add_event_listener_with_callback("copy", copy_handler.as_ref().unchecked_ref())
    {
        console::warn_1(&e);
    }
    copy_handler.forget();
}

/// Print-media defense: even if a print dialog slips through, the page
/// renders as a refusal notice.
fn install_print_media_css(ctx: &Rc<MonitorCtx>) -> Result<(), JsValue> {
    let style = ctx.document.create_element("style")?;
    style.set_attribute("media", "print")?;
    style.set_text_content(Some(
        "body * { display: none !important; } \
         body:after { content: \"PRINTING NOT AUTHORIZED. This document is protected.\"; \
         display: block !important; font-size: 24px; font-weight: bold; \
         text-align: center; margin: 50px; padding: 50px; }",
    ));
    let head = ctx
        .document
        .head()
        .ok_or_else(|| JsValue::from_str("No head"))?;
    head.append_child(&style)?;
    Ok(())
}

// DOM-dependent behavior is exercised in a browser via wasm-bindgen-test.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_install_creates_overlay_and_alert() {
        let monitor = DeterrenceMonitor::install("missing-surface").unwrap();
        assert!(!monitor.tripped());

        let document = web_sys::window().unwrap().document().unwrap();
        assert!(document.query_selector(".capture-overlay").unwrap().is_some());
        assert!(document.query_selector(".security-alert").unwrap().is_some());
    }

    #[wasm_bindgen_test]
    fn test_existing_frame_print_is_guarded() {
        let document = web_sys::window().unwrap().document().unwrap();
        let frame: HtmlIFrameElement = document
            .create_element("iframe")
            .unwrap()
            .dyn_into()
            .unwrap();
        // Appended before install: an about:blank frame is loaded
        // immediately and will never fire `load`.
        document.body().unwrap().append_child(&frame).unwrap();

        let monitor = DeterrenceMonitor::install("missing-surface").unwrap();

        let frame_window = frame.content_window().unwrap();
        let print = js_sys::Reflect::get(frame_window.as_ref(), &"print".into()).unwrap();
        let print: js_sys::Function = print.dyn_into().unwrap();
        print.call0(&JsValue::NULL).unwrap();

        assert!(monitor.tripped());
    }

    #[wasm_bindgen_test]
    fn test_burst_of_raises_responds_once() {
        let monitor = DeterrenceMonitor::install("missing-surface").unwrap();
        raise(&monitor.ctx, IncidentKind::ScreenshotKey);
        raise(&monitor.ctx, IncidentKind::PrintAttempt);
        raise(&monitor.ctx, IncidentKind::ClipboardCopy);

        assert!(monitor.tripped());
        assert_eq!(monitor.attempts(), 3);
        // The overlay went active exactly once and stays active.
        assert!(monitor.ctx.overlay.class_list().contains("active"));
    }
}
