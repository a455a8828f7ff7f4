use std::sync::Arc;

use gloo_events::{EventListener, EventListenerOptions};
use log::warn;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, PointerEvent, WheelEvent};

use super::PointerInput;

/// Forwards DOM pointer and wheel events from a canvas into [`PointerInput`].
///
/// Listeners are removed when the handler is dropped.
pub struct CanvasPointerHandler {
    _listeners: Vec<EventListener>,
}

impl CanvasPointerHandler {
    pub fn attach(canvas: &HtmlCanvasElement, input: Arc<PointerInput>) -> Self {
        let mut listeners = Vec::new();

        {
            let input = Arc::clone(&input);
            let target = canvas.clone();
            listeners.push(EventListener::new(canvas, "pointerdown", move |event| {
                let Some(event) = event.dyn_ref::<PointerEvent>() else {
                    return;
                };
                if event.button() == 0 {
                    if let Err(err) = target.set_pointer_capture(event.pointer_id()) {
                        warn!("pointer capture failed: {err:?}");
                    }
                    input.press();
                }
            }));
        }

        {
            let input = Arc::clone(&input);
            listeners.push(EventListener::new(canvas, "pointermove", move |event| {
                if let Some(event) = event.dyn_ref::<PointerEvent>() {
                    input.move_by(event.movement_x() as f32, event.movement_y() as f32);
                }
            }));
        }

        for name in ["pointerup", "pointercancel"] {
            let input = Arc::clone(&input);
            listeners.push(EventListener::new(canvas, name, move |_| input.release()));
        }

        {
            let input = Arc::clone(&input);
            let options = EventListenerOptions::enable_prevent_default();
            listeners.push(EventListener::new_with_options(
                canvas,
                "wheel",
                options,
                move |event| {
                    if let Some(event) = event.dyn_ref::<WheelEvent>() {
                        event.prevent_default();
                        input.scroll(event.delta_y() as f32);
                    }
                },
            ));
        }

        Self {
            _listeners: listeners,
        }
    }
}
