//! A scripted window-stack session.
//!
//! Stands in for the game's real dialog flow: a full-screen playfield, a
//! status strip, and a modal menu stack up, a fixed event script runs
//! against them, and every routing decision lands in a serializable trace.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use mirage_gui::{
    BufferContent, DispatchOutcome, EventResponse, InputEvent, MouseAction, MouseButton, Rect,
    RegionList, Surface, ViewManager, WindowContent, WindowFlags, WindowInfo,
};

const KEY_ESCAPE: u32 = 27;
const KEY_F1: u32 = 112;

#[derive(Debug, Serialize, Deserialize)]
pub struct TraceStep {
    pub action: String,
    pub outcome: String,
    /// Active stack front-to-back, as slot indices.
    pub stack: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScreenTrace {
    pub steps: Vec<TraceStep>,
    /// Pixel probes proving the final composite: `(x, y, value)`.
    pub pixels: Vec<(i32, i32, u8)>,
}

/// A menu panel: a solid buffer that consumes clicks and drags with
/// capture, the way the interpreter's draggable dialogs did.
struct MenuContent {
    pixels: BufferContent,
}

impl MenuContent {
    fn new(width: i32, height: i32, value: u8) -> Self {
        MenuContent {
            pixels: BufferContent::filled(width, height, value),
        }
    }
}

impl WindowContent for MenuContent {
    fn redraw(&mut self, window: &WindowInfo, dirty: &RegionList, dest: &mut Surface) {
        self.pixels.redraw(window, dirty, dest);
    }

    fn handle_event(&mut self, _window: &WindowInfo, event: &InputEvent) -> EventResponse {
        match event {
            InputEvent::Mouse {
                action: MouseAction::Down(MouseButton::Left),
                ..
            } => EventResponse::Capture,
            InputEvent::Mouse {
                action: MouseAction::Up(MouseButton::Left),
                ..
            } => EventResponse::Release,
            InputEvent::Mouse { .. } => EventResponse::Consumed,
            InputEvent::Key { .. } => EventResponse::Ignored,
        }
    }
}

fn record(trace: &mut ScreenTrace, vm: &ViewManager, action: impl Into<String>, outcome: String) {
    trace.steps.push(TraceStep {
        action: action.into(),
        outcome,
        stack: vm.active_order().iter().map(|id| id.index()).collect(),
    });
}

fn dispatch_step(
    trace: &mut ScreenTrace,
    vm: &mut ViewManager,
    action: &str,
    event: InputEvent,
) {
    let outcome = vm.dispatch(&event);
    record(trace, vm, action, outcome_label(outcome));
}

fn outcome_label(outcome: DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Window(id) => format!("window {}", id.index()),
        DispatchOutcome::Hotkey(id) => format!("hotkey {}", id.index()),
        DispatchOutcome::SystemHotkey => "system hotkey".to_string(),
        DispatchOutcome::Blocked(id) => format!("blocked by {}", id.index()),
        DispatchOutcome::Unclaimed => "unclaimed".to_string(),
    }
}

fn click(x: i32, y: i32) -> InputEvent {
    InputEvent::mouse(MouseAction::Down(MouseButton::Left), x, y)
}

fn release(x: i32, y: i32) -> InputEvent {
    InputEvent::mouse(MouseAction::Up(MouseButton::Left), x, y)
}

/// Run the fixed session and return its trace.
pub fn run_screen_session() -> Result<ScreenTrace> {
    let mut vm = ViewManager::new(320, 200);
    let mut trace = ScreenTrace {
        steps: Vec::new(),
        pixels: Vec::new(),
    };

    // Playfield fills the screen at the back layer and takes the mouse.
    let playfield = vm.create(
        Rect::new(0, 0, 319, 199),
        WindowFlags::from_layer(1) | WindowFlags::ACCEPTS_MOUSE | WindowFlags::ACCEPTS_KEYS,
        Box::new(BufferContent::filled(320, 200, 10)),
    )?;
    // Status strip floats above the playfield.
    let status = vm.create(
        Rect::new(0, 180, 319, 199),
        WindowFlags::from_layer(2),
        Box::new(BufferContent::filled(320, 20, 20)),
    )?;
    // Modal menu: frontmost, draggable, and a mouse block for whatever it
    // overlaps.
    let menu = vm.create(
        Rect::new(100, 40, 219, 139),
        WindowFlags::from_layer(69) | WindowFlags::ACCEPTS_MOUSE | WindowFlags::BLOCKS_MOUSE,
        Box::new(MenuContent::new(120, 100, 30)),
    )?;

    vm.show(playfield)?;
    record(&mut trace, &vm, "show playfield", "ok".into());
    vm.show(status)?;
    record(&mut trace, &vm, "show status", "ok".into());
    vm.show(menu)?;
    record(&mut trace, &vm, "show menu", "ok".into());

    vm.add_system_hotkey(KEY_F1, Box::new(|_| {}));

    // Routing sweep: playfield corner, menu body, then a drag that starts
    // on the menu and wanders outside it while captured.
    dispatch_step(&mut trace, &mut vm, "click 10,10", click(10, 10));
    dispatch_step(&mut trace, &mut vm, "click 150,90", click(150, 90));
    dispatch_step(
        &mut trace,
        &mut vm,
        "drag to 300,190",
        InputEvent::mouse(MouseAction::Drag(MouseButton::Left), 300, 190),
    );
    dispatch_step(&mut trace, &mut vm, "release 300,190", release(300, 190));
    dispatch_step(&mut trace, &mut vm, "click 10,10 again", click(10, 10));
    dispatch_step(&mut trace, &mut vm, "press F1", InputEvent::key(KEY_F1));
    dispatch_step(&mut trace, &mut vm, "press escape", InputEvent::key(KEY_ESCAPE));

    // Dismiss the menu; the playfield repaints what it covered.
    vm.hide(menu)?;
    record(&mut trace, &vm, "hide menu", "ok".into());
    dispatch_step(&mut trace, &mut vm, "click 150,90 after hide", click(150, 90));

    vm.dispose(menu)?;
    record(&mut trace, &vm, "dispose menu", "ok".into());

    for (x, y) in [(5, 5), (150, 90), (160, 190)] {
        let value = vm.screen().pixel(x, y).unwrap_or(0);
        trace.pixels.push((x, y, value));
    }
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_routes_and_composites_as_scripted() -> Result<()> {
        let trace = run_screen_session()?;

        let outcome_of = |action: &str| -> &str {
            trace
                .steps
                .iter()
                .find(|s| s.action == action)
                .map(|s| s.outcome.as_str())
                .unwrap_or("missing")
        };

        // The menu owns its body, the playfield its corner, and the drag
        // stays with the menu while captured.
        assert_eq!(outcome_of("click 10,10"), "window 0");
        assert_eq!(outcome_of("click 150,90"), "window 2");
        assert_eq!(outcome_of("drag to 300,190"), "window 2");
        assert_eq!(outcome_of("release 300,190"), "window 2");
        assert_eq!(outcome_of("click 10,10 again"), "window 0");
        assert_eq!(outcome_of("press F1"), "system hotkey");
        assert_eq!(outcome_of("press escape"), "unclaimed");
        assert_eq!(outcome_of("click 150,90 after hide"), "window 0");

        // Menu frontmost while shown.
        let shown = trace
            .steps
            .iter()
            .find(|s| s.action == "show menu")
            .expect("show step");
        assert_eq!(shown.stack, vec![2, 1, 0]);

        // Final composite: playfield, exposed again, with the status strip
        // still on top at the bottom of the screen.
        assert_eq!(trace.pixels, vec![(5, 5, 10), (150, 90, 10), (160, 190, 20)]);
        Ok(())
    }
}
