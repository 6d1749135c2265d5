//! The view manager: window lifecycle, z-order, dirty-rect redraw, and
//! event routing.
//!
//! Windows live in a slot arena addressed by [`WindowId`] and sit in one of
//! two ordered stacks: active (visible, front-to-back) or inactive. Showing
//! a window inserts it in front of every member at its own layer or below,
//! so the latest-shown window of a layer wins; hiding or disposing restores
//! the vacated rectangle so whatever was underneath repaints.

use log::debug;
use thiserror::Error;

use crate::buffer::Surface;
use crate::rect::Rect;
use crate::region::{RegionError, RegionList};
use crate::window::{
    EventResponse, HotkeyFn, InputEvent, KeyCode, Window, WindowContent, WindowFlags, WindowId,
    WindowStatus,
};

/// Window arena capacity, standing in for the interpreter's fixed screen
/// stash.
pub const DEFAULT_WINDOW_BUDGET: usize = 128;

#[derive(Debug, Error)]
pub enum GuiError {
    #[error("window arena capacity of {capacity} exhausted")]
    TooManyWindows { capacity: usize },

    #[error("window {0:?} does not exist")]
    UnknownWindow(WindowId),

    #[error(transparent)]
    Region(#[from] RegionError),
}

/// Who claimed a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered to a window's content handler.
    Window(WindowId),
    /// Claimed by a window's hotkey table.
    Hotkey(WindowId),
    /// Claimed by the manager-wide hotkey table.
    SystemHotkey,
    /// A blocking window swallowed the event without wanting it.
    Blocked(WindowId),
    /// Nobody wanted it.
    Unclaimed,
}

pub struct ViewManager {
    slots: Vec<Option<Window>>,
    free: Vec<u32>,
    /// Front-to-back.
    active: Vec<WindowId>,
    inactive: Vec<WindowId>,
    captured: Option<WindowId>,
    system_hotkeys: Vec<(KeyCode, HotkeyFn)>,
    screen: Surface,
    budget: usize,
}

impl ViewManager {
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_budget(width, height, DEFAULT_WINDOW_BUDGET)
    }

    pub fn with_budget(width: i32, height: i32, budget: usize) -> Self {
        ViewManager {
            slots: Vec::new(),
            free: Vec::new(),
            active: Vec::new(),
            inactive: Vec::new(),
            captured: None,
            system_hotkeys: Vec::new(),
            screen: Surface::new(width, height),
            budget,
        }
    }

    pub fn screen(&self) -> &Surface {
        &self.screen
    }

    pub fn captured(&self) -> Option<WindowId> {
        self.captured
    }

    /// Active stack front-to-back, for tracing and tests.
    pub fn active_order(&self) -> Vec<WindowId> {
        self.active.clone()
    }

    pub fn window_bounds(&self, id: WindowId) -> Option<Rect> {
        self.window(id).map(|w| w.bounds).ok()
    }

    pub fn window_flags(&self, id: WindowId) -> Option<WindowFlags> {
        self.window(id).map(|w| w.flags).ok()
    }

    pub fn status(&self, id: WindowId) -> Option<WindowStatus> {
        if self.active.contains(&id) {
            Some(WindowStatus::Active)
        } else if self.inactive.contains(&id) {
            Some(WindowStatus::Inactive)
        } else {
            None
        }
    }

    /// Allocate a window. It starts inactive; [`show`](Self::show) makes it
    /// visible.
    pub fn create(
        &mut self,
        bounds: Rect,
        flags: WindowFlags,
        content: Box<dyn WindowContent>,
    ) -> Result<WindowId, GuiError> {
        if self.active.len() + self.inactive.len() >= self.budget {
            return Err(GuiError::TooManyWindows {
                capacity: self.budget,
            });
        }
        let window = Window {
            bounds,
            flags,
            content,
            hotkeys: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(window);
                WindowId(index)
            }
            None => {
                self.slots.push(Some(window));
                WindowId(self.slots.len() as u32 - 1)
            }
        };
        self.inactive.insert(0, id);
        Ok(id)
    }

    /// Move a window into the active stack and repaint its rectangle.
    ///
    /// Insertion walks the stack from the front and places the window just
    /// before the first member whose layer is less than or equal to its
    /// own: strictly higher layers stay in front, and within a layer the
    /// last window shown lands frontmost. Showing an already-active window
    /// restacks it the same way.
    pub fn show(&mut self, id: WindowId) -> Result<(), GuiError> {
        let window = self.window(id)?;
        let bounds = window.bounds;
        let layer = window.flags.layer();

        self.active.retain(|&w| w != id);
        self.inactive.retain(|&w| w != id);
        let position = self
            .active
            .iter()
            .position(|&w| self.layer_of(w) <= layer)
            .unwrap_or(self.active.len());
        self.active.insert(position, id);

        debug!("show {id:?} at layer {layer}, stack depth {}", self.active.len());
        self.restore(bounds)
    }

    /// Move a window to the inactive stack and repaint what it vacated.
    /// Hiding an already-hidden window is a quiet no-op.
    pub fn hide(&mut self, id: WindowId) -> Result<(), GuiError> {
        let bounds = self.window(id)?.bounds;
        let Some(position) = self.active.iter().position(|&w| w == id) else {
            return Ok(());
        };
        self.active.remove(position);
        self.inactive.insert(0, id);
        if self.captured == Some(id) {
            self.captured = None;
        }
        self.restore(bounds)
    }

    /// Destroy a window wherever it lives, dropping its hotkeys and
    /// repainting the vacated rectangle when it was visible.
    pub fn dispose(&mut self, id: WindowId) -> Result<(), GuiError> {
        let window = self
            .slots
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(GuiError::UnknownWindow(id))?;
        let was_active = self.active.contains(&id);
        self.active.retain(|&w| w != id);
        self.inactive.retain(|&w| w != id);
        self.free.push(id.0);
        if self.captured == Some(id) {
            self.captured = None;
        }
        if was_active {
            self.restore(window.bounds)?;
        }
        Ok(())
    }

    /// Restack an active window to the front of its layer.
    pub fn move_to_front(&mut self, id: WindowId) -> Result<(), GuiError> {
        self.show(id)
    }

    /// Restack an active window behind every other member of its layer.
    pub fn move_to_back(&mut self, id: WindowId) -> Result<(), GuiError> {
        let window = self.window(id)?;
        let bounds = window.bounds;
        let layer = window.flags.layer();
        if !self.active.contains(&id) {
            return Ok(());
        }
        self.active.retain(|&w| w != id);
        let position = self
            .active
            .iter()
            .position(|&w| self.layer_of(w) < layer)
            .unwrap_or(self.active.len());
        self.active.insert(position, id);
        self.restore(bounds)
    }

    /// Repaint a damaged screen rectangle.
    ///
    /// Every active window intersecting the damage redraws exactly the part
    /// of it that no non-transparent window in front covers, back-to-front,
    /// so each damaged pixel is painted once by its visible owner.
    pub fn restore(&mut self, damaged: Rect) -> Result<(), GuiError> {
        let Some(damaged) = damaged.intersection(&self.screen.bounds()) else {
            return Ok(());
        };

        let order: Vec<(WindowId, Rect, WindowFlags)> = self
            .active
            .iter()
            .filter_map(|&id| {
                let window = self.slots.get(id.0 as usize)?.as_ref()?;
                Some((id, window.bounds, window.flags))
            })
            .collect();

        for (position, &(id, bounds, _)) in order.iter().enumerate().rev() {
            let Some(visible) = damaged.intersection(&bounds) else {
                continue;
            };
            let mut region = RegionList::from_rect(visible);
            for &(_, front_bounds, front_flags) in &order[..position] {
                if !front_flags.contains(WindowFlags::TRANSPARENT) {
                    region.remove(front_bounds)?;
                }
            }
            if region.is_empty() {
                continue;
            }
            let Some(window) = self.slots.get_mut(id.0 as usize).and_then(Option::as_mut) else {
                continue;
            };
            let info = window.info(id);
            window.content.redraw(&info, &region, &mut self.screen);
        }
        Ok(())
    }

    /// Route one input event.
    ///
    /// A captured window receives everything until it answers `Release`.
    /// Otherwise mouse events walk the active stack front-to-back: the
    /// first window containing the cursor that accepts mouse input gets the
    /// event; a containing window that merely blocks stops the walk cold.
    /// Key events go to key-accepting windows in stack order, falling
    /// through to per-window hotkeys and then the system hotkey table.
    pub fn dispatch(&mut self, event: &InputEvent) -> DispatchOutcome {
        if let Some(id) = self.captured {
            match self.deliver(id, event) {
                Some(_) => return DispatchOutcome::Window(id),
                None => self.captured = None,
            }
        }

        match *event {
            InputEvent::Mouse { x, y, .. } => self.dispatch_mouse(event, x, y),
            InputEvent::Key { code } => self.dispatch_key(event, code),
        }
    }

    pub fn add_hotkey(
        &mut self,
        id: WindowId,
        key: KeyCode,
        callback: HotkeyFn,
    ) -> Result<(), GuiError> {
        self.window_mut(id)?.hotkeys.push((key, callback));
        Ok(())
    }

    pub fn remove_hotkey(&mut self, id: WindowId, key: KeyCode) -> bool {
        let Ok(window) = self.window_mut(id) else {
            return false;
        };
        let before = window.hotkeys.len();
        window.hotkeys.retain(|(k, _)| *k != key);
        window.hotkeys.len() != before
    }

    pub fn add_system_hotkey(&mut self, key: KeyCode, callback: HotkeyFn) {
        self.system_hotkeys.push((key, callback));
    }

    pub fn remove_system_hotkey(&mut self, key: KeyCode) -> bool {
        let before = self.system_hotkeys.len();
        self.system_hotkeys.retain(|(k, _)| *k != key);
        self.system_hotkeys.len() != before
    }

    fn dispatch_mouse(&mut self, event: &InputEvent, x: i32, y: i32) -> DispatchOutcome {
        let order = self.active.clone();
        for id in order {
            let Ok(window) = self.window(id) else {
                continue;
            };
            if !window.bounds.contains(x, y) {
                continue;
            }
            if window.flags.contains(WindowFlags::ACCEPTS_MOUSE) {
                self.deliver(id, event);
                return DispatchOutcome::Window(id);
            }
            if window.flags.contains(WindowFlags::BLOCKS_MOUSE) {
                return DispatchOutcome::Blocked(id);
            }
        }
        DispatchOutcome::Unclaimed
    }

    fn dispatch_key(&mut self, event: &InputEvent, code: KeyCode) -> DispatchOutcome {
        let order = self.active.clone();
        for id in order {
            let Ok(window) = self.window(id) else {
                continue;
            };
            if !window.flags.contains(WindowFlags::ACCEPTS_KEYS) {
                continue;
            }
            if let Some(response) = self.deliver(id, event) {
                if response != EventResponse::Ignored {
                    return DispatchOutcome::Window(id);
                }
            }
            if let Ok(window) = self.window_mut(id) {
                for (key, callback) in window.hotkeys.iter_mut() {
                    if *key == code {
                        callback(code);
                        return DispatchOutcome::Hotkey(id);
                    }
                }
            }
        }

        for (key, callback) in self.system_hotkeys.iter_mut() {
            if *key == code {
                callback(code);
                return DispatchOutcome::SystemHotkey;
            }
        }
        DispatchOutcome::Unclaimed
    }

    fn deliver(&mut self, id: WindowId, event: &InputEvent) -> Option<EventResponse> {
        let window = self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)?;
        let info = window.info(id);
        let response = window.content.handle_event(&info, event);
        match response {
            EventResponse::Capture => self.captured = Some(id),
            EventResponse::Release => self.captured = None,
            EventResponse::Ignored | EventResponse::Consumed => {}
        }
        Some(response)
    }

    fn window(&self, id: WindowId) -> Result<&Window, GuiError> {
        self.slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(GuiError::UnknownWindow(id))
    }

    fn window_mut(&mut self, id: WindowId) -> Result<&mut Window, GuiError> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(GuiError::UnknownWindow(id))
    }

    fn layer_of(&self, id: WindowId) -> u32 {
        self.window(id).map(|w| w.flags.layer()).unwrap_or(0)
    }
}
