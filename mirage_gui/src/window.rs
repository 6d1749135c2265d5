//! Window descriptors, flags, and the content callback seam.

use bitflags::bitflags;

use crate::buffer::Surface;
use crate::rect::Rect;
use crate::region::RegionList;

bitflags! {
    /// Per-window behavior flags. The low seven bits are the z-order layer;
    /// higher layers stack in front.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowFlags: u32 {
        const LAYER_MASK    = 0x0000_007f;
        /// Window wants mouse events inside its bounds.
        const ACCEPTS_MOUSE = 0x0000_0080;
        /// Mouse events inside the bounds stop here even when unwanted.
        const BLOCKS_MOUSE  = 0x0000_0100;
        /// Window wants raw key events.
        const ACCEPTS_KEYS  = 0x0000_0200;
        /// Window does not obscure what lies behind it during redraw.
        const TRANSPARENT   = 0x0000_0400;
    }
}

impl WindowFlags {
    pub fn layer(self) -> u32 {
        (self & WindowFlags::LAYER_MASK).bits()
    }

    pub fn with_layer(self, layer: u32) -> Self {
        let kept = self & !WindowFlags::LAYER_MASK;
        kept | WindowFlags::from_bits_retain(layer & WindowFlags::LAYER_MASK.bits())
    }

    pub fn from_layer(layer: u32) -> Self {
        WindowFlags::empty().with_layer(layer)
    }
}

/// Key identifier delivered with key events and hotkey registrations.
pub type KeyCode = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Move,
    Down(MouseButton),
    Drag(MouseButton),
    Up(MouseButton),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Mouse { action: MouseAction, x: i32, y: i32 },
    Key { code: KeyCode },
}

impl InputEvent {
    pub fn mouse(action: MouseAction, x: i32, y: i32) -> Self {
        InputEvent::Mouse { action, x, y }
    }

    pub fn key(code: KeyCode) -> Self {
        InputEvent::Key { code }
    }
}

/// What a content handler did with an event.
///
/// `Capture` routes every following event straight to this window until its
/// handler answers `Release` — the drag contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResponse {
    Ignored,
    Consumed,
    Capture,
    Release,
}

/// Identity and geometry handed to content callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub bounds: Rect,
    pub flags: WindowFlags,
}

/// Stable handle to a managed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub(crate) u32);

impl WindowId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Where a window currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Active,
    Inactive,
}

/// The callback seam each window supplies.
///
/// `redraw` receives the dirty region in screen coordinates and translates
/// by its own origin; `handle_event` decides consumption and capture.
pub trait WindowContent {
    fn redraw(&mut self, window: &WindowInfo, dirty: &RegionList, dest: &mut Surface);

    fn handle_event(&mut self, window: &WindowInfo, event: &InputEvent) -> EventResponse;
}

pub type HotkeyFn = Box<dyn FnMut(KeyCode)>;

pub(crate) struct Window {
    pub(crate) bounds: Rect,
    pub(crate) flags: WindowFlags,
    pub(crate) content: Box<dyn WindowContent>,
    pub(crate) hotkeys: Vec<(KeyCode, HotkeyFn)>,
}

impl Window {
    pub(crate) fn info(&self, id: WindowId) -> WindowInfo {
        WindowInfo {
            id,
            bounds: self.bounds,
            flags: self.flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_bits_round_trip() {
        let flags = WindowFlags::ACCEPTS_MOUSE | WindowFlags::from_layer(69);
        assert_eq!(flags.layer(), 69);
        assert!(flags.contains(WindowFlags::ACCEPTS_MOUSE));

        let relayered = flags.with_layer(3);
        assert_eq!(relayered.layer(), 3);
        assert!(relayered.contains(WindowFlags::ACCEPTS_MOUSE));
    }

    #[test]
    fn layer_values_clamp_to_the_mask() {
        assert_eq!(WindowFlags::from_layer(0x1ff).layer(), 0x7f);
    }
}
