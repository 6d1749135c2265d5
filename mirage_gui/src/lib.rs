//! Layered window compositing for the engine runtime.
//!
//! A [`ViewManager`] keeps an ordered stack of windows, routes mouse and
//! key events by z-order, and repaints damaged screen area through a
//! dirty-rectangle region algebra ([`RegionList`]) that guarantees each
//! damaged pixel is painted exactly once by the window that owns it.

pub mod buffer;
pub mod rect;
pub mod region;
pub mod view;
pub mod window;

pub use buffer::{BufferContent, Surface};
pub use rect::Rect;
pub use region::{RegionError, RegionList, DEFAULT_NODE_BUDGET};
pub use view::{DispatchOutcome, GuiError, ViewManager, DEFAULT_WINDOW_BUDGET};
pub use window::{
    EventResponse, HotkeyFn, InputEvent, KeyCode, MouseAction, MouseButton, WindowContent,
    WindowFlags, WindowId, WindowInfo, WindowStatus,
};
