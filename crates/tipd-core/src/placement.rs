//! Popup placement next to its trigger.
//!
//! The popup goes below the trigger, left edges aligned. It flips to
//! right-aligned when it would overflow the right edge (and the flipped
//! position fits on the left), and above the trigger when it would overflow
//! the bottom (and the flipped position fits on top).

use crate::geometry::{Position, Rect, Viewport};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OFFSET: f64 = 8.0;

/// How the host should style the popup right now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PopupStyle {
    /// Not measured yet: render with `visibility: hidden` and report the rect.
    Hidden,
    /// Render at these absolute coordinates.
    At(Position),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Collisions {
    top: bool,
    right: bool,
    bottom: bool,
    left: bool,
}

fn collisions(trigger: &Rect, popup: &Rect, viewport: &Viewport, offset: f64) -> Collisions {
    Collisions {
        top: trigger.top - popup.height < 0.0,
        right: viewport.width < trigger.left + popup.width,
        bottom: viewport.height < trigger.bottom() + popup.height + offset,
        left: trigger.left - popup.width < 0.0,
    }
}

/// Compute the popup position, or `None` until both rects are measured.
pub fn place(
    trigger: Option<&Rect>,
    popup: Option<&Rect>,
    viewport: &Viewport,
    offset: f64,
) -> Option<Position> {
    let (trigger, popup) = (trigger?, popup?);
    let hit = collisions(trigger, popup, viewport, offset);

    let align_right = hit.right && !hit.left;
    let go_up = hit.bottom && !hit.top;

    let left = if align_right {
        trigger.right() - popup.width
    } else {
        trigger.left
    };
    let top = if go_up {
        trigger.top - offset - popup.height
    } else {
        trigger.top + offset + trigger.height
    };

    Some(Position {
        left: left + viewport.scroll_x,
        top: top + viewport.scroll_y,
    })
}

/// Style for the popup: hidden while the popup is unmeasured, otherwise
/// positioned by [`place`].
pub fn popup_style(
    trigger: Option<&Rect>,
    popup: Option<&Rect>,
    viewport: &Viewport,
    offset: f64,
) -> PopupStyle {
    match place(trigger, popup, viewport, offset) {
        Some(position) => PopupStyle::At(position),
        None => PopupStyle::Hidden,
    }
}
