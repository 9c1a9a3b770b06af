//! Pointer events as reported by the host input subsystem.
//!
//! The input subsystem reports absolute positions in a *logical* range
//! (`ABS_MIN..=ABS_MAX`) that is independent of the display resolution.  The
//! guest agent expects pixel coordinates, so every absolute value is rescaled
//! to the active display size before it is stored.

use serde::{Deserialize, Serialize};

/// Smallest logical value of an absolute axis.
pub const ABS_MIN: i32 = 0;

/// Largest logical value of an absolute axis.
pub const ABS_MAX: i32 = 0x7FFF;

/// An absolute pointer axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Pointer buttons the input subsystem can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    Side,
    Extra,
}

/// A single event from the input subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    /// Absolute position on one axis, in logical units.
    Absolute { axis: Axis, value: i32 },
    /// Button press (`down = true`) or release.
    Button { button: PointerButton, down: bool },
}

/// Pixel resolution of the display the pointer moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

impl DisplaySize {
    /// Creates a display size.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Extent of `axis` in pixels.
    pub fn extent(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.width,
            Axis::Y => self.height,
        }
    }
}

impl Default for DisplaySize {
    /// 1024x768, used when no console resolution is known.
    fn default() -> Self {
        Self::new(1024, 768)
    }
}

/// Linearly maps `value` from `[min_in, max_in]` to `[min_out, max_out]`.
///
/// A degenerate input range maps everything to the middle of the output range.
///
/// # Examples
///
/// ```rust
/// use vdagent_core::domain::pointer::{scale_axis, ABS_MAX, ABS_MIN};
///
/// assert_eq!(scale_axis(0, ABS_MIN, ABS_MAX, 0, 1024), 0);
/// assert_eq!(scale_axis(ABS_MAX, ABS_MIN, ABS_MAX, 0, 1024), 1024);
/// ```
pub fn scale_axis(value: i32, min_in: i32, max_in: i32, min_out: i32, max_out: i32) -> i32 {
    let range_in = i64::from(max_in) - i64::from(min_in);
    let range_out = i64::from(max_out) - i64::from(min_out);

    if range_in < 1 {
        return (i64::from(min_out) + range_out / 2) as i32;
    }
    ((i64::from(value) - i64::from(min_in)) * range_out / range_in + i64::from(min_out)) as i32
}
