//! A signed 24.8 fixed-point number used in the wayland protocol.


use std::fmt::{Debug, Display, Formatter};

/// A signed 24.8 fixed-point number used in the wayland protocol.
///
/// Surface-local coordinates in pointer and drag-and-drop events use this
/// format. The relay only ever scales such coordinates by small integer
/// factors, so the arithmetic surface is limited to that.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
#[repr(transparent)]
pub struct Fixed(i32);

impl Fixed {
    /// The 0 [`Fixed`].
    pub const ZERO: Self = Self(0);

    /// Creates a [`Fixed`] from the raw bits that appear in the wire protocol.
    #[inline]
    pub const fn from_wire(val: i32) -> Self {
        Self(val)
    }

    /// Converts this [`Fixed`] to the bits that should be set in the wire protocol.
    #[inline]
    pub const fn to_wire(self) -> i32 {
        self.0
    }

    /// Creates a [`Fixed`] from an `i32`, saturating at the representable range.
    #[inline]
    pub const fn from_i32_saturating(val: i32) -> Self {
        Self(val.saturating_mul(256))
    }

    /// Converts this [`Fixed`] to an `i32`, rounding towards negative infinity.
    #[inline]
    pub const fn to_i32_floor(self) -> i32 {
        self.0 >> 8
    }

    /// Converts this [`Fixed`] to an `f64`. This conversion is lossless.
    #[inline]
    pub const fn to_f64(self) -> f64 {
        self.0 as f64 / 256.0
    }

    /// Multiplies by an integer scale factor with saturating semantics.
    #[inline]
    pub const fn scale_up(self, factor: i32) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    /// Divides by an integer scale factor.
    ///
    /// Division by 0 returns [`Fixed::ZERO`].
    #[inline]
    pub const fn scale_down(self, factor: i32) -> Self {
        if factor == 0 {
            return Self::ZERO;
        }
        Self(self.0 / factor)
    }
}

impl Debug for Fixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Fixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.to_f64(), f)
    }
}
