//! 24.8 signed fixed-point numbers.
//!
//! The value is an `i32`: the integer part is the value shifted right by 8
//! (arithmetic, so it keeps its sign) and the low 8 bits are an unsigned
//! fraction in 1/256 steps.
//!
//! # Sign of the fraction
//!
//! The fraction is always added, never subtracted. Packing `-1.5` stores
//! integer part `-1` with fraction `128`, which reads back as `-0.5`, and
//! `-0.25` reads back as `+0.25`. Existing peers depend on exactly this bit
//! layout, so it is kept as-is: only non-negative values and whole negative
//! numbers survive [`Fixed::from_f64`] / [`Fixed::to_f64`] unchanged.

use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(1 << 8);

    /// Reinterpret raw wire bits.
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// Raw wire bits.
    pub const fn to_bits(self) -> i32 {
        self.0
    }

    /// Whole number with a zero fraction. Bits above the 24-bit integer
    /// range are shifted out.
    pub const fn from_integer(n: i32) -> Self {
        Self(n << 8)
    }

    /// Truncate `x` toward zero for the integer part; the magnitude of the
    /// remainder is rounded to the nearest 1/256 and stored unsigned.
    ///
    /// A remainder that rounds up to a whole step is held at `255/256`
    /// so it never carries into the integer part: `2.999` becomes bits
    /// `767`, the value peers that truncate to 8 bits put on the wire,
    /// rather than the `512 | 256` an unclamped OR would produce.
    pub fn from_f64(x: f64) -> Self {
        let integer = x.trunc();
        let fraction = ((x - integer).abs() * 256.0).round().min(255.0) as i32;
        Self(((integer as i32) << 8) | fraction)
    }

    /// Integer part, sign preserved.
    pub const fn integer(self) -> i32 {
        self.0 >> 8
    }

    /// Fractional part in 1/256 steps, always 0..=255.
    pub const fn fraction(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// `integer() + fraction() / 256`.
    pub fn to_f64(self) -> f64 {
        f64::from(self.integer()) + (f64::from(self.fraction()) * (-8f64).exp2()).abs()
    }
}

impl From<i32> for Fixed {
    fn from(n: i32) -> Self {
        Self::from_integer(n)
    }
}

impl From<f64> for Fixed {
    fn from(x: f64) -> Self {
        Self::from_f64(x)
    }
}

impl From<Fixed> for f64 {
    fn from(value: Fixed) -> Self {
        value.to_f64()
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip() {
        for n in [0, 1, 5, -1, -300, (1 << 23) - 1, -(1 << 23)] {
            let value = Fixed::from_integer(n);
            assert_eq!(value.integer(), n, "n = {n}");
            assert_eq!(value.fraction(), 0, "n = {n}");
        }
        assert_eq!(Fixed::from_integer(5).to_f64(), 5.0);
        assert_eq!(Fixed::from_integer(5).to_bits(), 5 * 256);
    }

    #[test]
    fn positive_fractions() {
        let value = Fixed::from_f64(2.5);
        assert_eq!(value.integer(), 2);
        assert_eq!(value.fraction(), 128);
        assert_eq!(value.to_f64(), 2.5);

        assert_eq!(Fixed::from_f64(0.25).to_bits(), 64);
        assert_eq!(Fixed::from_f64(1.0 / 256.0).to_bits(), 1);
    }

    #[test]
    fn fraction_rounds_to_nearest_step() {
        assert_eq!(Fixed::from_f64(0.3).fraction(), 77);
        assert_eq!(Fixed::from_f64(3.999).integer(), 3);
        assert_eq!(Fixed::from_f64(3.999).fraction(), 255);
        assert_eq!(Fixed::from_f64(2.999).to_bits(), 767);
        assert_eq!(Fixed::from_f64(-2.999).integer(), -2);
        assert_eq!(Fixed::from_f64(-2.999).fraction(), 255);
    }

    #[test]
    fn negative_whole_numbers_survive() {
        assert_eq!(Fixed::from_f64(-7.0).to_f64(), -7.0);
        assert_eq!(Fixed::from_f64(-7.0), Fixed::from_integer(-7));
    }

    #[test]
    fn negative_fraction_loses_sign() {
        let value = Fixed::from_f64(-1.5);
        assert_eq!(value.integer(), -1);
        assert_eq!(value.fraction(), 128);
        assert_eq!(value.to_f64(), -0.5);

        assert_eq!(Fixed::from_f64(-0.25).to_f64(), 0.25);
    }

    #[test]
    fn integer_shift_is_arithmetic() {
        let value = Fixed::from_bits(-1);
        assert_eq!(value.integer(), -1);
        assert_eq!(value.fraction(), 255);
    }

    #[test]
    fn conversions() {
        let from_int: Fixed = 3.into();
        assert_eq!(from_int, Fixed::from_integer(3));
        let back: f64 = Fixed::from_f64(1.25).into();
        assert_eq!(back, 1.25);
        assert_eq!(Fixed::ONE.to_f64(), 1.0);
        assert_eq!(Fixed::from_f64(0.5).to_string(), "0.5");
    }
}
