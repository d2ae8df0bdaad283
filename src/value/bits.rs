//! Fixed-width two's-complement bit vectors backing every bits value.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive, Zero};

/// A fixed-width bit pattern. The pattern never has bits set at or above
/// `width`; every constructor masks on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bits {
    width: usize,
    value: BigUint,
}

fn mask(width: usize) -> BigUint {
    (BigUint::one() << width) - 1u32
}

impl Bits {
    pub fn new(width: usize, value: BigUint) -> Self {
        let value = value & mask(width);
        Bits { width, value }
    }

    pub fn zero(width: usize) -> Self {
        Bits { width, value: BigUint::zero() }
    }

    pub fn all_ones(width: usize) -> Self {
        Bits { width, value: mask(width) }
    }

    pub fn from_u64(width: usize, value: u64) -> Self {
        Bits::new(width, BigUint::from(value))
    }

    pub fn from_i64(width: usize, value: i64) -> Self {
        Bits::from_bigint(width, &BigInt::from(value))
    }

    /// Two's-complement encoding of `value`, wrapped to `width` bits.
    pub fn from_bigint(width: usize, value: &BigInt) -> Self {
        if value.sign() != Sign::Minus {
            return Bits::new(width, value.magnitude().clone());
        }
        let modulus = BigInt::from(BigUint::one() << width);
        let wrapped = ((value % &modulus) + &modulus) % &modulus;
        let (_, magnitude) = wrapped.into_parts();
        Bits::new(width, magnitude)
    }

    pub fn from_bool(value: bool) -> Self {
        Bits::from_u64(1, value as u64)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn bit(&self, index: usize) -> bool {
        index < self.width && self.value.bit(index as u64)
    }

    pub fn msb(&self) -> bool {
        self.width > 0 && self.bit(self.width - 1)
    }

    /// Numeric value of the pattern, read as two's complement when `signed`.
    pub fn to_bigint(&self, signed: bool) -> BigInt {
        let unsigned = BigInt::from(self.value.clone());
        if signed && self.msb() {
            unsigned - BigInt::from(BigUint::one() << self.width)
        } else {
            unsigned
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    pub fn to_usize(&self) -> Option<usize> {
        self.value.to_usize()
    }

    /// Resize to exactly `width` bits. Narrower targets truncate the high
    /// bits; wider targets replicate the sign bit when `sign_extend` is set
    /// and fill with zeros otherwise.
    pub fn resize(&self, width: usize, sign_extend: bool) -> Bits {
        if width <= self.width {
            return Bits::new(width, self.value.clone());
        }
        if sign_extend && self.msb() {
            let upper = mask(width) ^ mask(self.width);
            Bits { width, value: &self.value | &upper }
        } else {
            Bits { width, value: self.value.clone() }
        }
    }

    pub fn zero_ext(&self, width: usize) -> Bits {
        self.resize(width, false)
    }

    pub fn sign_ext(&self, width: usize) -> Bits {
        self.resize(width, true)
    }

    /// `self` becomes the high part, `low` the low part.
    pub fn concat(&self, low: &Bits) -> Bits {
        Bits {
            width: self.width + low.width,
            value: (&self.value << low.width) | &low.value,
        }
    }

    /// `width` bits starting at bit `start` (bit 0 is the LSB). Positions past
    /// the end of the pattern read as zero.
    pub fn slice(&self, start: usize, width: usize) -> Bits {
        Bits::new(width, &self.value >> start)
    }

    pub fn wrapping_add(&self, rhs: &Bits) -> Bits {
        Bits::new(self.width, &self.value + &rhs.value)
    }

    pub fn wrapping_sub(&self, rhs: &Bits) -> Bits {
        let biased = &self.value + (BigUint::one() << self.width);
        Bits::new(self.width, biased - &rhs.value)
    }

    pub fn wrapping_mul(&self, rhs: &Bits) -> Bits {
        Bits::new(self.width, &self.value * &rhs.value)
    }

    /// Unsigned division; dividing by zero yields all ones.
    pub fn udiv(&self, rhs: &Bits) -> Bits {
        if rhs.is_zero() {
            return Bits::all_ones(self.width);
        }
        Bits::new(self.width, &self.value / &rhs.value)
    }

    /// Signed division truncating toward zero. Dividing by zero saturates to
    /// the most positive or most negative value depending on the dividend.
    pub fn sdiv(&self, rhs: &Bits) -> Bits {
        if rhs.is_zero() {
            if self.width == 0 {
                return Bits::zero(0);
            }
            return if self.msb() {
                Bits { width: self.width, value: BigUint::one() << (self.width - 1) }
            } else {
                Bits { width: self.width, value: mask(self.width - 1) }
            };
        }
        let quotient = self.to_bigint(true) / rhs.to_bigint(true);
        Bits::from_bigint(self.width, &quotient)
    }

    pub fn and(&self, rhs: &Bits) -> Bits {
        Bits { width: self.width, value: &self.value & &rhs.value }
    }

    pub fn or(&self, rhs: &Bits) -> Bits {
        Bits::new(self.width, &self.value | &rhs.value)
    }

    pub fn xor(&self, rhs: &Bits) -> Bits {
        Bits::new(self.width, &self.value ^ &rhs.value)
    }

    pub fn not(&self) -> Bits {
        Bits { width: self.width, value: mask(self.width) ^ &self.value }
    }

    pub fn negate(&self) -> Bits {
        Bits::zero(self.width).wrapping_sub(self)
    }

    pub fn shl(&self, amount: usize) -> Bits {
        if amount >= self.width {
            return Bits::zero(self.width);
        }
        Bits::new(self.width, &self.value << amount)
    }

    pub fn shrl(&self, amount: usize) -> Bits {
        if amount >= self.width {
            return Bits::zero(self.width);
        }
        Bits { width: self.width, value: &self.value >> amount }
    }

    pub fn compare(&self, rhs: &Bits, signed: bool) -> Ordering {
        self.to_bigint(signed).cmp(&rhs.to_bigint(signed))
    }

    pub fn reverse(&self) -> Bits {
        let mut value = BigUint::zero();
        for i in 0..self.width {
            if self.bit(i) {
                value.set_bit((self.width - 1 - i) as u64, true);
            }
        }
        Bits { width: self.width, value }
    }

    pub fn leading_zeros(&self) -> usize {
        self.width - self.value.bits() as usize
    }

    pub fn trailing_zeros(&self) -> usize {
        self.value
            .trailing_zeros()
            .map(|t| t as usize)
            .unwrap_or(self.width)
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bits[{}]:{:#x}", self.width, self.value)
    }
}
