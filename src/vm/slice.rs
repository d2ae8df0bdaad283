//! Bit slicing. Bounds are arbitrary-precision so out-of-range indices clamp
//! rather than wrap.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::types::ConcreteType;
use crate::value::{Bits, Value};
use super::{VmError, VmResult};

fn basis_bits<'a>(basis: &'a Value, op: &str) -> VmResult<&'a Bits> {
    basis
        .as_bits()
        .ok_or_else(|| VmError::InvalidArgument(format!("{op}: cannot slice a {} value", basis.kind())))
}

fn index_of(index: &Value, op: &str) -> VmResult<BigInt> {
    index
        .as_bits()
        .map(|b| b.to_bigint(index.is_signed()))
        .ok_or_else(|| VmError::InvalidArgument(format!("{op}: index must be bits, got {}", index.kind())))
}

fn to_offset(n: &BigInt, what: &str) -> VmResult<usize> {
    n.to_usize()
        .ok_or_else(|| VmError::Internal(format!("slice {what} {n} is not representable")))
}

/// Python-style `[start:limit]`: negative bounds count from the end and
/// everything is clamped into the basis. The result is unsigned.
pub(super) fn bounds_slice(basis: &Value, start: &Value, limit: &Value) -> VmResult<Value> {
    let bits = basis_bits(basis, "slice")?;
    let width = BigInt::from(bits.width());
    let clamp_low = |mut n: BigInt| {
        if n.is_negative() {
            n += &width;
            if n.is_negative() {
                n = BigInt::zero();
            }
        }
        n
    };

    let start = clamp_low(index_of(start, "slice")?);
    let mut limit = clamp_low(index_of(limit, "slice")?);
    if limit > width {
        limit = width.clone();
    }
    let length = &limit - &start;
    if length.is_negative() {
        return Err(VmError::Internal(format!(
            "slice length is negative: start {start}, limit {limit}"
        )));
    }

    let start = to_offset(&start, "start")?;
    let length = to_offset(&length, "length")?;
    Ok(Value::from_bits(false, bits.slice(start, length)))
}

/// `[start +: ty]`: a fixed-width window. Bits past the end of the basis read
/// as zero; the result takes the signedness of `ty`.
pub(super) fn width_slice(basis: &Value, start: &Value, ty: &ConcreteType) -> VmResult<Value> {
    let ConcreteType::Bits { signed, width } = ty else {
        return Err(VmError::Internal(format!("width_slice needs a bits type, got {ty}")));
    };
    let bits = basis_bits(basis, "width_slice")?;
    let start = index_of(start, "width_slice")?;
    if start.is_negative() {
        return Err(VmError::InvalidArgument(format!(
            "width_slice start must be non-negative, got {start}"
        )));
    }

    let basis_width = bits.width();
    let start = start.to_usize().unwrap_or(usize::MAX).min(basis_width);
    let length = if start.saturating_add(*width) >= basis_width {
        basis_width - start
    } else {
        *width
    };

    let mut window = bits.slice(start, length);
    if window.width() < *width {
        window = window.zero_ext(*width);
    }
    Ok(Value::from_bits(*signed, window))
}
