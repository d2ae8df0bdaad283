//! Value conversions for the `cast` instruction.

use crate::types::ConcreteType;
use crate::value::Value;
use super::{VmError, VmResult};

/// Converts `from` to `to` following the language's cast rules.
pub(super) fn cast(from: Value, to: &ConcreteType) -> VmResult<Value> {
    match from {
        Value::Array(_) => {
            let ConcreteType::Bits { signed, width } = to else {
                return Err(VmError::InvalidArgument(format!(
                    "array values can only be cast to bits, not {to}"
                )));
            };
            let flat = from.flatten()?;
            // Stricter than a plain flatten: the width must match the target
            // exactly and the result takes the target's signedness.
            if flat.width() != *width {
                return Err(VmError::InvalidArgument(format!(
                    "cast from array had mismatching bit counts: from {} to {width}",
                    flat.width()
                )));
            }
            Ok(Value::from_bits(*signed, flat))
        }
        Value::Enum { def, bits } => {
            if !to.is_bits() {
                return Err(VmError::InvalidArgument(format!(
                    "enum values can only be cast to bits, not {to}"
                )));
            }
            Ok(Value::from_bits(def.signed, bits))
        }
        Value::Bits { signed, bits } => match to {
            ConcreteType::Array { .. } => {
                let want = to.total_bit_count().ok_or_else(|| {
                    VmError::InvalidArgument(format!("cast target {to} has too many bits"))
                })?;
                if bits.width() != want {
                    return Err(VmError::InvalidArgument(format!(
                        "cast to array had mismatching bit counts: from {} to {want}",
                        bits.width()
                    )));
                }
                Ok(Value::from_flat_bits(&bits, to)?)
            }
            ConcreteType::Enum(def) => {
                let bits = if bits.width() == def.width { bits } else { bits.resize(def.width, signed) };
                Ok(Value::Enum { def: def.clone(), bits })
            }
            ConcreteType::Bits { signed: to_signed, width } => {
                let bits = if bits.width() == *width { bits } else { bits.resize(*width, signed) };
                Ok(Value::from_bits(*to_signed, bits))
            }
            _ => Err(VmError::InvalidArgument(format!(
                "bits can only be cast to arrays, enums or other bits types, not {to}"
            ))),
        },
        other => Err(VmError::InvalidArgument(format!(
            "only casts from arrays, enums and bits are supported, got {}",
            other.kind()
        ))),
    }
}
