use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::ast::{EnumDef, Function, Module};
use crate::types::ConcreteType;
use crate::vm::builtins::Builtin;

pub mod bits;
pub use bits::Bits;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("{op}: expected a bits operand, got {kind}")]
    NotBits { op: &'static str, kind: &'static str },
    #[error("{op}: operand widths differ ({lhs} vs {rhs} bits)")]
    WidthMismatch { op: &'static str, lhs: usize, rhs: usize },
    #[error("{op}: cannot combine {lhs} with {rhs}")]
    KindMismatch { op: &'static str, lhs: &'static str, rhs: &'static str },
    #[error("index {index} is out of bounds for {kind} of length {len}")]
    IndexOutOfBounds { index: String, kind: &'static str, len: usize },
    #[error("can only index on array or tuple values, got {kind}")]
    NotIndexable { kind: &'static str },
    #[error("cannot flatten {kind} to bits")]
    NotFlattenable { kind: &'static str },
    #[error("{kind} has no bit representation of type {ty}")]
    Unflatten { kind: &'static str, ty: String },
}

type Result<T> = std::result::Result<T, ValueError>;

/// A callable value pushed ahead of a `call` instruction.
#[derive(Debug, Clone)]
pub enum FnRef {
    Builtin(Builtin),
    User { module: Rc<Module>, function: Rc<Function> },
}

impl PartialEq for FnRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FnRef::Builtin(a), FnRef::Builtin(b)) => a == b,
            (FnRef::User { function: a, .. }, FnRef::User { function: b, .. }) => {
                a.module == b.module && a.name == b.name
            }
            _ => false,
        }
    }
}

impl fmt::Display for FnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FnRef::Builtin(b) => write!(f, "builtin:{}", b.name()),
            FnRef::User { function, .. } => write!(f, "fn:{}", function.identifier()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Bits { signed: bool, bits: Bits },
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Enum { def: Rc<EnumDef>, bits: Bits },
    Token,
    Function(FnRef),
}

/// Bits compare bit-for-bit: width and pattern, not signedness.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bits { bits: a, .. }, Value::Bits { bits: b, .. }) => a == b,
            (Value::Array(a), Value::Array(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Enum { def: da, bits: a }, Value::Enum { def: db, bits: b }) => {
                da.name == db.name && a == b
            }
            (Value::Token, Value::Token) => true,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn ubits(width: usize, value: u64) -> Self {
        Value::Bits { signed: false, bits: Bits::from_u64(width, value) }
    }

    pub fn sbits(width: usize, value: i64) -> Self {
        Value::Bits { signed: true, bits: Bits::from_i64(width, value) }
    }

    pub fn from_bits(signed: bool, bits: Bits) -> Self {
        Value::Bits { signed, bits }
    }

    pub fn make_bool(value: bool) -> Self {
        Value::Bits { signed: false, bits: Bits::from_bool(value) }
    }

    pub fn unit() -> Self {
        Value::Tuple(Vec::new())
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Value::Function(FnRef::Builtin(builtin))
    }

    pub fn user_fn(module: Rc<Module>, function: Rc<Function>) -> Self {
        Value::Function(FnRef::User { module, function })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bits { signed: false, .. } => "ubits",
            Value::Bits { signed: true, .. } => "sbits",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Enum { .. } => "enum",
            Value::Token => "token",
            Value::Function(_) => "function",
        }
    }

    /// The underlying pattern of bits and enum values.
    pub fn as_bits(&self) -> Option<&Bits> {
        match self {
            Value::Bits { bits, .. } | Value::Enum { bits, .. } => Some(bits),
            _ => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            Value::Bits { signed, .. } => *signed,
            Value::Enum { def, .. } => def.signed,
            _ => false,
        }
    }

    /// True only for a 1-bit value with its bit set.
    pub fn is_true(&self) -> bool {
        matches!(self.as_bits(), Some(b) if b.width() == 1 && b.bit(0))
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(elements) | Value::Tuple(elements) => Some(elements.len()),
            _ => None,
        }
    }

    fn expect_bits(&self, op: &'static str) -> Result<&Bits> {
        self.as_bits().ok_or(ValueError::NotBits { op, kind: self.kind() })
    }

    fn same_width<'a>(&'a self, rhs: &'a Value, op: &'static str) -> Result<(&'a Bits, &'a Bits)> {
        let l = self.expect_bits(op)?;
        let r = rhs.expect_bits(op)?;
        if l.width() != r.width() {
            return Err(ValueError::WidthMismatch { op, lhs: l.width(), rhs: r.width() });
        }
        Ok((l, r))
    }

    fn binop(&self, rhs: &Value, op: &'static str, f: impl FnOnce(&Bits, &Bits) -> Bits) -> Result<Value> {
        let (l, r) = self.same_width(rhs, op)?;
        Ok(Value::from_bits(self.is_signed(), f(l, r)))
    }

    pub fn add(&self, rhs: &Value) -> Result<Value> {
        self.binop(rhs, "add", Bits::wrapping_add)
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value> {
        self.binop(rhs, "sub", Bits::wrapping_sub)
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value> {
        self.binop(rhs, "mul", Bits::wrapping_mul)
    }

    pub fn div(&self, rhs: &Value) -> Result<Value> {
        if self.is_signed() {
            self.binop(rhs, "div", Bits::sdiv)
        } else {
            self.binop(rhs, "div", Bits::udiv)
        }
    }

    pub fn bitwise_and(&self, rhs: &Value) -> Result<Value> {
        self.binop(rhs, "and", Bits::and)
    }

    pub fn bitwise_or(&self, rhs: &Value) -> Result<Value> {
        self.binop(rhs, "or", Bits::or)
    }

    pub fn bitwise_xor(&self, rhs: &Value) -> Result<Value> {
        self.binop(rhs, "xor", Bits::xor)
    }

    pub fn bitwise_not(&self) -> Result<Value> {
        let bits = self.expect_bits("invert")?;
        Ok(Value::from_bits(self.is_signed(), bits.not()))
    }

    pub fn arithmetic_negate(&self) -> Result<Value> {
        let bits = self.expect_bits("negate")?;
        Ok(Value::from_bits(self.is_signed(), bits.negate()))
    }

    /// The shift amount is read as unsigned and may have any width.
    fn shift_amount(amount: &Value, op: &'static str) -> Result<usize> {
        let bits = amount.expect_bits(op)?;
        Ok(bits.to_usize().unwrap_or(usize::MAX))
    }

    pub fn shl(&self, amount: &Value) -> Result<Value> {
        let bits = self.expect_bits("shll")?;
        let n = Value::shift_amount(amount, "shll")?;
        Ok(Value::from_bits(self.is_signed(), bits.shl(n)))
    }

    pub fn shrl(&self, amount: &Value) -> Result<Value> {
        let bits = self.expect_bits("shrl")?;
        let n = Value::shift_amount(amount, "shrl")?;
        Ok(Value::from_bits(self.is_signed(), bits.shrl(n)))
    }

    pub fn eq_value(&self, rhs: &Value) -> Value {
        Value::make_bool(self == rhs)
    }

    pub fn ne_value(&self, rhs: &Value) -> Value {
        Value::make_bool(self != rhs)
    }

    fn compare(&self, rhs: &Value, op: &'static str) -> Result<Ordering> {
        let (l, r) = self.same_width(rhs, op)?;
        Ok(l.compare(r, self.is_signed()))
    }

    pub fn lt(&self, rhs: &Value) -> Result<Value> {
        Ok(Value::make_bool(self.compare(rhs, "lt")? == Ordering::Less))
    }

    pub fn le(&self, rhs: &Value) -> Result<Value> {
        Ok(Value::make_bool(self.compare(rhs, "le")? != Ordering::Greater))
    }

    pub fn gt(&self, rhs: &Value) -> Result<Value> {
        Ok(Value::make_bool(self.compare(rhs, "gt")? == Ordering::Greater))
    }

    pub fn ge(&self, rhs: &Value) -> Result<Value> {
        Ok(Value::make_bool(self.compare(rhs, "ge")? != Ordering::Less))
    }

    /// Bits concatenate with `self` in the high part; arrays append.
    pub fn concat(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Array(a), Value::Array(b)) => {
                Ok(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
            }
            (Value::Bits { bits: a, .. }, Value::Bits { bits: b, .. }) => {
                Ok(Value::from_bits(false, a.concat(b)))
            }
            _ => Err(ValueError::KindMismatch { op: "concat", lhs: self.kind(), rhs: rhs.kind() }),
        }
    }

    pub fn index(&self, index: &Value) -> Result<Value> {
        let elements = match self {
            Value::Array(elements) | Value::Tuple(elements) => elements,
            _ => return Err(ValueError::NotIndexable { kind: self.kind() }),
        };
        let bits = index.expect_bits("index")?;
        bits.to_usize()
            .and_then(|i| elements.get(i))
            .cloned()
            .ok_or_else(|| ValueError::IndexOutOfBounds {
                index: index.to_string(),
                kind: self.kind(),
                len: elements.len(),
            })
    }

    /// Concatenates elements in order, element 0 in the most significant bits.
    pub fn flatten(&self) -> Result<Bits> {
        match self {
            Value::Bits { bits, .. } | Value::Enum { bits, .. } => Ok(bits.clone()),
            Value::Array(elements) => elements
                .iter()
                .try_fold(Bits::zero(0), |acc, e| -> Result<Bits> { Ok(acc.concat(&e.flatten()?)) }),
            _ => Err(ValueError::NotFlattenable { kind: self.kind() }),
        }
    }

    /// Inverse of `flatten`: carves `bits` into a value of type `ty`, taking
    /// leading members from the most significant end.
    pub fn from_flat_bits(bits: &Bits, ty: &ConcreteType) -> Result<Value> {
        let unflatten = || ValueError::Unflatten { kind: "bits", ty: ty.to_string() };
        if ty.total_bit_count() != Some(bits.width()) {
            return Err(unflatten());
        }
        match ty {
            ConcreteType::Bits { signed, .. } => Ok(Value::from_bits(*signed, bits.clone())),
            ConcreteType::Enum(def) => Ok(Value::Enum { def: def.clone(), bits: bits.clone() }),
            ConcreteType::Token => Ok(Value::Token),
            ConcreteType::Array { element, size } => {
                let stride = element.total_bit_count().ok_or_else(unflatten)?;
                (0..*size)
                    .map(|i| {
                        let start = (size - 1 - i) * stride;
                        Value::from_flat_bits(&bits.slice(start, stride), element)
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
            }
            ConcreteType::Tuple(members) => {
                let mut remaining = bits.width();
                members
                    .iter()
                    .map(|m| {
                        let width = m.total_bit_count().ok_or_else(unflatten)?;
                        remaining -= width;
                        Value::from_flat_bits(&bits.slice(remaining, width), m)
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Tuple)
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

/// The text form parsed back by the assembler.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bits { signed, bits } => {
                let prefix = if *signed { 's' } else { 'u' };
                write!(f, "{prefix}{}:{}", bits.width(), bits.to_bigint(*signed))
            }
            Value::Array(elements) => write_list(f, "[", elements, "]"),
            Value::Tuple(elements) => write_list(f, "(", elements, ")"),
            Value::Enum { def, bits } => match def.member_name(bits) {
                Some(member) => write!(f, "{}::{member}", def.name),
                None => write!(f, "{}:{}", def.name, bits.to_bigint(def.signed)),
            },
            Value::Token => write!(f, "token"),
            Value::Function(fn_ref) => write!(f, "{fn_ref}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EnumMember;

    fn color() -> Rc<EnumDef> {
        Rc::new(EnumDef {
            name: "Color".to_string(),
            signed: false,
            width: 2,
            members: vec![
                EnumMember { name: "Red".to_string(), value: Bits::from_u64(2, 0) },
                EnumMember { name: "Green".to_string(), value: Bits::from_u64(2, 1) },
            ],
        })
    }

    #[test]
    fn arithmetic_requires_matching_widths() {
        let a = Value::ubits(8, 3);
        assert_eq!(a.add(&Value::ubits(8, 4)).unwrap(), Value::ubits(8, 7));
        let err = a.add(&Value::ubits(4, 4)).unwrap_err();
        assert_eq!(err, ValueError::WidthMismatch { op: "add", lhs: 8, rhs: 4 });
        assert!(err.to_string().contains("8 vs 4"));
    }

    #[test]
    fn arithmetic_rejects_aggregates() {
        let err = Value::Tuple(vec![]).add(&Value::ubits(8, 1)).unwrap_err();
        assert_eq!(err, ValueError::NotBits { op: "add", kind: "tuple" });
    }

    #[test]
    fn signedness_drives_division_and_comparison() {
        let a = Value::sbits(8, -6);
        let b = Value::sbits(8, 4);
        assert_eq!(a.div(&b).unwrap(), Value::sbits(8, -1));
        assert!(a.lt(&b).unwrap().is_true());

        let ua = Value::from_bits(false, Bits::from_i64(8, -6));
        let ub = Value::ubits(8, 4);
        assert!(ua.gt(&ub).unwrap().is_true());
        assert_eq!(ua.div(&ub).unwrap(), Value::ubits(8, 250 / 4));
    }

    #[test]
    fn equality_is_bit_for_bit() {
        assert_eq!(Value::ubits(8, 255), Value::sbits(8, -1));
        assert_ne!(Value::ubits(8, 1), Value::ubits(4, 1));
        assert!(Value::Token.eq_value(&Value::Token).is_true());
        assert!(!Value::ubits(8, 1).eq_value(&Value::Token).is_true());
    }

    #[test]
    fn concat_bits_and_arrays() {
        let v = Value::ubits(4, 0xa).concat(&Value::sbits(4, 5)).unwrap();
        assert_eq!(v, Value::ubits(8, 0xa5));
        assert!(!v.is_signed());

        let arr = Value::Array(vec![Value::ubits(8, 1)])
            .concat(&Value::Array(vec![Value::ubits(8, 2)]))
            .unwrap();
        assert_eq!(arr, Value::Array(vec![Value::ubits(8, 1), Value::ubits(8, 2)]));
        assert!(Value::Token.concat(&Value::Token).is_err());
    }

    #[test]
    fn index_bounds() {
        let t = Value::Tuple(vec![Value::ubits(8, 1), Value::Token]);
        assert_eq!(t.index(&Value::ubits(32, 1)).unwrap(), Value::Token);
        let err = t.index(&Value::ubits(32, 2)).unwrap_err();
        assert!(matches!(err, ValueError::IndexOutOfBounds { len: 2, .. }));
        assert_eq!(
            Value::ubits(8, 0).index(&Value::ubits(32, 0)).unwrap_err(),
            ValueError::NotIndexable { kind: "ubits" }
        );
    }

    #[test]
    fn flatten_puts_first_element_high() {
        let arr = Value::Array(vec![Value::ubits(4, 0x1), Value::ubits(4, 0x2)]);
        assert_eq!(arr.flatten().unwrap(), Bits::from_u64(8, 0x12));
        let ty = ConcreteType::array(ConcreteType::ubits(4), 2);
        assert_eq!(Value::from_flat_bits(&Bits::from_u64(8, 0x12), &ty).unwrap(), arr);
    }

    #[test]
    fn unflatten_nested_and_tuple() {
        let ty = ConcreteType::Tuple(vec![
            ConcreteType::ubits(4),
            ConcreteType::array(ConcreteType::sbits(2), 2),
        ]);
        let v = Value::from_flat_bits(&Bits::from_u64(8, 0b1001_1101), &ty).unwrap();
        assert_eq!(
            v,
            Value::Tuple(vec![
                Value::ubits(4, 0b1001),
                Value::Array(vec![Value::sbits(2, -1), Value::sbits(2, 1)]),
            ])
        );
        assert!(Value::from_flat_bits(&Bits::zero(7), &ty).is_err());

        let huge = ConcreteType::array(ConcreteType::array(ConcreteType::ubits(8), usize::MAX), 4);
        assert!(matches!(
            Value::from_flat_bits(&Bits::zero(8), &huge),
            Err(ValueError::Unflatten { .. })
        ));
    }

    #[test]
    fn display_text_forms() {
        assert_eq!(Value::ubits(8, 13).to_string(), "u8:13");
        assert_eq!(Value::sbits(8, -1).to_string(), "s8:-1");
        let nested = Value::Tuple(vec![
            Value::Array(vec![Value::ubits(2, 1), Value::ubits(2, 3)]),
            Value::unit(),
            Value::Token,
        ]);
        assert_eq!(nested.to_string(), "([u2:1, u2:3], (), token)");
        let def = color();
        assert_eq!(Value::Enum { def: def.clone(), bits: Bits::from_u64(2, 1) }.to_string(), "Color::Green");
        assert_eq!(Value::Enum { def, bits: Bits::from_u64(2, 3) }.to_string(), "Color:3");
        assert_eq!(Value::builtin(Builtin::AssertEq).to_string(), "builtin:assert_eq");
    }
}
