// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
#![allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::float_cmp,
    clippy::arithmetic_side_effects
)]

//! Evaluated constant values.
//!
//! Arithmetic follows the source language's untyped-constant promotion: any
//! float operand makes the result a float, otherwise integers are computed
//! through `i128` and narrowed back to a signed or unsigned 64-bit width.
//! Anything unrepresentable (overflow, division by zero, shift out of range,
//! operand kind mismatch) is `None`, the "no value" sentinel callers treat
//! as "omit this member".

use crate::Str;
use core::fmt;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    String(Str),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a == b,
            (Uint(a), Uint(b)) => a == b,
            (Int(a), Uint(b)) | (Uint(b), Int(a)) => *a >= 0 && *a as u64 == *b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => *a as f64 == *b,
            (Uint(a), Float(b)) | (Float(b), Uint(a)) => *a as f64 == *b,
            (String(a), String(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Uint(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
        }
    }
}

struct ValueVisitor;

impl Visitor<'_> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or string")
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Value, E> {
        if v <= i64::MAX as u64 {
            Ok(Value::Int(v as i64))
        } else {
            Ok(Value::Uint(v))
        }
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.into()))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl Value {
    pub(crate) fn from_i128(v: i128) -> Option<Value> {
        if let Ok(x) = i64::try_from(v) {
            Some(Value::Int(x))
        } else if let Ok(x) = u64::try_from(v) {
            Some(Value::Uint(x))
        } else {
            None
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(i128::from(*v)),
            Value::Uint(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::String(_) => None,
        }
    }

    /// Two's-complement 64-bit view for bitwise operators.
    fn as_bits(&self) -> Option<u64> {
        match self {
            Value::Int(v) => Some(*v as u64),
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    fn any_float(&self, rhs: &Value) -> bool {
        matches!(self, Value::Float(_)) || matches!(rhs, Value::Float(_))
    }

    /// Bitwise results stay unsigned only when both operands are unsigned.
    fn bits_result(&self, rhs: &Value, v: u64) -> Value {
        if matches!(self, Value::Uint(_)) && matches!(rhs, Value::Uint(_)) {
            Value::Uint(v)
        } else {
            Value::Int(v as i64)
        }
    }

    pub fn add(&self, rhs: &Value) -> Option<Value> {
        if let (Value::String(a), Value::String(b)) = (self, rhs) {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            return Some(Value::String(s.into()));
        }
        if self.any_float(rhs) {
            return Some(Value::Float(self.as_f64()? + rhs.as_f64()?));
        }
        Value::from_i128(self.as_i128()? + rhs.as_i128()?)
    }

    pub fn sub(&self, rhs: &Value) -> Option<Value> {
        if self.any_float(rhs) {
            return Some(Value::Float(self.as_f64()? - rhs.as_f64()?));
        }
        Value::from_i128(self.as_i128()? - rhs.as_i128()?)
    }

    pub fn mul(&self, rhs: &Value) -> Option<Value> {
        if self.any_float(rhs) {
            return Some(Value::Float(self.as_f64()? * rhs.as_f64()?));
        }
        Value::from_i128(self.as_i128()?.checked_mul(rhs.as_i128()?)?)
    }

    pub fn div(&self, rhs: &Value) -> Option<Value> {
        if self.any_float(rhs) {
            let b = rhs.as_f64()?;
            if b == 0.0 {
                return None;
            }
            return Some(Value::Float(self.as_f64()? / b));
        }
        Value::from_i128(self.as_i128()?.checked_div(rhs.as_i128()?)?)
    }

    pub fn rem(&self, rhs: &Value) -> Option<Value> {
        Value::from_i128(self.as_i128()?.checked_rem(rhs.as_i128()?)?)
    }

    pub fn and(&self, rhs: &Value) -> Option<Value> {
        Some(self.bits_result(rhs, self.as_bits()? & rhs.as_bits()?))
    }

    pub fn or(&self, rhs: &Value) -> Option<Value> {
        Some(self.bits_result(rhs, self.as_bits()? | rhs.as_bits()?))
    }

    pub fn xor(&self, rhs: &Value) -> Option<Value> {
        Some(self.bits_result(rhs, self.as_bits()? ^ rhs.as_bits()?))
    }

    pub fn and_not(&self, rhs: &Value) -> Option<Value> {
        Some(self.bits_result(rhs, self.as_bits()? & !rhs.as_bits()?))
    }

    /// Shift counts coerce to an unsigned width; negative or >63 is out of
    /// range.
    fn shift_amount(&self) -> Option<u32> {
        match self {
            Value::Int(v) if (0..=63).contains(v) => Some(*v as u32),
            Value::Uint(v) if *v <= 63 => Some(*v as u32),
            _ => None,
        }
    }

    pub fn shl(&self, rhs: &Value) -> Option<Value> {
        let n = rhs.shift_amount()?;
        match self {
            Value::Int(v) => Value::from_i128(i128::from(*v) << n),
            Value::Uint(v) => {
                let r = u128::from(*v) << n;
                u64::try_from(r).ok().map(Value::Uint)
            }
            _ => None,
        }
    }

    pub fn shr(&self, rhs: &Value) -> Option<Value> {
        let n = rhs.shift_amount()?;
        match self {
            Value::Int(v) => Some(Value::Int(v >> n)),
            Value::Uint(v) => Some(Value::Uint(v >> n)),
            _ => None,
        }
    }

    pub fn neg(&self) -> Option<Value> {
        match self {
            Value::Float(v) => Some(Value::Float(-v)),
            _ => Value::from_i128(-self.as_i128()?),
        }
    }

    pub fn bit_not(&self) -> Option<Value> {
        match self {
            Value::Int(v) => Some(Value::Int(!v)),
            Value::Uint(v) => Some(Value::Uint(!v)),
            _ => None,
        }
    }

    /// Integer view for conversions; floats qualify only when integral.
    fn integral(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(i128::from(*v)),
            Value::Uint(v) => Some(i128::from(*v)),
            Value::Float(v) if v.fract() == 0.0 && v.abs() < (u64::MAX as f64) => Some(*v as i128),
            _ => None,
        }
    }

    /// Explicit conversion to a named primitive type, with machine
    /// wrap-on-narrow semantics.
    pub fn convert(&self, target: &str) -> Option<Value> {
        match target {
            "int" | "int64" => Some(Value::Int(self.integral()? as i64)),
            "int32" | "rune" => Some(Value::Int(i64::from(self.integral()? as i32))),
            "int16" => Some(Value::Int(i64::from(self.integral()? as i16))),
            "int8" => Some(Value::Int(i64::from(self.integral()? as i8))),
            "uint" | "uint64" => Some(Value::Uint(self.integral()? as u64)),
            "uint32" => Some(Value::Uint(u64::from(self.integral()? as u32))),
            "uint16" => Some(Value::Uint(u64::from(self.integral()? as u16))),
            "uint8" | "byte" => Some(Value::Uint(u64::from(self.integral()? as u8))),
            "float64" => Some(Value::Float(self.as_f64()?)),
            "float32" => Some(Value::Float(self.as_f64()? as f32 as f64)),
            "string" => match self {
                Value::String(_) => Some(self.clone()),
                _ => {
                    let scalar = u32::try_from(self.integral()?).ok()?;
                    let c = char::from_u32(scalar)?;
                    Some(Value::String(String::from(c).into()))
                }
            },
            _ => None,
        }
    }
}
