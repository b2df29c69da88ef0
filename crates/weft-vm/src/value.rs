//! Runtime values.
//!
//! A `Value` is either a primitive (null, integer, float) or a handle to a
//! heap object. The handle carries the kind in its discriminant, so type
//! tests never touch the heap.
//!
//! Operator families and their admissible operand types:
//!
//! | Family | Operands | Result |
//! |---|---|---|
//! | arithmetic `+ - * neg` | both numeric | Int except any Float operand promotes |
//! | division `/` | both numeric | always Float |
//! | integer `% << >> \| & ^` | both Int | Int |
//! | logical `and or not` | any | `Int(1)` / `Null` |
//! | comparison `< <= > >=` | both numeric | `Int(1)` / `Null` |
//!
//! Inadmissible operands make an operation fail softly by returning Null.
//! Equality needs heap access (string contents, external-function ids) and
//! lives on [`Heap`](crate::heap::Heap).

use crate::heap::ObjId;

// Raw kind discriminants. These are wire-stable: the serializer writes the
// full tag (raw kind plus flag bits) verbatim.
pub const RAW_NULL: i32 = 0x00;
pub const RAW_INTEGER: i32 = 0x01;
pub const RAW_FLOAT: i32 = 0x02;
pub const RAW_TABLE: i32 = 0x03;
pub const RAW_ARRAY: i32 = 0x04;
pub const RAW_STRING: i32 = 0x05;
pub const RAW_FUNCTION: i32 = 0x06;
pub const RAW_EXTFUNC: i32 = 0x07;
pub const RAW_USERDATA: i32 = 0x08;
pub const RAW_THREAD: i32 = 0x09;

/// Tag flag: the value is numeric (integer or float).
pub const IS_NUMERIC: i32 = 0x1000;
/// Tag flag: the value references a heap object.
pub const IS_OBJECT: i32 = 0x2000;

/// A runtime value: primitive payload or heap handle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Int(i32),
    Float(f32),
    String(ObjId),
    Array(ObjId),
    Table(ObjId),
    Function(ObjId),
    ExtFunc(ObjId),
    UserData(ObjId),
    Thread(ObjId),
}

impl Value {
    /// Canonical true: `Int(1)`.
    pub const TRUE: Value = Value::Int(1);
    /// Canonical false: `Null`.
    pub const FALSE: Value = Value::Null;

    /// Convert a bool to the canonical truth values.
    pub fn truth(b: bool) -> Value {
        if b { Value::TRUE } else { Value::FALSE }
    }

    /// The wire tag: raw kind discriminant plus flag bits.
    pub fn tag(&self) -> i32 {
        match self {
            Value::Null => RAW_NULL,
            Value::Int(_) => RAW_INTEGER | IS_NUMERIC,
            Value::Float(_) => RAW_FLOAT | IS_NUMERIC,
            Value::Table(_) => RAW_TABLE | IS_OBJECT,
            Value::Array(_) => RAW_ARRAY | IS_OBJECT,
            Value::String(_) => RAW_STRING | IS_OBJECT,
            Value::Function(_) => RAW_FUNCTION | IS_OBJECT,
            Value::ExtFunc(_) => RAW_EXTFUNC | IS_OBJECT,
            Value::UserData(_) => RAW_USERDATA | IS_OBJECT,
            Value::Thread(_) => RAW_THREAD | IS_OBJECT,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness: null is false, everything else is true.
    pub fn is_true(&self) -> bool {
        !self.is_null()
    }

    pub fn is_false(&self) -> bool {
        self.is_null()
    }

    pub fn is_numeric(&self) -> bool {
        self.tag() & IS_NUMERIC != 0
    }

    pub fn is_object(&self) -> bool {
        self.tag() & IS_OBJECT != 0
    }

    /// The heap handle, if this value references an object.
    pub fn obj_id(&self) -> Option<ObjId> {
        match self {
            Value::String(id)
            | Value::Array(id)
            | Value::Table(id)
            | Value::Function(id)
            | Value::ExtFunc(id)
            | Value::UserData(id)
            | Value::Thread(id) => Some(*id),
            _ => None,
        }
    }

    /// The kind name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::ExtFunc(_) => "external_function",
            Value::UserData(_) => "userdata",
            Value::Thread(_) => "thread",
        }
    }

    /// The numeric payload widened to float, if numeric.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Int(i) => Some(*i as f32),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    // ========================================================================
    // Arithmetic: Int op Int stays Int (wrapping), any Float promotes.
    // ========================================================================

    pub fn op_add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
            (Value::Int(a), Value::Float(b)) => Value::Float(*a as f32 + b),
            (Value::Float(a), Value::Int(b)) => Value::Float(a + *b as f32),
            (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            _ => Value::Null,
        }
    }

    pub fn op_sub(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
            (Value::Int(a), Value::Float(b)) => Value::Float(*a as f32 - b),
            (Value::Float(a), Value::Int(b)) => Value::Float(a - *b as f32),
            (Value::Float(a), Value::Float(b)) => Value::Float(a - b),
            _ => Value::Null,
        }
    }

    pub fn op_mul(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
            (Value::Int(a), Value::Float(b)) => Value::Float(*a as f32 * b),
            (Value::Float(a), Value::Int(b)) => Value::Float(a * *b as f32),
            (Value::Float(a), Value::Float(b)) => Value::Float(a * b),
            _ => Value::Null,
        }
    }

    /// Division always yields Float, even for two integer operands.
    pub fn op_div(&self, other: &Value) -> Value {
        match (self.as_float(), other.as_float()) {
            (Some(a), Some(b)) => Value::Float(a / b),
            _ => Value::Null,
        }
    }

    pub fn op_neg(&self) -> Value {
        match self {
            Value::Int(i) => Value::Int(i.wrapping_neg()),
            Value::Float(f) => Value::Float(-f),
            _ => Value::Null,
        }
    }

    // ========================================================================
    // Integer-only operations.
    // ========================================================================

    /// Modulo. A zero divisor fails softly (the VM must not trap).
    pub fn op_modulo(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => Value::Null,
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_rem(*b)),
            _ => Value::Null,
        }
    }

    /// Left shift. Negative shift counts fail softly; counts are taken mod 32.
    pub fn op_shl(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => Value::Int(a.wrapping_shl(*b as u32)),
            _ => Value::Null,
        }
    }

    /// Arithmetic right shift. Negative shift counts fail softly.
    pub fn op_shr(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => Value::Int(a.wrapping_shr(*b as u32)),
            _ => Value::Null,
        }
    }

    pub fn op_bitor(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a | b),
            _ => Value::Null,
        }
    }

    pub fn op_bitand(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a & b),
            _ => Value::Null,
        }
    }

    pub fn op_bitxor(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a ^ b),
            _ => Value::Null,
        }
    }

    // ========================================================================
    // Logical operations. Results are canonical truth values.
    // ========================================================================

    pub fn op_booland(&self, other: &Value) -> Value {
        Value::truth(self.is_true() && other.is_true())
    }

    pub fn op_boolor(&self, other: &Value) -> Value {
        Value::truth(self.is_true() || other.is_true())
    }

    pub fn op_boolnot(&self) -> Value {
        Value::truth(self.is_null())
    }

    // ========================================================================
    // Comparison. Numeric promotion as for arithmetic; non-numeric operands
    // compare false.
    // ========================================================================

    pub fn op_lt(&self, other: &Value) -> Value {
        self.compare(other, |a, b| a < b, |a, b| a < b)
    }

    pub fn op_gt(&self, other: &Value) -> Value {
        self.compare(other, |a, b| a > b, |a, b| a > b)
    }

    pub fn op_le(&self, other: &Value) -> Value {
        self.compare(other, |a, b| a <= b, |a, b| a <= b)
    }

    pub fn op_ge(&self, other: &Value) -> Value {
        self.compare(other, |a, b| a >= b, |a, b| a >= b)
    }

    fn compare(
        &self,
        other: &Value,
        int_cmp: impl Fn(i32, i32) -> bool,
        float_cmp: impl Fn(f32, f32) -> bool,
    ) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::truth(int_cmp(*a, *b)),
            (Value::Int(a), Value::Float(b)) => Value::truth(float_cmp(*a as f32, *b)),
            (Value::Float(a), Value::Int(b)) => Value::truth(float_cmp(*a, *b as f32)),
            (Value::Float(a), Value::Float(b)) => Value::truth(float_cmp(*a, *b)),
            _ => Value::FALSE,
        }
    }
}
