//! Heap object kinds and their shared capability surface.
//!
//! Every reference-typed value exposes the same capabilities: key/value get
//! and set, iteration, clone, string rendering and a GC mark hook. The
//! concrete kinds are a single sum type; dispatch lives on [`Heap`] because
//! almost every operation needs heap access for something — string member
//! lookup allocates external-function values, table keys hash through string
//! objects, rendering reads nested objects.
//!
//! Key equality follows the script `==` operator: numeric values compare
//! across Int/Float, strings by content, external functions by symbolic id,
//! everything else by identity. Because `1 == 1.0` must hold for table keys
//! too, numeric keys are canonicalized: a Float key that is exactly
//! representable as an Int is stored and hashed as that Int.

use std::any::Any;
use std::fmt;

use crate::array::ArrayObj;
use crate::function::FunctionObj;
use crate::heap::{Heap, ObjId};
use crate::string::{hash_bytes, StrObj};
use crate::table::TableObj;
use crate::thread::ThreadObj;
use crate::value::Value;

/// An external function: a symbolic id resolved against the module registry
/// at call time, so snapshots survive native relocation across runs.
#[derive(Clone, Debug)]
pub struct ExtFuncObj {
    pub symbol: String,
}

impl ExtFuncObj {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

/// Opaque host-defined datum. Serialization is delegated to a host handler
/// registered under `tag`.
pub struct UserDataObj {
    pub tag: String,
    pub data: Box<dyn Any>,
}

impl UserDataObj {
    pub fn new(tag: impl Into<String>, data: Box<dyn Any>) -> Self {
        Self {
            tag: tag.into(),
            data,
        }
    }
}

impl fmt::Debug for UserDataObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDataObj")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// A heap object.
#[derive(Debug)]
pub enum Object {
    Str(StrObj),
    Array(ArrayObj),
    Table(TableObj),
    Function(FunctionObj),
    ExtFunc(ExtFuncObj),
    UserData(UserDataObj),
    Thread(ThreadObj),
}

/// Render depth cap for nested containers, so self-referential arrays do not
/// recurse without bound while printing.
const MAX_RENDER_DEPTH: usize = 8;

impl Heap {
    // ========================================================================
    // Typed accessors
    // ========================================================================

    pub fn string(&self, id: ObjId) -> Option<&StrObj> {
        match self.body(id) {
            Some(Object::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn string_mut(&mut self, id: ObjId) -> Option<&mut StrObj> {
        match self.body_mut(id) {
            Some(Object::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn array(&self, id: ObjId) -> Option<&ArrayObj> {
        match self.body(id) {
            Some(Object::Array(a)) => Some(a),
            _ => None,
        }
    }

    pub fn array_mut(&mut self, id: ObjId) -> Option<&mut ArrayObj> {
        match self.body_mut(id) {
            Some(Object::Array(a)) => Some(a),
            _ => None,
        }
    }

    pub fn table(&self, id: ObjId) -> Option<&TableObj> {
        match self.body(id) {
            Some(Object::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn table_mut(&mut self, id: ObjId) -> Option<&mut TableObj> {
        match self.body_mut(id) {
            Some(Object::Table(t)) => Some(t),
            _ => None,
        }
    }

    pub fn function(&self, id: ObjId) -> Option<&FunctionObj> {
        match self.body(id) {
            Some(Object::Function(f)) => Some(f),
            _ => None,
        }
    }

    pub fn extfunc(&self, id: ObjId) -> Option<&ExtFuncObj> {
        match self.body(id) {
            Some(Object::ExtFunc(e)) => Some(e),
            _ => None,
        }
    }

    pub fn userdata(&self, id: ObjId) -> Option<&UserDataObj> {
        match self.body(id) {
            Some(Object::UserData(u)) => Some(u),
            _ => None,
        }
    }

    pub fn thread(&self, id: ObjId) -> Option<&ThreadObj> {
        match self.body(id) {
            Some(Object::Thread(t)) => Some(t),
            _ => None,
        }
    }

    pub fn thread_mut(&mut self, id: ObjId) -> Option<&mut ThreadObj> {
        match self.body_mut(id) {
            Some(Object::Thread(t)) => Some(t),
            _ => None,
        }
    }

    // ========================================================================
    // Allocation helpers
    // ========================================================================

    pub fn new_string(&mut self, s: impl Into<Vec<u8>>) -> Value {
        Value::String(self.alloc(Object::Str(StrObj::new(s))))
    }

    pub fn new_array(&mut self) -> Value {
        Value::Array(self.alloc(Object::Array(ArrayObj::new())))
    }

    pub fn new_table(&mut self) -> Value {
        Value::Table(self.alloc(Object::Table(TableObj::new())))
    }

    pub fn new_function(&mut self, func: FunctionObj) -> Value {
        Value::Function(self.alloc(Object::Function(func)))
    }

    pub fn new_extfunc(&mut self, symbol: impl Into<String>) -> Value {
        Value::ExtFunc(self.alloc(Object::ExtFunc(ExtFuncObj::new(symbol))))
    }

    pub fn new_userdata(&mut self, tag: impl Into<String>, data: Box<dyn Any>) -> Value {
        Value::UserData(self.alloc(Object::UserData(UserDataObj::new(tag, data))))
    }

    // ========================================================================
    // Keyed access
    // ========================================================================

    /// Read `obj[key]`. Absence and inadmissible keys read as Null; get on a
    /// non-object is the caller's error to report.
    pub fn get_key(&mut self, obj: Value, key: &Value) -> Value {
        let Some(id) = obj.obj_id() else {
            return Value::Null;
        };
        match self.body(id) {
            Some(Object::Array(a)) => match key {
                Value::Int(i) => a.get(*i).unwrap_or(Value::Null),
                Value::String(sid) => {
                    let len = a.len();
                    if self.string(*sid).is_some_and(|s| s.bytes() == b"n") {
                        Value::Int(len as i32)
                    } else {
                        Value::Null
                    }
                }
                _ => Value::Null,
            },
            Some(Object::Table(_)) => {
                let hash = self.key_hash(key);
                let key = self.canonical_key(*key);
                let this = &*self;
                let Some(t) = this.table(id) else {
                    return Value::Null;
                };
                match t.find(hash, |k| this.values_equal(k, &key)) {
                    Some(idx) => t.entries()[idx].value,
                    None => Value::Null,
                }
            }
            Some(Object::Str(_)) => match self.key_text(key).as_deref() {
                Some("length") => self.new_extfunc("sys_string_length"),
                Some("concat") => self.new_extfunc("sys_string_concat"),
                Some("substr") => self.new_extfunc("sys_string_substr"),
                Some("replace") => self.new_extfunc("sys_string_replace"),
                _ => Value::Null,
            },
            Some(Object::Thread(t)) => {
                let result = t.result;
                match self.key_text(key).as_deref() {
                    Some("kill") => self.new_extfunc("sys_thread_kill"),
                    Some("isrunning") => self.new_extfunc("sys_thread_isrunning"),
                    Some("suspend") => self.new_extfunc("sys_thread_suspend"),
                    Some("resume") => self.new_extfunc("sys_thread_resume"),
                    Some("result") => result,
                    _ => Value::Null,
                }
            }
            // Functions, external functions and userdata have no members.
            _ => Value::Null,
        }
    }

    /// Write `obj[key] = value`. Kinds without keyed storage ignore the write.
    pub fn set_key(&mut self, obj: Value, key: Value, value: Value) {
        let Some(id) = obj.obj_id() else {
            return;
        };
        match self.body(id) {
            Some(Object::Array(_)) => {
                if let Value::Int(i) = key {
                    if let Some(a) = self.array_mut(id) {
                        a.set(i, value);
                    }
                }
            }
            Some(Object::Table(_)) => {
                let hash = self.key_hash(&key);
                let key = self.canonical_key(key);
                let found = {
                    let this = &*self;
                    let Some(t) = this.table(id) else { return };
                    t.find(hash, |k| this.values_equal(k, &key))
                };
                let Some(t) = self.table_mut(id) else { return };
                match found {
                    Some(idx) => t.set_at(idx, value),
                    None => t.insert(hash, key, value),
                }
            }
            // Strings, functions, external functions, userdata and threads
            // ignore keyed writes.
            _ => {}
        }
    }

    /// Iteration entry for `obj`.
    pub fn begin(&self, obj: Value) -> Value {
        match obj.obj_id().and_then(|id| self.body(id)) {
            Some(Object::Array(a)) => a.begin(),
            Some(Object::Table(t)) => t.begin(),
            _ => Value::Null,
        }
    }

    /// Iteration step for `obj`: (next iterator, key, value).
    pub fn next(&self, obj: Value, iterator: Value) -> (Value, Value, Value) {
        match obj.obj_id().and_then(|id| self.body(id)) {
            Some(Object::Array(a)) => a.next(iterator),
            Some(Object::Table(t)) => t.next(iterator),
            _ => (Value::Null, Value::Null, Value::Null),
        }
    }

    // ========================================================================
    // Clone
    // ========================================================================

    /// Clone a value. Primitives copy; arrays and tables copy their element
    /// storage but share inner object references; strings copy their bytes;
    /// functions, external functions and userdata alias themselves. Threads
    /// cannot be cloned: None.
    pub fn clone_value(&mut self, value: Value) -> Option<Value> {
        let Some(id) = value.obj_id() else {
            return Some(value);
        };
        match self.body(id) {
            Some(Object::Str(s)) => {
                let bytes = s.bytes().to_vec();
                Some(self.new_string(bytes))
            }
            Some(Object::Array(a)) => {
                let elements = a.elements().to_vec();
                Some(Value::Array(
                    self.alloc(Object::Array(ArrayObj::from_elements(elements))),
                ))
            }
            Some(Object::Table(t)) => {
                let copy = t.clone();
                Some(Value::Table(self.alloc(Object::Table(copy))))
            }
            Some(Object::Function(_)) | Some(Object::ExtFunc(_)) | Some(Object::UserData(_)) => {
                Some(value)
            }
            Some(Object::Thread(_)) => None,
            None => Some(Value::Null),
        }
    }

    // ========================================================================
    // Equality, hashing, rendering
    // ========================================================================

    /// The script `==` relation.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        // Numbers compare across Int/Float.
        if a.is_numeric() && b.is_numeric() {
            return match (a, b) {
                (Value::Int(x), Value::Int(y)) => x == y,
                _ => a.as_float() == b.as_float(),
            };
        }
        // Different types other than numeric ones are never equal.
        if a.tag() != b.tag() {
            return false;
        }
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::String(x), Value::String(y)) => {
                x == y
                    || match (self.string(*x), self.string(*y)) {
                        (Some(sx), Some(sy)) => sx.bytes() == sy.bytes(),
                        _ => false,
                    }
            }
            (Value::ExtFunc(x), Value::ExtFunc(y)) => {
                x == y
                    || match (self.extfunc(*x), self.extfunc(*y)) {
                        (Some(ex), Some(ey)) => ex.symbol == ey.symbol,
                        _ => false,
                    }
            }
            _ => a.obj_id() == b.obj_id(),
        }
    }

    /// Canonical form of a table key: a Float exactly representable as Int
    /// becomes that Int, so `t[1.0]` and `t[1]` are one slot.
    pub fn canonical_key(&self, key: Value) -> Value {
        match key {
            Value::Float(f)
                if f.fract() == 0.0 && f >= i32::MIN as f32 && f <= i32::MAX as f32 =>
            {
                Value::Int(f as i32)
            }
            other => other,
        }
    }

    /// Hash a table key consistently with [`Heap::values_equal`]. String keys
    /// use the string object's cached hash; external functions hash their
    /// symbolic id; other keys mix the payload with the kind tag.
    pub fn key_hash(&mut self, key: &Value) -> u32 {
        match self.canonical_key(*key) {
            Value::Null => hash_bytes(&[]),
            Value::Int(i) => tag_mix(crate::value::RAW_INTEGER, i as u32),
            Value::Float(f) => tag_mix(crate::value::RAW_FLOAT, f.to_bits()),
            Value::String(id) => self.string_mut(id).map(|s| s.hash()).unwrap_or(0),
            Value::ExtFunc(id) => self
                .extfunc(id)
                .map(|e| hash_bytes(e.symbol.as_bytes()))
                .unwrap_or(0),
            other => {
                let id = other.obj_id().map(|i| i.index()).unwrap_or(0);
                tag_mix(other.tag(), id)
            }
        }
    }

    /// Render a value for printing and diagnostics.
    pub fn render(&self, value: &Value) -> String {
        self.render_depth(value, 0)
    }

    fn render_depth(&self, value: &Value, depth: usize) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{:.6}", f),
            Value::String(id) => self
                .string(*id)
                .map(|s| s.to_text())
                .unwrap_or_default(),
            Value::Array(id) => {
                if depth >= MAX_RENDER_DEPTH {
                    return "[...]".to_string();
                }
                let Some(a) = self.array(*id) else {
                    return "[]".to_string();
                };
                let mut out = String::from("[");
                for element in a.elements() {
                    out.push_str(&self.render_depth(element, depth + 1));
                    out.push_str(", ");
                }
                out.push(']');
                out
            }
            Value::Table(id) => format!("<table@{}>", id.index()),
            Value::Function(id) => format!("<function@{}>", id.index()),
            Value::ExtFunc(id) => {
                let symbol = self.extfunc(*id).map(|e| e.symbol.as_str()).unwrap_or("?");
                format!("<extfunc:{}>", symbol)
            }
            Value::UserData(id) => format!("<userdata@{}>", id.index()),
            Value::Thread(id) => format!("<thread@{}>", id.index()),
        }
    }

    /// Read a key as text if it is a string object.
    fn key_text(&self, key: &Value) -> Option<String> {
        match key {
            Value::String(id) => self.string(*id).map(|s| s.to_text()),
            _ => None,
        }
    }
}

/// Mix a kind tag into a payload hash.
fn tag_mix(tag: i32, payload: u32) -> u32 {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&tag.to_le_bytes());
    bytes[4..].copy_from_slice(&payload.to_le_bytes());
    hash_bytes(&bytes)
}
