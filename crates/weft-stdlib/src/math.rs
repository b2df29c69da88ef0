//! The `math` module.
//!
//! Trigonometric functions work in degrees: `sin`, `cos` and `tan` take
//! degree arguments, `asin`, `acos`, `atan` and `atan2` return degrees.
//! Numeric arguments accept Int or Float; anything else yields Null.

use rand::Rng;

use weft_vm::{Context, Module, ModuleEntry, NativeArgs, ObjId, Value};

pub struct MathModule {
    entries: Vec<ModuleEntry>,
}

impl Default for MathModule {
    fn default() -> Self {
        Self::new()
    }
}

impl MathModule {
    pub fn new() -> Self {
        Self {
            entries: vec![
                ModuleEntry::named("sin", "math_sin", sin),
                ModuleEntry::named("cos", "math_cos", cos),
                ModuleEntry::named("tan", "math_tan", tan),
                ModuleEntry::named("asin", "math_asin", asin),
                ModuleEntry::named("acos", "math_acos", acos),
                ModuleEntry::named("atan", "math_atan", atan),
                ModuleEntry::named("sqrt", "math_sqrt", sqrt),
                ModuleEntry::named("random", "math_random", random),
                ModuleEntry::named("atan2", "math_atan2", atan2),
            ],
        }
    }
}

impl Module for MathModule {
    fn name(&self) -> &str {
        "math"
    }

    fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }
}

/// First argument widened to float, if numeric.
fn arg_float(args: &NativeArgs, index: usize) -> Option<f32> {
    args.get(index).and_then(|v| v.as_float())
}

fn sin(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match arg_float(args, 0) {
        Some(x) => Value::Float(x.to_radians().sin()),
        None => Value::Null,
    }
}

fn cos(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match arg_float(args, 0) {
        Some(x) => Value::Float(x.to_radians().cos()),
        None => Value::Null,
    }
}

fn tan(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match arg_float(args, 0) {
        Some(x) => Value::Float(x.to_radians().tan()),
        None => Value::Null,
    }
}

fn asin(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match arg_float(args, 0) {
        Some(x) => Value::Float(x.asin().to_degrees()),
        None => Value::Null,
    }
}

fn acos(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match arg_float(args, 0) {
        Some(x) => Value::Float(x.acos().to_degrees()),
        None => Value::Null,
    }
}

fn atan(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match arg_float(args, 0) {
        Some(x) => Value::Float(x.atan().to_degrees()),
        None => Value::Null,
    }
}

fn sqrt(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match arg_float(args, 0) {
        Some(x) => Value::Float(x.sqrt()),
        None => Value::Null,
    }
}

/// `random()` => non-negative int; `random(n)` => int in `[0, n)`.
fn random(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    let mut rng = rand::rng();
    match args.len() {
        0 => Value::Int(rng.random_range(0..i32::MAX)),
        1 => match args[0] {
            Value::Int(n) if n > 0 => Value::Int(rng.random_range(0..n)),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

/// `atan2(y, x)` in degrees.
fn atan2(_: &mut Context, _: ObjId, args: &mut NativeArgs, _: Value) -> Value {
    match (arg_float(args, 0), arg_float(args, 1)) {
        (Some(y), Some(x)) => Value::Float(y.atan2(x).to_degrees()),
        _ => Value::Null,
    }
}
