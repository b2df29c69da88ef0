//! Compiled functions.
//!
//! A function is immutable after compilation: a declared argument count, a
//! flat instruction sequence and a constant pool. The compiler that produces
//! these lives outside this crate; hosts and tests construct them directly.

use crate::bytecode::Instr;
use crate::value::Value;

/// A compiled function body.
#[derive(Clone, Debug, Default)]
pub struct FunctionObj {
    /// Declared argument count. Calls pad or trim their arguments to this.
    pub arity: u32,
    /// The instruction sequence.
    pub code: Vec<Instr>,
    /// Constant pool referenced by `PushConst`.
    pub constants: Vec<Value>,
}

impl FunctionObj {
    pub fn new(arity: u32, code: Vec<Instr>, constants: Vec<Value>) -> Self {
        Self {
            arity,
            code,
            constants,
        }
    }
}
