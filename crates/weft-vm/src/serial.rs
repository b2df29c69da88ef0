//! Whole-process snapshots.
//!
//! ## Wire format
//!
//! Little-endian throughout. Primitives:
//!
//! | Item | Encoding |
//! |---|---|
//! | integer | i32 LE |
//! | float | f32 LE |
//! | bool | one byte, 0/1 |
//! | string / bytes | u32 length prefix + raw bytes, no terminator |
//! | value tag | i32, written verbatim (see `value.rs`) |
//! | back-reference | `STACKREF` (0xFF) + u32 id |
//!
//! Heap objects serialize once: the first encounter registers the object in
//! the writer's id table and writes its body; later encounters write a
//! `STACKREF` to the already-assigned id. The loader mirrors this by
//! registering each freshly allocated shell *before* reading its fields, so
//! fully cyclic graphs resolve — a field can refer back to any ancestor
//! still under construction. Sharing is preserved: objects reachable by
//! several paths load as one object.
//!
//! Debug builds additionally fence major sections with length-prefixed magic
//! tags (`[CONTEXT]`, `[THREAD]`, ...). Release builds omit them; a snapshot
//! must be loaded by the same build that saved it.
//!
//! File layout of a context snapshot: root-table value, thread count, then
//! each thread value in registration order.

use std::collections::HashMap;

use thiserror::Error;

use crate::array::ArrayObj;
use crate::bytecode::{op, Instr};
use crate::context::Context;
use crate::function::FunctionObj;
use crate::heap::ObjId;
use crate::object::{ExtFuncObj, Object, UserDataObj};
use crate::string::StrObj;
use crate::table::TableObj;
use crate::thread::ThreadState;
use crate::value::{self, Value};

/// Sentinel tag marking a back-reference to an already-written object. Does
/// not collide with any value tag (those carry flag bits in 0x1000/0x2000).
pub const STACKREF: i32 = 0xFF;

/// Snapshot corruption and misuse errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unexpected end of snapshot data")]
    UnexpectedEnd,
    #[error("invalid value tag: {0:#x}")]
    BadTag(i32),
    #[error("invalid back-reference id: {0}")]
    BadRef(u32),
    #[error("invalid opcode: {0:#x}")]
    BadOpcode(u8),
    #[error("invalid UTF-8 in string field")]
    BadUtf8,
    #[error("magic tag mismatch, expected {0}")]
    BadMagic(&'static str),
    #[error("invalid field: {0}")]
    BadField(&'static str),
    #[error("cannot snapshot a thread that is currently executing")]
    ThreadRunning,
    #[error("no userdata handler registered for tag '{0}'")]
    UnknownUserData(String),
}

// ============================================================================
// Writer
// ============================================================================

/// Serializes into an owned buffer, tracking already-written objects.
#[derive(Default)]
pub struct SnapshotWriter {
    buf: Vec<u8>,
    ids: HashMap<ObjId, u32>,
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.write_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    pub fn write_str(&mut self, v: &str) {
        self.write_bytes(v.as_bytes());
    }

    /// The serial id for an already-written object, if any.
    fn find(&self, id: ObjId) -> Option<u32> {
        self.ids.get(&id).copied()
    }

    /// Assign the next serial id to an object about to be written.
    fn register(&mut self, id: ObjId) -> u32 {
        let serial = self.ids.len() as u32;
        self.ids.insert(id, serial);
        serial
    }

    /// Debug-only section fence. A no-op in release builds.
    pub fn magic(&mut self, _tag: &str) {
        #[cfg(debug_assertions)]
        self.write_str(_tag);
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Deserializes from a byte slice, tracking already-built objects.
pub struct SnapshotReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    objs: Vec<ObjId>,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            objs: Vec::new(),
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        if self.remaining() < n {
            return Err(SnapshotError::UnexpectedEnd);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, SnapshotError> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32, SnapshotError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32, SnapshotError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, SnapshotError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_str(&mut self) -> Result<String, SnapshotError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| SnapshotError::BadUtf8)
    }

    /// Register a freshly allocated shell under the next serial id.
    fn register(&mut self, id: ObjId) {
        self.objs.push(id);
    }

    /// Resolve a back-reference.
    fn lookup(&self, serial: u32) -> Result<ObjId, SnapshotError> {
        self.objs
            .get(serial as usize)
            .copied()
            .ok_or(SnapshotError::BadRef(serial))
    }

    /// Debug-only section fence. A no-op in release builds.
    pub fn expect_magic(&mut self, tag: &'static str) -> Result<(), SnapshotError> {
        #[cfg(debug_assertions)]
        {
            let found = self.read_str().map_err(|_| SnapshotError::BadMagic(tag))?;
            if found != tag {
                return Err(SnapshotError::BadMagic(tag));
            }
        }
        let _ = tag;
        Ok(())
    }
}

// ============================================================================
// Values
// ============================================================================

/// Write one value, sharing-preserving.
pub fn save_value(ctx: &Context, w: &mut SnapshotWriter, value: Value) -> Result<(), SnapshotError> {
    // Primitives carry their payload inline.
    match value {
        Value::Null => {
            w.write_i32(value.tag());
            return Ok(());
        }
        Value::Int(i) => {
            w.write_i32(value.tag());
            w.write_i32(i);
            return Ok(());
        }
        Value::Float(f) => {
            w.write_i32(value.tag());
            w.write_f32(f);
            return Ok(());
        }
        _ => {}
    }

    let Some(id) = value.obj_id() else {
        return Err(SnapshotError::BadField("primitive took the object path"));
    };
    if let Some(serial) = w.find(id) {
        w.write_i32(STACKREF);
        w.write_u32(serial);
        return Ok(());
    }
    w.register(id);
    w.write_i32(value.tag());

    match ctx.heap().body(id) {
        Some(Object::Str(s)) => {
            w.write_bytes(s.bytes());
        }
        Some(Object::Array(a)) => {
            w.write_u32(a.len() as u32);
            for element in a.elements() {
                save_value(ctx, w, *element)?;
            }
        }
        Some(Object::Table(t)) => {
            w.write_u32(t.len() as u32);
            for entry in t.entries() {
                save_value(ctx, w, entry.key)?;
                save_value(ctx, w, entry.value)?;
            }
        }
        Some(Object::Function(f)) => {
            w.write_i32(f.arity as i32);
            w.write_u32(f.code.len() as u32);
            for instr in &f.code {
                save_instr(w, instr);
            }
            w.write_u32(f.constants.len() as u32);
            for constant in &f.constants {
                save_value(ctx, w, *constant)?;
            }
        }
        Some(Object::ExtFunc(e)) => {
            w.write_str(&e.symbol);
        }
        Some(Object::UserData(u)) => {
            let handler = ctx
                .userdata_handler(&u.tag)
                .ok_or_else(|| SnapshotError::UnknownUserData(u.tag.clone()))?;
            w.write_str(&u.tag);
            handler.save(u, w);
        }
        Some(Object::Thread(t)) => {
            if t.inside_run {
                return Err(SnapshotError::ThreadRunning);
            }
            w.write_i32(t.state as i32);
            save_value(ctx, w, t.result)?;
            w.write_u32(t.stack.len() as u32);
            for v in &t.stack {
                save_value(ctx, w, *v)?;
            }
            w.write_u32(t.frames.len() as u32);
            for frame in &t.frames {
                w.write_u32(frame.ip as u32);
                save_value(ctx, w, frame.func)?;
                save_value(ctx, w, frame.self_value)?;
                w.write_u32(frame.locals.len() as u32);
                for local in &frame.locals {
                    save_value(ctx, w, *local)?;
                }
            }
            w.write_str(&t.file);
            w.write_i32(t.line);
        }
        None => return Err(SnapshotError::BadField("dangling object reference")),
    }
    Ok(())
}

/// Read one value. Fresh objects register their shell before their fields
/// are read, so back-references into partially built ancestors resolve.
pub fn load_value(ctx: &mut Context, r: &mut SnapshotReader<'_>) -> Result<Value, SnapshotError> {
    let tag = r.read_i32()?;
    match tag {
        t if t == value::RAW_NULL => Ok(Value::Null),
        t if t == (value::RAW_INTEGER | value::IS_NUMERIC) => Ok(Value::Int(r.read_i32()?)),
        t if t == (value::RAW_FLOAT | value::IS_NUMERIC) => Ok(Value::Float(r.read_f32()?)),

        STACKREF => {
            let serial = r.read_u32()?;
            let id = r.lookup(serial)?;
            value_for(ctx, id)
        }

        t if t == (value::RAW_STRING | value::IS_OBJECT) => {
            let id = ctx.heap_mut().alloc(Object::Str(StrObj::default()));
            r.register(id);
            let bytes = r.read_bytes()?;
            if let Some(s) = ctx.heap_mut().string_mut(id) {
                s.set(bytes);
            }
            Ok(Value::String(id))
        }

        t if t == (value::RAW_ARRAY | value::IS_OBJECT) => {
            let id = ctx.heap_mut().alloc(Object::Array(ArrayObj::new()));
            r.register(id);
            let size = r.read_u32()?;
            for _ in 0..size {
                let element = load_value(ctx, r)?;
                if let Some(a) = ctx.heap_mut().array_mut(id) {
                    a.push(element);
                }
            }
            Ok(Value::Array(id))
        }

        t if t == (value::RAW_TABLE | value::IS_OBJECT) => {
            let id = ctx.heap_mut().alloc(Object::Table(TableObj::new()));
            r.register(id);
            let v = Value::Table(id);
            let size = r.read_u32()?;
            for _ in 0..size {
                let key = load_value(ctx, r)?;
                let val = load_value(ctx, r)?;
                ctx.heap_mut().set_key(v, key, val);
            }
            Ok(v)
        }

        t if t == (value::RAW_FUNCTION | value::IS_OBJECT) => {
            let id = ctx.heap_mut().alloc(Object::Function(FunctionObj::default()));
            r.register(id);

            let arity = r.read_i32()?;
            if arity < 0 {
                return Err(SnapshotError::BadField("negative function arity"));
            }
            let code_len = r.read_u32()?;
            let mut code = Vec::new();
            for _ in 0..code_len {
                code.push(load_instr(r)?);
            }
            let const_len = r.read_u32()?;
            let mut constants = Vec::new();
            for _ in 0..const_len {
                constants.push(load_value(ctx, r)?);
            }
            if let Some(Object::Function(f)) = ctx.heap_mut().body_mut(id) {
                *f = FunctionObj::new(arity as u32, code, constants);
            }
            Ok(Value::Function(id))
        }

        t if t == (value::RAW_EXTFUNC | value::IS_OBJECT) => {
            let id = ctx.heap_mut().alloc(Object::ExtFunc(ExtFuncObj::new("")));
            r.register(id);
            let symbol = r.read_str()?;
            if let Some(Object::ExtFunc(e)) = ctx.heap_mut().body_mut(id) {
                e.symbol = symbol;
            }
            Ok(Value::ExtFunc(id))
        }

        t if t == (value::RAW_USERDATA | value::IS_OBJECT) => {
            let id = ctx
                .heap_mut()
                .alloc(Object::UserData(UserDataObj::new("", Box::new(()))));
            r.register(id);
            let tag_name = r.read_str()?;
            let Some(handler) = ctx.userdata_handler(&tag_name) else {
                return Err(SnapshotError::UnknownUserData(tag_name));
            };
            let data = handler.load(r)?;
            if let Some(Object::UserData(u)) = ctx.heap_mut().body_mut(id) {
                u.tag = tag_name;
                u.data = data;
            }
            Ok(Value::UserData(id))
        }

        t if t == (value::RAW_THREAD | value::IS_OBJECT) => {
            let id = ctx.new_thread();
            r.register(id);

            let state_raw = r.read_i32()?;
            let state = ThreadState::from_i32(state_raw)
                .ok_or(SnapshotError::BadField("unknown thread state"))?;
            let result = load_value(ctx, r)?;

            let stack_len = r.read_u32()?;
            let mut stack = Vec::new();
            for _ in 0..stack_len {
                stack.push(load_value(ctx, r)?);
            }

            let frame_count = r.read_u32()?;
            let mut frames = Vec::new();
            for _ in 0..frame_count {
                let ip = r.read_u32()? as usize;
                let func = load_value(ctx, r)?;
                let self_value = load_value(ctx, r)?;
                let locals_len = r.read_u32()?;
                let mut locals = Vec::new();
                for _ in 0..locals_len {
                    locals.push(load_value(ctx, r)?);
                }
                let mut frame = crate::thread::CallFrame::new(func, self_value, locals);
                frame.ip = ip;
                frames.push(frame);
            }

            let file = r.read_str()?;
            let line = r.read_i32()?;

            if let Some(t) = ctx.heap_mut().thread_mut(id) {
                t.state = state;
                t.result = result;
                t.stack = stack;
                t.frames = frames;
                t.file = file;
                t.line = line;
            }
            Ok(Value::Thread(id))
        }

        other => Err(SnapshotError::BadTag(other)),
    }
}

/// Rebuild the tagged value for a back-referenced object.
fn value_for(ctx: &Context, id: ObjId) -> Result<Value, SnapshotError> {
    match ctx.heap().body(id) {
        Some(Object::Str(_)) => Ok(Value::String(id)),
        Some(Object::Array(_)) => Ok(Value::Array(id)),
        Some(Object::Table(_)) => Ok(Value::Table(id)),
        Some(Object::Function(_)) => Ok(Value::Function(id)),
        Some(Object::ExtFunc(_)) => Ok(Value::ExtFunc(id)),
        Some(Object::UserData(_)) => Ok(Value::UserData(id)),
        Some(Object::Thread(_)) => Ok(Value::Thread(id)),
        None => Err(SnapshotError::BadRef(id.index())),
    }
}

// ============================================================================
// Instructions
// ============================================================================

fn save_instr(w: &mut SnapshotWriter, instr: &Instr) {
    w.write_u8(instr.opcode());
    match instr {
        Instr::PushConst(i)
        | Instr::PushInt(i)
        | Instr::Pop(i)
        | Instr::Dup(i)
        | Instr::PushLocal(i)
        | Instr::PopLocal(i)
        | Instr::AddLocals(i)
        | Instr::DelLocals(i)
        | Instr::Jmp(i)
        | Instr::Jmpt(i)
        | Instr::Jmpf(i)
        | Instr::Line(i) => w.write_i32(*i),
        Instr::PushFloat(x) => w.write_f32(*x),
        Instr::PushExtFunc(s) | Instr::PushStr(s) | Instr::File(s) => w.write_str(s),
        _ => {}
    }
}

fn load_instr(r: &mut SnapshotReader<'_>) -> Result<Instr, SnapshotError> {
    let opcode = r.read_u8()?;
    let instr = match opcode {
        op::NOP => Instr::Nop,
        op::PUSH0 => Instr::Push0,
        op::PUSHROOT => Instr::PushRoot,
        op::PUSHSELF => Instr::PushSelf,
        op::PUSHCONST => Instr::PushConst(r.read_i32()?),
        op::PUSHEXTFUNC => Instr::PushExtFunc(r.read_str()?),
        op::PUSHI => Instr::PushInt(r.read_i32()?),
        op::PUSHF => Instr::PushFloat(r.read_f32()?),
        op::PUSHS => Instr::PushStr(r.read_str()?),
        op::POP => Instr::Pop(r.read_i32()?),
        op::DUP => Instr::Dup(r.read_i32()?),
        op::PUSHL => Instr::PushLocal(r.read_i32()?),
        op::POPL => Instr::PopLocal(r.read_i32()?),
        op::ADDL => Instr::AddLocals(r.read_i32()?),
        op::DELL => Instr::DelLocals(r.read_i32()?),
        op::NEG => Instr::Neg,
        op::ADD => Instr::Add,
        op::SUB => Instr::Sub,
        op::MUL => Instr::Mul,
        op::DIV => Instr::Div,
        op::SHL => Instr::Shl,
        op::SHR => Instr::Shr,
        op::MODULO => Instr::Modulo,
        op::BITOR => Instr::BitOr,
        op::BITAND => Instr::BitAnd,
        op::BITXOR => Instr::BitXor,
        op::AND => Instr::And,
        op::OR => Instr::Or,
        op::NOT => Instr::Not,
        op::EQ => Instr::Eq,
        op::NEQ => Instr::Neq,
        op::LT => Instr::Lt,
        op::GT => Instr::Gt,
        op::LE => Instr::Le,
        op::GE => Instr::Ge,
        op::NEWTABLE => Instr::NewTable,
        op::NEWARRAY => Instr::NewArray,
        op::TABSET => Instr::TabSet,
        op::TABGET => Instr::TabGet,
        op::TABGET2 => Instr::TabGet2,
        op::TABIT => Instr::TabIt,
        op::TABNEXT => Instr::TabNext,
        op::CLONE => Instr::Clone,
        op::JMP => Instr::Jmp(r.read_i32()?),
        op::JMPT => Instr::Jmpt(r.read_i32()?),
        op::JMPF => Instr::Jmpf(r.read_i32()?),
        op::MCALL => Instr::Mcall,
        op::RET => Instr::Ret,
        op::YIELD => Instr::Yield,
        op::FILE => Instr::File(r.read_str()?),
        op::LINE => Instr::Line(r.read_i32()?),
        other => return Err(SnapshotError::BadOpcode(other)),
    };
    Ok(instr)
}

// ============================================================================
// Context snapshots
// ============================================================================

impl Context {
    /// Snapshot the whole context: root table, thread count, each thread.
    pub fn save_snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut w = SnapshotWriter::new();
        w.magic("[CONTEXT]");

        save_value(self, &mut w, self.root())?;

        let threads: Vec<ObjId> = self.threads().to_vec();
        w.write_u32(threads.len() as u32);
        for tid in threads {
            w.magic("[THREAD]");
            save_value(self, &mut w, Value::Thread(tid))?;
            w.magic("[THREAD-END]");
        }

        w.magic("[CONTEXT-END]");
        Ok(w.into_bytes())
    }

    /// Restore a context snapshot. The context is cleared first; threads
    /// re-register as they are rebuilt.
    pub fn load_snapshot(&mut self, bytes: &[u8]) -> Result<(), SnapshotError> {
        self.clear();
        let mut r = SnapshotReader::new(bytes);
        r.expect_magic("[CONTEXT]")?;

        let root = load_value(self, &mut r)?;
        self.set_root(root);

        let count = r.read_u32()?;
        for _ in 0..count {
            r.expect_magic("[THREAD]")?;
            // Registration happens inside load_value at thread allocation.
            load_value(self, &mut r)?;
            r.expect_magic("[THREAD-END]")?;
        }

        r.expect_magic("[CONTEXT-END]")?;
        Ok(())
    }

    /// Serialize a single value (used for compiled function images).
    pub fn save_value_bytes(&self, value: Value) -> Result<Vec<u8>, SnapshotError> {
        let mut w = SnapshotWriter::new();
        save_value(self, &mut w, value)?;
        Ok(w.into_bytes())
    }

    /// Deserialize a single value into this context's heap.
    pub fn load_value_bytes(&mut self, bytes: &[u8]) -> Result<Value, SnapshotError> {
        let mut r = SnapshotReader::new(bytes);
        load_value(self, &mut r)
    }
}
