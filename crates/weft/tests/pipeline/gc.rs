//! Collector liveness at the whole-context level.

use weft::{Instr, Value};

use crate::{build_function, capture_context, spawn};

#[test]
fn unreferenced_object_is_reaped_after_one_cycle() {
    let (mut ctx, _out) = capture_context();
    let a = ctx.heap_mut().new_array();
    let id = a.obj_id().unwrap();

    ctx.collect();
    assert!(!ctx.heap().contains(id));
}

#[test]
fn root_reachable_object_survives_with_clear_mark_path() {
    let (mut ctx, _out) = capture_context();
    let a = ctx.heap_mut().new_array();
    let id = a.obj_id().unwrap();
    let root = ctx.root();
    let key = ctx.heap_mut().new_string("keep");
    ctx.heap_mut().set_key(root, key, a);

    for _ in 0..3 {
        ctx.collect();
        assert!(ctx.heap().contains(id));
    }

    // Dropping the only reference condemns it on the next cycle.
    let key = ctx.heap_mut().new_string("keep");
    ctx.heap_mut().set_key(root, key, Value::Null);
    ctx.collect();
    assert!(!ctx.heap().contains(id));
}

#[test]
fn lock_pins_an_unreachable_object() {
    let (mut ctx, _out) = capture_context();
    let a = ctx.heap_mut().new_array();
    let id = a.obj_id().unwrap();

    ctx.heap_mut().lock(id);
    ctx.collect();
    ctx.collect();
    assert!(ctx.heap().contains(id));

    ctx.heap_mut().unlock(id);
    ctx.collect();
    assert!(!ctx.heap().contains(id));
}

#[test]
fn running_thread_locals_are_roots() {
    let (mut ctx, _out) = capture_context();

    // The array lives only in a local of a thread parked at a yield.
    let func = build_function(
        &mut ctx,
        0,
        vec![
            Instr::AddLocals(1),
            Instr::NewArray,
            Instr::PopLocal(0),
            Instr::Push0,
            Instr::Yield,
            Instr::Push0,
            Instr::Ret,
        ],
        Vec::new(),
    );
    let tid = spawn(&mut ctx, func);
    ctx.round_robin(-1).unwrap();

    let held = ctx.heap().thread(tid).unwrap().frames[0].locals[0];
    let id = held.obj_id().unwrap();
    assert!(matches!(held, Value::Array(_)));

    ctx.collect();
    assert!(ctx.heap().contains(id));

    // Killing the thread drops its stacks; the array becomes garbage.
    ctx.kill_thread(tid);
    ctx.collect();
    assert!(!ctx.heap().contains(id));
}

#[test]
fn function_local_garbage_is_reaped_after_return() {
    let (mut ctx, _out) = capture_context();

    // The function creates an array it never publishes.
    let func = build_function(
        &mut ctx,
        0,
        vec![
            Instr::AddLocals(1),
            Instr::NewArray,
            Instr::PopLocal(0),
            Instr::DelLocals(1),
            Instr::Push0,
            Instr::Ret,
        ],
        Vec::new(),
    );
    let tid = spawn(&mut ctx, func);

    let before = ctx.heap().live_count();
    ctx.round_robin(-1).unwrap();
    ctx.collect();

    // The array, the finished thread and the function are all gone; the heap
    // is back at (or below) its pre-run population.
    assert!(ctx.heap().live_count() <= before);
    assert!(!ctx.heap().contains(tid));
}

#[test]
fn unreachable_cycle_is_collected() {
    let (mut ctx, _out) = capture_context();
    let t = ctx.heap_mut().new_table();
    let key = ctx.heap_mut().new_string("self");
    ctx.heap_mut().set_key(t, key, t);
    let id = t.obj_id().unwrap();

    ctx.collect();
    assert!(!ctx.heap().contains(id));
}
