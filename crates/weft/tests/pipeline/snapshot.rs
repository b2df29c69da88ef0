//! Whole-context snapshot round trips.

use weft::{Instr, ThreadState, Value};

use crate::{build_function, capture_context, spawn};

#[test]
fn cyclic_root_entry_survives_save_clear_load() {
    let (mut ctx, _out) = capture_context();

    // t = {}; t["me"] = t; root["t"] = t
    let t = ctx.heap_mut().new_table();
    let me = ctx.heap_mut().new_string("me");
    ctx.heap_mut().set_key(t, me, t);
    let root = ctx.root();
    let t_key = ctx.heap_mut().new_string("t");
    ctx.heap_mut().set_key(root, t_key, t);

    let snapshot = ctx.save_snapshot().unwrap();
    ctx.clear();
    ctx.load_snapshot(&snapshot).unwrap();

    let root = ctx.root();
    let t_key = ctx.heap_mut().new_string("t");
    let t2 = ctx.heap_mut().get_key(root, &t_key);
    assert!(matches!(t2, Value::Table(_)));

    let me = ctx.heap_mut().new_string("me");
    let inner = ctx.heap_mut().get_key(t2, &me);
    assert_eq!(inner.obj_id(), t2.obj_id());
    assert!(ctx.heap().values_equal(&inner, &t2));
}

#[test]
fn shared_objects_stay_shared_across_reload() {
    let (mut ctx, _out) = capture_context();

    let shared = ctx.heap_mut().new_array();
    let root = ctx.root();
    let key_a = ctx.heap_mut().new_string("a");
    let key_b = ctx.heap_mut().new_string("b");
    ctx.heap_mut().set_key(root, key_a, shared);
    ctx.heap_mut().set_key(root, key_b, shared);

    let snapshot = ctx.save_snapshot().unwrap();
    ctx.clear();
    ctx.load_snapshot(&snapshot).unwrap();

    let root = ctx.root();
    let key_a = ctx.heap_mut().new_string("a");
    let key_b = ctx.heap_mut().new_string("b");
    let a = ctx.heap_mut().get_key(root, &key_a);
    let b = ctx.heap_mut().get_key(root, &key_b);
    assert_eq!(a.obj_id(), b.obj_id());

    // Mutating through one path is visible through the other.
    ctx.heap_mut().set_key(a, Value::Int(0), Value::Int(5));
    assert_eq!(ctx.heap_mut().get_key(b, &Value::Int(0)), Value::Int(5));
}

#[test]
fn suspended_thread_state_survives_reload() {
    let (mut ctx, _out) = capture_context();

    // The thread parks at its yield with a value left on the stack.
    let func = build_function(
        &mut ctx,
        0,
        vec![
            Instr::PushInt(11),
            Instr::PushInt(22),
            Instr::Yield,
            Instr::PushInt(33),
            Instr::Ret,
        ],
        Vec::new(),
    );
    let tid = spawn(&mut ctx, func);
    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.thread_result(tid), Value::Int(22));
    ctx.suspend_thread(tid);

    // Suspended threads survive snapshots only if otherwise reachable.
    let root = ctx.root();
    let key = ctx.heap_mut().new_string("worker");
    ctx.heap_mut().set_key(root, key, Value::Thread(tid));

    let snapshot = ctx.save_snapshot().unwrap();
    ctx.clear();
    ctx.load_snapshot(&snapshot).unwrap();

    assert_eq!(ctx.threads().len(), 1);
    let restored = ctx.threads()[0];
    assert_eq!(ctx.thread_state(restored), Some(ThreadState::Suspended));
    {
        let t = ctx.heap().thread(restored).unwrap();
        assert_eq!(t.stack, vec![Value::Int(11)]);
        assert_eq!(t.result, Value::Int(22));
    }

    // Resume and finish where it left off.
    ctx.resume_thread(restored);
    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.thread_state(restored), Some(ThreadState::Done));
    assert_eq!(ctx.thread_result(restored), Value::Int(33));
}

#[test]
fn function_identity_is_shared_between_threads_after_reload() {
    let (mut ctx, _out) = capture_context();

    let func = build_function(
        &mut ctx,
        0,
        vec![Instr::PushInt(1), Instr::Yield, Instr::Push0, Instr::Ret],
        Vec::new(),
    );
    let a = spawn(&mut ctx, func);
    let b = spawn(&mut ctx, func);
    ctx.round_robin(-1).unwrap();

    let snapshot = ctx.save_snapshot().unwrap();
    ctx.clear();
    ctx.load_snapshot(&snapshot).unwrap();

    assert_eq!(ctx.threads().len(), 2);
    let fa = ctx.heap().thread(ctx.threads()[0]).unwrap().frames[0].func;
    let fb = ctx.heap().thread(ctx.threads()[1]).unwrap().frames[0].func;
    assert_eq!(fa.obj_id(), fb.obj_id());

    let _ = (a, b);
}

#[test]
fn thread_result_of_done_thread_survives_reload() {
    let (mut ctx, _out) = capture_context();

    let func = build_function(
        &mut ctx,
        0,
        vec![Instr::PushInt(123), Instr::Ret],
        Vec::new(),
    );
    let tid = spawn(&mut ctx, func);
    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.thread_state(tid), Some(ThreadState::Done));

    // Pin the finished thread so it is part of the snapshot.
    let root = ctx.root();
    let key = ctx.heap_mut().new_string("done");
    ctx.heap_mut().set_key(root, key, Value::Thread(tid));

    let snapshot = ctx.save_snapshot().unwrap();
    ctx.clear();
    ctx.load_snapshot(&snapshot).unwrap();

    let restored = ctx.threads()[0];
    assert_eq!(ctx.thread_state(restored), Some(ThreadState::Done));
    assert_eq!(ctx.thread_result(restored), Value::Int(123));
}
