//! Round-robin scheduling, yield and suspension.

use weft::{Instr, ThreadState, Value};

use crate::{build_function, capture_context, spawn};

/// A program that yields forever.
fn yield_loop(ctx: &mut weft::Context) -> Value {
    build_function(
        ctx,
        0,
        vec![Instr::PushInt(7), Instr::Yield, Instr::Jmp(0)],
        Vec::new(),
    )
}

fn ip_of(ctx: &weft::Context, tid: weft::ObjId) -> usize {
    ctx.heap().thread(tid).unwrap().frames.last().unwrap().ip
}

#[test]
fn round_robin_alternates_between_yielding_threads() {
    let (mut ctx, _out) = capture_context();
    let func = yield_loop(&mut ctx);
    let a = spawn(&mut ctx, func);
    let b = spawn(&mut ctx, func);

    // One instruction per slice: both threads advance in lockstep.
    ctx.round_robin(1).unwrap();
    assert_eq!(ip_of(&ctx, a), 1);
    assert_eq!(ip_of(&ctx, b), 1);

    // Second round retires each thread's yield.
    ctx.round_robin(1).unwrap();
    assert_eq!(ip_of(&ctx, a), 2);
    assert_eq!(ip_of(&ctx, b), 2);
    assert_eq!(ctx.thread_result(a), Value::Int(7));
    assert_eq!(ctx.thread_result(b), Value::Int(7));
    assert_eq!(ctx.thread_state(a), Some(ThreadState::Running));
    assert_eq!(ctx.thread_state(b), Some(ThreadState::Running));
}

#[test]
fn suspending_one_thread_advances_only_the_other() {
    let (mut ctx, _out) = capture_context();
    let func = yield_loop(&mut ctx);
    let a = spawn(&mut ctx, func);
    let b = spawn(&mut ctx, func);

    ctx.round_robin(1).unwrap();
    ctx.suspend_thread(a);
    let frozen = ip_of(&ctx, a);

    // Keep the suspended thread reachable: suspended threads are not GC
    // roots, so pin it through the root table.
    let root = ctx.root();
    let key = ctx.heap_mut().new_string("a");
    ctx.heap_mut().set_key(root, key, Value::Thread(a));

    // Two more rounds: only b advances, reaching its yield and looping back.
    ctx.round_robin(1).unwrap();
    ctx.collect();
    assert_eq!(ip_of(&ctx, a), frozen);
    assert_eq!(ip_of(&ctx, b), 2);
    assert_eq!(ctx.thread_result(b), Value::Int(7));

    ctx.round_robin(1).unwrap();
    ctx.collect();
    assert_eq!(ip_of(&ctx, a), frozen);
    assert_eq!(ip_of(&ctx, b), 0);
    assert_eq!(ctx.thread_state(a), Some(ThreadState::Suspended));

    // Resuming rejoins the rotation.
    ctx.resume_thread(a);
    ctx.round_robin(1).unwrap();
    assert_eq!(ip_of(&ctx, a), 2);
    assert_eq!(ctx.thread_result(a), Value::Int(7));
}

#[test]
fn unbounded_slice_parks_at_every_yield() {
    let (mut ctx, _out) = capture_context();
    let func = build_function(
        &mut ctx,
        0,
        vec![
            Instr::PushInt(1),
            Instr::Yield,
            Instr::PushInt(2),
            Instr::Yield,
            Instr::PushInt(3),
            Instr::Ret,
        ],
        Vec::new(),
    );
    let tid = spawn(&mut ctx, func);

    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.thread_result(tid), Value::Int(1));
    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.thread_result(tid), Value::Int(2));
    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.thread_state(tid), Some(ThreadState::Done));
    assert_eq!(ctx.thread_result(tid), Value::Int(3));
}

#[test]
fn done_threads_drop_out_of_the_rotation() {
    let (mut ctx, _out) = capture_context();
    let func = build_function(
        &mut ctx,
        0,
        vec![Instr::PushInt(1), Instr::Ret],
        Vec::new(),
    );
    let tid = spawn(&mut ctx, func);

    assert_eq!(ctx.count_running_threads(), 1);
    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.count_running_threads(), 0);
    assert_eq!(ctx.thread_result(tid), Value::Int(1));

    // Another round is a no-op for the finished thread.
    ctx.round_robin(-1).unwrap();
    assert_eq!(ctx.thread_state(tid), Some(ThreadState::Done));
}
