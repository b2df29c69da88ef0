//! Hello-world and host-loop behaviour.

use weft::{Instr, ThreadState, Value};

use crate::{build_function, call_global, capture_context, drive, spawn};

#[test]
fn hello_prints_and_finishes_clean() {
    let (mut ctx, out) = capture_context();

    let mut code = vec![Instr::File("hello.wf".to_string()), Instr::Line(1)];
    code.extend(call_global(
        "println",
        1,
        vec![Instr::PushStr("hi".to_string())],
    ));
    code.push(Instr::Push0);
    code.push(Instr::Ret);

    let func = build_function(&mut ctx, 0, code, Vec::new());
    let func_id = func.obj_id().unwrap();
    let tid = spawn(&mut ctx, func);

    // One unbounded round completes the program; inspect before collecting.
    ctx.round_robin(-1).unwrap();
    assert_eq!(out.text(), "hi\n");
    assert_eq!(ctx.thread_state(tid), Some(ThreadState::Done));
    assert_eq!(ctx.thread_result(tid), Value::Null);

    // The finished thread is unreachable and the next cycle collects it.
    ctx.collect();
    assert!(!ctx.heap().contains(tid));

    // Nothing from this run survives clear.
    ctx.clear();
    assert!(!ctx.heap().contains(func_id));
    assert!(ctx.threads().is_empty());
}

#[test]
fn version_builtin_reports_a_string() {
    let (mut ctx, out) = capture_context();

    // println(version())
    let code = vec![
        Instr::PushRoot,
        Instr::PushStr("println".to_string()),
        Instr::TabGet,
        Instr::Push0,
        Instr::PushRoot,
        Instr::PushStr("version".to_string()),
        Instr::TabGet,
        Instr::Push0,
        Instr::PushInt(0),
        Instr::Mcall,
        Instr::PushInt(1),
        Instr::Mcall,
        Instr::Pop(1),
        Instr::Push0,
        Instr::Ret,
    ];

    let func = build_function(&mut ctx, 0, code, Vec::new());
    spawn(&mut ctx, func);
    drive(&mut ctx);

    assert!(out.text().contains("version"));
}

#[test]
fn startthread_spawned_work_runs_next_round() {
    let (mut ctx, out) = capture_context();

    // worker: println("worker"); return
    let mut worker_code = call_global(
        "println",
        1,
        vec![Instr::PushStr("worker".to_string())],
    );
    worker_code.push(Instr::Push0);
    worker_code.push(Instr::Ret);
    let worker = build_function(&mut ctx, 0, worker_code, Vec::new());

    // main: startthread(worker, null); println("main"); return
    let mut code = call_global("startthread", 2, vec![Instr::PushConst(0), Instr::Push0]);
    code.extend(call_global(
        "println",
        1,
        vec![Instr::PushStr("main".to_string())],
    ));
    code.push(Instr::Push0);
    code.push(Instr::Ret);
    let main = build_function(&mut ctx, 0, code, vec![worker]);

    spawn(&mut ctx, main);
    drive(&mut ctx);

    // Main finishes its round before the worker is scheduled.
    assert_eq!(out.text(), "main\nworker\n");
}

#[test]
fn runtime_error_pushes_null_and_execution_continues() {
    let (mut ctx, out) = capture_context();

    // println(1[0]) -- indexing a non-object reads Null but does not kill.
    let mut code = call_global(
        "println",
        1,
        vec![
            Instr::PushInt(1),
            Instr::PushStr("k".to_string()),
            Instr::TabGet,
        ],
    );
    code.push(Instr::PushInt(99));
    code.push(Instr::Ret);

    let func = build_function(&mut ctx, 0, code, Vec::new());
    let tid = spawn(&mut ctx, func);
    ctx.round_robin(-1).unwrap();

    assert_eq!(out.text(), "null\n");
    assert_eq!(ctx.thread_state(tid), Some(ThreadState::Done));
    assert_eq!(ctx.thread_result(tid), Value::Int(99));
}
