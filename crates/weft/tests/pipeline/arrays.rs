//! Array growth semantics observed through a script.

use weft::Instr;

use crate::{build_function, call_global, capture_context, drive, spawn};

#[test]
fn sparse_assignment_grows_with_null_padding() {
    let (mut ctx, out) = capture_context();

    // a = []; a[3] = 42; println(a["n"]); println(a[0]); println(a[3])
    let mut code = vec![
        Instr::AddLocals(1),
        Instr::NewArray,
        Instr::PopLocal(0),
        Instr::PushLocal(0),
        Instr::PushInt(3),
        Instr::PushInt(42),
        Instr::TabSet,
        Instr::Pop(1),
    ];
    code.extend(call_global(
        "println",
        1,
        vec![
            Instr::PushLocal(0),
            Instr::PushStr("n".to_string()),
            Instr::TabGet,
        ],
    ));
    code.extend(call_global(
        "println",
        1,
        vec![Instr::PushLocal(0), Instr::PushInt(0), Instr::TabGet],
    ));
    code.extend(call_global(
        "println",
        1,
        vec![Instr::PushLocal(0), Instr::PushInt(3), Instr::TabGet],
    ));
    code.push(Instr::Push0);
    code.push(Instr::Ret);

    let func = build_function(&mut ctx, 0, code, Vec::new());
    spawn(&mut ctx, func);
    drive(&mut ctx);

    assert_eq!(out.text(), "4\nnull\n42\n");
}

#[test]
fn negative_index_write_is_ignored() {
    let (mut ctx, out) = capture_context();

    let mut code = vec![
        Instr::AddLocals(1),
        Instr::NewArray,
        Instr::PopLocal(0),
        Instr::PushLocal(0),
        Instr::PushInt(-1),
        Instr::PushInt(9),
        Instr::TabSet,
        Instr::Pop(1),
    ];
    code.extend(call_global(
        "println",
        1,
        vec![
            Instr::PushLocal(0),
            Instr::PushStr("n".to_string()),
            Instr::TabGet,
        ],
    ));
    code.push(Instr::Push0);
    code.push(Instr::Ret);

    let func = build_function(&mut ctx, 0, code, Vec::new());
    spawn(&mut ctx, func);
    drive(&mut ctx);

    assert_eq!(out.text(), "0\n");
}
