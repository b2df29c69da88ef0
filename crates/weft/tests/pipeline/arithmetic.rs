//! Arithmetic promotion as observed through `println`.

use weft::Instr;

use crate::{build_function, call_global, capture_context, drive, spawn};

fn print_expr(expr: Vec<Instr>) -> String {
    let (mut ctx, out) = capture_context();
    let mut code = call_global("println", 1, expr);
    code.push(Instr::Push0);
    code.push(Instr::Ret);
    let func = build_function(&mut ctx, 0, code, Vec::new());
    spawn(&mut ctx, func);
    drive(&mut ctx);
    out.text()
}

#[test]
fn int_plus_int_prints_int() {
    let printed = print_expr(vec![Instr::PushInt(1), Instr::PushInt(2), Instr::Add]);
    assert_eq!(printed, "3\n");
}

#[test]
fn int_plus_float_prints_fixed_float() {
    let printed = print_expr(vec![Instr::PushInt(1), Instr::PushFloat(2.0), Instr::Add]);
    assert_eq!(printed, "3.000000\n");
}

#[test]
fn int_modulo_int() {
    let printed = print_expr(vec![Instr::PushInt(7), Instr::PushInt(3), Instr::Modulo]);
    assert_eq!(printed, "1\n");
}

#[test]
fn int_modulo_float_is_null() {
    let printed = print_expr(vec![
        Instr::PushInt(7),
        Instr::PushFloat(3.0),
        Instr::Modulo,
    ]);
    assert_eq!(printed, "null\n");
}

#[test]
fn division_always_prints_float() {
    let printed = print_expr(vec![Instr::PushInt(6), Instr::PushInt(3), Instr::Div]);
    assert_eq!(printed, "2.000000\n");
}

#[test]
fn comparison_prints_canonical_truth() {
    let printed = print_expr(vec![Instr::PushInt(1), Instr::PushInt(2), Instr::Lt]);
    assert_eq!(printed, "1\n");
    let printed = print_expr(vec![Instr::PushInt(2), Instr::PushInt(1), Instr::Lt]);
    assert_eq!(printed, "null\n");
}
