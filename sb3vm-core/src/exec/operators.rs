//! Operator reporters. Arithmetic is plain IEEE-754: division by zero gives
//! signed infinities, `0/0`, `∞−∞` and `∞×0` give NaN, and NaN survives
//! until a cast normalises it.

use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::project::BlockDecl;
use crate::thread::Thread;
use crate::types::BlockId;
use crate::value::{compare, Value};
use std::cmp::Ordering;

pub(crate) fn binary_num(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
    op: fn(f64, f64) -> f64,
) -> Value {
    let a = num_input(rt, th, graph, block, "NUM1", visited);
    let b = num_input(rt, th, graph, block, "NUM2", visited);
    Value::Number(op(a, b))
}

/// Result takes the sign of the divisor: `-3 mod 6 = 3`.
pub(crate) fn modulo(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let n = num_input(rt, th, graph, block, "NUM1", visited);
    let modulus = num_input(rt, th, graph, block, "NUM2", visited);
    let mut result = n % modulus;
    if result / modulus < 0.0 {
        result += modulus;
    }
    Value::Number(result)
}

/// `pick random`: whole-number bounds give a uniform integer, anything else
/// a uniform float over the range.
pub(crate) fn random(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let from = rt
        .input_value(th, graph, block, "FROM", visited)
        .unwrap_or_default();
    let to = rt
        .input_value(th, graph, block, "TO", visited)
        .unwrap_or_default();
    let integral = from.is_int_like() && to.is_int_like();
    let (a, b) = (from.to_number(), to.to_number());
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if !lo.is_finite() || !hi.is_finite() {
        return Value::Number(lo);
    }
    if integral {
        Value::Number(rt.random_int(lo as i64, hi as i64) as f64)
    } else {
        Value::Number(rt.random_float(lo, hi))
    }
}

pub(crate) fn comparison(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
    pick: fn(Ordering) -> bool,
) -> Value {
    let a = rt
        .input_value(th, graph, block, "OPERAND1", visited)
        .unwrap_or_default();
    let b = rt
        .input_value(th, graph, block, "OPERAND2", visited)
        .unwrap_or_default();
    Value::Bool(pick(compare(&a, &b)))
}

/// Short-circuit: the second operand is not evaluated when the first
/// decides the result.
pub(crate) fn logic_and(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let a = bool_input(rt, th, graph, block, "OPERAND1", visited);
    if !a {
        return Value::Bool(false);
    }
    Value::Bool(bool_input(rt, th, graph, block, "OPERAND2", visited))
}

pub(crate) fn logic_or(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let a = bool_input(rt, th, graph, block, "OPERAND1", visited);
    if a {
        return Value::Bool(true);
    }
    Value::Bool(bool_input(rt, th, graph, block, "OPERAND2", visited))
}

pub(crate) fn logic_not(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    Value::Bool(!bool_input(rt, th, graph, block, "OPERAND", visited))
}

pub(crate) fn join(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let a = str_input(rt, th, graph, block, "STRING1", visited);
    let b = str_input(rt, th, graph, block, "STRING2", visited);
    Value::Text(format!("{a}{b}"))
}

/// 1-indexed over Unicode scalars; out of range reports the empty string.
pub(crate) fn letter_of(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let index = num_input(rt, th, graph, block, "LETTER", visited);
    let text = str_input(rt, th, graph, block, "STRING", visited);
    if index < 1.0 || index.fract() != 0.0 {
        return Value::Text(String::new());
    }
    match text.chars().nth(index as usize - 1) {
        Some(c) => Value::Text(c.to_string()),
        None => Value::Text(String::new()),
    }
}

pub(crate) fn length(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let text = str_input(rt, th, graph, block, "STRING", visited);
    Value::Number(text.chars().count() as f64)
}

/// Case-insensitive substring test.
pub(crate) fn contains(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let haystack = str_input(rt, th, graph, block, "STRING1", visited).to_lowercase();
    let needle = str_input(rt, th, graph, block, "STRING2", visited).to_lowercase();
    Value::Bool(haystack.contains(&needle))
}

/// Half-away-from-zero, the rounding the repeat counter uses too.
pub(crate) fn round(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    Value::Number(num_input(rt, th, graph, block, "NUM", visited).round())
}

pub(crate) fn math_op(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let n = num_input(rt, th, graph, block, "NUM", visited);
    let op = block.field_text("OPERATOR").unwrap_or("");
    let result = match op.to_lowercase().as_str() {
        "abs" => n.abs(),
        "floor" => n.floor(),
        "ceiling" => n.ceil(),
        "sqrt" => n.sqrt(),
        "sin" => snap_tiny(n.to_radians().sin()),
        "cos" => snap_tiny(n.to_radians().cos()),
        "tan" => tan_degrees(n),
        "asin" => n.asin().to_degrees(),
        "acos" => n.acos().to_degrees(),
        "atan" => n.atan().to_degrees(),
        "ln" => n.ln(),
        "log" => n.log10(),
        "e ^" => n.exp(),
        "10 ^" => 10f64.powf(n),
        _ => 0.0,
    };
    Value::Number(result)
}

/// Rounds to 10 decimals so `sin 180` is exactly 0.
fn snap_tiny(v: f64) -> f64 {
    (v * 1e10).round() / 1e10
}

/// Scratch pins the tangent poles to signed infinity instead of the huge
/// finite values float tangent produces near them.
fn tan_degrees(degrees: f64) -> f64 {
    let wrapped = degrees % 360.0;
    if wrapped == 90.0 || wrapped == -270.0 {
        f64::INFINITY
    } else if wrapped == -90.0 || wrapped == 270.0 {
        f64::NEG_INFINITY
    } else {
        snap_tiny(wrapped.to_radians().tan())
    }
}

fn num_input(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    name: &str,
    visited: &mut Vec<BlockId>,
) -> f64 {
    rt.input_value(th, graph, block, name, visited)
        .map(|v| v.to_number())
        .unwrap_or(0.0)
}

fn str_input(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    name: &str,
    visited: &mut Vec<BlockId>,
) -> String {
    rt.input_value(th, graph, block, name, visited)
        .map(|v| v.to_display())
        .unwrap_or_default()
}

fn bool_input(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    name: &str,
    visited: &mut Vec<BlockId>,
) -> bool {
    rt.input_value(th, graph, block, name, visited)
        .map(|v| v.to_boolean())
        .unwrap_or(false)
}
