//! Variable and list blocks. Lists are 1-indexed throughout; out-of-range
//! reads report the empty string and out-of-range writes are no-ops.

use crate::blocks::BlockGraph;
use crate::engine::Runtime;
use crate::project::BlockDecl;
use crate::thread::Thread;
use crate::types::BlockId;
use crate::value::{values_equal, Value};

/// Variable/list fields carry the display name and a reference id.
fn field_ref<'b>(block: &'b BlockDecl, name: &str) -> (&'b str, &'b str) {
    match block.fields.get(name) {
        Some(f) => (f.id.as_deref().unwrap_or(""), f.value.as_str()),
        None => ("", ""),
    }
}

pub(crate) fn variable_reporter(rt: &mut Runtime, th: &Thread, block: &BlockDecl) -> Value {
    let (id, name) = field_ref(block, "VARIABLE");
    rt.variable_value(th.target, id, name)
}

pub(crate) fn set_variable(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let value = rt.arg_value(th, graph, block, "VALUE");
    let (id, name) = field_ref(block, "VARIABLE");
    rt.set_variable(th.target, id, name, value);
}

pub(crate) fn change_variable(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let delta = rt.arg_num(th, graph, block, "VALUE");
    let (id, name) = field_ref(block, "VARIABLE");
    let current = rt.variable_value(th.target, id, name).to_number();
    rt.set_variable(th.target, id, name, Value::Number(current + delta));
}

pub(crate) fn set_variable_visible(
    rt: &mut Runtime,
    th: &mut Thread,
    block: &BlockDecl,
    visible: bool,
) {
    let (id, name) = field_ref(block, "VARIABLE");
    rt.set_variable_monitor(th.target, id, name, visible);
}

// ─── Lists ────────────────────────────────────────────────────

/// How an index argument resolves against a list of `len` items.
enum ListIndex {
    Item(usize),
    All,
    OutOfRange,
}

/// `"last"`, `"random"`/`"any"` and (for deletes) `"all"` are accepted
/// alongside 1-based numeric indices.
fn resolve_index(rt: &mut Runtime, arg: &Value, len: usize, accept_all: bool) -> ListIndex {
    if let Value::Text(word) = arg {
        match word.as_str() {
            "last" => {
                return if len > 0 {
                    ListIndex::Item(len)
                } else {
                    ListIndex::OutOfRange
                }
            }
            "random" | "any" => {
                return if len > 0 {
                    ListIndex::Item(rt.random_int(1, len as i64) as usize)
                } else {
                    ListIndex::OutOfRange
                }
            }
            "all" if accept_all => return ListIndex::All,
            _ => {}
        }
    }
    let n = arg.to_number();
    if n.fract() != 0.0 || n < 1.0 || n > len as f64 {
        return ListIndex::OutOfRange;
    }
    ListIndex::Item(n as usize)
}

pub(crate) fn add_to_list(rt: &mut Runtime, th: &mut Thread, graph: &BlockGraph, block: &BlockDecl) {
    let item = rt.arg_value(th, graph, block, "ITEM");
    let (id, name) = field_ref(block, "LIST");
    rt.with_list(th.target, id, name, |list| list.values.push(item));
}

pub(crate) fn delete_of_list(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let index_arg = rt.arg_value(th, graph, block, "INDEX");
    let (id, name) = field_ref(block, "LIST");
    let len = rt.list_len(th.target, id, name);
    match resolve_index(rt, &index_arg, len, true) {
        ListIndex::Item(i) => {
            rt.with_list(th.target, id, name, |list| {
                list.values.remove(i - 1);
            });
        }
        ListIndex::All => rt.with_list(th.target, id, name, |list| list.values.clear()),
        ListIndex::OutOfRange => {}
    }
}

pub(crate) fn delete_all_of_list(rt: &mut Runtime, th: &mut Thread, block: &BlockDecl) {
    let (id, name) = field_ref(block, "LIST");
    rt.with_list(th.target, id, name, |list| list.values.clear());
}

pub(crate) fn insert_at_list(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let item = rt.arg_value(th, graph, block, "ITEM");
    let index_arg = rt.arg_value(th, graph, block, "INDEX");
    let (id, name) = field_ref(block, "LIST");
    let len = rt.list_len(th.target, id, name);
    // Inserting one past the end appends.
    match resolve_index(rt, &index_arg, len + 1, false) {
        ListIndex::Item(i) => {
            rt.with_list(th.target, id, name, |list| list.values.insert(i - 1, item));
        }
        _ => {}
    }
}

pub(crate) fn replace_item_of_list(
    rt: &mut Runtime,
    th: &mut Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
) {
    let item = rt.arg_value(th, graph, block, "ITEM");
    let index_arg = rt.arg_value(th, graph, block, "INDEX");
    let (id, name) = field_ref(block, "LIST");
    let len = rt.list_len(th.target, id, name);
    match resolve_index(rt, &index_arg, len, false) {
        ListIndex::Item(i) => {
            rt.with_list(th.target, id, name, |list| list.values[i - 1] = item);
        }
        _ => {}
    }
}

pub(crate) fn item_of_list(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let index_arg = rt
        .input_value(th, graph, block, "INDEX", visited)
        .unwrap_or_default();
    let (id, name) = field_ref(block, "LIST");
    let len = rt.list_len(th.target, id, name);
    match resolve_index(rt, &index_arg, len, false) {
        ListIndex::Item(i) => rt
            .list_item(th.target, id, name, i)
            .unwrap_or_else(|| Value::Text(String::new())),
        _ => Value::Text(String::new()),
    }
}

/// 1-based position of the first matching item, 0 when absent. Matching
/// uses the cast-aware equality, so `"6"` finds the number 6.
pub(crate) fn item_num_of_list(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let item = rt
        .input_value(th, graph, block, "ITEM", visited)
        .unwrap_or_default();
    let (id, name) = field_ref(block, "LIST");
    let position = rt.list_find(th.target, id, name, |v| values_equal(v, &item));
    Value::Number(position.map(|p| p as f64).unwrap_or(0.0))
}

pub(crate) fn length_of_list(rt: &mut Runtime, th: &Thread, block: &BlockDecl) -> Value {
    let (id, name) = field_ref(block, "LIST");
    Value::Number(rt.list_len(th.target, id, name) as f64)
}

pub(crate) fn list_contains_item(
    rt: &mut Runtime,
    th: &Thread,
    graph: &BlockGraph,
    block: &BlockDecl,
    visited: &mut Vec<BlockId>,
) -> Value {
    let item = rt
        .input_value(th, graph, block, "ITEM", visited)
        .unwrap_or_default();
    let (id, name) = field_ref(block, "LIST");
    Value::Bool(rt.list_find(th.target, id, name, |v| values_equal(v, &item)).is_some())
}

/// Single-character items join bare, anything else space-separated.
pub(crate) fn list_contents_reporter(rt: &mut Runtime, th: &Thread, block: &BlockDecl) -> Value {
    let (id, name) = field_ref(block, "LIST");
    Value::Text(rt.list_contents(th.target, id, name))
}

pub(crate) fn set_list_visible(rt: &mut Runtime, th: &mut Thread, block: &BlockDecl, visible: bool) {
    let (id, name) = field_ref(block, "LIST");
    rt.set_list_monitor(th.target, id, name, visible);
}
