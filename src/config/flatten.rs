//! `!flatten_seq` semantics.

use serde_yaml::Value;

/// Flatten nested sequences into a single level, depth-first.
///
/// Non-sequence elements are leaves and keep their relative position, so
/// `[a, [b, [c]], d]` becomes `[a, b, c, d]`. Applying it twice is the same as
/// applying it once.
pub fn flatten(items: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len());
    push_flat(items, &mut out);
    out
}

fn push_flat(items: Vec<Value>, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Sequence(inner) => push_flat(inner, out),
            leaf => out.push(leaf),
        }
    }
}
