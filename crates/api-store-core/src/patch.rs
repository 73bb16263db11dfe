//! RFC 6902 JSON Patch, applied to a deep copy with a reverse patch
//! produced alongside the forward one. Built directly on `serde_json`
//! rather than a separate patch crate: the core requirement here is the
//! *inverse*, which a generic apply-only library wouldn't give us.

use crate::error::{ApiError, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

/// Parses a JSON-Patch array (`serde_json::Value::Array` of objects) into
/// typed ops, failing with [`ApiError::InvalidPatch`] on malformed entries.
pub fn parse_patch(patch: &Value) -> Result<Vec<Op>> {
    let arr = patch
        .as_array()
        .ok_or_else(|| ApiError::InvalidPatch("patch must be an array".to_string()))?;
    arr.iter().map(parse_op).collect()
}

fn parse_op(v: &Value) -> Result<Op> {
    let obj = v
        .as_object()
        .ok_or_else(|| ApiError::InvalidPatch("patch entry must be an object".to_string()))?;
    let op = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::InvalidPatch("missing \"op\"".to_string()))?;
    let path = || -> Result<String> {
        obj.get("path")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::InvalidPatch("missing \"path\"".to_string()))
    };
    let value = || obj.get("value").cloned().unwrap_or(Value::Null);
    let from = || -> Result<String> {
        obj.get("from")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::InvalidPatch("missing \"from\"".to_string()))
    };
    match op {
        "add" => Ok(Op::Add { path: path()?, value: value() }),
        "remove" => Ok(Op::Remove { path: path()? }),
        "replace" => Ok(Op::Replace { path: path()?, value: value() }),
        "move" => Ok(Op::Move { from: from()?, path: path()? }),
        "copy" => Ok(Op::Copy { from: from()?, path: path()? }),
        "test" => Ok(Op::Test { path: path()?, value: value() }),
        other => Err(ApiError::InvalidPatch(format!("unknown op {other:?}"))),
    }
}

pub fn ops_to_value(ops: &[Op]) -> Value {
    Value::Array(ops.iter().map(op_to_value).collect())
}

fn op_to_value(op: &Op) -> Value {
    match op {
        Op::Add { path, value } => serde_json::json!({"op": "add", "path": path, "value": value}),
        Op::Remove { path } => serde_json::json!({"op": "remove", "path": path}),
        Op::Replace { path, value } => serde_json::json!({"op": "replace", "path": path, "value": value}),
        Op::Move { from, path } => serde_json::json!({"op": "move", "from": from, "path": path}),
        Op::Copy { from, path } => serde_json::json!({"op": "copy", "from": from, "path": path}),
        Op::Test { path, value } => serde_json::json!({"op": "test", "path": path, "value": value}),
    }
}

/// Rejects any op whose path falls under one of `immutable_prefixes`.
pub fn check_immutable(ops: &[Op], immutable_prefixes: &[&str]) -> Result<()> {
    for op in ops {
        let touched: Vec<&str> = match op {
            Op::Add { path, .. } | Op::Remove { path } | Op::Replace { path, .. } | Op::Test { path, .. } => {
                vec![path.as_str()]
            }
            Op::Move { from, path } | Op::Copy { from, path } => {
                check_two(from, path, immutable_prefixes)?;
                continue;
            }
        };
        for p in &touched {
            if immutable_prefixes.iter().any(|pre| is_under(p, pre)) {
                return Err(ApiError::InvalidPatch(format!("path {p:?} is immutable")));
            }
        }
    }
    Ok(())
}

fn check_two(from: &str, path: &str, immutable_prefixes: &[&str]) -> Result<()> {
    for p in [from, path] {
        if immutable_prefixes.iter().any(|pre| is_under(p, pre)) {
            return Err(ApiError::InvalidPatch(format!("path {p:?} is immutable")));
        }
    }
    Ok(())
}

fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

/// Applies `ops` to a deep copy of `document`, returning the mutated
/// document and the inverse patch that undoes it.
pub fn apply_with_inverse(document: &Value, ops: &[Op]) -> Result<(Value, Vec<Op>)> {
    let mut doc = document.clone();
    let mut inverse = Vec::with_capacity(ops.len());
    for op in ops {
        let mut inv = apply_one(&mut doc, op)?;
        inverse.append(&mut inv);
    }
    inverse.reverse();
    Ok((doc, inverse))
}

/// Applies one op, returning its inverse as zero or more ops (in
/// forward-apply order; the caller reverses the whole sequence once).
/// `move`/`copy` decompose into `remove`+`add`.
fn apply_one(doc: &mut Value, op: &Op) -> Result<Vec<Op>> {
    match op {
        Op::Add { path, value } => {
            let prev = get_at(doc, path);
            set_at(doc, path, value.clone())?;
            match prev {
                Some(old) => Ok(vec![Op::Replace { path: path.clone(), value: old }]),
                None => Ok(vec![Op::Remove { path: path.clone() }]),
            }
        }
        Op::Remove { path } => {
            let old = remove_at(doc, path)?;
            Ok(vec![Op::Add { path: path.clone(), value: old }])
        }
        Op::Replace { path, value } => {
            let old = get_at(doc, path)
                .ok_or_else(|| ApiError::InvalidPatch(format!("path {path:?} does not exist")))?;
            set_at(doc, path, value.clone())?;
            Ok(vec![Op::Replace { path: path.clone(), value: old }])
        }
        Op::Move { from, path } => {
            let value = remove_at(doc, from)?;
            let prev_at_dest = get_at(doc, path);
            set_at(doc, path, value.clone())?;
            // Forward-order inverse: put the destination's old value back
            // first, then move the value back to where it came from.
            let mut inv = Vec::new();
            if let Some(old) = prev_at_dest {
                inv.push(Op::Add { path: path.clone(), value: old });
            }
            inv.push(Op::Move { from: path.clone(), path: from.clone() });
            Ok(inv)
        }
        Op::Copy { from, path } => {
            let value = get_at(doc, from)
                .ok_or_else(|| ApiError::InvalidPatch(format!("path {from:?} does not exist")))?;
            let prev_at_dest = get_at(doc, path);
            set_at(doc, path, value)?;
            match prev_at_dest {
                Some(old) => Ok(vec![Op::Replace { path: path.clone(), value: old }]),
                None => Ok(vec![Op::Remove { path: path.clone() }]),
            }
        }
        Op::Test { path, value } => {
            let current = get_at(doc, path);
            if current.as_ref() != Some(value) {
                return Err(ApiError::InvalidPatch(format!("test failed at {path:?}")));
            }
            Ok(vec![])
        }
    }
}

fn split_path(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(vec![]);
    }
    if !path.starts_with('/') {
        return Err(ApiError::InvalidPatch(format!("path {path:?} must start with /")));
    }
    Ok(path[1..]
        .split('/')
        .map(|tok| tok.replace("~1", "/").replace("~0", "~"))
        .collect())
}

fn get_at(doc: &Value, path: &str) -> Option<Value> {
    let tokens = split_path(path).ok()?;
    let mut cur = doc;
    for tok in &tokens {
        cur = match cur {
            Value::Object(map) => map.get(tok)?,
            Value::Array(arr) => {
                let idx: usize = tok.parse().ok()?;
                arr.get(idx)?
            }
            _ => return None,
        };
    }
    Some(cur.clone())
}

fn set_at(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let tokens = split_path(path)?;
    if tokens.is_empty() {
        *doc = value;
        return Ok(());
    }
    let mut cur = doc;
    for tok in &tokens[..tokens.len() - 1] {
        cur = match cur {
            Value::Object(map) => map
                .entry(tok.clone())
                .or_insert_with(|| Value::Object(Default::default())),
            Value::Array(arr) => {
                let idx: usize = tok
                    .parse()
                    .map_err(|_| ApiError::InvalidPatch(format!("bad array index {tok:?}")))?;
                arr.get_mut(idx)
                    .ok_or_else(|| ApiError::InvalidPatch(format!("index {idx} out of range")))?
            }
            _ => return Err(ApiError::InvalidPatch(format!("cannot descend into path {path:?}"))),
        };
    }
    let last = &tokens[tokens.len() - 1];
    match cur {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(arr) => {
            if last == "-" {
                arr.push(value);
            } else {
                let idx: usize = last
                    .parse()
                    .map_err(|_| ApiError::InvalidPatch(format!("bad array index {last:?}")))?;
                if idx > arr.len() {
                    return Err(ApiError::InvalidPatch(format!("index {idx} out of range")));
                }
                arr.insert(idx, value);
            }
        }
        _ => return Err(ApiError::InvalidPatch(format!("cannot set at path {path:?}"))),
    }
    Ok(())
}

fn remove_at(doc: &mut Value, path: &str) -> Result<Value> {
    let tokens = split_path(path)?;
    if tokens.is_empty() {
        return Err(ApiError::InvalidPatch("cannot remove root".to_string()));
    }
    let mut cur = doc;
    for tok in &tokens[..tokens.len() - 1] {
        cur = match cur {
            Value::Object(map) => map
                .get_mut(tok)
                .ok_or_else(|| ApiError::InvalidPatch(format!("path {path:?} does not exist")))?,
            Value::Array(arr) => {
                let idx: usize = tok
                    .parse()
                    .map_err(|_| ApiError::InvalidPatch(format!("bad array index {tok:?}")))?;
                arr.get_mut(idx)
                    .ok_or_else(|| ApiError::InvalidPatch(format!("index {idx} out of range")))?
            }
            _ => return Err(ApiError::InvalidPatch(format!("cannot descend into path {path:?}"))),
        };
    }
    let last = &tokens[tokens.len() - 1];
    match cur {
        Value::Object(map) => map
            .remove(last)
            .ok_or_else(|| ApiError::InvalidPatch(format!("path {path:?} does not exist"))),
        Value::Array(arr) => {
            let idx: usize = last
                .parse()
                .map_err(|_| ApiError::InvalidPatch(format!("bad array index {last:?}")))?;
            if idx >= arr.len() {
                return Err(ApiError::InvalidPatch(format!("index {idx} out of range")));
            }
            Ok(arr.remove(idx))
        }
        _ => Err(ApiError::InvalidPatch(format!("cannot remove at path {path:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn replace_inverts_to_replace_with_old_value() {
        let doc = json!({"info": {"name": "A"}});
        let ops = parse_patch(&json!([{"op": "replace", "path": "/info/name", "value": "B"}])).unwrap();
        let (new_doc, inverse) = apply_with_inverse(&doc, &ops).unwrap();
        assert_eq!(new_doc, json!({"info": {"name": "B"}}));
        let (reverted, _) = apply_with_inverse(&new_doc, &inverse).unwrap();
        assert_eq!(reverted, doc);
    }

    #[test]
    fn add_then_remove_round_trips() {
        let doc = json!({"a": 1});
        let ops = parse_patch(&json!([{"op": "add", "path": "/b", "value": 2}])).unwrap();
        let (new_doc, inverse) = apply_with_inverse(&doc, &ops).unwrap();
        assert_eq!(new_doc, json!({"a": 1, "b": 2}));
        let (reverted, _) = apply_with_inverse(&new_doc, &inverse).unwrap();
        assert_eq!(reverted, doc);
    }

    #[test]
    fn remove_then_add_round_trips() {
        let doc = json!({"a": 1, "b": 2});
        let ops = parse_patch(&json!([{"op": "remove", "path": "/b"}])).unwrap();
        let (new_doc, inverse) = apply_with_inverse(&doc, &ops).unwrap();
        assert_eq!(new_doc, json!({"a": 1}));
        let (reverted, _) = apply_with_inverse(&new_doc, &inverse).unwrap();
        assert_eq!(reverted, doc);
    }

    #[test]
    fn immutable_paths_are_rejected() {
        let ops = parse_patch(&json!([{"op": "replace", "path": "/owner", "value": "X"}])).unwrap();
        assert!(check_immutable(&ops, &["/_deleted", "/key", "/kind", "/owner", "/parents"]).is_err());
    }

    #[test]
    fn move_does_not_shadow_a_later_immutable_op() {
        let ops = parse_patch(&json!([
            {"op": "move", "from": "/info/a", "path": "/info/b"},
            {"op": "replace", "path": "/owner", "value": "attacker"}
        ]))
        .unwrap();
        assert!(check_immutable(&ops, &["/_deleted", "/key", "/kind", "/owner", "/parents"]).is_err());
    }

    proptest! {
        #[test]
        fn replace_scalar_is_always_invertible(a in any::<i64>(), b in any::<i64>()) {
            let doc = json!({"v": a});
            let ops = vec![Op::Replace { path: "/v".to_string(), value: json!(b) }];
            let (new_doc, inverse) = apply_with_inverse(&doc, &ops).unwrap();
            prop_assert_eq!(new_doc["v"].clone(), json!(b));
            let (reverted, _) = apply_with_inverse(&new_doc, &inverse).unwrap();
            prop_assert_eq!(reverted, doc);
        }
    }
}
