// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node list queries.
//!
//! The store's list endpoint takes `field=value` pairs where fields may use
//! dotted paths (`data.kernel_revision.tree`) and operator suffixes
//! (`__gt`, `__lt`, `__re`, `__ne`). [`NodeQuery::matches`] mirrors the
//! server-side evaluation for the in-memory fake; `__re` is evaluated there
//! as containment.

use chrono::{DateTime, Utc};
use cv_core::{Node, NodeId, NodeKind, NodeState};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeQuery {
    params: Vec<(String, String)>,
    limit: Option<usize>,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match filter on a (possibly dotted) field path.
    pub fn field(mut self, path: &str, value: impl ToString) -> Self {
        self.params.push((path.to_string(), value.to_string()));
        self
    }

    pub fn ne(mut self, path: &str, value: impl ToString) -> Self {
        self.params.push((format!("{path}__ne"), value.to_string()));
        self
    }

    pub fn gt(mut self, path: &str, value: impl ToString) -> Self {
        self.params.push((format!("{path}__gt"), value.to_string()));
        self
    }

    pub fn lt(mut self, path: &str, value: impl ToString) -> Self {
        self.params.push((format!("{path}__lt"), value.to_string()));
        self
    }

    pub fn re(mut self, path: &str, value: impl ToString) -> Self {
        self.params.push((format!("{path}__re"), value.to_string()));
        self
    }

    pub fn kind(self, kind: NodeKind) -> Self {
        self.field("kind", kind)
    }

    pub fn state(self, state: NodeState) -> Self {
        self.field("state", state)
    }

    pub fn name(self, name: &str) -> Self {
        self.field("name", name)
    }

    pub fn parent(self, parent: NodeId) -> Self {
        self.field("parent", parent)
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Query-string pairs for the HTTP client.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Server-side filter semantics, replayed locally for the fake store.
    pub fn matches(&self, node: &Node) -> bool {
        let Ok(doc) = serde_json::to_value(node) else {
            return false;
        };
        self.params.iter().all(|(key, want)| {
            let (path, op) = split_op(key);
            match lookup(&doc, path) {
                Some(value) => compare(&value, op, want),
                // absent fields only satisfy inequality
                None => op == Op::Ne,
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Re,
}

fn split_op(key: &str) -> (&str, Op) {
    for (suffix, op) in
        [("__ne", Op::Ne), ("__gt", Op::Gt), ("__lt", Op::Lt), ("__re", Op::Re)]
    {
        if let Some(path) = key.strip_suffix(suffix) {
            return (path, op);
        }
    }
    (key, Op::Eq)
}

fn lookup(doc: &serde_json::Value, path: &str) -> Option<String> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    match current {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn compare(have: &str, op: Op, want: &str) -> bool {
    match op {
        Op::Eq => have == want,
        Op::Ne => have != want,
        Op::Re => have.contains(want),
        Op::Gt | Op::Lt => {
            let ordering = if let (Ok(a), Ok(b)) =
                (have.parse::<DateTime<Utc>>(), want.parse::<DateTime<Utc>>())
            {
                a.cmp(&b)
            } else if let (Ok(a), Ok(b)) = (have.parse::<f64>(), want.parse::<f64>()) {
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            } else {
                have.cmp(want)
            };
            match op {
                Op::Gt => ordering == std::cmp::Ordering::Greater,
                _ => ordering == std::cmp::Ordering::Less,
            }
        }
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
