// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

use super::schema::{MergeOp, ValueKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Str(String),
    Int(i32),
    Long(i64),
    Bool(bool),
    Double(f64),
    Bytes(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Str(_) => ValueKind::Str,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Bool(_) => ValueKind::Bool,
            Value::Double(_) => ValueKind::Double,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    #[must_use]
    pub fn zero(kind: ValueKind) -> Value {
        match kind {
            ValueKind::Str => Value::Str(String::new()),
            ValueKind::Int => Value::Int(0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Bytes => Value::Bytes(Vec::new()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Combines `incoming` into `self` following `op`.
    ///
    /// Both values are expected to have the same kind; the record layer
    /// guarantees it.
    pub(crate) fn merge(&mut self, incoming: &Value, op: MergeOp) {
        match op {
            MergeOp::KeepFirst => {}
            MergeOp::Overwrite => self.clone_from(incoming),
            MergeOp::Sum => match (self, incoming) {
                (Value::Int(a), Value::Int(b)) => *a = a.saturating_add(*b),
                (Value::Long(a), Value::Long(b)) => *a = a.saturating_add(*b),
                (Value::Double(a), Value::Double(b)) => *a += *b,
                (this, other) => this.clone_from(other),
            },
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
