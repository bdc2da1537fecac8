// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static record schemas.
//!
//! Every record type declares its attributes once, in a `'static` table. The
//! position of an attribute in the table is also its position in the record's
//! value vector and in the remote wire payload, so tables must only ever grow
//! at the end (bump `version` when they do).

use serde::Serialize;

/// Primitive kinds an attribute can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueKind {
    Str,
    Int,
    Long,
    Bool,
    Double,
    Bytes,
}

/// How two values of the same attribute combine when records are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MergeOp {
    /// Keep the value that was set first, ignore later ones.
    KeepFirst,
    /// Last write wins.
    Overwrite,
    /// Add numeric values together. Non-numeric kinds behave like `Overwrite`.
    Sum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: ValueKind,
    pub op: MergeOp,
}

#[must_use]
pub const fn attribute(name: &'static str, kind: ValueKind, op: MergeOp) -> Attribute {
    Attribute { name, kind, op }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub name: &'static str,
    pub version: u32,
    /// When true the record id is `<entityKey>_<timeBucket>`, otherwise the
    /// entity key alone (inventory-style records such as heartbeats).
    pub keyed_by_time_bucket: bool,
    pub attributes: &'static [Attribute],
}

impl Schema {
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&'static Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Number of attributes of `kind`, used to size wire payloads.
    #[must_use]
    pub fn count_of(&self, kind: ValueKind) -> usize {
        self.attributes.iter().filter(|a| a.kind == kind).count()
    }

    #[must_use]
    pub fn same_as(&self, other: &Schema) -> bool {
        std::ptr::eq(self, other) || (self.name == other.name && self.version == other.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST: Schema = Schema {
        name: "test",
        version: 1,
        keyed_by_time_bucket: true,
        attributes: &[
            attribute("a", ValueKind::Int, MergeOp::KeepFirst),
            attribute("b", ValueKind::Long, MergeOp::Sum),
            attribute("c", ValueKind::Long, MergeOp::Overwrite),
        ],
    };

    #[test]
    fn test_position_follows_declaration_order() {
        assert_eq!(TEST.position("a"), Some(0));
        assert_eq!(TEST.position("c"), Some(2));
        assert_eq!(TEST.position("missing"), None);
        assert_eq!(TEST.count_of(ValueKind::Long), 2);
        assert_eq!(TEST.count_of(ValueKind::Str), 0);
    }
}
