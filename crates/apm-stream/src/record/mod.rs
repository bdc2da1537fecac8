// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Data records flowing through the aggregation graph.
//!
//! A [`Record`] is a typed tuple described by a static [`Schema`]. It is built
//! once by a listener, then only mutated through [`Record::merge`] inside the
//! worker that currently owns it.

pub mod schema;
pub mod time_bucket;
pub mod value;

pub use schema::{attribute, Attribute, MergeOp, Schema, ValueKind};
pub use time_bucket::Granularity;
pub use value::Value;

use crate::constants::ID_SPLIT;
use crate::errors::RecordError;

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: &'static Schema,
    entity_key: String,
    time_bucket: i64,
    id: String,
    values: Vec<Value>,
}

impl Record {
    #[must_use]
    pub fn builder(
        schema: &'static Schema,
        entity_key: impl Into<String>,
        time_bucket: i64,
    ) -> RecordBuilder {
        RecordBuilder {
            schema,
            entity_key: entity_key.into(),
            time_bucket,
            values: schema.attributes.iter().map(|a| Value::zero(a.kind)).collect(),
            error: None,
        }
    }

    /// Rebuilds a record from positional values, checking kinds against the schema.
    pub fn from_values(
        schema: &'static Schema,
        entity_key: String,
        time_bucket: i64,
        values: Vec<Value>,
    ) -> Result<Record, RecordError> {
        if values.len() != schema.attributes.len() {
            return Err(RecordError::Arity {
                schema: schema.name,
                expected: schema.attributes.len(),
                actual: values.len(),
            });
        }
        for (attr, value) in schema.attributes.iter().zip(&values) {
            if attr.kind != value.kind() {
                return Err(RecordError::KindMismatch {
                    schema: schema.name,
                    attribute: attr.name,
                    expected: attr.kind,
                    actual: value.kind(),
                });
            }
        }
        let id = compose_id(schema, &entity_key, time_bucket);
        Ok(Record {
            schema,
            entity_key,
            time_bucket,
            id,
            values,
        })
    }

    #[must_use]
    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn entity_key(&self) -> &str {
        &self.entity_key
    }

    #[must_use]
    pub fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.position(name).map(|i| &self.values[i])
    }

    #[must_use]
    pub fn get_long(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_long)
    }

    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(Value::as_int)
    }

    #[must_use]
    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_double)
    }

    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Merges `other` into this record field by field, using each attribute's
    /// declared [`MergeOp`]. Both records must share schema and id.
    pub fn merge(&mut self, other: &Record) -> Result<(), RecordError> {
        if !self.schema.same_as(other.schema) || self.id != other.id {
            return Err(RecordError::Unmergeable {
                this: format!("{}/{}", self.schema.name, self.id),
                other: format!("{}/{}", other.schema.name, other.id),
            });
        }
        for ((attr, mine), theirs) in self
            .schema
            .attributes
            .iter()
            .zip(self.values.iter_mut())
            .zip(&other.values)
        {
            mine.merge(theirs, attr.op);
        }
        Ok(())
    }

    /// Copy of this record moved to a coarser time bucket, with its id recomputed.
    pub fn rebucket(&self, from: Granularity, to: Granularity) -> Result<Record, RecordError> {
        let time_bucket = time_bucket::convert(self.time_bucket, from, to)?;
        Ok(Record {
            schema: self.schema,
            entity_key: self.entity_key.clone(),
            time_bucket,
            id: compose_id(self.schema, &self.entity_key, time_bucket),
            values: self.values.clone(),
        })
    }
}

fn compose_id(schema: &Schema, entity_key: &str, time_bucket: i64) -> String {
    if schema.keyed_by_time_bucket {
        format!("{entity_key}{ID_SPLIT}{time_bucket}")
    } else {
        entity_key.to_string()
    }
}

/// Builder returned by [`Record::builder`]. Unset attributes keep the zero
/// value of their kind; the first invalid `set` is reported by `build`.
#[derive(Debug)]
pub struct RecordBuilder {
    schema: &'static Schema,
    entity_key: String,
    time_bucket: i64,
    values: Vec<Value>,
    error: Option<RecordError>,
}

impl RecordBuilder {
    #[must_use]
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let value = value.into();
        match self.schema.position(name) {
            None => {
                self.error = Some(RecordError::UnknownAttribute {
                    schema: self.schema.name,
                    attribute: name.to_string(),
                });
            }
            Some(i) => {
                let attr = &self.schema.attributes[i];
                if attr.kind == value.kind() {
                    self.values[i] = value;
                } else {
                    self.error = Some(RecordError::KindMismatch {
                        schema: self.schema.name,
                        attribute: attr.name,
                        expected: attr.kind,
                        actual: value.kind(),
                    });
                }
            }
        }
        self
    }

    pub fn build(self) -> Result<Record, RecordError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let id = compose_id(self.schema, &self.entity_key, self.time_bucket);
        Ok(Record {
            schema: self.schema,
            entity_key: self.entity_key,
            time_bucket: self.time_bucket,
            id,
            values: self.values,
        })
    }
}
