// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire format of records exchanged between collector peers.
//!
//! A record travels as flat typed arrays. `data_strings[0]` carries the
//! entity key and `data_longs[0]` the time bucket; the schema's attributes
//! follow, each appended to the array of its kind in definition order.

use crate::errors::WireError;
use crate::graph::{GraphId, NodeId};
use crate::record::{Record, Schema, Value, ValueKind};

#[derive(Clone, PartialEq, prost::Message)]
pub struct RemoteMessage {
    #[prost(int32, tag = "1")]
    pub graph_id: i32,
    #[prost(int32, tag = "2")]
    pub node_id: i32,
    #[prost(message, optional, tag = "3")]
    pub payload: Option<RemoteData>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RemoteData {
    #[prost(string, repeated, tag = "1")]
    pub data_strings: Vec<String>,
    #[prost(int32, repeated, tag = "2")]
    pub data_integers: Vec<i32>,
    #[prost(int64, repeated, tag = "3")]
    pub data_longs: Vec<i64>,
    #[prost(bool, repeated, tag = "4")]
    pub data_booleans: Vec<bool>,
    #[prost(double, repeated, tag = "5")]
    pub data_doubles: Vec<f64>,
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub data_bytes: Vec<Vec<u8>>,
}

#[must_use]
pub fn encode_message(graph_id: GraphId, node_id: NodeId, record: &Record) -> RemoteMessage {
    RemoteMessage {
        graph_id,
        node_id,
        payload: Some(encode_record(record)),
    }
}

#[must_use]
pub fn encode_record(record: &Record) -> RemoteData {
    let mut data = RemoteData {
        data_strings: vec![record.entity_key().to_string()],
        data_longs: vec![record.time_bucket()],
        ..RemoteData::default()
    };
    for value in record.values() {
        match value {
            Value::Str(v) => data.data_strings.push(v.clone()),
            Value::Int(v) => data.data_integers.push(*v),
            Value::Long(v) => data.data_longs.push(*v),
            Value::Bool(v) => data.data_booleans.push(*v),
            Value::Double(v) => data.data_doubles.push(*v),
            Value::Bytes(v) => data.data_bytes.push(v.clone()),
        }
    }
    data
}

pub fn decode_record(schema: &'static Schema, data: RemoteData) -> Result<Record, WireError> {
    let check = |kind: ValueKind, header: usize, actual: usize| {
        let expected = header + schema.count_of(kind);
        if expected == actual {
            Ok(())
        } else {
            Err(WireError::FieldCount {
                schema: schema.name,
                kind,
                expected,
                actual,
            })
        }
    };
    check(ValueKind::Str, 1, data.data_strings.len())?;
    check(ValueKind::Int, 0, data.data_integers.len())?;
    check(ValueKind::Long, 1, data.data_longs.len())?;
    check(ValueKind::Bool, 0, data.data_booleans.len())?;
    check(ValueKind::Double, 0, data.data_doubles.len())?;
    check(ValueKind::Bytes, 0, data.data_bytes.len())?;

    let mut strings = data.data_strings.into_iter();
    let mut integers = data.data_integers.into_iter();
    let mut longs = data.data_longs.into_iter();
    let mut booleans = data.data_booleans.into_iter();
    let mut doubles = data.data_doubles.into_iter();
    let mut bytes = data.data_bytes.into_iter();

    let entity_key = strings.next().unwrap_or_default();
    let time_bucket = longs.next().unwrap_or_default();
    // Counts were checked above, so every `next` yields a value.
    let values = schema
        .attributes
        .iter()
        .map(|attr| match attr.kind {
            ValueKind::Str => strings.next().map(Value::Str),
            ValueKind::Int => integers.next().map(Value::Int),
            ValueKind::Long => longs.next().map(Value::Long),
            ValueKind::Bool => booleans.next().map(Value::Bool),
            ValueKind::Double => doubles.next().map(Value::Double),
            ValueKind::Bytes => bytes.next().map(Value::Bytes),
        })
        .collect::<Option<Vec<Value>>>()
        .ok_or(WireError::MissingPayload)?;

    Ok(Record::from_values(schema, entity_key, time_bucket, values)?)
}
