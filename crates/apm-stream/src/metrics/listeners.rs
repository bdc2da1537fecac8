// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::listener::{SegmentCore, SpanListener};
use super::schemas::{INSTANCE_HEARTBEAT, INSTANCE_MAPPING, SERVICE_HEARTBEAT, SERVICE_REFERENCE};
use crate::constants::{
    INSTANCE_HEARTBEAT_GRAPH_ID, INSTANCE_MAPPING_GRAPH_ID, ID_SPLIT, SERVICE_HEARTBEAT_GRAPH_ID,
    SERVICE_REFERENCE_GRAPH_ID, SLOW_CALL_THRESHOLDS_MS, USER_SERVICE_ID,
};
use crate::errors::RecordError;
use crate::graph::GraphId;
use crate::record::{time_bucket, Record};
use crate::telemetry::Span;

/// Marks the segment's service as alive until the segment's end.
pub struct ServiceHeartbeatListener;

impl SpanListener for ServiceHeartbeatListener {
    fn build(&mut self, core: &SegmentCore) -> Result<Vec<(GraphId, Record)>, RecordError> {
        let record = Record::builder(&SERVICE_HEARTBEAT, core.service_id.to_string(), core.minute_bucket)
            .set("heart_beat_time", core.end_time)
            .build()?;
        Ok(vec![(SERVICE_HEARTBEAT_GRAPH_ID, record)])
    }
}

pub struct InstanceHeartbeatListener;

impl SpanListener for InstanceHeartbeatListener {
    fn build(&mut self, core: &SegmentCore) -> Result<Vec<(GraphId, Record)>, RecordError> {
        Ok(vec![(
            INSTANCE_HEARTBEAT_GRAPH_ID,
            instance_heartbeat(core.service_id, core.instance_id, core.end_time, core.minute_bucket)?,
        )])
    }
}

/// Heartbeat record of a service instance.
pub fn instance_heartbeat(
    service_id: i32,
    instance_id: i32,
    heart_beat_time: i64,
    minute_bucket: i64,
) -> Result<Record, RecordError> {
    Record::builder(&INSTANCE_HEARTBEAT, instance_id.to_string(), minute_bucket)
        .set("service_id", service_id)
        .set("heart_beat_time", heart_beat_time)
        .build()
}

/// Records which network addresses callers used to reach this instance.
#[derive(Default)]
pub struct InstanceMappingListener {
    address_ids: Vec<i32>,
}

impl SpanListener for InstanceMappingListener {
    fn parse_entry(&mut self, span: &Span, _core: &SegmentCore) {
        for reference in &span.refs {
            if let Some(address_id) = reference.network_address_id {
                if !self.address_ids.contains(&address_id) {
                    self.address_ids.push(address_id);
                }
            }
        }
    }

    fn build(&mut self, core: &SegmentCore) -> Result<Vec<(GraphId, Record)>, RecordError> {
        self.address_ids
            .drain(..)
            .map(|address_id| {
                let key = format!("{}{ID_SPLIT}{address_id}", core.instance_id);
                let record = Record::builder(&INSTANCE_MAPPING, key, core.minute_bucket)
                    .set("instance_id", core.instance_id)
                    .set("address_id", address_id)
                    .set("last_seen", core.end_time)
                    .build()?;
                Ok((INSTANCE_MAPPING_GRAPH_ID, record))
            })
            .collect()
    }
}

struct Call {
    front_service_id: i32,
    start_time: i64,
    duration: i64,
    is_error: bool,
}

/// Service-to-service call counts. An entry span without references is a
/// call from the user service.
#[derive(Default)]
pub struct ServiceReferenceListener {
    calls: Vec<Call>,
}

impl SpanListener for ServiceReferenceListener {
    fn parse_entry(&mut self, span: &Span, _core: &SegmentCore) {
        let call = |front_service_id| Call {
            front_service_id,
            start_time: span.start_time,
            duration: span.duration_millis(),
            is_error: span.is_error,
        };
        if span.refs.is_empty() {
            self.calls.push(call(USER_SERVICE_ID));
            return;
        }
        for reference in &span.refs {
            if let Some(parent) = reference.parent_service_id {
                self.calls.push(call(parent));
            }
        }
    }

    fn build(&mut self, core: &SegmentCore) -> Result<Vec<(GraphId, Record)>, RecordError> {
        self.calls
            .drain(..)
            .map(|call| {
                let key = format!("{}{ID_SPLIT}{}", call.front_service_id, core.service_id);
                let bucket = time_bucket::minute_bucket(call.start_time)?;
                let [one, three, five] = SLOW_CALL_THRESHOLDS_MS;
                let latency = if call.duration <= one {
                    "one_second_less"
                } else if call.duration <= three {
                    "three_second_less"
                } else if call.duration <= five {
                    "five_second_less"
                } else {
                    "five_second_greater"
                };
                let record = Record::builder(&SERVICE_REFERENCE, key, bucket)
                    .set("front_service_id", call.front_service_id)
                    .set("behind_service_id", core.service_id)
                    .set(latency, 1_i64)
                    .set("error", i64::from(call.is_error))
                    .set("summary", 1_i64)
                    .set("duration_sum", call.duration)
                    .build()?;
                Ok((SERVICE_REFERENCE_GRAPH_ID, record))
            })
            .collect()
    }
}
