// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pre-decoded telemetry handed over by the transport layer.
//!
//! Names arrive as strings; the `*_id` fields start empty and are filled by
//! id exchange before a segment is parsed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanType {
    Entry,
    Exit,
    Local,
}

/// Link from a span to the span of another segment that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReference {
    pub parent_service_name: String,
    /// Address the caller used to reach this service.
    pub network_address: String,
    #[serde(default)]
    pub parent_service_id: Option<i32>,
    #[serde(default)]
    pub network_address_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub span_id: i32,
    #[serde(default = "no_parent")]
    pub parent_span_id: i32,
    pub span_type: SpanType,
    pub operation_name: String,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub is_error: bool,
    /// Remote address of an exit span.
    #[serde(default)]
    pub peer: Option<String>,
    #[serde(default)]
    pub refs: Vec<SegmentReference>,
    #[serde(default)]
    pub operation_id: Option<i32>,
    #[serde(default)]
    pub peer_id: Option<i32>,
}

fn no_parent() -> i32 {
    -1
}

impl Span {
    #[must_use]
    pub fn duration_millis(&self) -> i64 {
        (self.end_time - self.start_time).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSegment {
    pub trace_id: String,
    pub segment_id: String,
    pub service_name: String,
    pub service_instance_name: String,
    pub spans: Vec<Span>,
    #[serde(default)]
    pub service_id: Option<i32>,
    #[serde(default)]
    pub service_instance_id: Option<i32>,
}

impl TraceSegment {
    /// Earliest span start, in epoch millis.
    #[must_use]
    pub fn start_time(&self) -> Option<i64> {
        self.spans.iter().map(|s| s.start_time).min()
    }

    /// Latest span end, in epoch millis.
    #[must_use]
    pub fn end_time(&self) -> Option<i64> {
        self.spans.iter().map(|s| s.end_time).max()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuMetric {
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMetric {
    pub is_heap: bool,
    pub init: i64,
    pub max: i64,
    pub used: i64,
    pub committed: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcPhase {
    Young,
    Old,
}

impl GcPhase {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            GcPhase::Young => 0,
            GcPhase::Old => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcMetric {
    pub phase: GcPhase,
    pub count: i64,
    pub time: i64,
}

/// One JVM sample of a service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JvmMetric {
    pub time: i64,
    pub cpu: CpuMetric,
    #[serde(default)]
    pub memory: Vec<MemoryMetric>,
    #[serde(default)]
    pub gc: Vec<GcMetric>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHeartbeat {
    pub service_id: i32,
    pub instance_id: i32,
    pub heart_beat_time: i64,
}

/// Everything the ingestion boundary accepts, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Telemetry {
    Segment(TraceSegment),
    Jvm {
        instance_id: i32,
        metrics: Vec<JvmMetric>,
    },
    Heartbeat(InstanceHeartbeat),
}
