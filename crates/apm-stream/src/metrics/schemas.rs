// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record types produced by the collector.
//!
//! Inventory schemas (heartbeats, mappings) are keyed by entity only and
//! merged with the stored row. Metric schemas are bucketed by time and
//! persisted at every granularity.

use crate::record::{attribute, MergeOp::*, Schema, ValueKind::*};

pub static SERVICE_HEARTBEAT: Schema = Schema {
    name: "service_heartbeat",
    version: 1,
    keyed_by_time_bucket: false,
    attributes: &[attribute("heart_beat_time", Long, Overwrite)],
};

pub static INSTANCE_HEARTBEAT: Schema = Schema {
    name: "instance_heartbeat",
    version: 1,
    keyed_by_time_bucket: false,
    attributes: &[
        attribute("service_id", Int, KeepFirst),
        attribute("heart_beat_time", Long, Overwrite),
    ],
};

/// Network address an instance was reached through.
pub static INSTANCE_MAPPING: Schema = Schema {
    name: "instance_mapping",
    version: 1,
    keyed_by_time_bucket: false,
    attributes: &[
        attribute("instance_id", Int, KeepFirst),
        attribute("address_id", Int, KeepFirst),
        attribute("last_seen", Long, Overwrite),
    ],
};

/// Calls from one service to another, bucketed by latency.
pub static SERVICE_REFERENCE: Schema = Schema {
    name: "service_reference",
    version: 1,
    keyed_by_time_bucket: true,
    attributes: &[
        attribute("front_service_id", Int, KeepFirst),
        attribute("behind_service_id", Int, KeepFirst),
        attribute("one_second_less", Long, Sum),
        attribute("three_second_less", Long, Sum),
        attribute("five_second_less", Long, Sum),
        attribute("five_second_greater", Long, Sum),
        attribute("error", Long, Sum),
        attribute("summary", Long, Sum),
        attribute("duration_sum", Long, Sum),
    ],
};

pub static JVM_CPU: Schema = Schema {
    name: "jvm_cpu",
    version: 1,
    keyed_by_time_bucket: true,
    attributes: &[
        attribute("instance_id", Int, KeepFirst),
        attribute("usage_percent_sum", Double, Sum),
        attribute("times", Long, Sum),
    ],
};

pub static JVM_MEMORY: Schema = Schema {
    name: "jvm_memory",
    version: 1,
    keyed_by_time_bucket: true,
    attributes: &[
        attribute("instance_id", Int, KeepFirst),
        attribute("is_heap", Bool, KeepFirst),
        attribute("init", Long, Sum),
        attribute("max", Long, Sum),
        attribute("used", Long, Sum),
        attribute("committed", Long, Sum),
        attribute("times", Long, Sum),
    ],
};

pub static JVM_GC: Schema = Schema {
    name: "jvm_gc",
    version: 1,
    keyed_by_time_bucket: true,
    attributes: &[
        attribute("instance_id", Int, KeepFirst),
        attribute("phase", Int, KeepFirst),
        attribute("count", Long, Sum),
        attribute("time", Long, Sum),
        attribute("times", Long, Sum),
    ],
};
