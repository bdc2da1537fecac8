// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::graph::GraphId;

/// Separator between the entity key and the time bucket in record ids.
pub const ID_SPLIT: &str = "_";

// Graph ids are part of the remote wire contract; never renumber them.
pub const SERVICE_HEARTBEAT_GRAPH_ID: GraphId = 100;
pub const INSTANCE_HEARTBEAT_GRAPH_ID: GraphId = 101;
pub const INSTANCE_MAPPING_GRAPH_ID: GraphId = 102;
pub const SERVICE_REFERENCE_GRAPH_ID: GraphId = 103;
pub const JVM_CPU_GRAPH_ID: GraphId = 200;
pub const JVM_MEMORY_GRAPH_ID: GraphId = 201;
pub const JVM_GC_GRAPH_ID: GraphId = 202;

/// Queue capacity for low volume streams.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;
/// Queue capacity for per-segment streams such as heartbeats.
pub const HOT_QUEUE_SIZE: usize = 4096;

/// Largest remote frame accepted from a peer.
pub const MAX_REMOTE_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Service standing for callers outside the instrumented system.
pub const USER_SERVICE_NAME: &str = "User";
pub const USER_SERVICE_ID: i32 = 1;

/// Upper latency bounds, in millis, of the reference latency counters.
pub const SLOW_CALL_THRESHOLDS_MS: [i64; 3] = [1_000, 3_000, 5_000];
