// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # apm-stream
//!
//! The stream-processing core of an APM collector: telemetry records enter a
//! per-metric graph, get merged by aggregation workers, are routed to the
//! cluster peer owning their aggregation key and finally land in storage at
//! minute, hour, day and month granularity.
//!
//! ```text
//! segment ─> Standardizer ─> SegmentParser ─> Graph entry
//!                                                 │
//!                              AggregationWorker (minute window)
//!                                                 │
//!                              RemoteNode (consistent hash on record id)
//!                                                 │
//!            ┌──────────────┬─────────────────────┼──────────────┐
//!     Persist(minute)  Transform(hour)     Transform(day)  Transform(month)
//!                           │                     │              │
//!                     Persist(hour)         Persist(day)   Persist(month)
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregation;
pub mod collector;
pub mod config;
pub mod constants;
pub mod errors;
pub mod exchange;
pub mod graph;
pub mod logger;
pub mod metrics;
pub mod persistence;
pub mod pipeline;
pub mod record;
pub mod remote;
pub mod telemetry;
pub mod worker;
