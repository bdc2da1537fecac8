// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record types and the code turning telemetry into records.

pub mod jvm;
pub mod listener;
pub mod listeners;
pub mod schemas;

pub use jvm::jvm_records;
pub use listener::{SegmentCore, SegmentParser, SpanListener, SpanListenerFactory};
pub use listeners::instance_heartbeat;
