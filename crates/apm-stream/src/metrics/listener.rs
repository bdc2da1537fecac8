// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::{debug, warn};

use super::listeners::{
    InstanceHeartbeatListener, InstanceMappingListener, ServiceHeartbeatListener,
    ServiceReferenceListener,
};
use crate::errors::{IngestError, RecordError};
use crate::graph::{GraphId, GraphManager};
use crate::record::{time_bucket, Record};
use crate::telemetry::{Span, SpanType, TraceSegment};

/// Resolved identity and time range of the segment being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCore {
    pub service_id: i32,
    pub instance_id: i32,
    pub start_time: i64,
    pub end_time: i64,
    pub minute_bucket: i64,
}

/// Extracts records of one kind from the spans of a segment. A fresh
/// listener is created for every segment.
pub trait SpanListener: Send {
    fn parse_entry(&mut self, _span: &Span, _core: &SegmentCore) {}

    fn parse_exit(&mut self, _span: &Span, _core: &SegmentCore) {}

    fn build(&mut self, core: &SegmentCore) -> Result<Vec<(GraphId, Record)>, RecordError>;
}

pub trait SpanListenerFactory: Send + Sync {
    fn create(&self) -> Box<dyn SpanListener>;
}

impl<F> SpanListenerFactory for F
where
    F: Fn() -> Box<dyn SpanListener> + Send + Sync,
{
    fn create(&self) -> Box<dyn SpanListener> {
        self()
    }
}

/// Runs span listeners over standardized segments and starts every record
/// they produce in its graph.
pub struct SegmentParser {
    graphs: Arc<GraphManager>,
    factories: Vec<Box<dyn SpanListenerFactory>>,
}

impl SegmentParser {
    #[must_use]
    pub fn new(graphs: Arc<GraphManager>) -> Self {
        Self {
            graphs,
            factories: Vec::new(),
        }
    }

    /// Parser with the service heartbeat, instance heartbeat, instance
    /// mapping and service reference listeners.
    #[must_use]
    pub fn with_default_listeners(graphs: Arc<GraphManager>) -> Self {
        let mut parser = Self::new(graphs);
        parser.add_listener(|| Box::new(ServiceHeartbeatListener) as Box<dyn SpanListener>);
        parser.add_listener(|| Box::new(InstanceHeartbeatListener) as Box<dyn SpanListener>);
        parser.add_listener(|| Box::<InstanceMappingListener>::default() as Box<dyn SpanListener>);
        parser.add_listener(|| Box::<ServiceReferenceListener>::default() as Box<dyn SpanListener>);
        parser
    }

    pub fn add_listener(&mut self, factory: impl SpanListenerFactory + 'static) {
        self.factories.push(Box::new(factory));
    }

    /// Records produced by every listener for `segment`, which must have
    /// gone through id exchange.
    pub fn extract(&self, segment: &TraceSegment) -> Result<Vec<(GraphId, Record)>, IngestError> {
        let (Some(service_id), Some(instance_id)) = (segment.service_id, segment.service_instance_id)
        else {
            return Err(IngestError::Unresolved(segment.segment_id.clone()));
        };
        let (Some(start_time), Some(end_time)) = (segment.start_time(), segment.end_time()) else {
            return Ok(Vec::new());
        };
        let core = SegmentCore {
            service_id,
            instance_id,
            start_time,
            end_time,
            minute_bucket: time_bucket::minute_bucket(start_time)?,
        };

        let mut listeners: Vec<Box<dyn SpanListener>> =
            self.factories.iter().map(|f| f.create()).collect();
        for span in &segment.spans {
            for listener in &mut listeners {
                match span.span_type {
                    SpanType::Entry => listener.parse_entry(span, &core),
                    SpanType::Exit => listener.parse_exit(span, &core),
                    SpanType::Local => {}
                }
            }
        }

        let mut records = Vec::new();
        for listener in &mut listeners {
            records.extend(listener.build(&core)?);
        }
        Ok(records)
    }

    /// Extracts and starts the records of `segment`; returns how many were started.
    pub async fn parse(&self, segment: &TraceSegment) -> Result<usize, IngestError> {
        let records = self.extract(segment)?;
        let mut started = 0;
        for (graph_id, record) in records {
            match self.graphs.start(graph_id, record).await {
                Ok(()) => started += 1,
                Err(e) => warn!(graph_id, segment_id = %segment.segment_id, "Failed to start record: {e}"),
            }
        }
        debug!(segment_id = %segment.segment_id, "Parsed segment into {started} records");
        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        INSTANCE_HEARTBEAT_GRAPH_ID, INSTANCE_MAPPING_GRAPH_ID, SERVICE_HEARTBEAT_GRAPH_ID,
        SERVICE_REFERENCE_GRAPH_ID, USER_SERVICE_ID,
    };
    use crate::telemetry::SegmentReference;

    // 2024-01-15T10:30:45.123Z
    const TS: i64 = 1_705_314_645_123;

    fn span(span_type: SpanType, start: i64, end: i64) -> Span {
        Span {
            span_id: 0,
            parent_span_id: -1,
            span_type,
            operation_name: "/pay".into(),
            start_time: start,
            end_time: end,
            is_error: false,
            peer: None,
            refs: Vec::new(),
            operation_id: Some(10),
            peer_id: None,
        }
    }

    fn segment(spans: Vec<Span>) -> TraceSegment {
        TraceSegment {
            trace_id: "t".into(),
            segment_id: "s".into(),
            service_name: "checkout".into(),
            service_instance_name: "checkout-1".into(),
            spans,
            service_id: Some(3),
            service_instance_id: Some(7),
        }
    }

    #[test]
    fn test_unresolved_segment_is_rejected() {
        let parser = SegmentParser::with_default_listeners(Arc::new(GraphManager::new()));
        let mut raw = segment(vec![span(SpanType::Entry, TS, TS + 10)]);
        raw.service_instance_id = None;
        assert!(matches!(parser.extract(&raw), Err(IngestError::Unresolved(_))));
    }

    #[test]
    fn test_entry_span_from_outside_produces_every_record() {
        let parser = SegmentParser::with_default_listeners(Arc::new(GraphManager::new()));
        let records = parser
            .extract(&segment(vec![span(SpanType::Entry, TS, TS + 1500)]))
            .unwrap();
        let graphs: Vec<GraphId> = records.iter().map(|(g, _)| *g).collect();
        assert_eq!(
            graphs,
            vec![
                SERVICE_HEARTBEAT_GRAPH_ID,
                INSTANCE_HEARTBEAT_GRAPH_ID,
                SERVICE_REFERENCE_GRAPH_ID
            ]
        );

        let (_, reference) = &records[2];
        assert_eq!(reference.id(), format!("{USER_SERVICE_ID}_3_202401151030"));
        assert_eq!(reference.get_long("three_second_less"), Some(1));
        assert_eq!(reference.get_long("duration_sum"), Some(1500));
    }

    #[test]
    fn test_referenced_entry_maps_instance_to_address() {
        let parser = SegmentParser::with_default_listeners(Arc::new(GraphManager::new()));
        let mut entry = span(SpanType::Entry, TS, TS + 10);
        entry.refs.push(SegmentReference {
            parent_service_name: "gateway".into(),
            network_address: "10.0.0.5:8080".into(),
            parent_service_id: Some(2),
            network_address_id: Some(40),
        });
        let records = parser.extract(&segment(vec![entry])).unwrap();

        let mapping = records
            .iter()
            .find(|(g, _)| *g == INSTANCE_MAPPING_GRAPH_ID)
            .map(|(_, r)| r)
            .unwrap();
        assert_eq!(mapping.id(), "7_40");
        let reference = records
            .iter()
            .find(|(g, _)| *g == SERVICE_REFERENCE_GRAPH_ID)
            .map(|(_, r)| r)
            .unwrap();
        assert_eq!(reference.get_int("front_service_id"), Some(2));
        assert_eq!(reference.get_int("behind_service_id"), Some(3));
    }

    #[test]
    fn test_custom_listener() {
        struct Count(usize);
        impl SpanListener for Count {
            fn parse_exit(&mut self, _span: &Span, _core: &SegmentCore) {
                self.0 += 1;
            }

            fn build(&mut self, _core: &SegmentCore) -> Result<Vec<(GraphId, Record)>, RecordError> {
                assert_eq!(self.0, 2);
                Ok(Vec::new())
            }
        }

        let mut parser = SegmentParser::new(Arc::new(GraphManager::new()));
        parser.add_listener(|| Box::new(Count(0)) as Box<dyn SpanListener>);
        let spans = vec![
            span(SpanType::Exit, TS, TS + 1),
            span(SpanType::Local, TS, TS + 1),
            span(SpanType::Exit, TS, TS + 1),
        ];
        assert!(parser.extract(&segment(spans)).unwrap().is_empty());
    }
}
