// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use super::registry::{IdRegistry, NameKind};
use super::Exchanger;
use crate::telemetry::{SpanType, TraceSegment};

/// Resolves every name a segment references. Already resolved ids are kept,
/// so a deferred segment only asks for what is still missing.
pub struct SegmentExchanger {
    registry: Arc<dyn IdRegistry>,
}

impl SegmentExchanger {
    #[must_use]
    pub fn new(registry: Arc<dyn IdRegistry>) -> Self {
        Self { registry }
    }

    fn resolve(&self, slot: &mut Option<i32>, kind: NameKind, scope: i32, name: &str) -> bool {
        if slot.is_none() {
            *slot = self.registry.get_or_register(kind, scope, name);
        }
        slot.is_some()
    }
}

impl Exchanger<TraceSegment> for SegmentExchanger {
    fn exchange(&self, segment: &mut TraceSegment) -> bool {
        let mut resolved = self.resolve(&mut segment.service_id, NameKind::Service, 0, &segment.service_name);
        // Instances and endpoints are scoped by the service id.
        let service_id = segment.service_id;
        if let Some(service_id) = service_id {
            resolved &= self.resolve(
                &mut segment.service_instance_id,
                NameKind::ServiceInstance,
                service_id,
                &segment.service_instance_name,
            );
        }

        for span in &mut segment.spans {
            if let Some(service_id) = service_id.filter(|_| span.span_type != SpanType::Local) {
                resolved &= self.resolve(&mut span.operation_id, NameKind::Endpoint, service_id, &span.operation_name);
            }
            if span.span_type == SpanType::Exit {
                if let Some(peer) = span.peer.as_deref() {
                    resolved &= self.resolve(&mut span.peer_id, NameKind::NetworkAddress, 0, peer);
                }
            }
            for reference in &mut span.refs {
                resolved &= self.resolve(
                    &mut reference.parent_service_id,
                    NameKind::Service,
                    0,
                    &reference.parent_service_name,
                );
                resolved &= self.resolve(
                    &mut reference.network_address_id,
                    NameKind::NetworkAddress,
                    0,
                    &reference.network_address,
                );
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::InMemoryIdRegistry;
    use crate::telemetry::{SegmentReference, Span};

    fn segment() -> TraceSegment {
        TraceSegment {
            trace_id: "t".into(),
            segment_id: "s".into(),
            service_name: "checkout".into(),
            service_instance_name: "checkout-1".into(),
            spans: vec![Span {
                span_id: 0,
                parent_span_id: -1,
                span_type: SpanType::Entry,
                operation_name: "/pay".into(),
                start_time: 0,
                end_time: 1,
                is_error: false,
                peer: None,
                refs: vec![SegmentReference {
                    parent_service_name: "gateway".into(),
                    network_address: "10.0.0.5:8080".into(),
                    parent_service_id: None,
                    network_address_id: None,
                }],
                operation_id: None,
                peer_id: None,
            }],
            service_id: None,
            service_instance_id: None,
        }
    }

    #[test]
    fn test_resolves_in_rounds() {
        let registry = Arc::new(InMemoryIdRegistry::new());
        let exchanger = SegmentExchanger::new(registry.clone());
        let mut segment = segment();

        // Service, both reference names.
        assert!(!exchanger.exchange(&mut segment));
        assert_eq!(registry.resolve_pending(), 3);
        // Instance and endpoint need the service id.
        assert!(!exchanger.exchange(&mut segment));
        assert_eq!(registry.resolve_pending(), 2);

        assert!(exchanger.exchange(&mut segment));
        assert!(segment.service_instance_id.is_some());
        assert!(segment.spans[0].operation_id.is_some());
        assert!(segment.spans[0].refs[0].network_address_id.is_some());
    }
}
