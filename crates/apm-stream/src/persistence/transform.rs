// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::errors::WorkerError;
use crate::graph::{Next, NodeId, NodeProcessor};
use crate::record::{Granularity, Record};

/// Moves records to a coarser time bucket before handing them on.
pub struct TransformNode {
    id: NodeId,
    from: Granularity,
    to: Granularity,
}

impl TransformNode {
    #[must_use]
    pub fn new(id: NodeId, from: Granularity, to: Granularity) -> Self {
        Self { id, from, to }
    }
}

#[async_trait]
impl NodeProcessor for TransformNode {
    fn id(&self) -> NodeId {
        self.id
    }

    async fn process(&self, record: Record, next: &Next) -> Result<(), WorkerError> {
        let record = record.rebucket(self.from, self.to)?;
        next.execute(record).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::Tap;
    use crate::graph::GraphManager;
    use crate::metrics::schemas::SERVICE_REFERENCE;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rekeys_to_day() {
        let graph = GraphManager::new().create_if_absent(1);
        let tap = Tap::new(2);
        graph
            .add_node(Arc::new(TransformNode::new(1, Granularity::Minute, Granularity::Day)))
            .unwrap()
            .add_next(tap.clone())
            .unwrap();
        graph.seal().unwrap();

        let minute = Record::builder(&SERVICE_REFERENCE, "1_2", 202_401_151_030)
            .build()
            .unwrap();
        graph.start(minute).await.unwrap();

        let seen = tap.seen();
        assert_eq!(seen[0].time_bucket(), 20_240_115);
        assert_eq!(seen[0].id(), "1_2_20240115");
    }
}
