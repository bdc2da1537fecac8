// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::schemas::{JVM_CPU, JVM_GC, JVM_MEMORY};
use crate::constants::{ID_SPLIT, JVM_CPU_GRAPH_ID, JVM_GC_GRAPH_ID, JVM_MEMORY_GRAPH_ID};
use crate::errors::RecordError;
use crate::graph::GraphId;
use crate::record::{time_bucket, Record};
use crate::telemetry::JvmMetric;

/// Splits one JVM sample into cpu, memory (per pool kind) and gc (per phase)
/// records of the sample's minute.
pub fn jvm_records(instance_id: i32, metric: &JvmMetric) -> Result<Vec<(GraphId, Record)>, RecordError> {
    let bucket = time_bucket::minute_bucket(metric.time)?;
    let mut records = Vec::with_capacity(1 + metric.memory.len() + metric.gc.len());

    let cpu = Record::builder(&JVM_CPU, instance_id.to_string(), bucket)
        .set("instance_id", instance_id)
        .set("usage_percent_sum", metric.cpu.usage_percent)
        .set("times", 1_i64)
        .build()?;
    records.push((JVM_CPU_GRAPH_ID, cpu));

    for memory in &metric.memory {
        let key = format!("{instance_id}{ID_SPLIT}{}", u8::from(memory.is_heap));
        let record = Record::builder(&JVM_MEMORY, key, bucket)
            .set("instance_id", instance_id)
            .set("is_heap", memory.is_heap)
            .set("init", memory.init)
            .set("max", memory.max)
            .set("used", memory.used)
            .set("committed", memory.committed)
            .set("times", 1_i64)
            .build()?;
        records.push((JVM_MEMORY_GRAPH_ID, record));
    }

    for gc in &metric.gc {
        let key = format!("{instance_id}{ID_SPLIT}{}", gc.phase.code());
        let record = Record::builder(&JVM_GC, key, bucket)
            .set("instance_id", instance_id)
            .set("phase", gc.phase.code())
            .set("count", gc.count)
            .set("time", gc.time)
            .set("times", 1_i64)
            .build()?;
        records.push((JVM_GC_GRAPH_ID, record));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{CpuMetric, GcMetric, GcPhase, MemoryMetric};

    fn sample(usage: f64) -> JvmMetric {
        JvmMetric {
            time: 1_705_314_645_123,
            cpu: CpuMetric {
                usage_percent: usage,
            },
            memory: vec![
                MemoryMetric {
                    is_heap: true,
                    init: 1,
                    max: 100,
                    used: 40,
                    committed: 60,
                },
                MemoryMetric {
                    is_heap: false,
                    init: 1,
                    max: 50,
                    used: 10,
                    committed: 20,
                },
            ],
            gc: vec![GcMetric {
                phase: GcPhase::Young,
                count: 3,
                time: 12,
            }],
        }
    }

    #[test]
    fn test_sample_fans_out_per_kind() {
        let records = jvm_records(7, &sample(10.0)).unwrap();
        let ids: Vec<_> = records.iter().map(|(g, r)| (*g, r.id().to_string())).collect();
        assert_eq!(
            ids,
            vec![
                (JVM_CPU_GRAPH_ID, "7_202401151030".to_string()),
                (JVM_MEMORY_GRAPH_ID, "7_1_202401151030".to_string()),
                (JVM_MEMORY_GRAPH_ID, "7_0_202401151030".to_string()),
                (JVM_GC_GRAPH_ID, "7_0_202401151030".to_string()),
            ]
        );
    }

    #[test]
    fn test_samples_of_one_minute_accumulate() {
        let mut cpu = jvm_records(7, &sample(10.0)).unwrap().remove(0).1;
        cpu.merge(&jvm_records(7, &sample(30.0)).unwrap().remove(0).1).unwrap();
        let average = cpu.get_double("usage_percent_sum").unwrap() / cpu.get_long("times").unwrap() as f64;
        assert!((average - 20.0).abs() < f64::EPSILON);
    }
}
