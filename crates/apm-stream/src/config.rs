// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use tracing::warn;

use crate::constants::{DEFAULT_QUEUE_SIZE, HOT_QUEUE_SIZE};
use crate::persistence::TtlConfig;
use crate::pipeline::PipelineSettings;
use crate::remote::PeerAddress;
use crate::worker::OverflowPolicy;

const DEFAULT_SELF_ADDRESS: &str = "127.0.0.1:11800";
const DEFAULT_REMOTE_LISTEN: &str = "0.0.0.0:11800";
const DEFAULT_INGEST_LISTEN: &str = "0.0.0.0:11900";

#[derive(Debug, Clone)]
pub struct Config {
    /// Address peers use to reach this process; its slot on the hash ring.
    pub self_address: PeerAddress,
    pub cluster_peers: Vec<PeerAddress>,
    pub remote_listen: String,
    pub ingest_listen: String,
    pub pipeline: PipelineSettings,
    /// Per-peer send buffer, in messages.
    pub remote_buffer: usize,
    pub remote_connect_timeout: Duration,
    pub hash_virtual_nodes: usize,
    pub exchange_max_attempts: u32,
    pub exchange_retry_interval: Duration,
    pub exchange_pending_limit: usize,
    pub ttl: TtlConfig,
    pub ttl_check_interval: Duration,
}

impl Config {
    pub fn new() -> anyhow::Result<Config> {
        let self_address: PeerAddress = env::var("APM_SELF_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_SELF_ADDRESS.to_string())
            .parse()
            .context("invalid APM_SELF_ADDRESS")?;

        // Comma separated host:port list; empty entries are ignored.
        let cluster_peers = match env::var("APM_CLUSTER_PEERS") {
            Ok(peers) => peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PeerAddress::from_str)
                .collect::<Result<Vec<_>, _>>()
                .context("invalid APM_CLUSTER_PEERS")?,
            Err(_) => Vec::new(),
        };

        let overflow_policy = match env::var("APM_QUEUE_OVERFLOW") {
            Ok(val) => val.parse().unwrap_or_else(|_| {
                warn!("Unknown APM_QUEUE_OVERFLOW `{val}`, falling back to block");
                OverflowPolicy::Block
            }),
            Err(_) => OverflowPolicy::Block,
        };

        Ok(Config {
            self_address,
            cluster_peers,
            remote_listen: env::var("APM_REMOTE_LISTEN")
                .unwrap_or_else(|_| DEFAULT_REMOTE_LISTEN.to_string()),
            ingest_listen: env::var("APM_INGEST_LISTEN")
                .unwrap_or_else(|_| DEFAULT_INGEST_LISTEN.to_string()),
            pipeline: PipelineSettings {
                queue_size: number("APM_QUEUE_SIZE", DEFAULT_QUEUE_SIZE),
                hot_queue_size: number("APM_HOT_QUEUE_SIZE", HOT_QUEUE_SIZE),
                overflow_policy,
                aggregation_flush_interval: millis("APM_AGGREGATION_FLUSH_MS", 1_000),
                persistence_flush_interval: millis("APM_PERSISTENCE_FLUSH_MS", 3_000),
            },
            remote_buffer: number("APM_REMOTE_BUFFER", 4096),
            remote_connect_timeout: millis("APM_REMOTE_CONNECT_TIMEOUT_MS", 3_000),
            hash_virtual_nodes: number("APM_HASH_VIRTUAL_NODES", 128),
            exchange_max_attempts: number("APM_EXCHANGE_MAX_ATTEMPTS", 10),
            exchange_retry_interval: millis("APM_EXCHANGE_RETRY_MS", 1_000),
            exchange_pending_limit: number("APM_EXCHANGE_PENDING_LIMIT", 10_000),
            ttl: TtlConfig {
                minute_minutes: number("APM_TTL_MINUTE_MINUTES", 90),
                hour_hours: number("APM_TTL_HOUR_HOURS", 36),
                day_days: number("APM_TTL_DAY_DAYS", 45),
                month_months: number("APM_TTL_MONTH_MONTHS", 18),
            },
            ttl_check_interval: Duration::from_secs(60 * number("APM_TTL_CHECK_MINUTES", 60_u64)),
        })
    }
}

/// Positive number from `name`, or `default` when unset or unparsable.
fn number<T>(name: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    match env::var(name) {
        Ok(val) => match val.trim().parse::<T>() {
            Ok(n) if n > T::default() => n,
            _ => {
                warn!("Ignoring invalid {name} `{val}`");
                default
            }
        },
        Err(_) => default,
    }
}

fn millis(name: &str, default: u64) -> Duration {
    Duration::from_millis(number(name, default))
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use std::env;

    use super::*;

    const VARS: [&str; 6] = [
        "APM_SELF_ADDRESS",
        "APM_CLUSTER_PEERS",
        "APM_QUEUE_SIZE",
        "APM_QUEUE_OVERFLOW",
        "APM_TTL_DAY_DAYS",
        "APM_AGGREGATION_FLUSH_MS",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = Config::new().unwrap();
        assert_eq!(config.self_address, PeerAddress::new("127.0.0.1", 11800));
        assert!(config.cluster_peers.is_empty());
        assert_eq!(config.pipeline.queue_size, 1024);
        assert_eq!(config.pipeline.hot_queue_size, 4096);
        assert_eq!(config.pipeline.overflow_policy, OverflowPolicy::Block);
        assert_eq!(config.ttl, TtlConfig::default());
        assert_eq!(config.ttl_check_interval, Duration::from_secs(3600));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        env::set_var("APM_CLUSTER_PEERS", "10.0.0.2:11800, 10.0.0.3:11800,");
        env::set_var("APM_QUEUE_OVERFLOW", "drop");
        env::set_var("APM_TTL_DAY_DAYS", "7");
        env::set_var("APM_AGGREGATION_FLUSH_MS", "250");
        let config = Config::new().unwrap();
        assert_eq!(
            config.cluster_peers,
            vec![
                PeerAddress::new("10.0.0.2", 11800),
                PeerAddress::new("10.0.0.3", 11800)
            ]
        );
        assert_eq!(config.pipeline.overflow_policy, OverflowPolicy::Drop);
        assert_eq!(config.ttl.day_days, 7);
        assert_eq!(config.pipeline.aggregation_flush_interval, Duration::from_millis(250));
        clear();
    }

    #[test]
    #[serial]
    fn test_invalid_numbers_fall_back() {
        clear();
        env::set_var("APM_QUEUE_SIZE", "lots");
        assert_eq!(Config::new().unwrap().pipeline.queue_size, 1024);
        env::set_var("APM_QUEUE_SIZE", "0");
        assert_eq!(Config::new().unwrap().pipeline.queue_size, 1024);
        clear();
    }

    #[test]
    #[serial]
    fn test_invalid_address_is_an_error() {
        clear();
        env::set_var("APM_SELF_ADDRESS", "no-port");
        assert!(Config::new().is_err());
        env::set_var("APM_SELF_ADDRESS", "127.0.0.1:11800");
        env::set_var("APM_CLUSTER_PEERS", "10.0.0.2:port");
        assert!(Config::new().is_err());
        clear();
    }
}
