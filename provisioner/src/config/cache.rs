//! Cache partition selection
//!
//! Every instance gets its own numbered cache database. Partition 0 is
//! reserved; the first partition holding no keys is taken.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::models::platform::CacheConnection;

/// Partition count assumed when the server does not report one
pub const DEFAULT_PARTITION_COUNT: u32 = 16;

/// Read access to the cache server's partitions
#[async_trait]
pub trait PartitionInspector: Send + Sync {
    /// Number of partitions the server exposes
    async fn partition_count(&self) -> Result<u32, DeployError>;

    /// Number of keys stored in `partition`
    async fn key_count(&self, partition: u32) -> Result<u64, DeployError>;
}

/// Lowest partition in `1..count` holding no keys
pub async fn find_free_partition(inspector: &dyn PartitionInspector) -> Result<Option<u32>, DeployError> {
    let count = inspector.partition_count().await?;
    for partition in 1..count {
        let keys = inspector.key_count(partition).await?;
        debug!("Cache partition {} holds {} keys", partition, keys);
        if keys == 0 {
            return Ok(Some(partition));
        }
    }
    Ok(None)
}

/// Redis backed partition inspector
pub struct RedisPartitions {
    connection: CacheConnection,
}

impl RedisPartitions {
    pub fn new(connection: CacheConnection) -> Self {
        Self { connection }
    }

    async fn connect(&self, partition: u32) -> Result<redis::aio::MultiplexedConnection, DeployError> {
        let url = format!("redis://{}:{}/{}", self.connection.host, self.connection.port, partition);
        let client = redis::Client::open(url).map_err(cache_error)?;
        client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_error)
    }
}

fn cache_error(error: redis::RedisError) -> DeployError {
    DeployError::ConfigurationApplyFailed(format!("Cache server error: {}", error))
}

#[async_trait]
impl PartitionInspector for RedisPartitions {
    async fn partition_count(&self) -> Result<u32, DeployError> {
        let mut conn = self.connect(0).await?;
        let reply: Result<Vec<String>, redis::RedisError> = redis::cmd("CONFIG")
            .arg("GET")
            .arg("databases")
            .query_async(&mut conn)
            .await;

        match reply {
            Ok(values) => Ok(values
                .get(1)
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PARTITION_COUNT)),
            Err(e) => {
                warn!("Could not read partition count, assuming {}: {}", DEFAULT_PARTITION_COUNT, e);
                Ok(DEFAULT_PARTITION_COUNT)
            }
        }
    }

    async fn key_count(&self, partition: u32) -> Result<u64, DeployError> {
        let mut conn = self.connect(partition).await?;
        redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(cache_error)
    }
}
