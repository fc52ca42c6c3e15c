use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    MovieSearch(String),
    Discover { region: String, providers: Vec<u32> },
    MovieDetails(u64),
    MovieCredits(u64),
    MovieVideos(u64),
    ExternalIds(u64),
    Certification { movie_id: u64, region: String },
    Ratings(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::MovieSearch(query) => write!(f, "search:{}", query.trim().to_lowercase()),
            CacheKey::Discover { region, providers } => {
                let ids: Vec<String> = providers.iter().map(u32::to_string).collect();
                write!(f, "discover:{}:{}", region.to_lowercase(), ids.join(","))
            }
            CacheKey::MovieDetails(id) => write!(f, "details:{}", id),
            CacheKey::MovieCredits(id) => write!(f, "credits:{}", id),
            CacheKey::MovieVideos(id) => write!(f, "videos:{}", id),
            CacheKey::ExternalIds(id) => write!(f, "extids:{}", id),
            CacheKey::Certification { movie_id, region } => {
                write!(f, "cert:{}:{}", region.to_lowercase(), movie_id)
            }
            CacheKey::Ratings(imdb_id) => write!(f, "ratings:{}", imdb_id),
        }
    }
}

/// Creates a Redis client for caching
///
/// Opening the client does not connect; the cache connects on first use.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const READ_TIMEOUT: Duration = Duration::from_millis(250);
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// No reconnect attempts for this long after a failed connect
const RECONNECT_BACKOFF: Duration = Duration::from_secs(30);
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

enum ConnectionState {
    Idle,
    Connected(ConnectionManager),
    Failed(Instant),
}

/// One shared, self-reconnecting Redis connection
struct RedisConnection {
    client: Client,
    state: Mutex<ConnectionState>,
}

impl RedisConnection {
    fn new(client: Client) -> Self {
        Self {
            client,
            state: Mutex::new(ConnectionState::Idle),
        }
    }

    /// The shared connection, connecting on first use.
    ///
    /// A failed connect is not retried until `RECONNECT_BACKOFF` has passed,
    /// so an unreachable Redis costs one connect timeout, not one per lookup.
    async fn manager(&self) -> AppResult<ConnectionManager> {
        let mut state = self.state.lock().await;

        match &*state {
            ConnectionState::Connected(manager) => return Ok(manager.clone()),
            ConnectionState::Failed(at) if at.elapsed() < RECONNECT_BACKOFF => {
                return Err(AppError::Internal("Redis unavailable".to_string()));
            }
            _ => {}
        }

        match tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(self.client.clone())).await {
            Ok(Ok(manager)) => {
                tracing::info!("Connected to Redis");
                *state = ConnectionState::Connected(manager.clone());
                Ok(manager)
            }
            Ok(Err(e)) => {
                *state = ConnectionState::Failed(Instant::now());
                Err(e.into())
            }
            Err(_) => {
                *state = ConnectionState::Failed(Instant::now());
                Err(AppError::Internal("Redis connect timed out".to_string()))
            }
        }
    }
}

async fn with_timeout<T>(limit: Duration, op: impl Future<Output = AppResult<T>>) -> AppResult<T> {
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| AppError::Internal(format!("Redis operation timed out after {:?}", limit)))?
}

/// Best-effort cache for remote API lookups backed by Redis
///
/// A disabled cache (see [`Cache::disabled`]) always misses and drops writes.
#[derive(Clone)]
pub struct Cache {
    connection: Option<Arc<RedisConnection>>,
    write_tx: Option<mpsc::UnboundedSender<CacheWriteMessage>>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CacheWriterHandle {
    /// Signals the writer task and waits, bounded, until queued writes are flushed
    pub async fn shutdown(self) {
        let Some(tx) = self.shutdown_tx else {
            return;
        };
        let _ = tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");

        if let Some(task) = self.task {
            match tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Cache writer task failed"),
                Err(_) => tracing::warn!(
                    timeout = ?SHUTDOWN_FLUSH_TIMEOUT,
                    "Cache writer did not finish flushing in time"
                ),
            }
        }
    }
}

impl Cache {
    /// Creates a cache and spawns its background writer task
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let connection = Arc::new(RedisConnection::new(redis_client));
        let writer_connection = connection.clone();
        let task = tokio::spawn(async move {
            Self::cache_writer_task(writer_connection, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            connection: Some(connection),
            write_tx: Some(write_tx),
        };

        let handle = CacheWriterHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        };

        (cache, handle)
    }

    /// A cache that never stores anything
    pub fn disabled() -> (Self, CacheWriterHandle) {
        (
            Self {
                connection: None,
                write_tx: None,
            },
            CacheWriterHandle {
                shutdown_tx: None,
                task: None,
            },
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.connection.is_some()
    }

    /// Background task that drains write messages into Redis
    ///
    /// On shutdown every queued message is flushed before the task exits.
    async fn cache_writer_task(
        connection: Arc<RedisConnection>,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");
        let mut failed_writes = 0u64;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&connection, msg).await {
                        failed_writes += 1;
                        tracing::warn!(error = %e, failed_writes, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cache writer shutting down, flushing remaining writes");

                    write_rx.close();
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&connection, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write_to_redis(connection: &RedisConnection, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = connection.manager().await?;
        with_timeout(WRITE_TIMEOUT, async move {
            let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
            Ok::<_, AppError>(())
        })
        .await
    }

    async fn read_from_redis(connection: &RedisConnection, key: &CacheKey) -> AppResult<Option<String>> {
        let mut conn = connection.manager().await?;
        let key = key.to_string();
        with_timeout(READ_TIMEOUT, async move {
            let cached: Option<String> = conn.get(key).await?;
            Ok::<_, AppError>(cached)
        })
        .await
    }

    /// Retrieves a value from the cache by key
    ///
    /// Connection errors, timeouts and undecodable entries are logged and
    /// reported as a miss, so an unavailable Redis only costs extra API calls.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let connection = self.connection.as_ref()?;

        let json = match Self::read_from_redis(connection, key).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                let error = AppError::Internal(format!("Cache deserialization error: {}", e));
                tracing::warn!(key = %key, error = %error, "Discarding unreadable cache entry");
                None
            }
        }
    }

    /// Queues a value for storage without waiting for Redis
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let Some(write_tx) = &self.write_tx else {
            return;
        };

        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}
