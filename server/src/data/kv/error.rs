//! KV error types

use thiserror::Error;

use super::fault::KvOp;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("KV configuration error: {0}")]
    Config(String),

    #[error("KV connection error: {0}")]
    Connection(String),

    #[error("Injected KV fault on {0}")]
    Injected(KvOp),

    #[error("Unexpected KV reply: {0}")]
    Protocol(String),

    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
}
