use std::path::PathBuf;
use thiserror::Error;

/// 起動前に検出される設定エラー（スレッドは1本も起動していない）
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid argument `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{workers} workers cannot split a grid of {n} rows evenly")]
    Indivisible { n: usize, workers: usize },

    #[error("partition of {size} rows is below the minimum of {min} rows")]
    PartitionTooSmall { size: usize, min: usize },

    #[error("slab has {actual} rows but partition of {size} rows needs {expected}")]
    SlabShape { size: usize, expected: usize, actual: usize },
}

/// メッセージ交換ライブラリのエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommError {
    #[error("registry needs at least one endpoint")]
    NoEndpoints,

    #[error("endpoint {endpoint} out of range (registry has {count} endpoints)")]
    UnknownEndpoint { endpoint: usize, count: usize },

    #[error("channel {from}->{to}: lock poisoned")]
    Poisoned { from: usize, to: usize },

    #[error("channel {from}->{to}: registry aborted")]
    Aborted { from: usize, to: usize },

    #[error("short transfer on channel {from}->{to}: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        from: usize,
        to: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BarrierError {
    #[error("reduction barrier lock poisoned")]
    Poisoned,

    #[error("reduction barrier aborted")]
    Aborted,
}

/// シミュレーション全体のエラー
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error("checkpoint {}: {source}", path.display())]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {} is malformed: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("failed to build rayon thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
