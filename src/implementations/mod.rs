use std::thread::{self, ScopedJoinHandle};

use tracing::{error, info, warn};

use crate::barrier::ReductionBarrier;
use crate::checkpoint;
use crate::comm::{Endpoint, Registry};
use crate::config::{SimConfig, Variant};
use crate::error::{BarrierError, CommError, SimError};
use crate::grid::{heat_plate, Grid};

pub mod safe;

#[path = "unsafe"]
pub mod unsafe_impl {
    pub mod barrier_unsafe;
}

/// シミュレーションの結果
#[derive(Clone, Debug, PartialEq)]
pub struct SimOutcome {
    pub grid: Grid,
    /// 実際に計算したイテレーション数
    pub iterations: usize,
    /// 最後のイテレーションでの全セルの最大変化量
    pub max_delta: f64,
}

/// 設定を検査し、初期グリッドを用意して選択された実装を実行する
pub fn run(config: &SimConfig) -> Result<SimOutcome, SimError> {
    let layout = config.validate()?;
    let side = layout.cols();

    let resumed = match &config.checkpoint {
        Some(cp) => checkpoint::load(&cp.path, side, side)?,
        None => None,
    };
    let initial = resumed.unwrap_or_else(|| heat_plate(config.n, &config.temperatures));

    if config.checkpoint.is_some() && config.variant != Variant::Barrier {
        warn!(variant = ?config.variant, "periodic checkpoints are only written by the barrier variant");
    }

    info!(
        n = config.n,
        workers = config.workers,
        iterations = config.iterations,
        threshold = config.threshold,
        variant = ?config.variant,
        "starting simulation"
    );

    let outcome = match config.variant {
        Variant::Sequential => {
            safe::single::jacobi_sequential(initial, config.iterations, config.threshold)
        }
        Variant::Rayon => safe::rayon::rayon_parallel(
            initial,
            config.workers,
            config.iterations,
            config.threshold,
        )?,
        Variant::Channel => safe::channel::channel_parallel(
            initial,
            &layout,
            config.capacity,
            config.iterations,
            config.threshold,
        )?,
        Variant::Barrier => unsafe_impl::barrier_unsafe::barrier_parallel(
            initial,
            &layout,
            config.iterations,
            config.threshold,
            config.checkpoint.as_ref(),
        )?,
    };

    if let Some(cp) = &config.checkpoint {
        checkpoint::remove(&cp.path)?;
    }

    info!(iterations = outcome.iterations, max_delta = outcome.max_delta, "simulation finished");
    Ok(outcome)
}

/// 収束判定。閾値0は「判定しない」
pub(crate) fn converged(threshold: f64, delta: f64) -> bool {
    threshold > 0.0 && delta < threshold
}

/// ワーカー1本の終了報告
#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkerReport {
    pub iterations: usize,
    pub max_delta: f64,
}

/// ワーカーがパニックしたとき、他のワーカーがチャネルやバリアで待ち続けないように起こす
pub(crate) struct AbortOnPanic<'a> {
    pub registry: Option<&'a Registry>,
    pub barrier: &'a ReductionBarrier,
}

impl AbortOnPanic<'_> {
    pub fn abort(&self) {
        if let Some(registry) = self.registry {
            registry.abort();
        }
        self.barrier.abort();
    }
}

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.abort();
        }
    }
}

/// ワーカー本体を実行する。失敗またはパニックしたら、待っている他のワーカーを起こす
pub(crate) fn supervise<F>(id: Endpoint, guard: AbortOnPanic<'_>, work: F) -> Result<WorkerReport, SimError>
where
    F: FnOnce() -> Result<WorkerReport, SimError>,
{
    let outcome = work();
    if let Err(err) = &outcome {
        error!(worker = id, error = %err, "worker failed");
        guard.abort();
    }
    outcome
}

// 他のワーカーの失敗で起こされただけのエラー
fn is_secondary(err: &SimError) -> bool {
    matches!(
        err,
        SimError::Comm(CommError::Aborted { .. }) | SimError::Barrier(BarrierError::Aborted)
    )
}

/// 全ワーカーを join し、全員が同じイテレーション数で終わったことを確認して
/// (イテレーション数, 最大変化量) を返す。
/// エラーは最初に起きた原因を優先し、巻き添えの `Aborted` は後回しにする。
pub(crate) fn join_workers(
    handles: Vec<(Endpoint, ScopedJoinHandle<'_, Result<WorkerReport, SimError>>)>,
    coordinator: Result<(), SimError>,
) -> Result<(usize, f64), SimError> {
    let mut reports = Vec::with_capacity(handles.len());
    let mut errors = Vec::new();

    for (id, handle) in handles {
        match handle.join() {
            Ok(Ok(report)) => reports.push(report),
            Ok(Err(err)) => errors.push(err),
            Err(_) => errors.push(SimError::WorkerPanicked(id)),
        }
    }
    if let Err(err) = coordinator {
        errors.push(err);
    }

    if !errors.is_empty() {
        let primary = errors.iter().position(|e| !is_secondary(e)).unwrap_or(0);
        return Err(errors.swap_remove(primary));
    }

    let iterations = reports.first().map_or(0, |r| r.iterations);
    debug_assert!(
        reports.iter().all(|r| r.iterations == iterations),
        "workers stopped at different iterations"
    );
    let max_delta = reports.iter().map(|r| r.max_delta).fold(0.0, f64::max);

    Ok((iterations, max_delta))
}
