use std::thread;

use tracing::debug;

use crate::barrier::ReductionBarrier;
use crate::comm::{Endpoint, Registry, COORDINATOR};
use crate::error::{CommError, ConfigError, SimError};
use crate::generation::Generation;
use crate::grid::{relax_row, DoubleBuffer, Grid};
use crate::implementations::{
    converged, join_workers, supervise, AbortOnPanic, SimOutcome, WorkerReport,
};
use crate::partition::{Layout, Partition};

/*
  Channel版（メッセージ交換によるゴースト行の同期）

  各ワーカーは自分の帯 + 上下のゴースト行からなるスラブを2枚（current / next）持つ。
  グリッドは共有しないので、ワーカー間でメモリが重なることはない。

  1イテレーションの流れ：
  1. next の実行を current から計算（最大変化量を記録）
  2. next の端の実行を隣に送り、隣の端の行を next のゴースト行に受け取る
  3. 閾値があればリダクションバリアで全体の最大変化量を得る
  4. current / next を入れ替える（Generation の切り替え）

  デッドロック回避：
  - 偶数IDは「送信→受信」、奇数IDは「受信→送信」
  - 奇数IDは右(下)の隣から、偶数IDは左(上)の隣から交換する
  どの交換も (奇数, 偶数) の組で向かい合うので、容量0のチャネルでも循環待ちにならない。
*/

/// 1パーティションを担当するワーカーの状態
pub struct PartitionWorker {
    partition: Partition,
    workers: usize,
    buffers: DoubleBuffer,
    iteration: usize,
}

impl PartitionWorker {
    /// `slab` は上下のゴースト行を含む `size + 2` 行
    pub fn new(partition: Partition, workers: usize, slab: Grid) -> Result<Self, ConfigError> {
        partition.validate()?;
        let expected = partition.size + 2;
        if slab.rows() != expected {
            return Err(ConfigError::SlabShape {
                size: partition.size,
                expected,
                actual: slab.rows(),
            });
        }

        Ok(PartitionWorker {
            partition,
            workers,
            buffers: DoubleBuffer::new(slab),
            iteration: 0,
        })
    }

    /// コーディネータから初期スラブを1行ずつ受け取って作る
    pub fn receive_slab(
        partition: Partition,
        workers: usize,
        cols: usize,
        registry: &Registry,
    ) -> Result<Self, SimError> {
        // 行を受け取る前に失敗させる
        partition.validate()?;

        let mut slab = Grid::new(partition.size + 2, cols);
        for r in 0..slab.rows() {
            registry.receive_row(COORDINATOR, partition.id, slab.row_mut(r))?;
        }
        Ok(Self::new(partition, workers, slab)?)
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn current(&self) -> &Grid {
        self.buffers.get(Generation::of_iteration(self.iteration))
    }

    pub fn ghost_above(&self) -> &[f64] {
        self.current().row(0)
    }

    pub fn ghost_below(&self) -> &[f64] {
        self.current().row(self.partition.size + 1)
    }

    /// 所有する実行（グリッド全体の `partition.rows()` に対応）
    pub fn owned_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (1..=self.partition.size).map(move |r| self.current().row(r))
    }

    /// 1イテレーション分の計算と境界行の交換。自分の最大変化量を返す
    pub fn step(&mut self, registry: &Registry) -> Result<f64, CommError> {
        let size = self.partition.size;
        let id = self.partition.id;
        let (src, dst) = self.buffers.split(Generation::of_iteration(self.iteration));

        let mut max_delta = 0.0_f64;
        for i in 1..=size {
            let delta = relax_row(src.row(i - 1), src.row(i), src.row(i + 1), dst.row_mut(i));
            max_delta = max_delta.max(delta);
        }

        // (隣, 送る行, 受け取るゴースト行)
        let left = self.partition.left().map(|peer| (peer, 1, 0));
        let right = self.partition.right(self.workers).map(|peer| (peer, size, size + 1));
        let legs = if id % 2 == 0 { [left, right] } else { [right, left] };

        for (peer, send_row, ghost_row) in legs.into_iter().flatten() {
            exchange_leg(registry, id, peer, dst, send_row, ghost_row)?;
        }

        self.iteration += 1;
        Ok(max_delta)
    }

    /// 最終的な実行をコーディネータへ返す
    pub fn send_results(&self, registry: &Registry) -> Result<(), CommError> {
        for row in self.owned_rows() {
            registry.send_row(self.partition.id, COORDINATOR, row)?;
        }
        Ok(())
    }
}

fn exchange_leg(
    registry: &Registry,
    me: Endpoint,
    peer: Endpoint,
    grid: &mut Grid,
    send_row: usize,
    ghost_row: usize,
) -> Result<(), CommError> {
    if me % 2 == 0 {
        registry.send_row(me, peer, grid.row(send_row))?;
        registry.receive_row(peer, me, grid.row_mut(ghost_row))?;
    } else {
        registry.receive_row(peer, me, grid.row_mut(ghost_row))?;
        registry.send_row(me, peer, grid.row(send_row))?;
    }
    Ok(())
}

fn run_worker(
    partition: Partition,
    layout: &Layout,
    registry: &Registry,
    barrier: &ReductionBarrier,
    iterations: usize,
    threshold: f64,
) -> Result<WorkerReport, SimError> {
    let mut worker = PartitionWorker::receive_slab(partition, layout.workers(), layout.cols(), registry)?;
    debug!(worker = partition.id, base = partition.base, size = partition.size, "worker started");

    let mut max_delta = 0.0;
    while worker.iteration() < iterations {
        let generation = Generation::of_iteration(worker.iteration());
        max_delta = worker.step(registry)?;

        // 交換を終えてからバリアに入るので、最後のラウンドも全員が行を渡し終えている
        if threshold > 0.0 {
            max_delta = barrier.wait(generation, max_delta)?;
            if converged(threshold, max_delta) {
                break;
            }
        }
    }

    worker.send_results(registry)?;
    debug!(worker = partition.id, iterations = worker.iteration(), max_delta, "worker finished");

    Ok(WorkerReport {
        iterations: worker.iteration(),
        max_delta,
    })
}

// コーディネータ側：各ワーカーへスラブを送り、計算後の行を受け取る
fn feed_and_collect(
    registry: &Registry,
    layout: &Layout,
    initial: &Grid,
    result: &mut Grid,
) -> Result<(), SimError> {
    for partition in layout.partitions() {
        for global in partition.slab_rows() {
            registry.send_row(COORDINATOR, partition.id, initial.row(global))?;
        }
    }
    for partition in layout.partitions() {
        for global in partition.rows() {
            registry.receive_row(partition.id, COORDINATOR, result.row_mut(global))?;
        }
    }
    Ok(())
}

pub fn channel_parallel(
    initial: Grid,
    layout: &Layout,
    capacity: usize,
    iterations: usize,
    threshold: f64,
) -> Result<SimOutcome, SimError> {
    let registry = Registry::new(capacity, layout.workers() + 1)?;
    let barrier = ReductionBarrier::new(layout.workers());
    // 固定境界はそのまま残る
    let mut result = initial.clone();

    // スコープを抜ける時点で全ワーカーが join 済み。チャネルの解放はその後
    let summary = thread::scope(|scope| {
        let handles = layout
            .partitions()
            .map(|partition| {
                let registry = &registry;
                let barrier = &barrier;
                let handle = scope.spawn(move || {
                    let guard = AbortOnPanic {
                        registry: Some(registry),
                        barrier,
                    };
                    supervise(partition.id, guard, || {
                        run_worker(partition, layout, registry, barrier, iterations, threshold)
                    })
                });
                (partition.id, handle)
            })
            .collect::<Vec<_>>();

        let fed = feed_and_collect(&registry, layout, &initial, &mut result);
        if fed.is_err() {
            registry.abort();
            barrier.abort();
        }

        join_workers(handles, fed)
    });

    registry.shutdown();
    let (iterations, max_delta) = summary?;

    Ok(SimOutcome {
        grid: result,
        iterations,
        max_delta,
    })
}
