use std::path::Path;
use std::slice;
use std::thread;

use tracing::{debug, info, warn};

use crate::barrier::{ReductionBarrier, RoundReport};
use crate::checkpoint::{self, Ticker};
use crate::config::CheckpointConfig;
use crate::error::SimError;
use crate::generation::Generation;
use crate::grid::{relax_row, DoubleBuffer, Grid};
use crate::implementations::{
    converged, join_workers, supervise, AbortOnPanic, SimOutcome, WorkerReport,
};
use crate::partition::{Layout, Partition};

/*
  共有グリッド + リダクションバリア版

  2枚のグリッド（Generation A / B）を全ワーカーで共有する。
  - イテレーション k では of_iteration(k) 側を読み、反対側の自分の行だけに書く
  - 毎イテレーションの終わりにバリアで全員を待ち、同時に最大変化量を集める
  - 最後の到着者は、他の全員がバリア内で止まっている間にチェックポイントを書く

  ロックはバリアの1つだけ。グリッドには書き込み範囲が重ならないのでロックを掛けない。
*/

// ラッパー構造体
#[derive(Clone, Copy)]
struct GridPtr {
    data: *mut f64,
}

// ラッパーに対して Send / Sync を許可する
// SAFETY: 書き込みはパーティション単位で分離され、読み書きの切り替えはバリアで順序付けされる
unsafe impl Send for GridPtr {}
unsafe impl Sync for GridPtr {}

impl GridPtr {
    // メソッド経由で取り出し、クロージャが構造体ごとキャプチャするようにする
    fn as_ptr(self) -> *mut f64 {
        self.data
    }
}

struct Shared<'a> {
    buffers: [GridPtr; 2],
    rows: usize,
    cols: usize,
    barrier: &'a ReductionBarrier,
    snapshot: Option<(&'a Ticker, &'a Path)>,
}

pub fn barrier_parallel(
    initial: Grid,
    layout: &Layout,
    iterations: usize,
    threshold: f64,
    checkpoint: Option<&CheckpointConfig>,
) -> Result<SimOutcome, SimError> {
    let rows = initial.rows();
    let cols = initial.cols();
    let mut buffers = DoubleBuffer::new(initial);
    let ptr_a = GridPtr {
        data: buffers.get_mut(Generation::A).data.as_mut_ptr(),
    };
    let ptr_b = GridPtr {
        data: buffers.get_mut(Generation::B).data.as_mut_ptr(),
    };

    let barrier = ReductionBarrier::new(layout.workers());
    let ticker = checkpoint.map(|cp| Ticker::start(cp.period));

    let shared = Shared {
        buffers: [ptr_a, ptr_b],
        rows,
        cols,
        barrier: &barrier,
        snapshot: ticker
            .as_ref()
            .zip(checkpoint)
            .map(|(ticker, cp)| (ticker, cp.path.as_path())),
    };

    let summary = thread::scope(|scope| {
        let shared = &shared;
        let handles = layout
            .partitions()
            .map(|partition| {
                let handle = scope.spawn(move || {
                    let guard = AbortOnPanic {
                        registry: None,
                        barrier: shared.barrier,
                    };
                    supervise(partition.id, guard, || run_worker(partition, shared, iterations, threshold))
                });
                (partition.id, handle)
            })
            .collect::<Vec<_>>();

        join_workers(handles, Ok(()))
    });

    // タイマースレッドを止める
    drop(ticker);
    let (done, max_delta) = summary?;

    Ok(SimOutcome {
        grid: buffers.into_grid(Generation::of_iteration(done)),
        iterations: done,
        max_delta,
    })
}

fn run_worker(
    partition: Partition,
    shared: &Shared<'_>,
    iterations: usize,
    threshold: f64,
) -> Result<WorkerReport, SimError> {
    let cols = shared.cols;
    debug!(worker = partition.id, base = partition.base, size = partition.size, "worker started");

    let mut iteration = 0;
    let mut max_delta = 0.0;
    while iteration < iterations {
        let generation = Generation::of_iteration(iteration);
        let src = shared.buffers[generation.index()].as_ptr() as *const f64;
        let dst = shared.buffers[generation.other().index()].as_ptr();

        let mut local = 0.0_f64;
        for i in partition.rows() {
            // SAFETY: 1 <= i <= rows-2 なので3行とも範囲内。
            // src はこのイテレーション中だれも書かない。dst の i 行目はこのワーカーだけが書く。
            // 前のイテレーションの読み手は全員バリアを通過済み。
            let (above, row, below, out) = unsafe {
                (
                    slice::from_raw_parts(src.add((i - 1) * cols), cols),
                    slice::from_raw_parts(src.add(i * cols), cols),
                    slice::from_raw_parts(src.add((i + 1) * cols), cols),
                    slice::from_raw_parts_mut(dst.add(i * cols), cols),
                )
            };
            local = local.max(relax_row(above, row, below, out));
        }

        max_delta = shared
            .barrier
            .wait_with(generation, local, |report| save_snapshot(shared, dst, report))?;

        iteration += 1;
        if converged(threshold, max_delta) {
            break;
        }
    }

    debug!(worker = partition.id, iterations = iteration, max_delta, "worker finished");
    Ok(WorkerReport {
        iterations: iteration,
        max_delta,
    })
}

// バリアの最後の到着者がロックを保持したまま呼ぶ
fn save_snapshot(shared: &Shared<'_>, completed: *const f64, report: &RoundReport) {
    let Some((ticker, path)) = shared.snapshot else {
        return;
    };
    if !ticker.take_due() {
        return;
    }

    // SAFETY: 他のワーカーは全員バリア内で待っており、どのバッファにも書き込んでいない
    let data = unsafe { slice::from_raw_parts(completed, shared.rows * shared.cols) };
    match checkpoint::save(path, shared.cols, data) {
        Ok(()) => info!(round = report.round, path = %path.display(), "checkpoint written"),
        Err(err) => warn!(round = report.round, path = %path.display(), error = %err, "checkpoint failed"),
    }
}
