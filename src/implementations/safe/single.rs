use crate::generation::Generation;
use crate::grid::{relax_row, DoubleBuffer, Grid};
use crate::implementations::{converged, SimOutcome};

/// シングルスレッドの参照実装。1回の `step` が1イテレーション
pub struct Sweep {
    buffers: DoubleBuffer,
    iteration: usize,
}

impl Sweep {
    pub fn new(initial: Grid) -> Self {
        Sweep {
            buffers: DoubleBuffer::new(initial),
            iteration: 0,
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn current(&self) -> &Grid {
        self.buffers.get(Generation::of_iteration(self.iteration))
    }

    /// 内部セルを全て更新し、最大変化量を返す
    pub fn step(&mut self) -> f64 {
        let (src, dst) = self.buffers.split(Generation::of_iteration(self.iteration));
        let mut max_delta = 0.0_f64;

        for i in 1..src.rows().saturating_sub(1) {
            let delta = relax_row(src.row(i - 1), src.row(i), src.row(i + 1), dst.row_mut(i));
            max_delta = max_delta.max(delta);
        }

        self.iteration += 1;
        max_delta
    }

    pub fn into_grid(self) -> Grid {
        self.buffers.into_grid(Generation::of_iteration(self.iteration))
    }
}

pub fn jacobi_sequential(initial: Grid, iterations: usize, threshold: f64) -> SimOutcome {
    let mut sweep = Sweep::new(initial);
    let mut max_delta = 0.0;

    while sweep.iteration() < iterations {
        max_delta = sweep.step();
        if converged(threshold, max_delta) {
            break;
        }
    }

    SimOutcome {
        iterations: sweep.iteration(),
        max_delta,
        grid: sweep.into_grid(),
    }
}
