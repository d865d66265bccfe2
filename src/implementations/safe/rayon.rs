use rayon::prelude::*;

use crate::error::SimError;
use crate::generation::Generation;
use crate::grid::{relax_row, DoubleBuffer, Grid};
use crate::implementations::{converged, SimOutcome};

/*
  Rayon-based parallel implementation

  書き込み先の内部行を par_chunks_mut で行ごとに分け、各タスクは自分の行だけに書く。
  最大変化量は reduce で集める。ロックもバリアも不要。
*/

pub fn rayon_parallel(
    initial: Grid,
    threads: usize,
    iterations: usize,
    threshold: f64,
) -> Result<SimOutcome, SimError> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;

    let mut buffers = DoubleBuffer::new(initial);
    let mut done = 0;
    let mut max_delta = 0.0;

    pool.install(|| {
        while done < iterations {
            let (src, dst) = buffers.split(Generation::of_iteration(done));
            let rows = src.rows();
            let cols = src.cols();

            // 最上行・最下行は固定境界なので除外
            let interior = &mut dst.data[cols..(rows - 1) * cols];

            max_delta = interior
                .par_chunks_mut(cols)
                .enumerate()
                .map(|(r, dst_row)| {
                    // r は内部領域での行番号、グリッド上では r + 1
                    let i = r + 1;
                    relax_row(src.row(i - 1), src.row(i), src.row(i + 1), dst_row)
                })
                .reduce(|| 0.0, f64::max);

            done += 1;
            if converged(threshold, max_delta) {
                break;
            }
        }
    });

    Ok(SimOutcome {
        grid: buffers.into_grid(Generation::of_iteration(done)),
        iterations: done,
        max_delta,
    })
}
