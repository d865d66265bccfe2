use std::ops::Range;

use crate::comm::Endpoint;
use crate::error::ConfigError;
use crate::grid::Grid;

/// 1パーティションに必要な最小の実行数
pub const MIN_PARTITION_ROWS: usize = 2;

/// 1ワーカーが所有する連続した行範囲 `[base, base + size)`（グリッド全体の行番号）。
/// 「左」の隣は上のパーティション (id - 1)、「右」の隣は下のパーティション (id + 1)。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    pub id: Endpoint,
    pub base: usize,
    pub size: usize,
}

impl Partition {
    pub fn rows(&self) -> Range<usize> {
        self.base..self.base + self.size
    }

    pub fn left(&self) -> Option<Endpoint> {
        (self.id > 1).then(|| self.id - 1)
    }

    pub fn right(&self, workers: usize) -> Option<Endpoint> {
        (self.id < workers).then(|| self.id + 1)
    }

    /// 上下のゴースト行を含むスラブの行範囲
    pub fn slab_rows(&self) -> Range<usize> {
        self.base - 1..self.base + self.size + 1
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size < MIN_PARTITION_ROWS {
            return Err(ConfigError::PartitionTooSmall {
                size: self.size,
                min: MIN_PARTITION_ROWS,
            });
        }
        Ok(())
    }
}

/// `n x n` の内部領域を `workers` 本の横帯に分割する
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    n: usize,
    workers: usize,
}

impl Layout {
    pub fn new(n: usize, workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::Invalid {
                name: "workers",
                reason: "must be at least 1".into(),
            });
        }
        if n % workers != 0 {
            return Err(ConfigError::Indivisible { n, workers });
        }
        Ok(Layout { n, workers })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn rows_per_worker(&self) -> usize {
        self.n / self.workers
    }

    /// 列数（固定境界の2列を含む）
    pub fn cols(&self) -> usize {
        self.n + 2
    }

    /// `id` は 1..=workers
    pub fn partition(&self, id: Endpoint) -> Partition {
        let size = self.rows_per_worker();
        Partition {
            id,
            base: 1 + (id - 1) * size,
            size,
        }
    }

    /// 全パーティションが交換に必要な行数を持つか（全て同じ大きさ）
    pub fn validate_partitions(&self) -> Result<(), ConfigError> {
        self.partition(1).validate()
    }

    pub fn partitions(&self) -> impl Iterator<Item = Partition> + '_ {
        (1..=self.workers).map(move |id| self.partition(id))
    }

    /// グリッドからゴースト行込みのスラブを切り出す
    pub fn slab(&self, grid: &Grid, partition: &Partition) -> Grid {
        let mut slab = Grid::new(partition.size + 2, grid.cols());
        for (local, global) in partition.slab_rows().enumerate() {
            slab.set_row(local, grid.row(global));
        }
        slab
    }
}
