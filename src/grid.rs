use std::io::{self, Write};

use crate::generation::Generation;

/// 行優先で格納した倍精度の2次元行列
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    pub data: Vec<f64>,
}

impl Grid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Grid {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Grid { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn set_row(&mut self, row: usize, values: &[f64]) {
        self.row_mut(row).copy_from_slice(values);
    }

    pub fn set_row_to(&mut self, row: usize, value: f64) {
        self.row_mut(row).fill(value);
    }

    pub fn set_column_to(&mut self, col: usize, value: f64) {
        for i in 0..self.rows {
            self.data[i * self.cols + col] = value;
        }
    }

    /// 同じ形の行列から全要素をコピー
    pub fn copy_from(&mut self, src: &Grid) {
        assert_eq!(
            (self.rows, self.cols),
            (src.rows, src.cols),
            "copy between grids of different shape"
        );
        self.data.copy_from_slice(&src.data);
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_matrix(out, self.cols, &self.data)
    }

    // 格子の温度を標準出力へ表示
    pub fn print(&self) -> io::Result<()> {
        let mut lock = io::stdout().lock();
        self.write_to(&mut lock)?;
        lock.flush()
    }
}

/// 最終出力とチェックポイントで共通のテキスト形式
pub fn write_matrix<W: Write>(out: &mut W, cols: usize, data: &[f64]) -> io::Result<()> {
    for row in data.chunks(cols) {
        for value in row {
            write!(out, "{:6.2} ", value)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// 四辺の固定温度
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Temperatures {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// 内部 `n x n` セルと固定境界を持つ `(n+2) x (n+2)` の初期グリッド。
/// 角のセルは列の温度が優先される。
pub fn heat_plate(n: usize, temps: &Temperatures) -> Grid {
    let mut grid = Grid::new(n + 2, n + 2);
    grid.set_row_to(0, temps.top);
    grid.set_row_to(n + 1, temps.bottom);
    grid.set_column_to(0, temps.left);
    grid.set_column_to(n + 1, temps.right);
    grid
}

/// 上下左右4点の平均
#[inline(always)]
pub fn stencil(up: f64, down: f64, left: f64, right: f64) -> f64 {
    (up + down + left + right) / 4.0
}

/// 1行分の内部セル (1..cols-1) を更新し、最大変化量を返す。
/// 端の列は固定境界なので `out` 側には書き込まない。
/// 全実装がこの関数を通るので、結果はビット単位で一致する。
#[inline]
pub fn relax_row(above: &[f64], row: &[f64], below: &[f64], out: &mut [f64]) -> f64 {
    let cols = row.len();
    let mut max_delta = 0.0_f64;

    for j in 1..cols.saturating_sub(1) {
        let value = stencil(above[j], below[j], row[j - 1], row[j + 1]);
        let delta = (value - row[j]).abs();
        if delta > max_delta {
            max_delta = delta;
        }
        out[j] = value;
    }

    max_delta
}

/// current / next の2枚のバッファ。`Generation` で選択し、ポインタの入れ替えはしない。
#[derive(Clone, Debug)]
pub struct DoubleBuffer {
    a: Grid,
    b: Grid,
}

impl DoubleBuffer {
    /// 両バッファを同じ初期値（固定境界込み）で作る
    pub fn new(initial: Grid) -> Self {
        DoubleBuffer {
            b: initial.clone(),
            a: initial,
        }
    }

    pub fn get(&self, generation: Generation) -> &Grid {
        match generation {
            Generation::A => &self.a,
            Generation::B => &self.b,
        }
    }

    pub fn get_mut(&mut self, generation: Generation) -> &mut Grid {
        match generation {
            Generation::A => &mut self.a,
            Generation::B => &mut self.b,
        }
    }

    /// (読み取り元, 書き込み先) を返す
    pub fn split(&mut self, current: Generation) -> (&Grid, &mut Grid) {
        match current {
            Generation::A => (&self.a, &mut self.b),
            Generation::B => (&self.b, &mut self.a),
        }
    }

    pub fn into_grid(self, generation: Generation) -> Grid {
        match generation {
            Generation::A => self.a,
            Generation::B => self.b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_from_copies_every_cell() {
        let plate = heat_plate(
            2,
            &Temperatures {
                left: 1.0,
                top: 2.0,
                right: 3.0,
                bottom: 4.0,
            },
        );
        let mut copy = Grid::new(4, 4);
        copy.copy_from(&plate);
        assert_eq!(copy, plate);
    }

    #[test]
    #[should_panic(expected = "different shape")]
    fn copy_from_rejects_other_shape() {
        Grid::new(3, 3).copy_from(&Grid::new(4, 4));
    }

    #[test]
    fn relax_row_leaves_edge_columns() {
        let above = [9.0, 4.0, 4.0, 9.0];
        let row = [9.0, 0.0, 8.0, 9.0];
        let below = [9.0, 0.0, 0.0, 9.0];
        let mut out = [-1.0; 4];

        let delta = relax_row(&above, &row, &below, &mut out);

        assert_eq!(out, [-1.0, 5.25, 3.25, -1.0]);
        assert_eq!(delta, 5.25);
    }

    // 常に書き込みに失敗する出力先
    struct FullDevice;

    impl Write for FullDevice {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WriteZero, "device is full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_to_reports_output_errors() {
        let err = Grid::new(3, 3).write_to(&mut FullDevice).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn write_matrix_uses_fixed_width() {
        let mut out = Vec::new();
        write_matrix(&mut out, 2, &[1.0, 22.5, 100.0, 0.25]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  1.00  22.50 \n100.00   0.25 \n");
    }
}
