/// 二重化された状態（グリッドのバッファ・バリアのスロット）のどちらを使うか。
/// イテレーション番号の偶奇で決まる。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Generation {
    A,
    B,
}

impl Generation {
    pub fn of_iteration(iteration: usize) -> Self {
        if iteration % 2 == 0 {
            Generation::A
        } else {
            Generation::B
        }
    }

    pub fn other(self) -> Self {
        match self {
            Generation::A => Generation::B,
            Generation::B => Generation::A,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Generation::A => 0,
            Generation::B => 1,
        }
    }
}
