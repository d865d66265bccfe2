use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::debug;

use crate::error::BarrierError;
use crate::generation::Generation;

/*
  最大値リダクション付きの二重化バリア

  世代 A / B の2スロットに「残り到着数」と「最大値」を持つ。
  最後に到着したスレッドがその場で次の世代のスロットを初期化するので、
  リセット専用のフェーズが要らない。

  世代 g の結果を読むのは、全員が g を更新した後で、
  g が2ラウンド後に再初期化されるより前に限られる
  （再初期化するスレッドは、読み終えた全員が次のラウンドに到着するまで現れない）。
*/

struct Slots {
    remaining: [usize; 2],
    max: [f64; 2],
    completed: u64,
    active: Generation,
    aborted: bool,
}

/// 最後の到着者がロックを保持したまま受け取るラウンドの情報
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundReport {
    /// 1から数えた完了ラウンド数
    pub round: u64,
    pub generation: Generation,
    pub max: f64,
}

pub struct ReductionBarrier {
    participants: usize,
    slots: Mutex<Slots>,
    released: [Condvar; 2],
}

impl ReductionBarrier {
    /// `participants` が0の場合は1として扱う（std::sync::Barrier と同じ）
    pub fn new(participants: usize) -> Self {
        let participants = participants.max(1);
        ReductionBarrier {
            participants,
            slots: Mutex::new(Slots {
                remaining: [participants; 2],
                max: [f64::NEG_INFINITY; 2],
                completed: 0,
                active: Generation::A,
                aborted: false,
            }),
            released: [Condvar::new(), Condvar::new()],
        }
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// 全員が `generation` に到着するまで待ち、全員の `local` の最大値を返す
    pub fn wait(&self, generation: Generation, local: f64) -> Result<f64, BarrierError> {
        self.wait_with(generation, local, |_| {})
    }

    /// `wait` と同じだが、最後の到着者だけがロックを保持したまま `on_release` を実行する。
    /// その間、他の参加者はまだバリアから戻れない。
    pub fn wait_with<F>(&self, generation: Generation, local: f64, on_release: F) -> Result<f64, BarrierError>
    where
        F: FnOnce(&RoundReport),
    {
        let g = generation.index();
        let mut slots = self.lock()?;
        if slots.aborted {
            return Err(BarrierError::Aborted);
        }

        slots.remaining[g] -= 1;
        slots.max[g] = slots.max[g].max(local);

        if slots.remaining[g] == 0 {
            let next = generation.other();
            slots.completed += 1;
            slots.remaining[next.index()] = self.participants;
            slots.max[next.index()] = f64::NEG_INFINITY;
            slots.active = next;

            let report = RoundReport {
                round: slots.completed,
                generation,
                max: slots.max[g],
            };
            debug!(round = report.round, ?generation, max = report.max, "barrier round complete");
            on_release(&report);

            self.released[g].notify_all();
        } else {
            slots = self.released[g]
                .wait_while(slots, |s| !s.aborted && s.remaining[g] != 0)
                .map_err(|_| BarrierError::Poisoned)?;
            if slots.remaining[g] != 0 {
                return Err(BarrierError::Aborted);
            }
        }

        Ok(slots.max[g])
    }

    pub fn completed_rounds(&self) -> Result<u64, BarrierError> {
        Ok(self.lock()?.completed)
    }

    /// 直近に完了したラウンドの結果を持つ側の世代（スナップショット用）
    pub fn active_generation(&self) -> Result<Generation, BarrierError> {
        Ok(self.lock()?.active)
    }

    /// 待機中の参加者を `Aborted` で起こす
    pub fn abort(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.aborted = true;
        drop(slots);
        for condvar in &self.released {
            condvar.notify_all();
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slots>, BarrierError> {
        self.slots.lock().map_err(|_| BarrierError::Poisoned)
    }
}
