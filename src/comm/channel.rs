use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::trace;

use crate::error::CommError;

/*
  1組の (送信元, 宛先) に対応するFIFOメールボックス

  - capacity > 0: バッファ付き。キューの長さは capacity を超えない
  - capacity == 0: ランデブー。受信側が中身をコピーし終えるまで send は戻らない

  同期は Mutex 1つと Condvar 2つ（空き待ち / メッセージ待ち）だけで行う。
*/

struct Message {
    payload: Box<[u8]>,
    // ランデブー時、受信済みかどうかの判定に使う通し番号
    ticket: u64,
}

struct State {
    queue: VecDeque<Message>,
    sent: u64,
    consumed: u64,
    aborted: bool,
}

pub struct Channel {
    from: usize,
    to: usize,
    capacity: usize,
    state: Mutex<State>,
    space_available: Condvar,
    message_available: Condvar,
}

impl Channel {
    pub fn new(from: usize, to: usize, capacity: usize) -> Self {
        Channel {
            from,
            to,
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity.max(1)),
                sent: 0,
                consumed: 0,
                aborted: false,
            }),
            space_available: Condvar::new(),
            message_available: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_rendezvous(&self) -> bool {
        self.capacity == 0
    }

    /// 送信済みで未受信のメッセージ数
    pub fn len(&self) -> Result<usize, CommError> {
        Ok(self.lock()?.queue.len())
    }

    pub fn is_empty(&self) -> Result<bool, CommError> {
        Ok(self.len()? == 0)
    }

    /// `payload` を送り、送ったバイト数を返す。
    /// バッファ付きならキューに空きができるまで、ランデブーなら受信されるまでブロックする。
    pub fn send(&self, payload: &[u8]) -> Result<usize, CommError> {
        let mut state = self.lock()?;

        if self.capacity > 0 {
            state = self
                .space_available
                .wait_while(state, |s| !s.aborted && s.queue.len() >= self.capacity)
                .map_err(|_| self.poisoned())?;
        }
        if state.aborted {
            return Err(self.aborted());
        }

        state.sent += 1;
        let ticket = state.sent;
        state.queue.push_back(Message {
            payload: payload.into(),
            ticket,
        });
        self.message_available.notify_one();
        trace!(from = self.from, to = self.to, len = payload.len(), ticket, "sent");

        if self.capacity == 0 {
            // 受信側がコピーし終えるまで戻らない
            state = self
                .space_available
                .wait_while(state, |s| !s.aborted && s.consumed < ticket)
                .map_err(|_| self.poisoned())?;
            if state.consumed < ticket {
                return Err(self.aborted());
            }
        }

        Ok(payload.len())
    }

    /// 先頭のメッセージを `buffer` にコピーし、コピーしたバイト数 `min(len, buffer.len())` を返す。
    /// キューが空の間はブロックする。
    pub fn receive(&self, buffer: &mut [u8]) -> Result<usize, CommError> {
        let state = self.lock()?;
        let mut state = self
            .message_available
            .wait_while(state, |s| !s.aborted && s.queue.is_empty())
            .map_err(|_| self.poisoned())?;

        let message = match state.queue.pop_front() {
            Some(message) => message,
            None => return Err(self.aborted()),
        };

        let copied = message.payload.len().min(buffer.len());
        buffer[..copied].copy_from_slice(&message.payload[..copied]);

        if self.capacity == 0 {
            state.consumed = message.ticket;
            // 待っている送信者は自分の ticket を確認する
            self.space_available.notify_all();
        } else {
            self.space_available.notify_one();
        }
        trace!(from = self.from, to = self.to, copied, ticket = message.ticket, "received");

        Ok(copied)
    }

    /// ブロック中の送受信をすべて `Aborted` で起こす。以後の操作も失敗する。
    pub fn abort(&self) {
        // ロックが汚染されていても中身は書き換えて起こす
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.aborted = true;
        drop(state);
        self.space_available.notify_all();
        self.message_available.notify_all();
    }

    /// 未受信のメッセージを捨て、その数を返す
    pub fn drain(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let discarded = state.queue.len();
        state.queue.clear();
        discarded
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, CommError> {
        self.state.lock().map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> CommError {
        CommError::Poisoned {
            from: self.from,
            to: self.to,
        }
    }

    fn aborted(&self) -> CommError {
        CommError::Aborted {
            from: self.from,
            to: self.to,
        }
    }
}
