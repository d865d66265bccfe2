use tracing::{debug, info};

use super::channel::Channel;
use crate::error::CommError;

pub type Endpoint = usize;

/// コーディネータのエンドポイント番号。ワーカーは 1..N
pub const COORDINATOR: Endpoint = 0;

const F64_BYTES: usize = std::mem::size_of::<f64>();

/// 全エンドポイントの順序対ごとのチャネルを所有する。
/// グローバル状態ではなく、コーディネータが作ってワーカーに貸し出す。
pub struct Registry {
    endpoints: usize,
    capacity: usize,
    // 添字は to * endpoints + from
    channels: Vec<Channel>,
}

impl Registry {
    pub fn new(capacity: usize, endpoints: usize) -> Result<Self, CommError> {
        if endpoints == 0 {
            return Err(CommError::NoEndpoints);
        }

        let channels = (0..endpoints * endpoints)
            .map(|idx| Channel::new(idx % endpoints, idx / endpoints, capacity))
            .collect();

        debug!(endpoints, capacity, "message-passing registry initialized");
        Ok(Registry {
            endpoints,
            capacity,
            channels,
        })
    }

    pub fn endpoints(&self) -> usize {
        self.endpoints
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel(&self, from: Endpoint, to: Endpoint) -> Result<&Channel, CommError> {
        for endpoint in [from, to] {
            if endpoint >= self.endpoints {
                return Err(CommError::UnknownEndpoint {
                    endpoint,
                    count: self.endpoints,
                });
            }
        }
        Ok(&self.channels[to * self.endpoints + from])
    }

    pub fn send(&self, from: Endpoint, to: Endpoint, payload: &[u8]) -> Result<usize, CommError> {
        self.channel(from, to)?.send(payload)
    }

    pub fn receive(&self, from: Endpoint, to: Endpoint, buffer: &mut [u8]) -> Result<usize, CommError> {
        self.channel(from, to)?.receive(buffer)
    }

    /// 1行分の f64 をバイト列にして送る
    pub fn send_row(&self, from: Endpoint, to: Endpoint, row: &[f64]) -> Result<(), CommError> {
        let mut bytes = Vec::with_capacity(row.len() * F64_BYTES);
        for value in row {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        self.send(from, to, &bytes)?;
        Ok(())
    }

    /// 1行分を受け取る。長さが足りなければ境界行が壊れるのでエラーにする
    pub fn receive_row(&self, from: Endpoint, to: Endpoint, row: &mut [f64]) -> Result<(), CommError> {
        let expected = row.len() * F64_BYTES;
        let mut bytes = vec![0u8; expected];
        let actual = self.receive(from, to, &mut bytes)?;
        if actual != expected {
            return Err(CommError::ShortTransfer {
                from,
                to,
                expected,
                actual,
            });
        }

        for (value, chunk) in row.iter_mut().zip(bytes.chunks_exact(F64_BYTES)) {
            let mut raw = [0u8; F64_BYTES];
            raw.copy_from_slice(chunk);
            *value = f64::from_ne_bytes(raw);
        }
        Ok(())
    }

    /// 全チャネルを中断し、ブロック中のスレッドをエラーで起こす
    pub fn abort(&self) {
        for channel in &self.channels {
            channel.abort();
        }
    }

    /// 残っているメッセージを捨てて解放する。破棄した数を返す。
    /// `self` を消費するので、ワーカーが借用している間は呼べない。
    pub fn shutdown(self) -> usize {
        let discarded: usize = self.channels.iter().map(Channel::drain).sum();
        info!(endpoints = self.endpoints, discarded, "message-passing registry shut down");
        discarded
    }
}
