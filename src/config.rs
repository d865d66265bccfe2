use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::error::ConfigError;
use crate::grid::Temperatures;
use crate::partition::Layout;

/// ソルバーの実装
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// シングルスレッドの参照実装
    Sequential,
    /// rayon による行単位の並列化
    Rayon,
    /// チャネルでゴースト行を交換するワーカー
    Channel,
    /// 共有グリッドとリダクションバリア
    Barrier,
}

impl Variant {
    /// グリッドを横帯に分けてワーカーに割り当てるか
    pub fn is_partitioned(self) -> bool {
        matches!(self, Variant::Channel | Variant::Barrier)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    pub period: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimConfig {
    pub n: usize,
    pub temperatures: Temperatures,
    pub iterations: usize,
    pub workers: usize,
    pub capacity: usize,
    /// 0 なら収束判定をしない
    pub threshold: f64,
    pub checkpoint: Option<CheckpointConfig>,
    pub variant: Variant,
}

impl SimConfig {
    /// 全引数を検査し、分割レイアウトを返す
    pub fn validate(&self) -> Result<Layout, ConfigError> {
        if self.n < 1 {
            return Err(invalid("N", "must be at least 1"));
        }

        let temps = &self.temperatures;
        for (name, value) in [
            ("t_left", temps.left),
            ("t_top", temps.top),
            ("t_right", temps.right),
            ("t_bottom", temps.bottom),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(name, "temperatures must be finite and >= 0"));
            }
        }

        if self.iterations < 1 {
            return Err(invalid("iterations", "must be at least 1"));
        }
        if self.workers < 1 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(invalid("max-delta", "must be finite and >= 0"));
        }
        if let Some(checkpoint) = &self.checkpoint {
            if checkpoint.period.is_zero() {
                return Err(invalid("period", "must be positive when a checkpoint file is given"));
            }
        }

        let layout = Layout::new(self.n, self.workers)?;
        if self.variant.is_partitioned() {
            layout.validate_partitions()?;
        }
        Ok(layout)
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SimConfig {
        SimConfig {
            n: 8,
            temperatures: Temperatures {
                left: 0.0,
                top: 100.0,
                right: 0.0,
                bottom: 0.0,
            },
            iterations: 10,
            workers: 2,
            capacity: 1,
            threshold: 0.0,
            checkpoint: None,
            variant: Variant::Channel,
        }
    }

    #[test]
    fn accepts_even_split() {
        let layout = base().validate().unwrap();
        assert_eq!(layout.rows_per_worker(), 4);
        assert_eq!(layout.cols(), 10);
    }

    #[test]
    fn rejects_uneven_split() {
        let config = SimConfig { workers: 3, ..base() };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Indivisible { n: 8, workers: 3 })
        );
    }

    #[test]
    fn rejects_single_row_partitions() {
        let config = SimConfig { workers: 8, ..base() };
        assert_eq!(
            config.validate(),
            Err(ConfigError::PartitionTooSmall { size: 1, min: 2 })
        );
    }

    #[test]
    fn single_row_bands_are_fine_without_partitions() {
        for variant in [Variant::Sequential, Variant::Rayon] {
            let config = SimConfig {
                n: 1,
                workers: 1,
                variant,
                ..base()
            };
            assert!(config.validate().is_ok(), "{:?} rejected N=1", variant);
        }

        let config = SimConfig {
            n: 1,
            workers: 1,
            variant: Variant::Barrier,
            ..base()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::PartitionTooSmall { size: 1, min: 2 })
        );
    }

    #[test]
    fn rejects_negative_temperature() {
        let mut config = base();
        config.temperatures.right = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "t_right", .. })
        ));
    }

    #[test]
    fn rejects_zero_iterations_and_workers() {
        let config = SimConfig { iterations: 0, ..base() };
        assert!(config.validate().is_err());
        let config = SimConfig { workers: 0, ..base() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_checkpoint_period() {
        let config = SimConfig {
            checkpoint: Some(CheckpointConfig {
                path: PathBuf::from("snapshot.txt"),
                period: Duration::ZERO,
            }),
            ..base()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "period", .. })
        ));
    }
}
