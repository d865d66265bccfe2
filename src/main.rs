use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use heat_sim::config::CheckpointConfig;
use heat_sim::grid::Temperatures;
use heat_sim::{run, SimConfig, SimError, Variant};

/// 2次元の熱拡散シミュレーション（Jacobi法）
#[derive(Parser, Debug)]
#[command(name = "heat-sim", author, version, about, long_about = None)]
struct Args {
    /// 内部セルの一辺の数
    #[arg(value_name = "N")]
    n: usize,

    /// 左端の温度
    t_left: f64,

    /// 上端の温度
    t_top: f64,

    /// 右端の温度
    t_right: f64,

    /// 下端の温度
    t_bottom: f64,

    /// 最大イテレーション数
    iterations: usize,

    /// ワーカースレッド数（N を割り切る必要がある）
    workers: usize,

    /// 各チャネルの容量（0 でランデブー）
    capacity: usize,

    /// 全セルの最大変化量がこの値を下回ったら停止する（0 で無効）
    #[arg(long = "max-delta", default_value_t = 0.0)]
    max_delta: f64,

    /// 定期的にグリッドを書き出すファイル
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// チェックポイントの間隔（秒）
    #[arg(long, default_value_t = 1)]
    period: u64,

    /// 使用する実装
    #[arg(long, value_enum, default_value_t = Variant::Channel)]
    variant: Variant,
}

impl Args {
    fn into_config(self) -> SimConfig {
        SimConfig {
            n: self.n,
            temperatures: Temperatures {
                left: self.t_left,
                top: self.t_top,
                right: self.t_right,
                bottom: self.t_bottom,
            },
            iterations: self.iterations,
            workers: self.workers,
            capacity: self.capacity,
            threshold: self.max_delta,
            checkpoint: self.checkpoint.map(|path| CheckpointConfig {
                path,
                period: Duration::from_secs(self.period),
            }),
            variant: self.variant,
        }
    }
}

fn main() -> Result<()> {
    // 標準出力はグリッド専用。ログは標準エラーへ
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Args::parse().into_config();

    // 設定エラーは run の中でスレッド起動前に検出される
    let outcome = run(&config).map_err(|err| {
        let context = match err {
            SimError::Config(_) => "invalid arguments",
            _ => "simulation failed",
        };
        anyhow::Error::new(err).context(context)
    })?;

    outcome.grid.print().context("failed to write result grid")?;

    Ok(())
}
