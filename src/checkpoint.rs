use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::SimError;
use crate::grid::{write_matrix, Grid};

/*
  チェックポイント

  - 一時ファイルに書いてから rename で置き換える（読み手は常に完全なファイルを見る）
  - 周期は Ticker スレッドが「due」フラグを立てることで通知する
  - 書き込み自体はバリアの最後の到着者が行う（全ワーカーが止まっている間）
*/

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// `data` を最終出力と同じテキスト形式で `path` に原子的に書く
pub fn save(path: &Path, cols: usize, data: &[f64]) -> io::Result<()> {
    let tmp = temp_path(path);
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        write_matrix(&mut out, cols, data)?;
        out.flush()?;
    }
    fs::rename(&tmp, path)
}

/// チェックポイントがあれば読み込む。無ければ `None`
pub fn load(path: &Path, rows: usize, cols: usize) -> Result<Option<Grid>, SimError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SimError::Checkpoint {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let corrupt = |reason: String| SimError::CorruptCheckpoint {
        path: path.to_path_buf(),
        reason,
    };

    let data = text
        .split_whitespace()
        .map(|token| token.parse::<f64>().map_err(|e| corrupt(format!("`{token}`: {e}"))))
        .collect::<Result<Vec<_>, _>>()?;

    let found = data.len();
    let grid = Grid::from_rows(rows, cols, data)
        .ok_or_else(|| corrupt(format!("expected {} values, found {}", rows * cols, found)))?;

    info!(path = %path.display(), rows, cols, "resuming from checkpoint");
    Ok(Some(grid))
}

/// 正常終了時にチェックポイントを消す
pub fn remove(path: &Path) -> Result<(), SimError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SimError::Checkpoint {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// `period` ごとに due フラグを立てるタイマースレッド。drop で停止する。
pub struct Ticker {
    due: Arc<AtomicBool>,
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(period: Duration) -> Self {
        let due = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let flag = due.clone();
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => flag.store(true, Ordering::Release),
                _ => break,
            }
        });
        debug!(?period, "checkpoint ticker started");

        Ticker {
            due,
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// 期限が来ていればフラグを下ろして `true`
    pub fn take_due(&self) -> bool {
        self.due.swap(false, Ordering::AcqRel)
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        // Sender を落とすとスレッド側の recv_timeout が Disconnected で抜ける
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{heat_plate, Temperatures};

    fn plate() -> Grid {
        heat_plate(
            3,
            &Temperatures {
                left: 1.0,
                top: 100.0,
                right: 2.5,
                bottom: 0.0,
            },
        )
    }

    #[test]
    fn save_then_load_restores_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.txt");
        let grid = plate();

        save(&path, grid.cols(), &grid.data).unwrap();
        assert!(!temp_path(&path).exists(), "temporary file must be renamed away");

        let loaded = load(&path, grid.rows(), grid.cols()).unwrap().unwrap();
        assert_eq!(loaded, grid);
    }

    #[test]
    fn checkpoint_keeps_two_decimals() {
        // 最終出力と同じ形式なので、再開時の値は小数2桁に丸められる
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.txt");
        let mut grid = plate();
        grid.set(1, 1, 100.0 / 3.0);
        grid.set(2, 2, 1.0 / 7.0);

        save(&path, grid.cols(), &grid.data).unwrap();
        let loaded = load(&path, grid.rows(), grid.cols()).unwrap().unwrap();

        assert_eq!(loaded.get(1, 1), 33.33);
        assert_eq!(loaded.get(2, 2), 0.14);
        assert_eq!(loaded.row(0), grid.row(0));
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.txt");
        assert!(load(&path, 5, 5).unwrap().is_none());
        remove(&path).unwrap();
    }

    #[test]
    fn wrong_shape_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.txt");
        let grid = plate();
        save(&path, grid.cols(), &grid.data).unwrap();

        let err = load(&path, grid.rows() + 1, grid.cols()).unwrap_err();
        assert!(matches!(err, SimError::CorruptCheckpoint { .. }));
    }

    #[test]
    fn garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.txt");
        fs::write(&path, "1.0 2.0 hot\n").unwrap();

        let err = load(&path, 1, 3).unwrap_err();
        assert!(matches!(err, SimError::CorruptCheckpoint { .. }));
    }

    #[test]
    fn ticker_raises_due_flag() {
        let ticker = Ticker::start(Duration::from_millis(5));
        let mut seen = false;
        for _ in 0..200 {
            if ticker.take_due() {
                seen = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(seen);
    }
}
