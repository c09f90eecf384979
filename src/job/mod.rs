//! ジョブ制御のコア: ジョブテーブル、SIGCHLD reaper、ターミナル調停者、
//! パイプラインランチャ、ジョブモニタ/コントローラ。

pub mod launcher;
pub mod monitor;
pub mod reaper;
pub mod syscall;
pub mod table;
pub mod terminal;

use crate::error::Result;
use terminal::TerminalArbiter;

/// ジョブ制御サブシステムを立ち上げる: ジョブテーブル、SIGCHLD
/// ハンドラ、（対話的な stdin を要求する）ターミナル調停者。起動時に
/// 最初のプロンプトより前に一度だけ呼ぶ。
pub fn init() -> Result<TerminalArbiter> {
    table::init();
    reaper::install();
    TerminalArbiter::init().map_err(|msg| crate::error::ShellError::Init(msg))
}

/// プロセス全体で共有されるジョブテーブルに実際の子プロセスを fork する
/// このクレートの全テストモジュール（[`reaper`] と [`launcher`] の
/// テスト）が共有する。cargo test のデフォルトのスレッド並列ランナーは
/// これがないと無関係なテスト同士のジョブを同じグローバルテーブルに
/// 混在させてしまう。
#[cfg(test)]
pub(crate) mod test_lock {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    pub(crate) fn acquire() -> MutexGuard<'static, ()> {
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
