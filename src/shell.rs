//! REPLループ全体で共有されるシェルローカルな状態: 直前の終了ステータス、
//! ビルトインがセットする終了フラグ、フォアグラウンドへの受け渡しすべてが
//! 経由するターミナル調停者。

use crate::job::terminal::TerminalArbiter;

pub struct Shell {
    /// 直前に実行したコマンドの終了ステータス。`exit` のデフォルト引数
    /// （いずれはプロンプト表示にも）に使う。
    pub last_status: i32,
    /// `exit` ビルトインがセットし、REPLループを終了させる。
    pub should_exit: bool,
    pub terminal: TerminalArbiter,
}

impl Shell {
    pub fn new(terminal: TerminalArbiter) -> Self {
        Self {
            last_status: 0,
            should_exit: false,
            terminal,
        }
    }
}
