//! 行リーダー — REPLのうちプロンプト/入力を担う側。ジョブ制御コアが
//! 依存する対象ではなく、差し替え可能な薄い協調者として切り離してある。
//! [`BlockingReader`] は1バイトずつ読むだけの最小限のフォールバック。
//! [`EditorHook`] トレイトを実装すれば、コア側を変えずに本物の行エディタを
//! 差し込める。

use std::io::{self, Read, Write};

pub const PROMPT: &str = "# ";

/// 差し替え可能なプロンプト/入力ソース。以下のブロッキング読み取りの
/// デフォルト実装は履歴も行編集も行わない。本物のエディタはこのトレイト
/// を実装することで差し込める。
pub trait EditorHook {
    /// `prompt` を書き出し、1行分ブロックする。`None` は EOF を表す。
    fn read_line(&mut self, prompt: &str) -> Option<String>;

    /// 空でない行が受理された後に呼ばれる。本物のエディタはここで履歴に
    /// 積める。ブロッキングリーダーは無視する。
    fn add_history(&mut self, _line: &str) {}
}

/// デフォルトの協調者: プロンプトを書き出し、行バッファへの
/// ブロッキング `read(2)` を行い、末尾の改行を落として返す。
/// 割り込まれた読み取り（`EINTR`。no-op の SIGINT ハンドラがブロッキング
/// 読み取りを中断させたもの）はエラーではなく空行として扱うので、
/// プロンプト中の Ctrl-C は単に新しい行でプロンプトを再描画するだけに
/// なる。
pub struct BlockingReader {
    stdin: io::Stdin,
}

impl BlockingReader {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Default for BlockingReader {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorHook for BlockingReader {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        if io::stdout().flush().is_err() {
            return None;
        }

        let mut byte = [0u8; 1];
        let mut line = Vec::new();
        loop {
            match self.stdin.read(&mut byte) {
                Ok(0) => {
                    return if line.is_empty() { None } else { Some(bytes_to_line(line)) };
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        return Some(bytes_to_line(line));
                    }
                    line.push(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    // SIGINT の no-op ハンドラによる EINTR: C 版フォール
                    // バックの「`read()` が -1/EINTR を返す」場合の扱いに
                    // 合わせ、空行でプロンプトを再描画する。
                    return Some(String::new());
                }
                Err(_) => return None,
            }
        }
    }
}

fn bytes_to_line(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_constant_is_hash_space() {
        assert_eq!(PROMPT, "# ");
    }
}
