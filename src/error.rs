//! ジョブ制御コアにおける、プロセス致命的な条件とユーザー可視な条件の
//! ための型付きエラー。
//!
//! [`crate::job::syscall`] の区分に対応している: `Syscall` と `Exec` は
//! チェック付きラッパーが送出するプロセス致命的なもの。`NoSuchJob` と
//! `EmptyStage` はユーザー可視で、シェルを落とすことはない。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{call} failed: {}", std::io::Error::from_raw_os_error(*errno))]
    Syscall { call: &'static str, errno: i32 },

    #[error("{command}: {}", std::io::Error::from_raw_os_error(*errno))]
    Exec { command: String, errno: i32 },

    #[error("no such job: {0}")]
    NoSuchJob(usize),

    #[error("command line is not well formed")]
    EmptyStage,

    #[error("{0}")]
    Init(&'static str),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// exec に失敗した子プロセスの慣例的な終了ステータス:
    /// "command not found" なら 127、"found but not executable" なら 126。
    pub fn exec_exit_status(errno: i32) -> i32 {
        match errno {
            libc::ENOENT => 127,
            libc::EACCES => 126,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
