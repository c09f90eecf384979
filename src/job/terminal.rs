//! Terminal Arbiter — 制御端末のディスクリプタと、シェルが保存した
//! 端末モードのスナップショットを所有し、シェルとフォアグラウンド
//! ジョブのプロセスグループの間で所有権をやり取りする。

use super::syscall;

pub struct TerminalArbiter {
    /// stdin の制御端末の複製。close-on-exec。
    fd: i32,
    shell_pgid: libc::pid_t,
    shell_tmodes: libc::termios,
}

impl TerminalArbiter {
    /// stdin が端末であることを確認し、それを複製し（close-on-exec）、
    /// シェルのプロセスグループを端末のフォアグラウンドグループにし、
    /// シェルの端末モードをスナップショットする。非対話モードはここで
    /// 拒否される — これは対話シェル専用。
    pub fn init() -> Result<Self, &'static str> {
        if !syscall::isatty(libc::STDIN_FILENO) {
            return Err("Shell can run only in interactive mode!");
        }

        let fd = syscall::checked_dup(libc::STDIN_FILENO);
        syscall::set_cloexec(fd);

        let shell_pgid = syscall::getpgrp();
        syscall::tcsetpgrp(fd, shell_pgid);
        let shell_tmodes = syscall::tcgetattr(fd);

        Ok(Self {
            fd,
            shell_pgid,
            shell_tmodes,
        })
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn shell_pgid(&self) -> libc::pid_t {
        self.shell_pgid
    }

    pub fn shell_tmodes(&self) -> libc::termios {
        self.shell_tmodes
    }

    /// 端末の所有権を `pgid` に渡す。
    pub fn set_fg_pgrp(&self, pgid: libc::pid_t) {
        syscall::tcsetpgrp(self.fd, pgid);
    }

    /// 現在の端末モードをスナップショットして返す。呼び出し側は、
    /// 今停止したジョブのレコードにこれを保存できる（後で resume
    /// するときに端末状態を復元するため）。
    pub fn current_tmodes(&self) -> libc::termios {
        syscall::tcgetattr(self.fd)
    }

    /// 端末モードをシェル起動時のスナップショットへ戻す。先に保留中の
    /// 出力を drain する（`TCSADRAIN`）。
    pub fn restore_shell_tmodes(&self) {
        syscall::tcsetattr_drain(self.fd, &self.shell_tmodes);
    }

    /// 端末をシェルへ戻し、そのモードを復元する — [`crate::job::monitor`]
    /// の全てのフォアグラウンド終了パスが行う合成操作。
    pub fn reclaim(&self) {
        self.restore_shell_tmodes();
        self.set_fg_pgrp(self.shell_pgid);
    }

    pub fn shutdown(self) {
        syscall::close_fd(self.fd);
    }
}

#[cfg(test)]
impl TerminalArbiter {
    /// `isatty` のチェックを飛ばすテスト専用コンストラクタ。これにより
    /// [`crate::job::launcher`] と [`crate::job::monitor`] を（CI には
    /// pty がないので）ヘッドレスに動かせる。非端末の fd に対する
    /// `tcsetpgrp`/`tcgetattr` は単に `ENOTTY` で失敗するだけで、ここの
    /// 呼び出し元はすでに全てその戻り値を無視している。
    pub fn for_test() -> Self {
        let fd = syscall::checked_dup(libc::STDIN_FILENO);
        syscall::set_cloexec(fd);
        Self {
            fd,
            shell_pgid: syscall::getpgrp(),
            shell_tmodes: unsafe { std::mem::zeroed() },
        }
    }
}
