//! Reaper — 非同期の SIGCHLD 駆動ハンドラ。
//!
//! 起動時に一度だけインストールされ（[`install`]）、シェル自身のスレッド
//! 上で、シグナル配送のタイミングでそれを横取りしながら走る。協調する
//! 割り込みハンドラがクリティカルセクションの途中から longjmp しない
//! よう、ハンドラの実行中は SIGINT をマスクする。

use super::syscall::{self, WaitOutcome};
use super::table::{self, ProcState};

/// 状態が変化した子プロセスを、`waitpid` が「まだ状態変化なし」または
/// 「子プロセスなし」を返すまで次々に汲み取り、ジョブテーブルへ反映する。
/// シグナルハンドラと、積極的に reap したい呼び出し側（テストなど）の
/// 両方が共有する非ブロッキング部分。
pub fn drain() {
    loop {
        match syscall::waitpid_raw(-1, libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED) {
            Ok((pid, status)) => {
                let outcome = syscall::decode_status(pid, status);
                apply(outcome);
            }
            Err(0) => break,                      // まだ状態変化なし
            Err(e) if e == libc::ECHILD => break, // 子プロセスなし
            Err(e) => {
                log::error!("waitpid: {}", std::io::Error::from_raw_os_error(e));
                break;
            }
        }
    }
}

fn apply(outcome: WaitOutcome) {
    table::with_jobs(|jobs| match outcome {
        WaitOutcome::Exited { pid, code } => {
            log::debug!("pid {pid} exited with status {code}");
            jobs.mark_pid(pid, ProcState::Finished, Some(code));
        }
        WaitOutcome::Signaled { pid, signal } => {
            log::debug!("pid {pid} terminated by signal {signal}");
            jobs.mark_pid(pid, ProcState::Finished, Some(128 + signal));
        }
        WaitOutcome::Stopped { pid } => {
            log::debug!("pid {pid} stopped");
            jobs.mark_pid(pid, ProcState::Stopped, None);
        }
        WaitOutcome::Continued { pid } => {
            log::debug!("pid {pid} continued");
            jobs.mark_pid(pid, ProcState::Running, None);
        }
        WaitOutcome::NoChange | WaitOutcome::NoChildren => {}
    });
}

extern "C" fn sigchld_handler(_sig: libc::c_int) {
    let saved_errno = std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(0);
    drain();
    unsafe {
        *libc::__errno_location() = saved_errno;
    }
}

/// `SA_RESTART` 付きで SIGCHLD ハンドラをインストールし、ハンドラの
/// 実行中は SIGINT をマスクする。
pub fn install() {
    syscall::checked_sigaction(
        libc::SIGCHLD,
        sigchld_handler as usize,
        /* mask_sigint */ true,
        /* restart */ true,
    );
}

/// ガードの生存期間中 SIGCHLD をブロックし、drop 時に以前のマスクへ
/// 戻す RAII ガード。ジョブテーブルのあらゆるクリティカルセクション
/// （`add_job`..`add_proc*`、`job_state`/`watch_jobs` の周り、
/// [`crate::job::syscall::sigsuspend`] に渡すマスクを組み立てる間）で
/// 1つ保持しておくこと。
pub struct BlockSigchld {
    saved: libc::sigset_t,
}

impl BlockSigchld {
    pub fn new() -> Self {
        let mask = syscall::sigchld_mask();
        let saved = syscall::sigprocmask_block(&mask);
        Self { saved }
    }

    /// このガードが SIGCHLD をブロックする *前* のマスク — つまり、
    /// suspend の間だけ SIGCHLD を（外側のガードがすでにブロックして
    /// いない限り、SIGCHLD だけを）アンブロックするために `sigsuspend`
    /// へ渡すべきマスク。
    pub fn saved_mask(&self) -> libc::sigset_t {
        self.saved
    }
}

impl Drop for BlockSigchld {
    fn drop(&mut self) {
        syscall::sigprocmask_setmask(&self.saved);
    }
}
