//! 薄い libc ラッパー群。2つの系統に分かれる: *checking* ラッパーは
//! 予期しない失敗でプロセスを中断する（シェルの内部不変条件が成功に
//! 依存する箇所で使う）。*raw* ラッパーは errno を呼び出し側へ返す
//! （呼び出し側が特定の値を明示的に扱う箇所、例えば下の fork/setpgid
//! の競合で使う）。
//!
//! ここにある関数は全て直接の `unsafe` libc 呼び出しであり、この
//! モジュールは何も確保せずジョブテーブルにも触れないので、メイン
//! スレッドと SIGCHLD ハンドラの両方から呼んでよい。

use std::ffi::CString;
use std::io;

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// エラー報告ツール風のメッセージでプロセスを中断する。予期しない
/// システムコール失敗時、以下の `checked_*` ラッパーが全てこれを使う。
fn fatal(call: &'static str) -> ! {
    let errno = last_errno();
    log::error!("{call} failed: {}", io::Error::from_raw_os_error(errno));
    eprintln!("jsh: {call}: {}", io::Error::from_raw_os_error(errno));
    std::process::exit(1);
}

pub fn checked_fork() -> libc::pid_t {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        fatal("fork");
    }
    pid
}

pub fn checked_pipe() -> (i32, i32) {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        fatal("pipe");
    }
    (fds[0], fds[1])
}

/// `path` を読み取り専用で開く。プロセス致命的: 開けないリダイレクト
/// 先は、何かにフォールバックするのではなく子プロセスを殺す。
pub fn checked_open_read(path: &str) -> i32 {
    let c_path = match CString::new(path) {
        Ok(c) => c,
        Err(_) => fatal("open"),
    };
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY) };
    if fd < 0 {
        log::error!("open {path} for reading: {}", io::Error::last_os_error());
        eprintln!("jsh: {path}: {}", io::Error::last_os_error());
        std::process::exit(1);
    }
    fd
}

/// `path` を書き込み専用・存在しなければ作成・truncate・モード 0644 で開く。
pub fn checked_open_write(path: &str) -> i32 {
    let c_path = match CString::new(path) {
        Ok(c) => c,
        Err(_) => fatal("open"),
    };
    let fd = unsafe {
        libc::open(
            c_path.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        )
    };
    if fd < 0 {
        log::error!("open {path} for writing: {}", io::Error::last_os_error());
        eprintln!("jsh: {path}: {}", io::Error::last_os_error());
        std::process::exit(1);
    }
    fd
}

pub fn close_fd(fd: i32) {
    if fd >= 0 {
        unsafe {
            libc::close(fd);
        }
    }
}

pub fn checked_dup(fd: i32) -> i32 {
    let dup = unsafe { libc::dup(fd) };
    if dup < 0 {
        fatal("dup");
    }
    dup
}

pub fn checked_dup2(oldfd: i32, newfd: i32) {
    if unsafe { libc::dup2(oldfd, newfd) } < 0 {
        fatal("dup2");
    }
}

pub fn set_cloexec(fd: i32) {
    unsafe {
        libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
    }
}

/// fork/exec の競合に寛容な `setpgid`: 親と子の両方が子プロセスを
/// そのプロセスグループへ入れようと競走し、親の呼び出しが走る頃には
/// 子がすでに exec 済みか終了済み（ゾンビ）のこともある。EACCES
/// （子がすでに exec 済み。グループがすでに正しければ無害）と ESRCH
/// （子がすでに reap 済み）は飲み込み、それ以外は予期しないものとする。
pub fn setpgid_tolerant(pid: libc::pid_t, pgid: libc::pid_t) {
    if unsafe { libc::setpgid(pid, pgid) } < 0 {
        let errno = last_errno();
        if errno != libc::EACCES && errno != libc::ESRCH {
            fatal("setpgid");
        }
    }
}

pub fn tcsetpgrp(fd: i32, pgid: libc::pid_t) {
    unsafe {
        libc::tcsetpgrp(fd, pgid);
    }
}

pub fn tcgetattr(fd: i32) -> libc::termios {
    unsafe {
        let mut modes: libc::termios = std::mem::zeroed();
        libc::tcgetattr(fd, &mut modes);
        modes
    }
}

pub fn tcsetattr_drain(fd: i32, modes: &libc::termios) {
    unsafe {
        libc::tcsetattr(fd, libc::TCSADRAIN, modes);
    }
}

pub fn checked_sigaction(sig: i32, handler: libc::sighandler_t, mask_sigint: bool, restart: bool) {
    unsafe {
        let mut act: libc::sigaction = std::mem::zeroed();
        act.sa_sigaction = handler;
        act.sa_flags = if restart { libc::SA_RESTART } else { 0 };
        libc::sigemptyset(&mut act.sa_mask);
        if mask_sigint {
            libc::sigaddset(&mut act.sa_mask, libc::SIGINT);
        }
        if libc::sigaction(sig, &act, std::ptr::null_mut()) < 0 {
            fatal("sigaction");
        }
    }
}

pub fn signal_default(sig: i32) {
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}

pub fn signal_ignore(sig: i32) {
    unsafe {
        libc::signal(sig, libc::SIG_IGN);
    }
}

pub fn sigchld_mask() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGCHLD);
        set
    }
}

/// `mask` をブロックし、以前有効だったマスクを返す。後で復元するか
/// [`sigsuspend`] に渡すことができる。
pub fn sigprocmask_block(mask: &libc::sigset_t) -> libc::sigset_t {
    unsafe {
        let mut old: libc::sigset_t = std::mem::zeroed();
        libc::sigprocmask(libc::SIG_BLOCK, mask, &mut old);
        old
    }
}

pub fn sigprocmask_setmask(mask: &libc::sigset_t) {
    unsafe {
        libc::sigprocmask(libc::SIG_SETMASK, mask, std::ptr::null_mut());
    }
}

/// `mask` をアトミックに復元し、シグナルが配送されるまでサスペンドする。
pub fn sigsuspend(mask: &libc::sigset_t) {
    unsafe {
        libc::sigsuspend(mask);
    }
}

pub fn kill(pid: libc::pid_t, sig: i32) {
    unsafe {
        libc::kill(pid, sig);
    }
}

/// プロセスグループ全体にシグナルを送る（`kill(-pgid, sig)`）。
/// POSIX の負の pid という慣習に従う。`resume_job`/`kill_job` は
/// リーダーだけでなくグループ全体を対象にしなければならない。
pub fn kill_pgrp(pgid: libc::pid_t, sig: i32) {
    unsafe {
        libc::kill(-pgid, sig);
    }
}

pub fn getpid() -> libc::pid_t {
    unsafe { libc::getpid() }
}

pub fn getpgrp() -> libc::pid_t {
    unsafe { libc::getpgrp() }
}

/// `getsid(0)` / `getpgid(0)` — 起動時に、シェルが自分自身を専用の
/// プロセスグループに入れる必要があるかどうかを判断するために使う
/// （後で端末のフォアグラウンドグループになるには、プロセスグループ
/// のリーダーでなければならない）。
pub fn getsid0() -> libc::pid_t {
    unsafe { libc::getsid(0) }
}

pub fn getpgid0() -> libc::pid_t {
    unsafe { libc::getpgid(0) }
}

pub fn checked_setpgid0(pid: libc::pid_t, pgid: libc::pid_t) {
    if unsafe { libc::setpgid(pid, pgid) } < 0 {
        fatal("setpgid");
    }
}

pub fn isatty(fd: i32) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// `waitpid` の結果を、Reaper が関心を持つ分類へデコードしたもの。
pub enum WaitOutcome {
    /// まだ状態変化なし（`WNOHANG` が 0 を返した）。
    NoChange,
    /// 待つべき子プロセスが残っていない（`ECHILD`）。
    NoChildren,
    Exited { pid: libc::pid_t, code: i32 },
    Signaled { pid: libc::pid_t, signal: i32 },
    Stopped { pid: libc::pid_t },
    Continued { pid: libc::pid_t },
}

/// 生の `waitpid(pid, flags)` ラッパー。呼び出し側が生のステータスを
/// 分類する。Reaper の非ブロッキング drain と、フォアグラウンド
/// モニタのブロッキング待機の両方が使う。
pub fn waitpid_raw(pid: libc::pid_t, options: i32) -> Result<(libc::pid_t, i32), i32> {
    let mut status: i32 = 0;
    let ret = unsafe { libc::waitpid(pid, &mut status, options) };
    if ret > 0 {
        Ok((ret, status))
    } else if ret == 0 {
        Err(0)
    } else {
        Err(last_errno())
    }
}

pub fn decode_status(pid: libc::pid_t, status: i32) -> WaitOutcome {
    if libc::WIFEXITED(status) {
        WaitOutcome::Exited {
            pid,
            code: libc::WEXITSTATUS(status),
        }
    } else if libc::WIFSIGNALED(status) {
        WaitOutcome::Signaled {
            pid,
            signal: libc::WTERMSIG(status),
        }
    } else if libc::WIFSTOPPED(status) {
        WaitOutcome::Stopped { pid }
    } else {
        WaitOutcome::Continued { pid }
    }
}
