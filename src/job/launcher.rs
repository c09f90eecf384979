//! Pipeline Launcher — トークナイズ済みのステージ列を、配線された
//! パイプ/リダイレクトへと解決し、ステージごとに子プロセスを fork して
//! 全てを共有プロセスグループに収め、その結果をジョブとして登録する。
//!
//! 単一コマンドと N ステージのパイプラインは1つの関数として実装されて
//! いる: 1ステージのパイプラインは単一コマンドパスそのものであり
//! （fork/setpgid の競合も端末の受け渡しも同じ）、違いはインプロセスの
//! ビルトイン即応パスがないことだけで、それはこれが走る前にチェック
//! 済みである。

use std::ffi::CString;

use super::reaper::BlockSigchld;
use super::syscall;
use super::table;
use super::terminal::TerminalArbiter;
use crate::error::{Result, ShellError};
use crate::tokenizer::Token;

/// リダイレクトトークンを左から右へ消費し、ファイルを開いて、その
/// 向きにデフォルトで割り当てられていた記述子（パイプ端または以前の
/// リダイレクト）を置き換える — リダイレクトは常にパイプ記述子より
/// 優先され、同じ向きのリダイレクトが繰り返されれば後のものが前のもの
/// に勝ち、取って代わられた fd は閉じる。
fn resolve_stage(
    tokens: Vec<Token>,
    mut input: Option<i32>,
    mut output: Option<i32>,
) -> Result<(Vec<String>, Option<i32>, Option<i32>)> {
    let mut argv = Vec::new();
    let mut iter = tokens.into_iter().peekable();

    while let Some(tok) = iter.next() {
        match tok {
            Token::Lt => {
                let path = match iter.next() {
                    Some(Token::Word(w)) => w,
                    _ => return Err(ShellError::EmptyStage),
                };
                if let Some(fd) = input.take() {
                    syscall::close_fd(fd);
                }
                input = Some(syscall::checked_open_read(&path));
            }
            Token::Gt => {
                let path = match iter.next() {
                    Some(Token::Word(w)) => w,
                    _ => return Err(ShellError::EmptyStage),
                };
                if let Some(fd) = output.take() {
                    syscall::close_fd(fd);
                }
                output = Some(syscall::checked_open_write(&path));
            }
            Token::Word(w) => argv.push(w),
            Token::Pipe | Token::Amp => {
                // Launcher がステージのトークンを見る前に取り除かれている。
                unreachable!("pipe/background tokens must not reach resolve_stage")
            }
        }
    }

    if argv.is_empty() {
        if let Some(fd) = input {
            syscall::close_fd(fd);
        }
        if let Some(fd) = output {
            syscall::close_fd(fd);
        }
        return Err(ShellError::EmptyStage);
    }

    Ok((argv, input, output))
}

fn reset_child_signals() {
    syscall::signal_default(libc::SIGINT);
    syscall::signal_default(libc::SIGCHLD);
    syscall::signal_default(libc::SIGTSTP);
    syscall::signal_default(libc::SIGTTIN);
    syscall::signal_default(libc::SIGTTOU);
}

/// 戻らない: `argv[0]` を exec するか、失敗を報告して慣習的なステータス
/// で終了する（not-found は127、not-executable は126）。
fn exec_argv(argv: &[String]) -> ! {
    let cargs: Vec<CString> = argv
        .iter()
        .map(|a| CString::new(a.as_str()).unwrap_or_else(|_| CString::new("").unwrap()))
        .collect();
    let mut ptrs: Vec<*const libc::c_char> = cargs.iter().map(|c| c.as_ptr()).collect();
    ptrs.push(std::ptr::null());

    unsafe {
        libc::execvp(ptrs[0], ptrs.as_ptr());
    }

    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(1);
    let msg = match errno {
        libc::ENOENT => "command not found",
        libc::EACCES => "permission denied",
        _ => "exec failed",
    };
    eprintln!("jsh: {}: {msg}", argv[0]);
    std::process::exit(ShellError::exec_exit_status(errno));
}

/// ジョブ起動の結末: 完了まで走って Monitor に委ねられた
/// （フォアグラウンド）か、バックグラウンドで走り続けたまま登録
/// された、のどちらか。
pub enum Launched {
    Foreground(i32),
    Background(usize),
}

/// （単一ステージかもしれない）パイプラインを起動する。`stages` は
/// 呼び出し側がすでに末尾の `&` を取り除いたものでなければならない。
///
/// 保持するマスクの規律: SIGCHLD は最初の fork の直前からジョブ登録
/// まで、さらにこれがフォアグラウンドで走るなら `monitor_fg` の間も
/// 通してブロックされる。
pub fn run(
    stages: Vec<Vec<Token>>,
    background: bool,
    terminal: &TerminalArbiter,
) -> Result<Launched> {
    let n = stages.len();
    if n == 0 {
        return Err(ShellError::EmptyStage);
    }

    let pipes: Vec<(i32, i32)> = (0..n.saturating_sub(1))
        .map(|_| syscall::checked_pipe())
        .collect();

    let guard = BlockSigchld::new();

    let mut pgid: libc::pid_t = 0;
    let mut job_idx: Option<usize> = None;

    for (i, tokens) in stages.into_iter().enumerate() {
        let default_in = if i == 0 { None } else { Some(pipes[i - 1].0) };
        let default_out = if i == n - 1 { None } else { Some(pipes[i].1) };

        let (argv, in_fd, out_fd) = match resolve_stage(tokens, default_in, default_out) {
            Ok(v) => v,
            Err(e) => {
                // まだ起動していないステージ用の未使用パイプ端も
                // 必ず閉じる — 記述子を漏らさない。
                for &(r, w) in &pipes {
                    syscall::close_fd(r);
                    syscall::close_fd(w);
                }
                return Err(e);
            }
        };

        let pid = syscall::checked_fork();

        if pid == 0 {
            let child_pgid = pgid; // 0 は「自分がリーダーである」ことを意味する
            syscall::setpgid_tolerant(0, child_pgid);
            if !background && child_pgid == 0 {
                terminal.set_fg_pgrp(syscall::getpid());
            }

            reset_child_signals();

            if let Some(fd) = in_fd {
                syscall::checked_dup2(fd, libc::STDIN_FILENO);
                if fd != libc::STDIN_FILENO {
                    syscall::close_fd(fd);
                }
            }
            if let Some(fd) = out_fd {
                syscall::checked_dup2(fd, libc::STDOUT_FILENO);
                if fd != libc::STDOUT_FILENO {
                    syscall::close_fd(fd);
                }
            }
            // 親から継承した、このステージ自身の stdin/stdout ではない
            // パイプ fd は全て閉じなければならない。さもないと後続
            // ステージの読み手が EOF を見られなくなる。
            for &(r, w) in &pipes {
                if Some(r) != in_fd {
                    syscall::close_fd(r);
                }
                if Some(w) != out_fd {
                    syscall::close_fd(w);
                }
            }

            exec_argv(&argv);
        }

        // 親プロセス側。
        if pgid == 0 {
            pgid = pid;
            job_idx = Some(table::with_jobs(|jobs| {
                jobs.add_job(pgid, background, terminal.shell_tmodes())
            }));
            if !background {
                terminal.set_fg_pgrp(pgid);
            }
        }
        syscall::setpgid_tolerant(pid, pgid);

        table::with_jobs(|jobs| jobs.add_proc(job_idx.expect("job registered above"), pid, &argv));

        if let Some(fd) = in_fd {
            syscall::close_fd(fd);
        }
        if let Some(fd) = out_fd {
            syscall::close_fd(fd);
        }
    }

    let job_idx = job_idx.expect("at least one stage always runs");

    if background {
        drop(guard);
        Ok(Launched::Background(job_idx))
    } else {
        let code = super::monitor::monitor_fg(terminal, guard.saved_mask());
        drop(guard);
        Ok(Launched::Foreground(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::monitor;
    use crate::job::reaper;
    use crate::job::table::{self as jtable, JobState};
    use crate::tokenizer::Token;
    use crate::job::test_lock;
    use std::io::Read;
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// `job::init()` はヘッドレスには走れない（`isatty` をアサートする
    /// ため）。これは Launcher/Monitor が必要とする2つの部分だけを
    /// 立ち上げる。
    fn setup() -> TerminalArbiter {
        INIT.call_once(|| {
            jtable::init();
            reaper::install();
        });
        TerminalArbiter::for_test()
    }

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    fn read_file(path: &std::path::Path) -> String {
        let mut s = String::new();
        std::fs::File::open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn echo_hello_redirected_to_file() {
        let _guard = test_lock::acquire();
        let terminal = setup();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let stages = vec![vec![
            word("echo"),
            word("hello"),
            Token::Gt,
            word(&path),
        ]];

        match run(stages, false, &terminal).unwrap() {
            Launched::Foreground(code) => assert_eq!(code, 0),
            _ => panic!("expected foreground"),
        }

        assert_eq!(read_file(tmp.path()), "hello\n");
    }

    #[test]
    fn yes_piped_into_head_n3() {
        let _guard = test_lock::acquire();
        let terminal = setup();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let stages = vec![
            vec![word("yes")],
            vec![word("head"), word("-n"), word("3"), Token::Gt, word(&path)],
        ];

        match run(stages, false, &terminal).unwrap() {
            Launched::Foreground(code) => assert_eq!(code, 0),
            _ => panic!("expected foreground"),
        }

        assert_eq!(read_file(tmp.path()), "y\ny\ny\n");
    }

    #[test]
    fn cat_redirected_input_and_output_roundtrip() {
        let _guard = test_lock::acquire();
        let terminal = setup();
        let input = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(input.path(), b"roundtrip bytes\n").unwrap();
        let output = tempfile::NamedTempFile::new().unwrap();

        let stages = vec![vec![
            word("cat"),
            Token::Lt,
            word(input.path().to_str().unwrap()),
            Token::Gt,
            word(output.path().to_str().unwrap()),
        ]];

        match run(stages, false, &terminal).unwrap() {
            Launched::Foreground(code) => assert_eq!(code, 0),
            _ => panic!("expected foreground"),
        }

        assert_eq!(read_file(output.path()), "roundtrip bytes\n");
    }

    #[test]
    fn background_job_can_be_killed_by_signal() {
        let _guard = test_lock::acquire();
        let terminal = setup();
        let stages = vec![vec![word("sleep"), word("10")]];

        let idx = match run(stages, true, &terminal).unwrap() {
            Launched::Background(idx) => idx,
            _ => panic!("expected background"),
        };

        assert!(monitor::kill_job(idx));

        let mut observed = None;
        for _ in 0..200 {
            reaper::drain();
            if let Some(state) = jtable::with_jobs(|jobs| jobs.peek_state(idx)) {
                if state == JobState::Finished {
                    observed = jtable::with_jobs(|jobs| jobs.job_state(idx));
                    break;
                }
            } else {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }

        let (state, code) = observed.expect("job should finish after SIGTERM");
        assert_eq!(state, JobState::Finished);
        let code = code.unwrap();
        assert!(code > 128, "expected killed-by-signal encoding, got {code}");
        assert_eq!(code - 128, libc::SIGTERM);
    }

    #[test]
    fn empty_stage_is_a_syntax_error() {
        let _guard = test_lock::acquire();
        let terminal = setup();
        let stages = vec![vec![Token::Gt, word("/tmp/does-not-matter")]];
        assert!(matches!(run(stages, false, &terminal), Err(ShellError::EmptyStage)));
    }
}
