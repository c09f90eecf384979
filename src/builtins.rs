//! ビルトインコマンド — fork した子プロセスではなくシェル自身のプロセス
//! 内で実行しなければならない一握りのコマンド。シェルローカルな状態
//! （カレントディレクトリ、ジョブテーブル、「REPLを終了すべきか」）を
//! 変更するため。
//!
//! `try_exec` が `Some(status)` を返せばこの行はここで処理済みで
//! Launcher は呼ばれない。`None` は外部コマンドであることを意味する。

use std::env;
use std::path::Path;

use crate::job::monitor::{self, Filter};
use crate::shell::Shell;

pub fn is_builtin(name: &str) -> bool {
    matches!(name, "exit" | "cd" | "pwd" | "jobs" | "fg" | "bg" | "kill")
}

pub fn try_exec(shell: &mut Shell, args: &[&str]) -> Option<i32> {
    match args[0] {
        "exit" => Some(builtin_exit(shell, args)),
        "cd" => Some(builtin_cd(args)),
        "pwd" => Some(builtin_pwd()),
        "jobs" => Some(builtin_jobs()),
        "fg" => Some(builtin_fg(shell, args)),
        "bg" => Some(builtin_bg(shell, args)),
        "kill" => Some(builtin_kill(args)),
        _ => None,
    }
}

fn builtin_exit(shell: &mut Shell, args: &[&str]) -> i32 {
    shell.should_exit = true;
    if args.len() > 1 {
        args[1].parse::<i32>().unwrap_or_else(|_| {
            eprintln!("jsh: exit: {}: numeric argument required", args[1]);
            2
        })
    } else {
        shell.last_status
    }
}

fn builtin_cd(args: &[&str]) -> i32 {
    let target = if args.len() > 1 {
        args[1].to_string()
    } else {
        match env::var("HOME") {
            Ok(home) => home,
            Err(_) => {
                eprintln!("jsh: cd: HOME not set");
                return 1;
            }
        }
    };

    if let Err(e) = env::set_current_dir(Path::new(&target)) {
        eprintln!("jsh: cd: {target}: {e}");
        1
    } else {
        0
    }
}

fn builtin_pwd() -> i32 {
    match env::current_dir() {
        Ok(path) => {
            println!("{}", path.display());
            0
        }
        Err(e) => {
            eprintln!("jsh: pwd: {e}");
            1
        }
    }
}

/// `jobs` — 状態を問わず全てのバックグラウンドジョブを列挙する。
fn builtin_jobs() -> i32 {
    monitor::watch_jobs(Filter::All);
    0
}

/// 先頭の `%` 付きジョブ番号引数（例: `fg %2`）をパースする。`None` は
/// 「直近に触れたジョブを使う」ことを意味する。
fn parse_job_index(arg: Option<&&str>) -> Result<Option<usize>, i32> {
    match arg {
        None => Ok(None),
        Some(s) => {
            let digits = s.strip_prefix('%').unwrap_or(s);
            digits.parse::<usize>().map(Some).map_err(|_| {
                eprintln!("jsh: {s}: no such job");
                1
            })
        }
    }
}

fn builtin_fg(shell: &mut Shell, args: &[&str]) -> i32 {
    let idx = match parse_job_index(args.get(1)) {
        Ok(idx) => idx,
        Err(code) => return code,
    };
    if !monitor::resume_job(idx, false, &shell.terminal) {
        eprintln!("jsh: fg: no such job");
        return 1;
    }
    0
}

fn builtin_bg(shell: &mut Shell, args: &[&str]) -> i32 {
    let idx = match parse_job_index(args.get(1)) {
        Ok(idx) => idx,
        Err(code) => return code,
    };
    if !monitor::resume_job(idx, true, &shell.terminal) {
        eprintln!("jsh: bg: no such job");
        return 1;
    }
    0
}

/// `kill %N` — ジョブのグループに terminate してから continue を送る。
/// `%N` のジョブ番号形式のみをサポートする。生の pid による kill は
/// このコアのスコープ外。
fn builtin_kill(args: &[&str]) -> i32 {
    let Some(arg) = args.get(1) else {
        eprintln!("jsh: kill: usage: kill %job");
        return 1;
    };
    let digits = arg.strip_prefix('%').unwrap_or(arg);
    let idx = match digits.parse::<usize>() {
        Ok(i) => i,
        Err(_) => {
            eprintln!("jsh: kill: {arg}: no such job");
            return 1;
        }
    };
    if !monitor::kill_job(idx) {
        eprintln!("jsh: kill: {arg}: no such job");
        return 1;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_builtin_check() {
        assert!(is_builtin("exit"));
        assert!(is_builtin("cd"));
        assert!(is_builtin("pwd"));
        assert!(is_builtin("jobs"));
        assert!(is_builtin("fg"));
        assert!(is_builtin("bg"));
        assert!(is_builtin("kill"));
        assert!(!is_builtin("ls"));
        assert!(!is_builtin("grep"));
    }

    #[test]
    fn parse_job_index_accepts_percent_prefix() {
        assert_eq!(parse_job_index(Some(&"%2")), Ok(Some(2)));
        assert_eq!(parse_job_index(Some(&"3")), Ok(Some(3)));
        assert_eq!(parse_job_index(None), Ok(None));
    }

    #[test]
    fn parse_job_index_rejects_garbage() {
        assert!(parse_job_index(Some(&"abc")).is_err());
    }
}
