//! Job Monitor / Controller — フォアグラウンド待機のプリミティブと、
//! バックグラウンド再開・kill・状態報告の各操作。

use super::reaper::BlockSigchld;
use super::syscall;
use super::table::{self, JobState, FG};
use super::terminal::TerminalArbiter;

/// [`watch_jobs`] 用のフィルタ。`Finished` は、終了コードがシグナルを
/// 表しているジョブについては「killed」もあわせて報告する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Running,
    Stopped,
    Finished,
    All,
}

fn filter_matches(filter: Filter, state: JobState) -> bool {
    match filter {
        Filter::All => true,
        Filter::Running => state == JobState::Running,
        Filter::Stopped => state == JobState::Stopped,
        Filter::Finished => state == JobState::Finished,
    }
}

fn print_report_line(idx: usize, state: JobState, code: Option<i32>, command: &str) {
    match state {
        JobState::Running => println!("[{idx}] running '{command}'"),
        JobState::Stopped => println!("[{idx}] suspended '{command}'"),
        JobState::Finished => {
            let code = code.unwrap_or(0);
            if code > 128 {
                println!("[{idx}] killed '{command}' by signal {}", code - 128);
            } else {
                println!("[{idx}] exited '{command}', status={code}");
            }
        }
    }
}

/// サスペンド中のみ SIGCHLD をアンブロックして、フォアグラウンド
/// ジョブの合成状態が Running から外れるまで待つ。起床時: Finished
/// なら終了コードを回収し、Stopped ならジョブをバックグラウンドの
/// スロットへ降格して端末モードをスナップショットする。戻る前に
/// 常にシェルの端末モードと所有権を復元する。
pub fn monitor_fg(terminal: &TerminalArbiter, mask: libc::sigset_t) -> i32 {
    let exit_code;
    let mut stopped = false;

    loop {
        syscall::sigsuspend(&mask);
        match table::with_jobs(|jobs| jobs.job_state(FG)) {
            Some((JobState::Running, _)) => continue,
            Some((JobState::Finished, code)) => {
                exit_code = code.unwrap_or(0);
                break;
            }
            Some((JobState::Stopped, _)) => {
                exit_code = 0;
                stopped = true;
                break;
            }
            None => {
                // FG に何も登録されていない（今起動したジョブなら
                // 起こらないはず）。回収するものはない。
                exit_code = 0;
                break;
            }
        }
    }

    if stopped {
        table::with_jobs(|jobs| {
            let new_idx = jobs.alloc_bg_slot();
            jobs.move_job(FG, new_idx);
            jobs.set_tmodes(new_idx, terminal.current_tmodes());
        });
    }

    terminal.reclaim();
    exit_code
}

/// 停止中または実行中のジョブを再開する。`index = None` は未終了の
/// スロットのうち最大のインデックスのものを選ぶ。インデックスが
/// 範囲外、スロットが空き、またはジョブがすでに Finished の場合は
/// `false` を返す。
pub fn resume_job(index: Option<usize>, background: bool, terminal: &TerminalArbiter) -> bool {
    let guard = BlockSigchld::new();

    let idx = match index.or_else(|| table::with_jobs(|jobs| jobs.most_recent_live())) {
        Some(i) => i,
        None => return false,
    };

    let found = table::with_jobs(|jobs| {
        if !jobs.is_valid_index(idx) {
            return None;
        }
        match jobs.peek_state(idx) {
            None | Some(JobState::Finished) => None,
            Some(_) => Some((jobs.job_pgid(idx).unwrap(), jobs.job_command(idx).unwrap().to_string())),
        }
    });

    let (pgid, command) = match found {
        Some(v) => v,
        None => return false,
    };

    println!("[{idx}] continue '{command}'");

    // 端末の受け渡しと SIGCONT は1つの分岐にまとめられない:
    // continue シグナルは、フォアグラウンド再開のために端末の所有権を
    // すでに取得した後でなければならない。
    if !background {
        terminal.set_fg_pgrp(pgid);
    }
    syscall::kill_pgrp(pgid, libc::SIGCONT);

    if !background {
        table::with_jobs(|jobs| jobs.move_job(idx, FG));
        monitor_fg(terminal, guard.saved_mask());
    }

    true
}

/// ジョブのグループへ terminate してから continue を送る:
/// terminate は停止中のジョブが受け取れるように、continue は
/// カーネルが保留中の terminate を配送できるように。スロットが
/// 無効、空き、またはすでに Finished の場合は `false` を返す。
pub fn kill_job(index: usize) -> bool {
    let _guard = BlockSigchld::new();

    let pgid = table::with_jobs(|jobs| {
        if !jobs.is_valid_index(index) {
            return None;
        }
        match jobs.peek_state(index) {
            None | Some(JobState::Finished) => None,
            Some(_) => jobs.job_pgid(index),
        }
    });

    match pgid {
        Some(pgid) => {
            syscall::kill_pgrp(pgid, libc::SIGTERM);
            syscall::kill_pgrp(pgid, libc::SIGCONT);
            true
        }
        None => false,
    }
}

/// `filter` に一致する全てのバックグラウンドスロットを報告し、
/// 観測した端から Finished のスロットを破棄する。
pub fn watch_jobs(filter: Filter) {
    let slots = table::with_jobs(|jobs| jobs.background_slots());
    for idx in slots {
        let _guard = BlockSigchld::new();
        let report = table::with_jobs(|jobs| {
            let command = jobs.job_command(idx)?.to_string();
            let (state, code) = jobs.job_state(idx)?;
            Some((command, state, code))
        });

        if let Some((command, state, code)) = report {
            if filter_matches(filter, state) {
                print_report_line(idx, state, code, &command);
            }
        }
    }
}

/// 生きている全てのジョブを kill し、それぞれがシグナルを受けるのを
/// 待ってから、Finished の報告を汲み取って端末を解放する。シェル終了時
/// に一度だけ呼ばれる。
pub fn shutdown(terminal: TerminalArbiter) {
    let guard = BlockSigchld::new();

    let slots = table::with_jobs(|jobs| jobs.background_slots());
    for idx in slots {
        kill_job(idx);
        syscall::sigsuspend(&guard.saved_mask());
    }

    watch_jobs(Filter::Finished);
    drop(guard);
    terminal.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::table::{self as jtable, ProcState};
    use crate::job::test_lock;

    #[test]
    fn filter_matches_all_states_regardless_of_state() {
        for state in [JobState::Running, JobState::Stopped, JobState::Finished] {
            assert!(filter_matches(Filter::All, state));
        }
        assert!(filter_matches(Filter::Running, JobState::Running));
        assert!(!filter_matches(Filter::Running, JobState::Stopped));
        assert!(filter_matches(Filter::Stopped, JobState::Stopped));
        assert!(!filter_matches(Filter::Stopped, JobState::Finished));
        assert!(filter_matches(Filter::Finished, JobState::Finished));
        assert!(!filter_matches(Filter::Finished, JobState::Running));
    }

    fn tmodes() -> libc::termios {
        unsafe { std::mem::zeroed() }
    }

    #[test]
    fn resume_job_rejects_out_of_range_and_free_and_finished() {
        let _guard = test_lock::acquire();
        jtable::init();
        let terminal = TerminalArbiter::for_test();

        // 範囲外。
        assert!(!resume_job(Some(999), true, &terminal));

        // 空きスロット（一度も追加されていない）。
        let free_idx = jtable::with_jobs(|jobs| jobs.alloc_bg_slot());
        assert!(!resume_job(Some(free_idx), true, &terminal));

        // スロットはあるが全プロセスがすでに Finished。
        let idx = jtable::with_jobs(|jobs| {
            let idx = jobs.add_job(1, true, tmodes());
            jobs.add_proc(idx, 1, &["true".to_string()]);
            jobs.mark_pid(1, ProcState::Finished, Some(0));
            idx
        });
        assert!(!resume_job(Some(idx), true, &terminal));
    }

    #[test]
    fn kill_job_rejects_out_of_range_and_free_and_finished() {
        let _guard = test_lock::acquire();
        jtable::init();

        assert!(!kill_job(999));

        let free_idx = jtable::with_jobs(|jobs| jobs.alloc_bg_slot());
        assert!(!kill_job(free_idx));

        let idx = jtable::with_jobs(|jobs| {
            let idx = jobs.add_job(1, true, tmodes());
            jobs.add_proc(idx, 1, &["true".to_string()]);
            jobs.mark_pid(1, ProcState::Finished, Some(0));
            idx
        });
        assert!(!kill_job(idx));
    }
}
