//! ジョブテーブル — プロセス全体にわたるジョブとその構成プロセスの台帳。
//!
//! テーブルを裸の `static mut` ではなくプロセス全体の [`Mutex`] の裏に
//! 置いているのは、SIGCHLD ハンドラ（[`crate::job::reaper`]）が文脈を
//! 一切キャプチャせずにこれへ到達する必要があるため（シグナルハンドラは
//! 素の `extern "C" fn`）。ここの公開メソッドはそれぞれ、呼び出し側が
//! あらかじめ SIGCHLD をマスクしておくべきかどうかをドキュメントに
//! 書いている。mutex は安全な共有可変化のための実装の詳細であって、
//! そのマスク規律の代わりではない — ハンドラはメインスレッドの
//! クリティカルセクションで SIGCHLD がブロックされている間にしか
//! 走らないので、このロックは実際には競合しない。

use std::sync::{Mutex, OnceLock};

use libc::pid_t;

/// フォアグラウンドジョブ用に予約されたスロット。
pub const FG: usize = 0;

/// ジョブ内の個々のプロセスの状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Running,
    Stopped,
    Finished,
}

/// 1つのパイプラインステージに対応して起動された単一のプロセス。
pub struct Process {
    pub pid: pid_t,
    pub state: ProcState,
    /// [`ProcState::Finished`] に達するまでは `None`。
    pub exit_code: Option<i32>,
}

/// 構成プロセスから導出されるジョブの複合状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Finished,
}

/// ジョブテーブルの1スロット: あるパイプラインのプロセスグループと
/// その構成プロセス。
pub struct Job {
    /// 0 ならスロットは空き。
    pub pgid: pid_t,
    pub processes: Vec<Process>,
    pub tmodes: libc::termios,
    pub state: JobState,
    pub command: String,
}

impl Job {
    fn free() -> Self {
        Self {
            pgid: 0,
            processes: Vec::new(),
            tmodes: unsafe { std::mem::zeroed() },
            state: JobState::Running,
            command: String::new(),
        }
    }

    fn is_free(&self) -> bool {
        self.pgid == 0
    }

    /// プロセス群から `state` を再計算する: 全プロセスが Finished なら
    /// Finished。全プロセスが Stopped-or-Finished かつ1つ以上 Stopped
    /// なら Stopped。それ以外は Running。
    fn recompute_state(&mut self) {
        let all_finished = self.processes.iter().all(|p| p.state == ProcState::Finished);
        let any_stopped = self.processes.iter().any(|p| p.state == ProcState::Stopped);
        let none_running = self
            .processes
            .iter()
            .all(|p| p.state != ProcState::Running);

        self.state = if all_finished {
            JobState::Finished
        } else if any_stopped && none_running {
            JobState::Stopped
        } else {
            JobState::Running
        };
    }

    /// 最後のステージの終了コード。`state == Finished` になって初めて有効。
    fn exit_code(&self) -> i32 {
        self.processes
            .last()
            .and_then(|p| p.exit_code)
            .unwrap_or(0)
    }
}

pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        // スロット0（FG）は常に存在し、空きから始まる。
        Self {
            jobs: vec![Job::free()],
        }
    }

    /// `add_job(pgid, background) -> index`。呼び出し側は add_job から
    /// add_proc* までの全区間で SIGCHLD をマスクしておくこと。
    pub fn add_job(&mut self, pgid: pid_t, background: bool, shell_tmodes: libc::termios) -> usize {
        let idx = if !background { FG } else { self.alloc_bg_slot() };

        self.jobs[idx] = Job {
            pgid,
            processes: Vec::new(),
            tmodes: shell_tmodes,
            state: JobState::Running,
            command: String::new(),
        };
        idx
    }

    /// `add_proc(index, pid, argv)`。ジョブは（同じマスク下の
    /// クリティカルセクションで）`add_job` によってすでに存在している
    /// こと。
    pub fn add_proc(&mut self, index: usize, pid: pid_t, argv: &[String]) {
        let job = &mut self.jobs[index];
        assert!(job.pgid != 0, "add_proc on a free slot");

        if job.command.is_empty() {
            job.command.push_str(&argv.join(" "));
        } else {
            job.command.push_str(" | ");
            job.command.push_str(&argv.join(" "));
        }

        job.processes.push(Process {
            pid,
            state: ProcState::Running,
            exit_code: None,
        });
    }

    /// `job_state(index) -> (state, exit_code?)`。Finished の場合は
    /// 読み取った後そのスロットを破棄する。呼び出し側は SIGCHLD を
    /// マスクしておくこと。
    pub fn job_state(&mut self, index: usize) -> Option<(JobState, Option<i32>)> {
        let job = self.jobs.get_mut(index)?;
        if job.is_free() {
            return None;
        }

        let state = job.state;
        if state == JobState::Finished {
            let code = job.exit_code();
            self.jobs[index] = Job::free();
            Some((state, Some(code)))
        } else {
            Some((state, None))
        }
    }

    /// Finished なスロットを破棄せずに状態だけ覗き見る。`resume_job` の
    /// 「直近の未完了ジョブ」のような、見ただけでスロットを消費しては
    /// ならない選択ロジックが使う。
    pub fn peek_state(&self, index: usize) -> Option<JobState> {
        let job = self.jobs.get(index)?;
        if job.is_free() {
            None
        } else {
            Some(job.state)
        }
    }

    pub fn job_command(&self, index: usize) -> Option<&str> {
        let job = self.jobs.get(index)?;
        if job.is_free() {
            None
        } else {
            Some(&job.command)
        }
    }

    pub fn job_pgid(&self, index: usize) -> Option<pid_t> {
        let job = self.jobs.get(index)?;
        if job.is_free() {
            None
        } else {
            Some(job.pgid)
        }
    }

    pub fn job_tmodes(&self, index: usize) -> Option<libc::termios> {
        let job = self.jobs.get(index)?;
        if job.is_free() {
            None
        } else {
            Some(job.tmodes)
        }
    }

    pub fn set_tmodes(&mut self, index: usize, tmodes: libc::termios) {
        if let Some(job) = self.jobs.get_mut(index) {
            job.tmodes = tmodes;
        }
    }

    /// 空きのバックグラウンドスロットを探す（なければ成長させる）。
    /// 中身には触れない。`add_job` のバックグラウンド分岐と、
    /// `monitor_fg` が停止したフォアグラウンドジョブを降格する際に
    /// 共有される。
    pub fn alloc_bg_slot(&mut self) -> usize {
        match self.jobs.iter().skip(1).position(|j| j.is_free()) {
            Some(rel) => rel + 1,
            None => {
                self.jobs.push(Job::free());
                self.jobs.len() - 1
            }
        }
    }

    /// `move_job(from, to)`。前提条件: `to` が空いていること。
    pub fn move_job(&mut self, from: usize, to: usize) {
        assert!(self.jobs[to].is_free(), "move_job destination not free");
        while self.jobs.len() <= to {
            self.jobs.push(Job::free());
        }
        self.jobs[to] = std::mem::replace(&mut self.jobs[from], Job::free());
    }

    /// 最も大きい番号を持つ、未完了かつ空きでないスロット。なければ
    /// `None`。`resume_job(-1, ...)` が番号指定なしの「その」ジョブを
    /// 見つけるのに使う。
    pub fn most_recent_live(&self) -> Option<usize> {
        self.jobs
            .iter()
            .enumerate()
            .rev()
            .find(|(_, j)| !j.is_free() && j.state != JobState::Finished)
            .map(|(i, _)| i)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.jobs.len()
    }

    /// 現在占有されているバックグラウンドスロット（1..）の番号。
    pub fn background_slots(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, j)| !j.is_free())
            .map(|(i, _)| i)
            .collect()
    }

    /// Reaper が呼ぶ: `pid` に一致するプロセスを更新し、そのジョブの
    /// 複合状態を再計算する。`pid` が未知なら何もしない（この設計では
    /// 全ての子プロセスが追跡対象のジョブに属するとは限らないので、
    /// 見覚えのない pid を reap した場合はただ無視すればよい）。
    pub fn mark_pid(&mut self, pid: pid_t, state: ProcState, exit_code: Option<i32>) {
        for job in &mut self.jobs {
            if job.is_free() {
                continue;
            }
            if let Some(proc) = job.processes.iter_mut().find(|p| p.pid == pid) {
                proc.state = state;
                if state == ProcState::Finished {
                    proc.exit_code = exit_code;
                }
                job.recompute_state();
                return;
            }
        }
    }
}

static JOB_TABLE: OnceLock<Mutex<JobTable>> = OnceLock::new();

/// グローバルなジョブテーブルを初期化する。`job::init` から一度だけ
/// 呼ばれる。
pub fn init() {
    JOB_TABLE.get_or_init(|| Mutex::new(JobTable::new()));
}

/// `f` をグローバルなジョブテーブルへの排他アクセス付きで実行する。
/// メインスレッドは SIGCHLD がアンブロックされている区間をまたいで
/// ロックを保持しないので（モジュール冒頭の説明を参照）、SIGCHLD
/// ハンドラから呼んでも安全。
pub fn with_jobs<R>(f: impl FnOnce(&mut JobTable) -> R) -> R {
    let table = JOB_TABLE.get().expect("job table not initialized");
    let mut guard = match table.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(&mut guard)
}
