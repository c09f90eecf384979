//! jsh ベンチマークスイート: トークナイザ、ジョブテーブルの記帳、
//! ビルトインディスパッチ。`std::time::Instant` による手動計測のみで、
//! 外部ハーネスは使わない。
//!
//! 実行: `cargo bench`

use std::time::{Duration, Instant};

use jsh::job::table::{JobTable, ProcState};
use jsh::tokenizer;

struct BenchResult {
    category: &'static str,
    name: &'static str,
    avg: Duration,
    iters: u64,
}

impl BenchResult {
    fn print(&self) {
        let avg_us = self.avg.as_nanos() as f64 / 1000.0;
        println!(
            "[{:<8}] {:<40}: avg {:>10.2}µs  ({} iters)",
            self.category, self.name, avg_us, self.iters,
        );
    }
}

fn bench<F: FnMut()>(category: &'static str, name: &'static str, iters: u64, mut f: F) -> BenchResult {
    for _ in 0..iters.min(100) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    BenchResult {
        category,
        name,
        avg: elapsed / iters as u32,
        iters,
    }
}

fn tmodes() -> libc::termios {
    unsafe { std::mem::zeroed() }
}

fn main() {
    println!("jsh benchmark suite");
    println!("{}", "=".repeat(80));

    let mut results = Vec::new();

    // ── トークナイザ ──
    println!("\n--- Tokenizer ---");

    results.push(bench("tokenizer", "echo hello", 10_000, || {
        let _ = tokenizer::tokenize("echo hello");
    }));

    results.push(bench("tokenizer", "ls | grep Cargo | head -n 1", 10_000, || {
        let _ = tokenizer::tokenize("ls | grep Cargo | head -n 1");
    }));

    results.push(bench(
        "tokenizer",
        "cat < in.txt > out.txt &",
        10_000,
        || {
            let mut toks = tokenizer::tokenize("cat < in.txt > out.txt &");
            tokenizer::strip_background(&mut toks);
            let _ = tokenizer::split_stages(toks);
        },
    ));

    for r in &results {
        r.print();
    }
    results.clear();

    // ── ジョブテーブル ──
    println!("\n--- Job Table ---");

    results.push(bench("jobtable", "add_job + add_proc (background)", 10_000, || {
        let mut t = JobTable::new();
        let idx = t.add_job(1234, true, tmodes());
        t.add_proc(idx, 1234, &["sleep".to_string(), "10".to_string()]);
    }));

    results.push(bench("jobtable", "add_job + job_state (finished)", 10_000, || {
        let mut t = JobTable::new();
        let idx = t.add_job(1, true, tmodes());
        t.add_proc(idx, 1, &["true".to_string()]);
        t.mark_pid(1, ProcState::Finished, Some(0));
        let _ = t.job_state(idx);
    }));

    results.push(bench("jobtable", "move_job FG -> background slot", 10_000, || {
        let mut t = JobTable::new();
        let idx = t.add_job(1, false, tmodes());
        t.add_proc(idx, 1, &["x".to_string()]);
        let to = t.alloc_bg_slot();
        t.move_job(idx, to);
    }));

    for r in &results {
        r.print();
    }
    results.clear();

    // ── ビルトイン ──
    println!("\n--- Builtins ---");

    results.push(bench("builtin", "is_builtin(\"exit\")", 100_000, || {
        let _ = jsh::builtins::is_builtin("exit");
    }));

    results.push(bench("builtin", "is_builtin(\"ls\") (miss)", 100_000, || {
        let _ = jsh::builtins::is_builtin("ls");
    }));

    for r in &results {
        r.print();
    }

    println!("\n{}", "=".repeat(80));
    println!("done.");
}
