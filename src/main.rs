//! jsh — 対話的にジョブ制御を行うコマンドシェルのコア。
//!
//! REPL ループ: 固定の `"# "` プロンプトを出し、1行読めるまでブロック
//! し、トークナイズして、ビルトインテーブルかパイプラインランチャに
//! 渡し、次のプロンプトの前にジョブテーブルへ終了したバックグラウンド
//! ジョブの報告と reap を依頼する。

use jsh::job::{self, launcher, monitor, syscall};
use jsh::lineread::{BlockingReader, EditorHook, PROMPT};
use jsh::shell::Shell;
use jsh::tokenizer::{self, Token};
use jsh::{builtins, error};

fn main() {
    env_logger::init();

    // 後で制御端末の所有権を取得できるよう、シェルは自身のプロセス
    // グループリーダーでなければならない。すでにそうであれば
    // スキップする（例: セッションリーダーとして起動された場合）。
    if syscall::getsid0() != syscall::getpgid0() {
        syscall::checked_setpgid0(0, 0);
    }

    let terminal = match job::init() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("jsh: {e}");
            std::process::exit(1);
        }
    };

    install_shell_signals();

    let mut shell = Shell::new(terminal);
    let mut reader = BlockingReader::new();

    loop {
        let Some(line) = reader.read_line(PROMPT) else {
            break; // EOF
        };

        if !line.trim().is_empty() {
            reader.add_history(&line);
            run_line(&mut shell, &line);
        }

        // コマンドとコマンドの間に、終了したバックグラウンドジョブを
        // 報告して reap する。
        monitor::watch_jobs(monitor::Filter::Finished);

        if shell.should_exit {
            break;
        }
    }

    println!();
    monitor::shutdown(shell.terminal);
    std::process::exit(shell.last_status);
}

/// 入力行を1行トークナイズしてディスパッチし、`shell.last_status` を
/// 更新する: 末尾の `&` を取り除き、`|` で分割し、単一コマンドの
/// ビルトイン即応パス、ランチャの単一コマンドパス、またはその
/// パイプラインパスへ振り分ける。
fn run_line(shell: &mut Shell, line: &str) {
    let mut tokens = tokenizer::tokenize(line);
    if tokens.is_empty() {
        return;
    }
    let background = tokenizer::strip_background(&mut tokens);
    let stages = tokenizer::split_stages(tokens);

    // リダイレクトは（トークンを消費し、パス用トークンを捨てて）
    // ビルトイン判定より前に解決する。元の実装で do_redir が
    // builtin_command より常に先に走るのと同じ順序。こうしないと
    // `pwd > out`・`cd`・`jobs`・`fg`・`bg`・`kill` が、末尾に
    // リダイレクトを伴って書かれただけでビルトインテーブルに
    // 到達できなくなる。
    if stages.len() == 1 && !background {
        let args = stage_argv(&stages[0]);
        if let Some(name) = args.first() {
            if builtins::is_builtin(name) {
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                shell.last_status = builtins::try_exec(shell, &arg_refs).unwrap_or(0);
                return;
            }
        }
    }

    match launcher::run(stages, background, &shell.terminal) {
        Ok(launcher::Launched::Foreground(code)) => shell.last_status = code,
        Ok(launcher::Launched::Background(idx)) => {
            // 独自の報告行を組み立て直すのではなく、Monitor 自身の
            // 報告行をそのまま使う。
            log::debug!("launched background job {idx}");
            monitor::watch_jobs(monitor::Filter::Running);
        }
        Err(e @ error::ShellError::EmptyStage) => {
            eprintln!("jsh: {e}");
            shell.last_status = 2;
        }
        Err(e) => {
            eprintln!("jsh: {e}");
            shell.last_status = 1;
        }
    }
}

/// あるステージのリダイレクトトークン（とそれぞれが消費するパス
/// トークン）を取り除いた結果の argv。実際に何かを開いたりはしない。
/// `launcher::resolve_stage` が同じトークンに対して実際に行うことを
/// 模しており、ビルトイン判定は外部コマンドとして `execvp` に渡される
/// のと同じ argv を見ることになる。
fn stage_argv(stage: &[Token]) -> Vec<String> {
    let mut argv = Vec::new();
    let mut iter = stage.iter();
    while let Some(tok) = iter.next() {
        match tok {
            Token::Lt | Token::Gt => {
                iter.next(); // 続くパストークンがあれば消費する
            }
            Token::Word(w) => argv.push(w.clone()),
            Token::Pipe | Token::Amp => {}
        }
    }
    argv
}

/// シェル自身のシグナル処理をインストールする: no-op の SIGINT
/// ハンドラ（`SA_RESTART` なしなので、ブロッキング読み取りは透過的に
/// 再試行されず中断される）と、シェル自身が決して停止・一時停止
/// させられてはならない3つのジョブ制御シグナルに対する `SIG_IGN`。
extern "C" fn sigint_noop(_sig: libc::c_int) {}

fn install_shell_signals() {
    syscall::checked_sigaction(libc::SIGINT, sigint_noop as usize, false, false);
    syscall::signal_ignore(libc::SIGTSTP);
    syscall::signal_ignore(libc::SIGTTIN);
    syscall::signal_ignore(libc::SIGTTOU);
}
