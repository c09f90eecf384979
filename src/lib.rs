//! jsh — ジョブ制御機能を備えた対話型コマンドシェルのコア。
//!
//! バイナリ（`main.rs`）はこのライブラリの上に薄く被さったREPLに過ぎない。
//! `lib.rs` を分離しているのは、ベンチマークや結合テストがサブプロセスを
//! 経由せずジョブテーブル・トークナイザ・ビルトインに直接アクセスできる
//! ようにするため。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |--------|------|
//! | [`job`] | ジョブ制御のコア: ジョブテーブル、reaper、ターミナル調停、パイプラインランチャ、モニタ/コントローラ |
//! | [`tokenizer`] | 字句分割器（単語、`\|`、`<`、`>`、末尾の `&`）。Launcher に渡す |
//! | [`builtins`] | プロセス内で実行するコマンド: `cd`、`pwd`、`exit`、`jobs`、`fg`、`bg`、`kill` |
//! | [`lineread`] | プロンプト表示とブロッキング読み取りの協調者。差し替え可能な [`lineread::EditorHook`] を持つ |
//! | [`error`] | プロセス致命的な条件とユーザー可視な条件のための型付きエラー階層 |
//! | [`shell`] | REPLループ全体で共有されるシェルローカルな状態 |

pub mod builtins;
pub mod error;
pub mod job;
pub mod lineread;
pub mod shell;
pub mod tokenizer;
