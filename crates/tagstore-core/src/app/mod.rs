//! App - アプリケーション層
//!
//! このモジュールは、ports とコアのエンジンを組み合わせて
//! リクエスト経路の処理を実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder / App**: 構築とワイヤリング（グローバル状態なし）
//! - **TaskService**: move 系エントリポイントとタグ管理
//! - **Status**: ロックとブレーカーのスナップショット
//! - **AuditorLoop**: 自己修復の定期実行

pub mod auditor_loop;
pub mod builder;
pub mod service;
pub mod status;
pub mod tags;

// 主要な型を再エクスポート
pub use self::auditor_loop::AuditorLoop;
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::service::{resolve_tag, TaskService, STORE_BREAKER};
pub use self::status::Status;
pub use self::tags::TagSummary;
