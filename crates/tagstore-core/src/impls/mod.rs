//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **JsonFileTaskStore**: JSON ファイルの正本（本番用）
//! - **InMemoryTaskStore**: テスト用・組み込み用の正本

pub mod inmem_store;
pub mod json_file_store;

// 主要な型を再エクスポート
pub use self::inmem_store::InMemoryTaskStore;
pub use self::json_file_store::{is_missing_file, JsonFileTaskStore};
