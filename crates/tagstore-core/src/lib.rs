//! tagstore-core
//!
//! Mutation and consistency engine for a tag-partitioned task document.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, dependency refs, task, tagged store, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, Clock, FileRegenerator）
//! - **impls**: 実装（JsonFileTaskStore, InMemoryTaskStore）
//! - **graph**: 依存グラフとタグ間依存の検証
//! - **moves**: MoveEngine（タグ内移動・タグ間移動）
//! - **locks**: タグ単位のアドバイザリロック
//! - **resilience**: サーキットブレーカーとリトライ
//! - **healing**: 壊れたドキュメントの自己修復
//! - **app**: アプリケーション層（builder, service, tag 管理, status, auditor loop）
//! - **config**: 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod graph;
pub mod healing;
pub mod impls;
pub mod locks;
pub mod moves;
pub mod ports;
pub mod resilience;

pub use app::{App, AppBuilder, TaskService};
pub use config::CoreConfig;
pub use domain::{EntityId, StoreError, TaggedStore, MASTER_TAG};
pub use moves::{CrossTagMoveOptions, MoveEngine};
