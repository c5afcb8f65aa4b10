//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部の協調者（永続化、時刻、派生ファイル生成）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod file_regenerator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::file_regenerator::FileRegenerator;
pub use self::task_store::TaskStore;
