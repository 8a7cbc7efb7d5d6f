//! KSail の Docker 操作
//!
//! - [`docker`]: オーケストレーションが使う Docker 操作の境界
//! - [`engine`]: bollard による実装
//! - [`network`]: クラスタ用ネットワークの事前作成
//! - [`info`]: ミラー定義からコンテナ名・ポートを決める
//! - [`registry`]: レジストリコンテナの作成・接続・削除
//! - [`waiter`]: レジストリの準備完了待機

pub mod docker;
pub mod engine;
pub mod error;
pub mod info;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;
pub mod network;
pub mod registry;
pub mod waiter;

pub use docker::*;
pub use engine::*;
pub use error::*;
pub use info::*;
pub use network::*;
pub use registry::*;
pub use waiter::*;
