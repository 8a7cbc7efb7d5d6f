//! KSail のクラスタ設定とミラーレジストリのモデル
//!
//! - [`model`]: ディストリビューション・プロバイダー・クラスタ設定
//! - [`mirror`]: ミラー定義と優先順位付きの解決
//! - [`hosts`]: containerd hosts.toml の永続化
//! - [`native`]: Kind / K3d / Talos のネイティブ設定の書き換え

pub mod error;
pub mod hosts;
pub mod loader;
pub mod mirror;
pub mod model;
pub mod native;
pub mod net;
pub mod notify;

pub use error::*;
pub use hosts::*;
pub use loader::*;
pub use mirror::*;
pub use model::*;
pub use native::*;
pub use net::*;
pub use notify::*;
