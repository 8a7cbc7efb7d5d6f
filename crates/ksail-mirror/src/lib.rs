//! ミラーレジストリのオーケストレーション
//!
//! クラスタ作成時は [`MirrorPipeline`] が 4 つのステージを順に実行し、
//! クラスタ削除時は [`RegistryCleanup`] がレジストリを片付ける。
//!
//! ```text
//! Registry ──▶ Network ──▶ Connect ──▶ (クラスタ作成) ──▶ PostClusterConnect
//! ```

pub mod backends;
pub mod cleanup;
pub mod error;
pub mod pipeline;
pub mod stage;

pub use backends::{
    K3dBackend, KindBackend, MirrorBackend, TalosBackend, VClusterBackend, default_backends,
};
pub use cleanup::*;
pub use error::*;
pub use pipeline::*;
pub use stage::*;
