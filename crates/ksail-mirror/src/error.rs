//! ミラーオーケストレーションのエラー型

use crate::stage::Role;
use ksail_container::ContainerError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("ステージ {role} に失敗しました: {source}")]
    Stage {
        role: Role,
        #[source]
        source: ContainerError,
    },

    #[error("ステージ {role} が {}秒以内に完了しませんでした", .timeout.as_secs())]
    StageTimeout { role: Role, timeout: Duration },

    #[error("ステージ {requested} は {completed} の後に実行できません")]
    OutOfOrder { requested: Role, completed: Role },

    #[error("ディストリビューション {0} のバックエンドが登録されていません")]
    UnsupportedDistribution(ksail_core::Distribution),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Core(#[from] ksail_core::CoreError),
}

impl MirrorError {
    /// レジストリが見つからなかっただけか
    pub fn is_no_registries_found(&self) -> bool {
        matches!(
            self,
            MirrorError::Container(ContainerError::NoRegistriesFound { .. })
                | MirrorError::Stage {
                    source: ContainerError::NoRegistriesFound { .. },
                    ..
                }
        )
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
