//! リソースの観測状態
//!
//! 状態は問い合わせ時点でランタイムから観測した分類であり、
//! どこにも永続化されません。

use std::fmt;

use serde::{Deserialize, Serialize};

/// リソースの観測状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// 判別不能
    #[default]
    Unknown,
    /// 未作成
    Pending,
    /// 作成・起動処理中
    Creating,
    /// 稼働中
    Ready,
    /// 異常終了
    Failed,
    /// 破棄処理中
    Destroying,
    /// 破棄済み
    Destroyed,
}

impl Status {
    /// 終端状態かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Destroyed)
    }

    /// 健全に稼働しているか
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pending => "pending",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
        }
    }

    /// ランタイムが報告するコンテナ状態文字列からの変換
    ///
    /// `paused` と未知の値はUnknownに落とす。対象が存在しない場合の
    /// Pendingはexecutor側で判定する（inspectのnot-found）。
    pub fn from_container_state(state: &str) -> Self {
        match state {
            "running" => Self::Ready,
            "created" | "restarting" => Self::Creating,
            "removing" => Self::Destroying,
            "exited" | "dead" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
