//! イメージリソース定義
//!
//! リモートレジストリから取得する `RemoteImage` と、ローカルの
//! ビルドコンテキストから構築する `LocalImage` の2種類があります。
//! どちらも依存リソースを持ちません。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ResourceId;

/// デフォルトのDockerfileファイル名
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// イメージ取得ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// 常にpull
    Always,
    /// ローカルに無い場合のみpull（デフォルト）
    #[default]
    IfNotPresent,
    /// pullしない。ローカルに無ければエラー
    Never,
}

impl PullPolicy {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "if-not-present" | "if_not_present" | "ifnotpresent" => Some(Self::IfNotPresent),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::IfNotPresent => "if-not-present",
            Self::Never => "never",
        }
    }
}

/// レジストリから取得するイメージの望ましい状態
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteImage {
    /// pull参照（例: `nginx:latest`, `ghcr.io/owner/app:1.2`）
    pub reference: String,
    #[serde(default)]
    pub pull_policy: PullPolicy,
}

impl RemoteImage {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            ..Default::default()
        }
    }

    /// リソースID（`image:remote:<reference>`）
    pub fn id(&self) -> ResourceId {
        ResourceId::new(format!("image:remote:{}", self.reference))
    }

    /// ランタイムに渡すイメージ参照
    pub fn image_ref(&self) -> &str {
        &self.reference
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.reference.is_empty() {
            return Err("イメージ参照が指定されていません".to_string());
        }
        Ok(())
    }
}

/// ローカルでビルドするイメージの望ましい状態
///
/// ビルドコンテキストはグラフ外のファイルシステムにあるため
/// 依存リソースとしては扱わない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalImage {
    /// ビルドコンテキストのディレクトリ
    pub context_path: PathBuf,
    /// Dockerfileのパス。相対ならコンテキスト基準、未指定なら `Dockerfile`
    pub dockerfile: Option<PathBuf>,
    /// ビルド結果に付けるタグ
    pub tag: String,
}

impl LocalImage {
    pub fn new(context_path: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
            dockerfile: None,
            tag: tag.into(),
        }
    }

    /// リソースID（`image:local:<tag>`）
    pub fn id(&self) -> ResourceId {
        ResourceId::new(format!("image:local:{}", self.tag))
    }

    /// ランタイムに渡すイメージ参照（＝タグ）
    pub fn image_ref(&self) -> &str {
        &self.tag
    }

    /// 実際に使用するDockerfileパス
    pub fn dockerfile_path(&self) -> PathBuf {
        self.dockerfile
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKERFILE))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tag.is_empty() {
            return Err("イメージタグが指定されていません".to_string());
        }
        if self.context_path.as_os_str().is_empty() {
            return Err("ビルドコンテキストが指定されていません".to_string());
        }
        Ok(())
    }
}
