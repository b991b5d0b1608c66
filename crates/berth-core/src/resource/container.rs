//! コンテナリソース定義

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{ResourceId, ResourceRef};

/// コンテナIDの接頭辞（`container:<name>`）
pub const CONTAINER_ID_PREFIX: &str = "container:";

/// ポート公開定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub host: u16,
    pub container: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// バインド先ホストIP。未指定なら全インターフェース
    pub host_ip: Option<String>,
}

impl Port {
    pub fn new(host: u16, container: u16) -> Self {
        Self {
            host,
            container,
            protocol: Protocol::default(),
            host_ip: None,
        }
    }
}

/// プロトコル種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// 文字列からProtocolをパース
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "udp" => Protocol::Udp,
            _ => Protocol::Tcp,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// ボリュームマウント定義
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub host: PathBuf,
    pub container: PathBuf,
    #[serde(default)]
    pub read_only: bool,
}

/// 再起動ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// 再起動しない（デフォルト）
    #[default]
    No,
    /// 常に再起動
    Always,
    /// 異常終了時のみ再起動
    OnFailure,
    /// 明示的に停止しない限り再起動
    UnlessStopped,
}

impl RestartPolicy {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no" => Some(Self::No),
            "always" => Some(Self::Always),
            "on-failure" | "on_failure" => Some(Self::OnFailure),
            "unless-stopped" | "unless_stopped" => Some(Self::UnlessStopped),
            _ => None,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_docker_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

/// コンテナの望ましい状態
///
/// イメージ参照とネットワーク参照に依存する。依存順はイメージが先、
/// 続いてネットワークが定義順に並ぶ。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    /// 使用するイメージリソースへの参照
    pub image: ResourceRef,
    /// 接続するネットワークリソースへの参照
    #[serde(default)]
    pub networks: Vec<ResourceRef>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// 起動コマンド。空ならイメージのデフォルト
    #[serde(default)]
    pub command: Vec<String>,
    /// `/etc/hosts` に追記するエントリ（`host:ip` 形式）
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// 実行ユーザー（`uid[:gid]` またはユーザー名）
    pub user: Option<String>,
}

impl Container {
    /// リソースID（`container:<name>`）
    pub fn id(&self) -> ResourceId {
        ResourceId::new(format!("{CONTAINER_ID_PREFIX}{}", self.name))
    }

    /// 依存リソース参照。イメージが先頭、以降はネットワーク定義順
    pub fn dependencies(&self) -> Vec<ResourceRef> {
        let mut deps = Vec::with_capacity(1 + self.networks.len());
        deps.push(self.image.clone());
        deps.extend(self.networks.iter().cloned());
        deps
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("コンテナ名が指定されていません".to_string());
        }
        if self.image.id().as_str().is_empty() {
            return Err("イメージ参照が指定されていません".to_string());
        }
        Ok(())
    }
}
