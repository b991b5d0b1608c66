//! コンテナランタイムクライアントのインターフェース
//!
//! executorが依存する唯一の外部コラボレータ。特定のエンジンの
//! ワイヤプロトコルには依存せず、Docker・Podman・テスト用モックの
//! いずれでも実装できます。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::resource::{Port, RestartPolicy, Volume};

/// コンテナランタイムのトレイト
///
/// それぞれの操作は失敗時に `RuntimeError` を返す。inspect系は対象が
/// 存在しない場合に `is_not_found()` が真となるセンチネルを返すこと。
#[allow(async_fn_in_trait)]
pub trait RuntimeClient {
    // --- イメージ ---
    async fn image_inspect(&self, reference: &str) -> Result<ImageInfo, RuntimeError>;
    async fn image_pull(&self, reference: &str) -> Result<(), RuntimeError>;
    async fn image_build(&self, spec: &ImageBuildSpec) -> Result<(), RuntimeError>;

    // --- ネットワーク ---
    async fn network_inspect(&self, name: &str) -> Result<NetworkInfo, RuntimeError>;
    async fn network_create(&self, spec: &NetworkSpec) -> Result<String, RuntimeError>;
    async fn network_remove(&self, name: &str) -> Result<(), RuntimeError>;

    // --- コンテナ ---
    async fn container_inspect(&self, name: &str) -> Result<ContainerInfo, RuntimeError>;
    async fn container_create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;
    async fn container_start(&self, name: &str) -> Result<(), RuntimeError>;
    async fn container_stop(
        &self,
        name: &str,
        timeout_secs: Option<i64>,
    ) -> Result<(), RuntimeError>;
    async fn container_remove(&self, name: &str, force: bool) -> Result<(), RuntimeError>;
}

/// イメージのinspect結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// ランタイムが割り当てたイメージID（ダイジェスト）
    pub id: String,
}

/// ネットワークのinspect結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// コンテナのinspect結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    /// 実際に使用しているイメージID
    pub image_id: String,
    /// ランタイムが報告する状態文字列（`running`, `exited` など）
    pub state: String,
    pub running: bool,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// ネットワーク作成要求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// イメージビルド要求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuildSpec {
    pub context_path: PathBuf,
    /// 相対ならコンテキスト基準
    pub dockerfile: PathBuf,
    pub tag: String,
}

/// コンテナ作成要求
///
/// リソース定義と違い、イメージは解決済みのID、ネットワークは
/// 解決済みの名前を保持する。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    /// 解決済みイメージID
    pub image: String,
    /// 接続先ネットワーク名（解決済み）
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    pub user: Option<String>,
}
