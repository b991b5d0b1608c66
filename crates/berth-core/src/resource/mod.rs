//! リソースモデル
//!
//! 望ましい状態を表す不変の値オブジェクト群。リソース自身は
//! ランタイムクライアントを持たず、I/Oも行いません（適用は
//! executorの責務）。

pub mod container;
pub mod image;
pub mod network;

pub use container::{Container, Port, Protocol, RestartPolicy, Volume};
pub use image::{LocalImage, PullPolicy, RemoteImage};
pub use network::Network;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// グラフ内で一意なリソース識別子
///
/// 慣例として `<kind>:<name>` 形式（`container:web`、
/// `image:remote:nginx:latest` など）を取るが、エンジンは
/// 不透明なキーとして扱う。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// リソースへの参照
///
/// IDのみで参照するか、リソース値そのものを保持するか。値を保持する
/// 参照はグラフを引かずにIDを解決でき、ネットワーク名のような
/// 追加情報も直接問い合わせられる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceRef {
    Id(ResourceId),
    Value(Arc<Resource>),
}

impl ResourceRef {
    /// ID文字列による参照
    pub fn by_id(id: impl Into<ResourceId>) -> Self {
        Self::Id(id.into())
    }

    /// リソース値を保持する参照
    pub fn by_value(resource: Arc<Resource>) -> Self {
        Self::Value(resource)
    }

    /// 参照先のリソースID
    pub fn id(&self) -> ResourceId {
        match self {
            Self::Id(id) => id.clone(),
            Self::Value(resource) => resource.id(),
        }
    }

    /// 保持しているリソース値（ID参照ならNone）
    pub fn resource(&self) -> Option<&Arc<Resource>> {
        match self {
            Self::Id(_) => None,
            Self::Value(resource) => Some(resource),
        }
    }

    /// 参照先のネットワーク名を解決
    ///
    /// ネットワーク値を保持していれば直接名前を返す。それ以外は
    /// `network:<name>` というID慣例のパースにフォールバックする。
    pub fn network_name(&self) -> Option<String> {
        if let Self::Value(resource) = self {
            if let Some(network) = resource.as_network() {
                return Some(network.name.clone());
            }
        }
        self.id()
            .as_str()
            .strip_prefix(network::NETWORK_ID_PREFIX)
            .map(str::to_string)
    }
}

impl Default for ResourceRef {
    fn default() -> Self {
        Self::Id(ResourceId::new(""))
    }
}

impl From<&Arc<Resource>> for ResourceRef {
    fn from(resource: &Arc<Resource>) -> Self {
        Self::Value(Arc::clone(resource))
    }
}

impl From<Arc<Resource>> for ResourceRef {
    fn from(resource: Arc<Resource>) -> Self {
        Self::Value(resource)
    }
}

/// 管理対象リソース
///
/// グラフに追加された後は変更されない前提。種類は閉じた集合として
/// 扱い、executorは網羅的にマッチする。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resource {
    Network(Network),
    RemoteImage(RemoteImage),
    LocalImage(LocalImage),
    Container(Container),
}

impl Resource {
    /// リソースID
    pub fn id(&self) -> ResourceId {
        match self {
            Self::Network(network) => network.id(),
            Self::RemoteImage(image) => image.id(),
            Self::LocalImage(image) => image.id(),
            Self::Container(container) => container.id(),
        }
    }

    /// ログ用の種別名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::RemoteImage(_) => "remote-image",
            Self::LocalImage(_) => "local-image",
            Self::Container(_) => "container",
        }
    }

    /// 依存リソース参照
    ///
    /// ネットワークとイメージは依存を持たない。コンテナはイメージが
    /// 先頭、以降はネットワーク定義順。
    pub fn dependencies(&self) -> Vec<ResourceRef> {
        match self {
            Self::Network(_) | Self::RemoteImage(_) | Self::LocalImage(_) => Vec::new(),
            Self::Container(container) => container.dependencies(),
        }
    }

    /// リソース単体の妥当性検証
    pub fn validate(&self) -> Result<(), GraphError> {
        let result = match self {
            Self::Network(network) => network.validate(),
            Self::RemoteImage(image) => image.validate(),
            Self::LocalImage(image) => image.validate(),
            Self::Container(container) => container.validate(),
        };
        result.map_err(|message| GraphError::Validation {
            id: self.id(),
            message,
        })
    }

    /// ネットワークリソースであればその定義を返す
    pub fn as_network(&self) -> Option<&Network> {
        match self {
            Self::Network(network) => Some(network),
            _ => None,
        }
    }
}

impl From<Network> for Resource {
    fn from(network: Network) -> Self {
        Self::Network(network)
    }
}

impl From<RemoteImage> for Resource {
    fn from(image: RemoteImage) -> Self {
        Self::RemoteImage(image)
    }
}

impl From<LocalImage> for Resource {
    fn from(image: LocalImage) -> Self {
        Self::LocalImage(image)
    }
}

impl From<Container> for Resource {
    fn from(container: Container) -> Self {
        Self::Container(container)
    }
}
