//! ネットワークリソース定義

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ResourceId;

/// ネットワークIDの接頭辞（`network:<name>`）
pub const NETWORK_ID_PREFIX: &str = "network:";

/// ドライバ未指定時のデフォルト
pub const DEFAULT_DRIVER: &str = "bridge";

/// コンテナネットワークの望ましい状態
///
/// 依存リソースを持たない。既存ネットワークのdriver/labelsの
/// 差分検出は未対応（executor側のapply参照）。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    /// ネットワークドライバ。未指定なら `bridge`
    pub driver: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// リソースID（`network:<name>`）
    pub fn id(&self) -> ResourceId {
        ResourceId::new(format!("{NETWORK_ID_PREFIX}{}", self.name))
    }

    /// 実際に使用するドライバ名
    pub fn driver_name(&self) -> &str {
        self.driver.as_deref().unwrap_or(DEFAULT_DRIVER)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("ネットワーク名が指定されていません".to_string());
        }
        Ok(())
    }
}
