//! ライフサイクルイベントの通知
//!
//! 進捗報告用のサイドチャネル。イベントはリソースを処理している
//! タスクから同期的に発火されるため、実装は並行安全であること。
//! オブザーバが無い構成も有効です（イベントは捨てられる）。

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::resource::ResourceId;

/// イベント種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ApplyStarted,
    ApplyFinished,
    ApplyFailed,
    DestroyStarted,
    DestroyFinished,
    DestroyFailed,
}

/// ライフサイクルイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub resource_id: ResourceId,
    /// 失敗イベントのエラーメッセージ
    pub error: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, resource_id: ResourceId) -> Self {
        Self {
            kind,
            resource_id,
            error: None,
        }
    }

    pub fn with_error(kind: EventKind, resource_id: ResourceId, error: impl Into<String>) -> Self {
        Self {
            kind,
            resource_id,
            error: Some(error.into()),
        }
    }
}

/// イベントの受け手
///
/// 複数タスクから同時に呼ばれるためSend + Sync必須。
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// 登録順に全オブザーバへ配送するオブザーバ
#[derive(Default)]
pub struct MultiObserver {
    observers: Vec<Box<dyn Observer>>,
}

impl MultiObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// オブザーバを登録（配送は登録順）
    pub fn register(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl Observer for MultiObserver {
    fn on_event(&self, event: &Event) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// イベントをtracingレコードとして記録するオブザーバ
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event) {
        match event.kind {
            EventKind::ApplyStarted => {
                info!(resource = %event.resource_id, "apply started");
            }
            EventKind::ApplyFinished => {
                info!(resource = %event.resource_id, "apply finished");
            }
            EventKind::ApplyFailed => {
                error!(
                    resource = %event.resource_id,
                    error = event.error.as_deref().unwrap_or("unknown"),
                    "apply failed"
                );
            }
            EventKind::DestroyStarted => {
                info!(resource = %event.resource_id, "destroy started");
            }
            EventKind::DestroyFinished => {
                info!(resource = %event.resource_id, "destroy finished");
            }
            EventKind::DestroyFailed => {
                error!(
                    resource = %event.resource_id,
                    error = event.error.as_deref().unwrap_or("unknown"),
                    "destroy failed"
                );
            }
        }
    }
}
