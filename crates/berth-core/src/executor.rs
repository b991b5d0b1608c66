//! リソースグラフのexecutor
//!
//! グラフの望ましい状態をランタイムへ適用・破棄し、リソースごとの
//! 観測状態を報告します。レベル間は逐次、レベル内は並行。レベル内で
//! 失敗が出た場合は残りをキャンセルしつつ、起動済みの処理はすべて
//! 合流させてから最初のエラーを返します（後続レベルは開始しない）。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{ExecutorError, RuntimeError};
use crate::graph::Graph;
use crate::observer::{Event, EventKind, MultiObserver, Observer};
use crate::resource::{
    Container, LocalImage, Network, PullPolicy, RemoteImage, Resource, ResourceId,
};
use crate::runtime::{ContainerInfo, ContainerSpec, ImageBuildSpec, NetworkSpec, RuntimeClient};
use crate::status::Status;

/// コンテナ停止猶予のデフォルト（秒）
pub const DEFAULT_STOP_TIMEOUT_SECS: i64 = 10;

/// executorの操作種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Apply,
    Destroy,
}

impl Operation {
    fn started(self) -> EventKind {
        match self {
            Self::Apply => EventKind::ApplyStarted,
            Self::Destroy => EventKind::DestroyStarted,
        }
    }

    fn finished(self) -> EventKind {
        match self {
            Self::Apply => EventKind::ApplyFinished,
            Self::Destroy => EventKind::DestroyFinished,
        }
    }

    fn failed(self) -> EventKind {
        match self {
            Self::Apply => EventKind::ApplyFailed,
            Self::Destroy => EventKind::DestroyFailed,
        }
    }
}

/// 1回のapply内で解決されたイメージIDの対応表
///
/// イメージリソースごとに1回書き込まれ、依存コンテナから読まれる。
/// 呼び出しを跨いで共有されることはない。awaitをまたいでロックを
/// 保持しない。
#[derive(Debug, Default)]
struct ResolvedState {
    image_ids: Mutex<HashMap<ResourceId, String>>,
}

impl ResolvedState {
    fn record(&self, id: ResourceId, image_id: String) {
        self.image_ids
            .lock()
            .expect("resolved state lock poisoned")
            .insert(id, image_id);
    }

    fn image_id(&self, id: &ResourceId) -> Option<String> {
        self.image_ids
            .lock()
            .expect("resolved state lock poisoned")
            .get(id)
            .cloned()
    }
}

fn runtime_error(id: &ResourceId, operation: &'static str, source: RuntimeError) -> ExecutorError {
    ExecutorError::Runtime {
        id: id.clone(),
        operation,
        source,
    }
}

/// イメージIDの不一致、または期待ラベルが実ラベルの部分集合で
/// ない場合にドリフトと判定する
fn container_drifted(spec: &ContainerSpec, actual: &ContainerInfo) -> bool {
    if actual.image_id != spec.image {
        return true;
    }
    spec.labels
        .iter()
        .any(|(key, value)| actual.labels.get(key) != Some(value))
}

/// リソースグラフのexecutor
///
/// ランタイムクライアントをジェネリックに受け取る。リトライは
/// 行わない（必要なら呼び出し側かクライアント側の責務）。
pub struct Executor<R> {
    runtime: R,
    observers: MultiObserver,
    stop_timeout_secs: i64,
}

impl<R: RuntimeClient> Executor<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            observers: MultiObserver::new(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }

    /// オブザーバを登録（通知は登録順）
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.register(Box::new(observer));
        self
    }

    /// コンテナ停止の猶予秒数を変更
    pub fn with_stop_timeout(mut self, secs: i64) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    /// グラフの望ましい状態をランタイムへ適用
    #[tracing::instrument(skip_all)]
    pub async fn apply(&self, graph: &Graph) -> Result<(), ExecutorError> {
        let levels = graph.topological_order()?;
        let resolved = ResolvedState::default();
        info!(
            resources = graph.len(),
            levels = levels.len(),
            "applying resource graph"
        );
        for (index, level) in levels.iter().enumerate() {
            debug!(level = index, resources = level.len(), "applying level");
            self.run_level(level, Operation::Apply, &resolved).await?;
        }
        Ok(())
    }

    /// グラフのリソースを逆順に破棄
    ///
    /// 一度も適用されていないリソースに対しても安全（not-foundは成功）。
    #[tracing::instrument(skip_all)]
    pub async fn destroy(&self, graph: &Graph) -> Result<(), ExecutorError> {
        let levels = graph.reverse_topological_order()?;
        let resolved = ResolvedState::default();
        info!(
            resources = graph.len(),
            levels = levels.len(),
            "destroying resource graph"
        );
        for (index, level) in levels.iter().enumerate() {
            debug!(level = index, resources = level.len(), "destroying level");
            self.run_level(level, Operation::Destroy, &resolved).await?;
        }
        Ok(())
    }

    /// 全リソースの観測状態を取得
    ///
    /// 読み取り専用の診断であり、1つでも問い合わせに失敗したら
    /// 呼び出し全体をエラーにする。
    #[tracing::instrument(skip_all)]
    pub async fn status(&self, graph: &Graph) -> Result<HashMap<ResourceId, Status>, ExecutorError> {
        let mut report = HashMap::new();
        for resource in graph.all() {
            let status = self.resource_status(&resource).await?;
            report.insert(resource.id(), status);
        }
        Ok(report)
    }

    /// 1レベル分を並行実行し、全フューチャの完了を待つ
    ///
    /// 最初の実失敗を観測した時点でキャンセル信号を送り、残りは
    /// キャンセル結果としてドレインしてから先頭のエラーを返す。
    async fn run_level(
        &self,
        level: &[Arc<Resource>],
        op: Operation,
        resolved: &ResolvedState,
    ) -> Result<(), ExecutorError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut in_flight: FuturesUnordered<_> = level
            .iter()
            .map(|resource| self.run_one(Arc::clone(resource), op, resolved, cancel_rx.clone()))
            .collect();
        drop(cancel_rx);

        let mut first_error: Option<ExecutorError> = None;
        while let Some(outcome) = in_flight.next().await {
            if let Err(error) = outcome {
                let cancelled = matches!(error, ExecutorError::Cancelled { .. });
                if first_error.is_none() && !cancelled {
                    let _ = cancel_tx.send(true);
                    first_error = Some(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// リソース1つの処理。前後でイベントを発火する
    async fn run_one(
        &self,
        resource: Arc<Resource>,
        op: Operation,
        resolved: &ResolvedState,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), ExecutorError> {
        let id = resource.id();
        self.observers
            .on_event(&Event::new(op.started(), id.clone()));
        let outcome = tokio::select! {
            outcome = self.process(&resource, op, resolved) => outcome,
            _ = cancel.changed() => Err(ExecutorError::Cancelled { id: id.clone() }),
        };
        match &outcome {
            Ok(()) => self.observers.on_event(&Event::new(op.finished(), id)),
            Err(error) => self
                .observers
                .on_event(&Event::with_error(op.failed(), id, error.to_string())),
        }
        outcome
    }

    async fn process(
        &self,
        resource: &Resource,
        op: Operation,
        resolved: &ResolvedState,
    ) -> Result<(), ExecutorError> {
        match op {
            Operation::Apply => self.apply_resource(resource, resolved).await,
            Operation::Destroy => self.destroy_resource(resource).await,
        }
    }

    async fn apply_resource(
        &self,
        resource: &Resource,
        resolved: &ResolvedState,
    ) -> Result<(), ExecutorError> {
        match resource {
            Resource::Network(network) => self.apply_network(network).await,
            Resource::RemoteImage(image) => self.apply_remote_image(image, resolved).await,
            Resource::LocalImage(image) => self.apply_local_image(image, resolved).await,
            Resource::Container(container) => self.apply_container(container, resolved).await,
        }
    }

    async fn destroy_resource(&self, resource: &Resource) -> Result<(), ExecutorError> {
        match resource {
            Resource::Network(network) => self.destroy_network(network).await,
            Resource::RemoteImage(image) => {
                // イメージは共有資産であり、このグラフの所有物ではない
                debug!(image = image.image_ref(), "image destroy is a no-op");
                Ok(())
            }
            Resource::LocalImage(image) => {
                debug!(image = image.image_ref(), "image destroy is a no-op");
                Ok(())
            }
            Resource::Container(container) => self.destroy_container(container).await,
        }
    }

    async fn apply_network(&self, network: &Network) -> Result<(), ExecutorError> {
        let id = network.id();
        match self.runtime.network_inspect(&network.name).await {
            Ok(existing) => {
                // TODO: 既存ネットワークのdriver/labelsの差分検出と再作成
                debug!(
                    network = %network.name,
                    network_id = %existing.id,
                    "network already exists"
                );
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                let spec = NetworkSpec {
                    name: network.name.clone(),
                    driver: network.driver_name().to_string(),
                    labels: network.labels.clone(),
                };
                let network_id = self
                    .runtime
                    .network_create(&spec)
                    .await
                    .map_err(|e| runtime_error(&id, "create", e))?;
                info!(network = %network.name, network_id = %network_id, "network created");
                Ok(())
            }
            Err(err) => Err(runtime_error(&id, "inspect", err)),
        }
    }

    async fn apply_remote_image(
        &self,
        image: &RemoteImage,
        resolved: &ResolvedState,
    ) -> Result<(), ExecutorError> {
        let id = image.id();
        let reference = image.image_ref();
        match image.pull_policy {
            PullPolicy::Always => {
                info!(image = reference, "pulling image");
                self.runtime
                    .image_pull(reference)
                    .await
                    .map_err(|e| runtime_error(&id, "pull", e))?;
            }
            PullPolicy::IfNotPresent => match self.runtime.image_inspect(reference).await {
                Ok(info) => {
                    debug!(image = reference, "image already present");
                    resolved.record(id, info.id);
                    return Ok(());
                }
                Err(err) if err.is_not_found() => {
                    info!(image = reference, "image missing locally, pulling");
                    self.runtime
                        .image_pull(reference)
                        .await
                        .map_err(|e| runtime_error(&id, "pull", e))?;
                }
                Err(err) => return Err(runtime_error(&id, "inspect", err)),
            },
            PullPolicy::Never => match self.runtime.image_inspect(reference).await {
                Ok(info) => {
                    resolved.record(id, info.id);
                    return Ok(());
                }
                Err(err) if err.is_not_found() => {
                    return Err(ExecutorError::ImageMissingLocally {
                        id,
                        reference: reference.to_string(),
                    });
                }
                Err(err) => return Err(runtime_error(&id, "inspect", err)),
            },
        }
        let info = self
            .runtime
            .image_inspect(reference)
            .await
            .map_err(|e| runtime_error(&id, "inspect", e))?;
        resolved.record(id, info.id);
        Ok(())
    }

    async fn apply_local_image(
        &self,
        image: &LocalImage,
        resolved: &ResolvedState,
    ) -> Result<(), ExecutorError> {
        let id = image.id();
        let spec = ImageBuildSpec {
            context_path: image.context_path.clone(),
            dockerfile: image.dockerfile_path(),
            tag: image.tag.clone(),
        };
        info!(
            tag = %image.tag,
            context = %image.context_path.display(),
            "building image"
        );
        self.runtime
            .image_build(&spec)
            .await
            .map_err(|e| runtime_error(&id, "build", e))?;
        let info = self
            .runtime
            .image_inspect(image.image_ref())
            .await
            .map_err(|e| runtime_error(&id, "inspect", e))?;
        resolved.record(id, info.id);
        Ok(())
    }

    async fn apply_container(
        &self,
        container: &Container,
        resolved: &ResolvedState,
    ) -> Result<(), ExecutorError> {
        let id = container.id();
        // 依存イメージは前のレベルで解決済みのはず
        let image_ref_id = container.image.id();
        let image_id =
            resolved
                .image_id(&image_ref_id)
                .ok_or_else(|| ExecutorError::ImageNotResolved {
                    id: id.clone(),
                    image: image_ref_id,
                })?;

        let mut networks = Vec::with_capacity(container.networks.len());
        for reference in &container.networks {
            let name =
                reference
                    .network_name()
                    .ok_or_else(|| ExecutorError::NetworkNameUnresolved {
                        id: id.clone(),
                        reference: reference.id(),
                    })?;
            networks.push(name);
        }

        let spec = ContainerSpec {
            name: container.name.clone(),
            image: image_id,
            networks,
            ports: container.ports.clone(),
            volumes: container.volumes.clone(),
            env: container.env.clone(),
            labels: container.labels.clone(),
            command: container.command.clone(),
            extra_hosts: container.extra_hosts.clone(),
            restart_policy: container.restart_policy,
            user: container.user.clone(),
        };

        match self.runtime.container_inspect(&container.name).await {
            Ok(existing) => {
                if container_drifted(&spec, &existing) {
                    info!(container = %container.name, "container drifted, recreating");
                    self.runtime
                        .container_stop(&container.name, Some(self.stop_timeout_secs))
                        .await
                        .map_err(|e| runtime_error(&id, "stop", e))?;
                    self.runtime
                        .container_remove(&container.name, true)
                        .await
                        .map_err(|e| runtime_error(&id, "remove", e))?;
                    self.create_and_start(&id, &spec).await
                } else if !existing.running {
                    debug!(container = %container.name, "container stopped, starting");
                    self.runtime
                        .container_start(&container.name)
                        .await
                        .map_err(|e| runtime_error(&id, "start", e))?;
                    info!(container = %container.name, "container started");
                    Ok(())
                } else {
                    debug!(container = %container.name, "container up to date");
                    Ok(())
                }
            }
            Err(err) if err.is_not_found() => self.create_and_start(&id, &spec).await,
            Err(err) => Err(runtime_error(&id, "inspect", err)),
        }
    }

    async fn create_and_start(
        &self,
        id: &ResourceId,
        spec: &ContainerSpec,
    ) -> Result<(), ExecutorError> {
        let container_id = self
            .runtime
            .container_create(spec)
            .await
            .map_err(|e| runtime_error(id, "create", e))?;
        debug!(
            container = %spec.name,
            container_id = %container_id,
            "container created"
        );
        self.runtime
            .container_start(&spec.name)
            .await
            .map_err(|e| runtime_error(id, "start", e))?;
        info!(container = %spec.name, "container started");
        Ok(())
    }

    async fn destroy_network(&self, network: &Network) -> Result<(), ExecutorError> {
        match self.runtime.network_remove(&network.name).await {
            Ok(()) => {
                info!(network = %network.name, "network removed");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(network = %network.name, "network already gone");
                Ok(())
            }
            Err(err) => Err(runtime_error(&network.id(), "remove", err)),
        }
    }

    async fn destroy_container(&self, container: &Container) -> Result<(), ExecutorError> {
        let id = container.id();
        match self
            .runtime
            .container_stop(&container.name, Some(self.stop_timeout_secs))
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(container = %container.name, "container already gone");
                return Ok(());
            }
            Err(err) => return Err(runtime_error(&id, "stop", err)),
        }
        match self.runtime.container_remove(&container.name, true).await {
            Ok(()) => {
                info!(container = %container.name, "container removed");
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(runtime_error(&id, "remove", err)),
        }
    }

    async fn resource_status(&self, resource: &Resource) -> Result<Status, ExecutorError> {
        let id = resource.id();
        match resource {
            Resource::Network(network) => {
                match self.runtime.network_inspect(&network.name).await {
                    Ok(_) => Ok(Status::Ready),
                    Err(err) if err.is_not_found() => Ok(Status::Pending),
                    Err(err) => Err(runtime_error(&id, "inspect", err)),
                }
            }
            Resource::RemoteImage(image) => self.image_status(&id, image.image_ref()).await,
            Resource::LocalImage(image) => self.image_status(&id, image.image_ref()).await,
            Resource::Container(container) => {
                match self.runtime.container_inspect(&container.name).await {
                    Ok(info) => Ok(Status::from_container_state(&info.state)),
                    Err(err) if err.is_not_found() => Ok(Status::Pending),
                    Err(err) => Err(runtime_error(&id, "inspect", err)),
                }
            }
        }
    }

    async fn image_status(
        &self,
        id: &ResourceId,
        reference: &str,
    ) -> Result<Status, ExecutorError> {
        match self.runtime.image_inspect(reference).await {
            Ok(_) => Ok(Status::Ready),
            Err(err) if err.is_not_found() => Ok(Status::Pending),
            Err(err) => Err(runtime_error(id, "inspect", err)),
        }
    }
}
