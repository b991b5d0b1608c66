// テストバイナリごとに使うヘルパが異なるため
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use berth_core::runtime::{
    ContainerInfo, ContainerSpec, ImageBuildSpec, ImageInfo, NetworkInfo, NetworkSpec,
    RuntimeClient,
};
use berth_core::{Event, EventKind, Observer, RuntimeError};

/// 呼び出しに注入する挙動
#[derive(Debug, Clone)]
enum Injected {
    None,
    Fail(RuntimeError),
    Hang,
}

#[derive(Debug, Default)]
struct MockState {
    /// イメージ参照 -> イメージID
    images: HashMap<String, String>,
    networks: HashMap<String, NetworkInfo>,
    containers: HashMap<String, ContainerInfo>,
    calls: Vec<String>,
    created_specs: Vec<ContainerSpec>,
    stop_timeouts: Vec<Option<i64>>,
    failures: HashMap<String, RuntimeError>,
    hangs: HashSet<String>,
}

/// activeカウンタをスコープ終了時に戻すガード
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// インメモリのランタイム実装
///
/// 呼び出しを `"<op> <name>"` 形式で記録し、同じキーで失敗やハングを
/// 注入できる。状態遷移は実Dockerの観測結果を単純化したもの。
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
    delay: Option<Duration>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// 各呼び出しに遅延を入れる（並行度の観測用）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn seed_image(&self, reference: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(reference.to_string(), id.to_string());
    }

    pub fn seed_network(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.networks.insert(
            name.to_string(),
            NetworkInfo {
                id: format!("net-{name}"),
                name: name.to_string(),
                driver: "bridge".to_string(),
                labels: HashMap::new(),
            },
        );
    }

    pub fn seed_container(
        &self,
        name: &str,
        image_id: &str,
        container_state: &str,
        labels: &[(&str, &str)],
    ) {
        let mut state = self.state.lock().unwrap();
        state.containers.insert(
            name.to_string(),
            ContainerInfo {
                id: format!("ctr-{name}"),
                image_id: image_id.to_string(),
                state: container_state.to_string(),
                running: container_state == "running",
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    /// 指定の呼び出しを失敗させる（以後の同じ呼び出しも失敗し続ける）
    pub fn fail(&self, call: &str, error: RuntimeError) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(call.to_string(), error);
    }

    /// 指定の呼び出しを完了しないフューチャにする
    pub fn hang(&self, call: &str) {
        let mut state = self.state.lock().unwrap();
        state.hangs.insert(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_index(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().unwrap().created_specs.clone()
    }

    pub fn stop_timeouts(&self) -> Vec<Option<i64>> {
        self.state.lock().unwrap().stop_timeouts.clone()
    }

    /// 観測された同時実行数の最大値
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn image_exists(&self, reference: &str) -> bool {
        self.state.lock().unwrap().images.contains_key(reference)
    }

    pub fn network_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains_key(name)
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().containers.contains_key(name)
    }

    pub fn container_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .is_some_and(|info| info.running)
    }

    /// 呼び出しを記録し、注入された挙動を適用する
    async fn begin(&self, call: String) -> Result<ActiveGuard, RuntimeError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
        };

        let injected = {
            let state = self.state.lock().unwrap();
            if state.hangs.contains(&call) {
                Injected::Hang
            } else if let Some(error) = state.failures.get(&call) {
                Injected::Fail(error.clone())
            } else {
                Injected::None
            }
        };
        self.state.lock().unwrap().calls.push(call);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match injected {
            Injected::Hang => {
                // キャンセルでフューチャごと破棄されるまで完了しない
                std::future::pending::<()>().await;
                unreachable!()
            }
            Injected::Fail(error) => Err(error),
            Injected::None => Ok(guard),
        }
    }
}

impl RuntimeClient for MockRuntime {
    async fn image_inspect(&self, reference: &str) -> Result<ImageInfo, RuntimeError> {
        let _guard = self.begin(format!("inspect-image {reference}")).await?;
        let state = self.state.lock().unwrap();
        match state.images.get(reference) {
            Some(id) => Ok(ImageInfo { id: id.clone() }),
            None => Err(RuntimeError::ImageNotFound(reference.to_string())),
        }
    }

    async fn image_pull(&self, reference: &str) -> Result<(), RuntimeError> {
        let _guard = self.begin(format!("pull {reference}")).await?;
        let mut state = self.state.lock().unwrap();
        state
            .images
            .insert(reference.to_string(), format!("sha256:pulled-{reference}"));
        Ok(())
    }

    async fn image_build(&self, spec: &ImageBuildSpec) -> Result<(), RuntimeError> {
        let _guard = self.begin(format!("build {}", spec.tag)).await?;
        let mut state = self.state.lock().unwrap();
        state
            .images
            .insert(spec.tag.clone(), format!("sha256:built-{}", spec.tag));
        Ok(())
    }

    async fn network_inspect(&self, name: &str) -> Result<NetworkInfo, RuntimeError> {
        let _guard = self.begin(format!("inspect-network {name}")).await?;
        let state = self.state.lock().unwrap();
        state
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NetworkNotFound(name.to_string()))
    }

    async fn network_create(&self, spec: &NetworkSpec) -> Result<String, RuntimeError> {
        let _guard = self.begin(format!("create-network {}", spec.name)).await?;
        let id = format!("net-{}", spec.name);
        let mut state = self.state.lock().unwrap();
        state.networks.insert(
            spec.name.clone(),
            NetworkInfo {
                id: id.clone(),
                name: spec.name.clone(),
                driver: spec.driver.clone(),
                labels: spec.labels.clone(),
            },
        );
        Ok(id)
    }

    async fn network_remove(&self, name: &str) -> Result<(), RuntimeError> {
        let _guard = self.begin(format!("remove-network {name}")).await?;
        let mut state = self.state.lock().unwrap();
        if state.networks.remove(name).is_none() {
            return Err(RuntimeError::NetworkNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn container_inspect(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        let _guard = self.begin(format!("inspect-container {name}")).await?;
        let state = self.state.lock().unwrap();
        state
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::ContainerNotFound(name.to_string()))
    }

    async fn container_create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let _guard = self.begin(format!("create-container {}", spec.name)).await?;
        let id = format!("ctr-{}", spec.name);
        let mut state = self.state.lock().unwrap();
        state.created_specs.push(spec.clone());
        state.containers.insert(
            spec.name.clone(),
            ContainerInfo {
                id: id.clone(),
                image_id: spec.image.clone(),
                state: "created".to_string(),
                running: false,
                labels: spec.labels.clone(),
            },
        );
        Ok(id)
    }

    async fn container_start(&self, name: &str) -> Result<(), RuntimeError> {
        let _guard = self.begin(format!("start {name}")).await?;
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(name) {
            Some(info) => {
                info.state = "running".to_string();
                info.running = true;
                Ok(())
            }
            None => Err(RuntimeError::ContainerNotFound(name.to_string())),
        }
    }

    async fn container_stop(
        &self,
        name: &str,
        timeout_secs: Option<i64>,
    ) -> Result<(), RuntimeError> {
        let _guard = self.begin(format!("stop {name}")).await?;
        let mut state = self.state.lock().unwrap();
        state.stop_timeouts.push(timeout_secs);
        match state.containers.get_mut(name) {
            Some(info) => {
                info.state = "exited".to_string();
                info.running = false;
                Ok(())
            }
            None => Err(RuntimeError::ContainerNotFound(name.to_string())),
        }
    }

    async fn container_remove(&self, name: &str, _force: bool) -> Result<(), RuntimeError> {
        let _guard = self.begin(format!("remove {name}")).await?;
        let mut state = self.state.lock().unwrap();
        if state.containers.remove(name).is_none() {
            return Err(RuntimeError::ContainerNotFound(name.to_string()));
        }
        Ok(())
    }
}

/// 受け取ったイベントを蓄積するオブザーバ
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// 指定リソースに対するイベント種別の列
    pub fn kinds_for(&self, resource_id: &str) -> Vec<EventKind> {
        self.events()
            .iter()
            .filter(|event| event.resource_id.as_str() == resource_id)
            .map(|event| event.kind)
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}
