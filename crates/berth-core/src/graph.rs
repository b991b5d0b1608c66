//! リソース依存グラフ
//!
//! IDをキーとするスレッドセーフなリソース集合。参照整合性と
//! 非循環性を検証し、レベル分けされたトポロジカル順序を生成します。
//! レベル0は依存なし、レベルkの依存はすべてレベルk未満に属します。

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::GraphError;
use crate::resource::{Resource, ResourceId};

/// DFSの訪問マーク
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// 未訪問
    White,
    /// 訪問中（現在のDFS経路上）
    Gray,
    /// 訪問完了
    Black,
}

type ResourceMap = HashMap<ResourceId, Arc<Resource>>;

/// リソース依存グラフ
///
/// 追加は排他、読み取りは共有のread/writeロックで保護する。
/// 追加後のリソースは不変として扱われ、同じArcを保持し続ける。
#[derive(Debug, Default)]
pub struct Graph {
    resources: RwLock<ResourceMap>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, ResourceMap> {
        self.resources.read().expect("resource map lock poisoned")
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ResourceMap> {
        self.resources.write().expect("resource map lock poisoned")
    }

    /// リソースを追加
    ///
    /// 空IDと重複IDは拒否し、失敗時はグラフを変更しない。
    pub fn add(&self, resource: impl Into<Arc<Resource>>) -> Result<(), GraphError> {
        let resource = resource.into();
        let id = resource.id();
        if id.as_str().is_empty() {
            return Err(GraphError::EmptyId);
        }
        let mut resources = self.write_guard();
        if resources.contains_key(&id) {
            return Err(GraphError::DuplicateId(id));
        }
        resources.insert(id, resource);
        Ok(())
    }

    /// IDでリソースを取得
    pub fn get(&self, id: &ResourceId) -> Option<Arc<Resource>> {
        self.read_guard().get(id).cloned()
    }

    /// 全リソース（順序は不定）
    pub fn all(&self) -> Vec<Arc<Resource>> {
        self.read_guard().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// グラフ全体の検証
    ///
    /// (1) 参照整合性 → (2) 非循環性 → (3) リソース単体の検証、の順で
    /// 実行し、最初の失敗で打ち切る。
    pub fn validate(&self) -> Result<(), GraphError> {
        let resources = self.read_guard();
        Self::check_references(&resources)?;
        Self::check_acyclic(&resources)?;
        for id in sorted_ids(&resources) {
            resources[&id].validate()?;
        }
        Ok(())
    }

    /// レベル分けされたトポロジカル順序
    ///
    /// Kahnの入次数方式。空グラフはレベルなし（空Vec）。参照整合性と
    /// 非循環性はここでも検証するため、`validate()` を経ずに呼んでも
    /// 正しく失敗する。
    pub fn topological_order(&self) -> Result<Vec<Vec<Arc<Resource>>>, GraphError> {
        let resources = self.read_guard();
        if resources.is_empty() {
            return Ok(Vec::new());
        }
        Self::check_references(&resources)?;
        Self::check_acyclic(&resources)?;

        // 入次数と逆向き隣接リスト（依存先 → 依存元）を構築
        let mut in_degree: HashMap<ResourceId, usize> = HashMap::with_capacity(resources.len());
        let mut dependents: HashMap<ResourceId, Vec<ResourceId>> = HashMap::new();
        for (id, resource) in resources.iter() {
            let deps = resource.dependencies();
            in_degree.insert(id.clone(), deps.len());
            for dep in deps {
                dependents.entry(dep.id()).or_default().push(id.clone());
            }
        }

        let mut levels = Vec::new();
        let mut remaining = resources.len();
        while remaining > 0 {
            let mut ready: Vec<ResourceId> = in_degree
                .iter()
                .filter(|(_, degree)| **degree == 0)
                .map(|(id, _)| id.clone())
                .collect();
            if ready.is_empty() {
                // 循環検査を通過した後は到達しないはず
                return Err(GraphError::Internal(format!(
                    "トポロジカルレベリングが停止しました（残り{remaining}リソース）"
                )));
            }
            // レベル内の順序は未規定だが、診断を安定させるためIDでソート
            ready.sort();
            for id in &ready {
                in_degree.remove(id);
            }
            for id in &ready {
                if let Some(children) = dependents.get(id) {
                    for child in children {
                        if let Some(degree) = in_degree.get_mut(child) {
                            *degree -= 1;
                        }
                    }
                }
            }
            remaining -= ready.len();
            levels.push(ready.iter().map(|id| resources[id].clone()).collect());
        }
        Ok(levels)
    }

    /// 破棄用の逆順レベル（依存元が先、依存先が後）
    pub fn reverse_topological_order(&self) -> Result<Vec<Vec<Arc<Resource>>>, GraphError> {
        let mut levels = self.topological_order()?;
        levels.reverse();
        Ok(levels)
    }

    /// 全リソースの依存参照がグラフ内に存在するか検査
    fn check_references(resources: &ResourceMap) -> Result<(), GraphError> {
        for id in sorted_ids(resources) {
            for dep in resources[&id].dependencies() {
                let dep_id = dep.id();
                if !resources.contains_key(&dep_id) {
                    return Err(GraphError::MissingDependency {
                        id,
                        dependency: dep_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// 三色マーキングDFSによる循環検査
    fn check_acyclic(resources: &ResourceMap) -> Result<(), GraphError> {
        let mut marks: HashMap<ResourceId, Mark> = resources
            .keys()
            .map(|id| (id.clone(), Mark::White))
            .collect();
        for id in sorted_ids(resources) {
            if marks[&id] == Mark::White {
                let mut path = Vec::new();
                if let Some(cycle) = Self::visit(&id, resources, &mut marks, &mut path) {
                    let rendered = cycle
                        .iter()
                        .map(ResourceId::as_str)
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    return Err(GraphError::CircularDependency(rendered));
                }
            }
        }
        Ok(())
    }

    /// DFS本体。灰色ノードへ到達したら循環経路全体を返す
    fn visit(
        id: &ResourceId,
        resources: &ResourceMap,
        marks: &mut HashMap<ResourceId, Mark>,
        path: &mut Vec<ResourceId>,
    ) -> Option<Vec<ResourceId>> {
        marks.insert(id.clone(), Mark::Gray);
        path.push(id.clone());
        for dep in resources[id].dependencies() {
            let dep_id = dep.id();
            // 依存先の存在はcheck_referencesで検証済み
            match marks.get(&dep_id).copied().unwrap_or(Mark::White) {
                Mark::Gray => {
                    let start = path.iter().position(|p| p == &dep_id).unwrap_or(0);
                    let mut cycle: Vec<ResourceId> = path[start..].to_vec();
                    cycle.push(dep_id);
                    return Some(cycle);
                }
                Mark::Black => {}
                Mark::White => {
                    if let Some(cycle) = Self::visit(&dep_id, resources, marks, path) {
                        return Some(cycle);
                    }
                }
            }
        }
        path.pop();
        marks.insert(id.clone(), Mark::Black);
        None
    }
}

/// 決定的な走査順のためのソート済みIDリスト
fn sorted_ids(resources: &ResourceMap) -> Vec<ResourceId> {
    let mut ids: Vec<ResourceId> = resources.keys().cloned().collect();
    ids.sort();
    ids
}
