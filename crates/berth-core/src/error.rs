//! エラー型定義

use thiserror::Error;

use crate::resource::ResourceId;

/// グラフ構築・検証のエラー型
///
/// いずれも望ましい状態の組み立てミス（呼び出し側のバグ）であり、
/// 一時的な障害ではない。パニックは使わない。
#[derive(Error, Debug)]
pub enum GraphError {
    /// 空のリソースID
    #[error("リソースIDが空です")]
    EmptyId,

    /// ID重複
    #[error("リソース '{0}' は既にグラフに追加されています")]
    DuplicateId(ResourceId),

    /// 依存先がグラフに存在しない
    #[error("リソース '{id}' の依存先 '{dependency}' がグラフに存在しません")]
    MissingDependency {
        id: ResourceId,
        dependency: ResourceId,
    },

    /// 循環依存。経路全体を `a -> b -> a` 形式で保持する
    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),

    /// リソース単体の検証失敗
    #[error("リソース '{id}' の検証に失敗しました: {message}")]
    Validation { id: ResourceId, message: String },

    /// アルゴリズムの内部不変条件違反
    #[error("内部エラー: {0}")]
    Internal(String),
}

/// コンテナランタイムクライアントのエラー型
///
/// 「見つからない」系の3つはセンチネルとして扱われ、destroy時には
/// 成功と見なされる。
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("イメージ '{0}' が見つかりません")]
    ImageNotFound(String),

    #[error("ネットワーク '{0}' が見つかりません")]
    NetworkNotFound(String),

    #[error("コンテナ '{0}' が見つかりません")]
    ContainerNotFound(String),

    #[error("コンテナランタイムに接続できません: {0}")]
    Connection(String),

    #[error("イメージ '{tag}' のビルドに失敗しました: {message}")]
    BuildFailed { tag: String, message: String },

    #[error("ランタイムAPIエラー: {0}")]
    Api(String),
}

impl RuntimeError {
    /// 「見つからない」センチネルかどうか
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ImageNotFound(_) | Self::NetworkNotFound(_) | Self::ContainerNotFound(_)
        )
    }
}

/// 適用・破棄・状態取得のエラー型
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// グラフ由来のエラー
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// ランタイム操作の失敗。リソースIDと操作名で文脈を付ける
    #[error("リソース '{id}' の操作 '{operation}' に失敗しました: {source}")]
    Runtime {
        id: ResourceId,
        operation: &'static str,
        #[source]
        source: RuntimeError,
    },

    /// 同一レベル内の別リソースが失敗したことによるキャンセル
    #[error("リソース '{id}' の処理は同一レベル内の失敗によりキャンセルされました")]
    Cancelled { id: ResourceId },

    /// 依存イメージのIDが今回の適用で解決されていない（順序保証の破れ）
    #[error("リソース '{id}' が参照するイメージ '{image}' はこの実行で解決されていません")]
    ImageNotResolved { id: ResourceId, image: ResourceId },

    /// ネットワーク参照から名前を解決できない
    #[error("リソース '{id}' のネットワーク参照 '{reference}' からネットワーク名を解決できません")]
    NetworkNameUnresolved {
        id: ResourceId,
        reference: ResourceId,
    },

    /// pull_policy=never なのにローカルにイメージが無い
    #[error("リソース '{id}': イメージ '{reference}' がローカルに存在しません（pull_policy: never）")]
    ImageMissingLocally { id: ResourceId, reference: String },
}
