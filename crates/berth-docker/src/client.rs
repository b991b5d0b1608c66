//! Docker Engine APIによる [`RuntimeClient`] 実装
//!
//! bollardでDockerデーモンに接続し、berth-coreのexecutorが要求する
//! イメージ・ネットワーク・コンテナの各操作を提供します。

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use bollard::Docker;
use futures_util::stream::StreamExt;
use tracing::{debug, warn};

use berth_core::RuntimeError;
use berth_core::runtime::{
    ContainerInfo, ContainerSpec, ImageBuildSpec, ImageInfo, NetworkInfo, NetworkSpec,
    RuntimeClient,
};

use crate::auth::{extract_registry, parse_image_tag, registry_credentials};
use crate::context;
use crate::convert;

/// Dockerデーモンに接続する [`RuntimeClient`]
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// ローカルのDockerデーモンに接続し、疎通を確認する
    pub async fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        debug!("connected to docker daemon");
        Ok(Self { docker })
    }

    /// 既存の接続からクライアントを作成
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

impl RuntimeClient for DockerRuntime {
    async fn image_inspect(&self, reference: &str) -> Result<ImageInfo, RuntimeError> {
        let inspect = self
            .docker
            .inspect_image(reference)
            .await
            .map_err(|e| map_not_found(e, RuntimeError::ImageNotFound(reference.to_string())))?;
        let id = inspect
            .id
            .ok_or_else(|| RuntimeError::Api(format!("イメージ '{reference}' のIDが取得できません")))?;
        Ok(ImageInfo { id })
    }

    async fn image_pull(&self, reference: &str) -> Result<(), RuntimeError> {
        let (image_name, tag) = parse_image_tag(reference);

        // レジストリから認証情報を取得（あれば）
        let credentials = extract_registry(reference).and_then(registry_credentials);

        let options = bollard::image::CreateImageOptions {
            from_image: image_name,
            tag,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, credentials);

        while let Some(info) = stream.next().await {
            let info = info.map_err(|e| {
                map_not_found(e, RuntimeError::ImageNotFound(reference.to_string()))
            })?;
            if let Some(error) = info.error {
                return Err(RuntimeError::Api(error));
            }
            if let Some(status) = info.status {
                debug!("pull {}: {}", reference, status);
            }
        }

        debug!("pulled image: {}", reference);
        Ok(())
    }

    async fn image_build(&self, spec: &ImageBuildSpec) -> Result<(), RuntimeError> {
        let context_data = context::build_context(&spec.context_path, &spec.dockerfile).map_err(
            |e| RuntimeError::BuildFailed {
                tag: spec.tag.clone(),
                message: format!("ビルドコンテキストの作成に失敗しました: {e}"),
            },
        )?;

        // Dockerfileはアーカイブ内で常に "Dockerfile" として参照できる
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: spec.tag.as_str(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        use bytes::Bytes;
        use http_body_util::{Either, Full};
        let body = Full::new(Bytes::from(context_data));
        let mut stream = self.docker.build_image(options, None, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            let output = msg.map_err(connection_or_api)?;
            if let Some(error) = output.error {
                return Err(RuntimeError::BuildFailed {
                    tag: spec.tag.clone(),
                    message: error,
                });
            }
            if let Some(error_detail) = output.error_detail {
                let message = error_detail
                    .message
                    .unwrap_or_else(|| "unknown build error".to_string());
                return Err(RuntimeError::BuildFailed {
                    tag: spec.tag.clone(),
                    message,
                });
            }
            if let Some(step) = output.stream {
                debug!("build {}: {}", spec.tag, step.trim_end());
            }
            if let Some(status) = output.status {
                debug!("build {}: {}", spec.tag, status);
            }
        }

        debug!("built image: {}", spec.tag);
        Ok(())
    }

    async fn network_inspect(&self, name: &str) -> Result<NetworkInfo, RuntimeError> {
        let network = self
            .docker
            .inspect_network(name, None::<bollard::query_parameters::InspectNetworkOptions>)
            .await
            .map_err(|e| map_not_found(e, RuntimeError::NetworkNotFound(name.to_string())))?;
        Ok(convert::network_info(network))
    }

    async fn network_create(&self, spec: &NetworkSpec) -> Result<String, RuntimeError> {
        let request = convert::network_request(spec);
        let response = self
            .docker
            .create_network(request)
            .await
            .map_err(connection_or_api)?;
        if response.id.is_empty() {
            return Err(RuntimeError::Api(format!(
                "ネットワーク '{}' のIDが返されませんでした",
                spec.name
            )));
        }
        debug!("created network: {} ({})", spec.name, response.id);
        Ok(response.id)
    }

    async fn network_remove(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_network(name)
            .await
            .map_err(|e| map_not_found(e, RuntimeError::NetworkNotFound(name.to_string())))?;
        debug!("removed network: {}", name);
        Ok(())
    }

    async fn container_inspect(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        let response = self
            .docker
            .inspect_container(name, None::<bollard::query_parameters::InspectContainerOptions>)
            .await
            .map_err(|e| map_not_found(e, RuntimeError::ContainerNotFound(name.to_string())))?;
        Ok(convert::container_info(response))
    }

    async fn container_create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let (config, options) = convert::container_config(spec);
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            // 作成時の404はイメージ未取得を意味する
            .map_err(|e| map_not_found(e, RuntimeError::ImageNotFound(spec.image.clone())))?;
        for warning in &response.warnings {
            warn!("container {}: {}", spec.name, warning);
        }
        debug!("created container: {} ({})", spec.name, response.id);
        Ok(response.id)
    }

    async fn container_start(&self, name: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .start_container(name, None::<bollard::query_parameters::StartContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            // 304 は既に起動済み
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_not_found(
                e,
                RuntimeError::ContainerNotFound(name.to_string()),
            )),
        }
    }

    async fn container_stop(
        &self,
        name: &str,
        timeout_secs: Option<i64>,
    ) -> Result<(), RuntimeError> {
        let options = timeout_secs.map(|t| bollard::container::StopContainerOptions { t });
        match self.docker.stop_container(name, options).await {
            Ok(()) => Ok(()),
            // 304 は既に停止済み
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_not_found(
                e,
                RuntimeError::ContainerNotFound(name.to_string()),
            )),
        }
    }

    async fn container_remove(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                name,
                Some(bollard::query_parameters::RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_not_found(e, RuntimeError::ContainerNotFound(name.to_string())))?;
        debug!("removed container: {}", name);
        Ok(())
    }
}

/// 接続エラーの可能性をチェック
fn connection_or_api(err: bollard::errors::Error) -> RuntimeError {
    let err_str = err.to_string();
    if err_str.contains("Connection refused") || err_str.contains("No such file or directory") {
        RuntimeError::Connection(err_str)
    } else {
        RuntimeError::Api(err_str)
    }
}

/// 404を「見つからない」センチネルに読み替える
fn map_not_found(err: bollard::errors::Error, on_not_found: RuntimeError) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => on_not_found,
        other => connection_or_api(other),
    }
}
