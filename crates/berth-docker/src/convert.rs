//! コンテナ・ネットワーク仕様から Docker API パラメータへの変換

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use std::collections::HashMap;

use bollard::container::{Config, CreateContainerOptions, NetworkingConfig};
use bollard::models::{
    ContainerInspectResponse, ContainerStateStatusEnum, EndpointSettings, HostConfig,
    Network as DockerNetwork, NetworkCreateRequest, PortBinding,
    RestartPolicy as DockerRestartPolicy, RestartPolicyNameEnum,
};

use berth_core::runtime::{ContainerInfo, ContainerSpec, NetworkInfo, NetworkSpec};
use berth_core::{RestartPolicy, Volume};

/// Berth管理下のリソースに付与するラベル
pub const MANAGED_LABEL: &str = "berth.managed";

/// コンテナ仕様をDockerのコンテナ設定に変換
pub fn container_config(spec: &ContainerSpec) -> (Config<String>, CreateContainerOptions<String>) {
    // 環境変数
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

    // ポートバインディング
    let mut port_bindings = HashMap::new();
    let mut exposed_ports = HashMap::new();
    for port in &spec.ports {
        let container_port = format!("{}/{}", port.container, port.protocol.as_str());
        exposed_ports.insert(container_port.clone(), HashMap::new());

        let host_ip = port.host_ip.as_deref().unwrap_or("0.0.0.0");
        port_bindings.insert(
            container_port,
            Some(vec![PortBinding {
                host_ip: Some(host_ip.to_string()),
                host_port: Some(port.host.to_string()),
            }]),
        );
    }

    // ボリュームバインディング
    let binds: Vec<String> = spec.volumes.iter().map(bind_entry).collect();

    let restart_policy = match spec.restart_policy {
        RestartPolicy::No => None,
        policy => Some(DockerRestartPolicy {
            name: Some(restart_policy_name(policy)),
            maximum_retry_count: None,
        }),
    };

    let host_config = Some(HostConfig {
        port_bindings: Some(port_bindings),
        binds: Some(binds),
        network_mode: spec.networks.first().cloned(),
        extra_hosts: if spec.extra_hosts.is_empty() {
            None
        } else {
            Some(spec.extra_hosts.clone())
        },
        restart_policy,
        ..Default::default()
    });

    let mut labels = spec.labels.clone();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

    // 各ネットワークにコンテナ名でエイリアスを張る
    let networking_config = if spec.networks.is_empty() {
        None
    } else {
        let endpoints = spec
            .networks
            .iter()
            .map(|network| {
                (
                    network.clone(),
                    EndpointSettings {
                        aliases: Some(vec![spec.name.clone()]),
                        ..Default::default()
                    },
                )
            })
            .collect();
        Some(NetworkingConfig {
            endpoints_config: endpoints,
        })
    };

    let config = Config {
        image: Some(spec.image.clone()),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        host_config,
        labels: Some(labels),
        cmd: if spec.command.is_empty() {
            None
        } else {
            Some(spec.command.clone())
        },
        user: spec.user.clone(),
        networking_config,
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: spec.name.clone(),
        platform: None,
    };

    (config, options)
}

/// ネットワーク仕様をDockerの作成リクエストに変換
pub fn network_request(spec: &NetworkSpec) -> NetworkCreateRequest {
    let mut labels = spec.labels.clone();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

    NetworkCreateRequest {
        name: spec.name.clone(),
        driver: Some(spec.driver.clone()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// inspect結果をランタイム非依存のコンテナ情報に変換
pub fn container_info(response: ContainerInspectResponse) -> ContainerInfo {
    let state = response.state.as_ref();
    ContainerInfo {
        id: response.id.clone().unwrap_or_default(),
        image_id: response.image.clone().unwrap_or_default(),
        state: state_label(state.and_then(|s| s.status.as_ref())),
        running: state.and_then(|s| s.running).unwrap_or(false),
        labels: response
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default(),
    }
}

/// inspect結果をランタイム非依存のネットワーク情報に変換
pub fn network_info(network: DockerNetwork) -> NetworkInfo {
    NetworkInfo {
        id: network.id.unwrap_or_default(),
        name: network.name.unwrap_or_default(),
        driver: network.driver.unwrap_or_default(),
        labels: network.labels.unwrap_or_default(),
    }
}

fn state_label(status: Option<&ContainerStateStatusEnum>) -> String {
    let label = match status {
        Some(ContainerStateStatusEnum::CREATED) => "created",
        Some(ContainerStateStatusEnum::RUNNING) => "running",
        Some(ContainerStateStatusEnum::PAUSED) => "paused",
        Some(ContainerStateStatusEnum::RESTARTING) => "restarting",
        Some(ContainerStateStatusEnum::REMOVING) => "removing",
        Some(ContainerStateStatusEnum::EXITED) => "exited",
        Some(ContainerStateStatusEnum::DEAD) => "dead",
        _ => "",
    };
    label.to_string()
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

fn bind_entry(volume: &Volume) -> String {
    let mode = if volume.read_only { "ro" } else { "rw" };
    // 相対パスはカレントディレクトリ基準で絶対化する
    let host = if volume.host.is_relative() {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&volume.host),
            Err(_) => volume.host.clone(),
        }
    } else {
        volume.host.clone()
    };
    format!("{}:{}:{}", host.display(), volume.container.display(), mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{Port, Protocol};
    use bollard::models::ContainerState;
    use std::path::PathBuf;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_string(),
            image: "sha256:abc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_container_config_basic() {
        let (config, options) = container_config(&spec("web"));

        assert_eq!(config.image, Some("sha256:abc".to_string()));
        assert_eq!(options.name, "web");
        assert!(options.platform.is_none());
    }

    #[test]
    fn test_container_config_with_environment() {
        let mut s = spec("api");
        s.env
            .insert("DATABASE_URL".to_string(), "postgres://localhost".to_string());
        s.env.insert("DEBUG".to_string(), "true".to_string());

        let (config, _) = container_config(&s);

        let env = config.env.unwrap();
        assert!(env.contains(&"DATABASE_URL=postgres://localhost".to_string()));
        assert!(env.contains(&"DEBUG=true".to_string()));
    }

    #[test]
    fn test_container_config_with_ports() {
        let mut s = spec("web");
        s.ports = vec![
            Port {
                host: 8080,
                container: 3000,
                protocol: Protocol::Tcp,
                host_ip: None,
            },
            Port {
                host: 5432,
                container: 5432,
                protocol: Protocol::Tcp,
                host_ip: Some("127.0.0.1".to_string()),
            },
        ];

        let (config, _) = container_config(&s);

        let exposed_ports = config.exposed_ports.unwrap();
        assert!(exposed_ports.contains_key("3000/tcp"));
        assert!(exposed_ports.contains_key("5432/tcp"));

        let host_config = config.host_config.unwrap();
        let port_bindings = host_config.port_bindings.unwrap();

        let binding_3000 = port_bindings.get("3000/tcp").unwrap().as_ref().unwrap();
        assert_eq!(binding_3000[0].host_port, Some("8080".to_string()));
        assert_eq!(binding_3000[0].host_ip, Some("0.0.0.0".to_string()));

        let binding_5432 = port_bindings.get("5432/tcp").unwrap().as_ref().unwrap();
        assert_eq!(binding_5432[0].host_ip, Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_container_config_with_udp_port() {
        let mut s = spec("dns");
        s.ports = vec![Port {
            host: 53,
            container: 53,
            protocol: Protocol::Udp,
            host_ip: None,
        }];

        let (config, _) = container_config(&s);

        let exposed_ports = config.exposed_ports.unwrap();
        assert!(exposed_ports.contains_key("53/udp"));
    }

    #[test]
    fn test_container_config_with_volumes() {
        let mut s = spec("db");
        s.volumes = vec![
            Volume {
                host: PathBuf::from("/data"),
                container: PathBuf::from("/var/lib/data"),
                read_only: false,
            },
            Volume {
                host: PathBuf::from("/config"),
                container: PathBuf::from("/etc/config"),
                read_only: true,
            },
        ];

        let (config, _) = container_config(&s);

        let host_config = config.host_config.unwrap();
        let binds = host_config.binds.unwrap();

        assert_eq!(binds.len(), 2);
        assert!(binds[0].contains("/data:/var/lib/data:rw"));
        assert!(binds[1].contains("/config:/etc/config:ro"));
    }

    #[test]
    fn test_container_config_with_networks() {
        let mut s = spec("web");
        s.networks = vec!["front".to_string(), "back".to_string()];

        let (config, _) = container_config(&s);

        // 先頭のネットワークがnetwork_modeになる
        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.network_mode, Some("front".to_string()));

        // 全ネットワークにコンテナ名のエイリアス
        let endpoints = config.networking_config.unwrap().endpoints_config;
        assert_eq!(endpoints.len(), 2);
        for network in ["front", "back"] {
            let endpoint = endpoints.get(network).unwrap();
            assert_eq!(endpoint.aliases, Some(vec!["web".to_string()]));
        }
    }

    #[test]
    fn test_container_config_without_networks() {
        let (config, _) = container_config(&spec("standalone"));

        assert!(config.networking_config.is_none());
        assert_eq!(config.host_config.unwrap().network_mode, None);
    }

    #[test]
    fn test_managed_label_injected() {
        let mut s = spec("web");
        s.labels.insert("app".to_string(), "web".to_string());

        let (config, _) = container_config(&s);

        let labels = config.labels.unwrap();
        assert_eq!(labels.get(MANAGED_LABEL), Some(&"true".to_string()));
        assert_eq!(labels.get("app"), Some(&"web".to_string()));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_empty_command_is_omitted() {
        let (config, _) = container_config(&spec("web"));
        assert!(config.cmd.is_none());

        let mut s = spec("worker");
        s.command = vec!["run".to_string(), "--once".to_string()];
        let (config, _) = container_config(&s);
        assert_eq!(config.cmd, Some(vec!["run".to_string(), "--once".to_string()]));
    }

    #[test]
    fn test_restart_policy_mapping() {
        let (config, _) = container_config(&spec("web"));
        assert!(config.host_config.unwrap().restart_policy.is_none());

        let mut s = spec("web");
        s.restart_policy = RestartPolicy::UnlessStopped;
        let (config, _) = container_config(&s);
        let policy = config.host_config.unwrap().restart_policy.unwrap();
        assert_eq!(policy.name, Some(RestartPolicyNameEnum::UNLESS_STOPPED));
    }

    #[test]
    fn test_network_request_carries_driver_and_labels() {
        let mut labels = HashMap::new();
        labels.insert("env".to_string(), "dev".to_string());
        let request = network_request(&NetworkSpec {
            name: "app-net".to_string(),
            driver: "bridge".to_string(),
            labels,
        });

        assert_eq!(request.name, "app-net");
        assert_eq!(request.driver, Some("bridge".to_string()));
        let labels = request.labels.unwrap();
        assert_eq!(labels.get(MANAGED_LABEL), Some(&"true".to_string()));
        assert_eq!(labels.get("env"), Some(&"dev".to_string()));
    }

    #[test]
    fn test_container_info_from_inspect() {
        let response = ContainerInspectResponse {
            id: Some("ctr-1".to_string()),
            image: Some("sha256:abc".to_string()),
            state: Some(ContainerState {
                status: Some(ContainerStateStatusEnum::RUNNING),
                running: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = container_info(response);
        assert_eq!(info.id, "ctr-1");
        assert_eq!(info.image_id, "sha256:abc");
        assert_eq!(info.state, "running");
        assert!(info.running);
    }

    #[test]
    fn test_container_info_defaults_when_fields_missing() {
        let info = container_info(ContainerInspectResponse::default());
        assert_eq!(info.state, "");
        assert!(!info.running);
        assert!(info.labels.is_empty());
    }
}
