//! レジストリ認証とイメージ参照の解析

use bollard::auth::DockerCredentials;

/// イメージ名とタグを分離
/// 例: "redis:7-alpine" -> ("redis", "7-alpine")
///     "postgres" -> ("postgres", "latest")
pub fn parse_image_tag(image: &str) -> (&str, &str) {
    // レジストリポートの ':' をタグと誤認しない
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

/// イメージ名からレジストリを抽出
pub fn extract_registry(image: &str) -> Option<&str> {
    // ghcr.io/owner/repo:tag のような形式では最初の / の前がレジストリ
    let (first, _) = image.split_once('/')?;
    // レジストリは . または : を含む（例: ghcr.io, localhost:5000）
    if first.contains('.') || first.contains(':') {
        Some(first)
    } else {
        None
    }
}

/// Docker config.json からレジストリの認証情報を取得
pub fn registry_credentials(registry: &str) -> Option<DockerCredentials> {
    // ~/.docker/config.json を読み込み
    let home = std::env::var("HOME").ok()?;
    let config_path = format!("{}/.docker/config.json", home);
    let config_content = std::fs::read_to_string(&config_path).ok()?;
    let config: serde_json::Value = serde_json::from_str(&config_content).ok()?;

    // auths セクションからレジストリの認証情報を取得
    let auths = config.get("auths")?.as_object()?;
    let auth_entry = auths.get(registry)?;
    let auth_b64 = auth_entry.get("auth")?.as_str()?;

    // Base64 デコード (username:password 形式)
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth_b64)
        .ok()?;
    let auth_str = String::from_utf8(decoded).ok()?;
    let (username, password) = auth_str.split_once(':')?;

    tracing::debug!("using registry credentials for {}", registry);

    Some(DockerCredentials {
        username: Some(username.to_string()),
        password: Some(password.to_string()),
        serveraddress: Some(registry.to_string()),
        ..Default::default()
    })
}
