//! イメージビルド用コンテキストのtar.gzアーカイブ化

use std::io::{self, Read};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;

const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// ビルドコンテキストをtar.gzアーカイブとして作成
///
/// `dockerfile` が相対パスならコンテキスト基準で解決し、アーカイブ内では
/// 常に `Dockerfile` という名前で参照できるようにする。
pub fn build_context(context_path: &Path, dockerfile: &Path) -> io::Result<Vec<u8>> {
    tracing::debug!("creating build context from: {}", context_path.display());

    let dockerfile_path = if dockerfile.is_relative() {
        context_path.join(dockerfile)
    } else {
        dockerfile.to_path_buf()
    };
    if !dockerfile_path.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Dockerfile not found: {}", dockerfile_path.display()),
        ));
    }

    let mut archive_data = Vec::new();
    {
        let encoder = GzEncoder::new(&mut archive_data, Compression::default());
        let mut tar = Builder::new(encoder);

        // コンテキストディレクトリを再帰的に追加
        tar.append_dir_all(".", context_path)?;

        // コンテキスト直下の "Dockerfile" はappend_dir_allで収録済み
        if dockerfile_path != context_path.join(DEFAULT_DOCKERFILE) {
            let mut dockerfile_content = Vec::new();
            std::fs::File::open(&dockerfile_path)?.read_to_end(&mut dockerfile_content)?;

            let mut header = tar::Header::new_gnu();
            header.set_path(DEFAULT_DOCKERFILE)?;
            header.set_size(dockerfile_content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, &dockerfile_content[..])?;
        }

        tar.finish()?;
    }

    tracing::debug!("build context created: {} bytes", archive_data.len());
    check_context_size(archive_data.len());

    Ok(archive_data)
}

/// コンテキストサイズのチェックと警告
fn check_context_size(size: usize) {
    const MAX_CONTEXT_SIZE: usize = 500 * 1024 * 1024; // 500MB

    if size > MAX_CONTEXT_SIZE {
        tracing::warn!(
            "警告: ビルドコンテキストが大きすぎます（{}MB）\n\
             .dockerignoreファイルで不要なファイルを除外することを推奨します。",
            size / 1024 / 1024
        );
    }
}
