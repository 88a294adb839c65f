//! 影像文件获取
//!
//! 影像二进制通过 `files/by-name/{文件名}` 获取，加载失败时用固定的占位图代替

use crate::client::ApiClient;
use ptmd_core::utils::file_name_from_path;
use ptmd_core::{PtmdError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::{debug, warn};

/// 影像无法加载时显示的占位图
pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300" viewBox="0 0 400 300"><rect width="400" height="300" fill="#f0f0f0"/><text x="200" y="150" font-family="sans-serif" font-size="16" fill="#999999" text-anchor="middle">Imagem não carregada</text></svg>"##;

pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/svg+xml";

/// 详情视图中一张影像的展示内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePreview {
    Loaded { content_type: String, bytes: Vec<u8> },
    Placeholder,
}

impl ImagePreview {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ImagePreview::Placeholder)
    }

    pub fn content_type(&self) -> &str {
        match self {
            ImagePreview::Loaded { content_type, .. } => content_type,
            ImagePreview::Placeholder => PLACEHOLDER_CONTENT_TYPE,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            ImagePreview::Loaded { bytes, .. } => bytes,
            ImagePreview::Placeholder => PLACEHOLDER_SVG.as_bytes(),
        }
    }
}

impl ApiClient {
    /// 由影像的 `filePath` 得到下载地址，只取最后一段路径作为文件名
    pub fn image_url(&self, file_path: &str) -> Result<String> {
        let file_name = file_name_from_path(file_path.trim());
        if file_name.is_empty() {
            return Err(PtmdError::ImageLoad(format!("empty file path '{}'", file_path)));
        }

        let mut url = Url::parse(self.base_url())
            .map_err(|e| PtmdError::Config(format!("invalid base URL '{}': {}", self.base_url(), e)))?;
        url.path_segments_mut()
            .map_err(|_| PtmdError::Config(format!("base URL cannot be a base: {}", self.base_url())))?
            .pop_if_empty()
            .extend(&["files", "by-name", file_name]);

        Ok(url.to_string())
    }

    /// 下载影像二进制，任何失败都映射为 `ImageLoad`
    pub async fn fetch_image(&self, file_path: &str) -> Result<(String, Vec<u8>)> {
        let url = self.image_url(file_path)?;
        debug!("Fetching image {}", url);

        let response = self
            .authorized(self.http().get(&url))
            .send()
            .await
            .map_err(|e| PtmdError::ImageLoad(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PtmdError::ImageLoad(format!("HTTP {} for {}", status.as_u16(), file_path)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        if !content_type.starts_with("image/") {
            return Err(PtmdError::ImageLoad(format!(
                "unexpected content type '{}' for {}",
                content_type, file_path
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PtmdError::ImageLoad(e.to_string()))?;
        if bytes.is_empty() {
            return Err(PtmdError::ImageLoad(format!("empty body for {}", file_path)));
        }

        Ok((content_type, bytes.to_vec()))
    }

    /// 加载影像预览，失败时返回占位图，不影响详情视图的其余部分
    pub async fn load_image_preview(&self, file_path: &str) -> ImagePreview {
        match self.fetch_image(file_path).await {
            Ok((content_type, bytes)) => ImagePreview::Loaded { content_type, bytes },
            Err(e) => {
                warn!("Image {} replaced by placeholder: {}", file_path, e);
                ImagePreview::Placeholder
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_backend, test_client};
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    #[test]
    fn test_image_url_uses_last_segment() {
        let client = test_client("http://localhost:8080/api");
        assert_eq!(
            client.image_url("uploads/2024/ear.png").unwrap(),
            "http://localhost:8080/api/files/by-name/ear.png"
        );
        assert_eq!(
            client.image_url(r"C:\uploads\ear 1.png").unwrap(),
            "http://localhost:8080/api/files/by-name/ear%201.png"
        );
        assert_eq!(
            client.image_url("plain.jpg").unwrap(),
            "http://localhost:8080/api/files/by-name/plain.jpg"
        );
        assert!(client.image_url("  ").is_err());
    }

    #[tokio::test]
    async fn test_load_image_preview() {
        let router = Router::new().route(
            "/api/files/by-name/:name",
            get(|Path(name): Path<String>| async move {
                match name.as_str() {
                    "ear 1.png" => Ok(([("content-type", "image/png")], vec![0x89u8, 0x50, 0x4e, 0x47])),
                    "page.html" => Ok(([("content-type", "text/html")], b"<html></html>".to_vec())),
                    _ => Err(StatusCode::NOT_FOUND),
                }
            }),
        );
        let client = test_client(&spawn_backend(router).await);

        let preview = client.load_image_preview("uploads/ear 1.png").await;
        assert_eq!(
            preview,
            ImagePreview::Loaded {
                content_type: "image/png".into(),
                bytes: vec![0x89, 0x50, 0x4e, 0x47],
            }
        );

        let missing = client.load_image_preview("uploads/missing.png").await;
        assert!(missing.is_placeholder());
        assert_eq!(missing.content_type(), PLACEHOLDER_CONTENT_TYPE);
        assert!(String::from_utf8_lossy(missing.bytes()).contains("Imagem não carregada"));

        assert!(client.load_image_preview("page.html").await.is_placeholder());
    }

    #[tokio::test]
    async fn test_fetch_image_error_is_image_load() {
        let client = test_client("http://127.0.0.1:1/api");
        let err = client.fetch_image("a.png").await.unwrap_err();
        assert!(matches!(err, PtmdError::ImageLoad(_)));
    }
}
