//! # PTMD集成模块
//!
//! 通过 `reqwest` 实现PTMD后端的REST契约，包括：
//! - 会诊创建（multipart）、查询、详情和诊断确认
//! - 管理员仪表盘、数据库备份和修改密码
//! - 登录与医生注册
//! - 影像获取及加载失败时的占位图

pub mod admin;
pub mod auth;
pub mod client;
pub mod consultations;
pub mod files;

pub use client::{extract_error_message, ApiClient, ERROR_MESSAGE_HEADER};
pub use files::{ImagePreview, PLACEHOLDER_CONTENT_TYPE, PLACEHOLDER_SVG};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::client::ApiClient;
    use axum::Router;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// 在随机端口启动模拟后端，返回 `http://127.0.0.1:{port}/api`
    pub(crate) async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    pub(crate) fn test_client(base_url: &str) -> ApiClient {
        ApiClient::new(base_url, Duration::from_secs(5), Duration::from_secs(2)).unwrap()
    }

    pub(crate) fn image_json(id: i64, confirmed: bool) -> Value {
        json!({
            "id": id,
            "fileName": format!("ear{}.png", id),
            "filePath": format!("uploads/ear{}.png", id),
            "fileSize": 1024,
            "contentType": "image/png",
            "aiDiagnosis": "aom",
            "confidence": 0.82,
            "finalDiagnosis": null,
            "confirmed": confirmed,
            "createdAt": "2024-10-30T12:00:00"
        })
    }

    pub(crate) fn consultation_json(id: i64, images: usize) -> Value {
        let images: Vec<Value> = (0..images)
            .map(|i| image_json(id * 100 + i as i64, false))
            .collect();
        json!({
            "id": id,
            "patient": {"id": id, "nome": "Paciente", "cpf": "12345678900", "sexo": "MASCULINO"},
            "images": images,
            "createdAt": "2024-10-30T12:00:00"
        })
    }
}
