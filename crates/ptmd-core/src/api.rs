//! 后端接口抽象
//!
//! 工作流与管理模块只依赖这些trait，HTTP实现位于 `ptmd-integration`

use crate::diagnosis::Diagnosis;
use crate::error::Result;
use crate::models::{
    AuthResponse, ChangePasswordRequest, Consultation, ConsultationCreateRequest,
    DashboardCounts, Image, LoginRequest, RegisterRequest,
};
use async_trait::async_trait;

/// 会诊查询条件，已去除首尾空白且省略空值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsultationQuery {
    pub name: Option<String>,
    pub cpf: Option<String>,
}

impl ConsultationQuery {
    pub fn is_unfiltered(&self) -> bool {
        self.name.is_none() && self.cpf.is_none()
    }

    /// 查询字符串参数
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(name) = &self.name {
            params.push(("nome", name.clone()));
        }
        if let Some(cpf) = &self.cpf {
            params.push(("cpf", cpf.clone()));
        }
        params
    }
}

/// 医生端会诊接口
#[async_trait]
pub trait ConsultationApi: Send + Sync {
    /// 创建会诊（患者 + 影像一次提交）
    async fn create_consultation(&self, request: &ConsultationCreateRequest) -> Result<Consultation>;

    /// 列出当前医生的会诊
    async fn list_consultations(&self, query: &ConsultationQuery) -> Result<Vec<Consultation>>;

    /// 获取会诊详情
    async fn get_consultation(&self, consultation_id: i64) -> Result<Consultation>;

    /// 确认单张影像的诊断
    async fn confirm_image(&self, image_id: i64, diagnosis: Diagnosis) -> Result<Image>;

    /// 确认旧版单影像会诊
    async fn confirm_consultation(&self, consultation_id: i64, final_diagnosis: &str) -> Result<Consultation>;
}

/// 管理员接口
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn dashboard(&self) -> Result<DashboardCounts>;

    /// 下载数据库备份归档
    async fn backup(&self) -> Result<Vec<u8>>;

    async fn change_password(&self, request: &ChangePasswordRequest) -> Result<()>;
}

/// 认证接口
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse>;

    async fn register(&self, request: &RegisterRequest) -> Result<()>;
}
