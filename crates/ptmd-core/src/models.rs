//! 核心数据模型定义
//!
//! 字段名通过 serde 映射到后端的JSON契约（驼峰、葡萄牙语字段名）

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// 后端的 `Boolean` 可能为 null，按 false 处理
fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// 性别枚举
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sex {
    #[default]
    Masculino,
    Feminino,
    Outro,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Masculino => "MASCULINO",
            Sex::Feminino => "FEMININO",
            Sex::Outro => "OUTRO",
        }
    }

    /// 解析命令行/表单输入，大小写不敏感
    pub fn parse(value: &str) -> Option<Sex> {
        match value.trim().to_uppercase().as_str() {
            "MASCULINO" | "M" => Some(Sex::Masculino),
            "FEMININO" | "F" => Some(Sex::Feminino),
            "OUTRO" | "O" => Some(Sex::Outro),
            _ => None,
        }
    }
}

/// 患者基本信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(rename = "sexo", default)]
    pub sex: Option<Sex>,
    #[serde(rename = "dataNascimento", default)]
    pub birth_date: Option<NaiveDate>,
}

/// 影像及其AI/确认状态
///
/// `ai_diagnosis`/`confidence` 由上游分类器写入，客户端只读；
/// `final_diagnosis` 与 `confirmed` 只能由确认操作一起改变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: i64,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub ai_diagnosis: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub mult_class: Option<String>,
    #[serde(default)]
    pub mult_class_confidence: Option<f64>,
    #[serde(default)]
    pub final_diagnosis: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub confirmed: bool,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl Image {
    /// 置信度百分比文本，如 "87.5%"
    pub fn confidence_percent(&self) -> Option<String> {
        self.confidence.map(|c| format!("{:.1}%", c * 100.0))
    }
}

/// 旧版单影像会诊直接挂在会诊上的诊断字段，仅供展示
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyVerdict {
    #[serde(default)]
    pub ai_diagnosis: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub mult_class: Option<String>,
    #[serde(default)]
    pub mult_class_confidence: Option<f64>,
    #[serde(default)]
    pub final_diagnosis: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub confirmed: bool,
}

impl LegacyVerdict {
    pub fn is_empty(&self) -> bool {
        self.ai_diagnosis.is_none() && self.final_diagnosis.is_none() && !self.confirmed
    }
}

/// 会诊：一次就诊及其全部影像
///
/// 聚合状态不存储，始终由影像的确认状态计算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: i64,
    pub patient: Patient,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub legacy: LegacyVerdict,
}

impl Consultation {
    pub fn image(&self, image_id: i64) -> Option<&Image> {
        self.images.iter().find(|img| img.id == image_id)
    }
}

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// 管理员 - 可进入所有区域
    Admin,
    /// 医生 - 创建会诊并确认诊断
    Medico,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Medico => "MEDICO",
        }
    }
}

/// 持久化的最小用户记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub email: String,
    pub role: Role,
}

/// 登录请求
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 登录响应
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "type", default)]
    pub token_type: Option<String>,
    pub email: String,
    pub role: Role,
}

/// 医生注册请求
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub nome: String,
    pub cpf: String,
    pub crm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_nascimento: Option<NaiveDate>,
    pub email: String,
    pub password: String,
}

/// 管理员仪表盘统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounts {
    #[serde(default)]
    pub total_images: u64,
    #[serde(default)]
    pub total_consultations: u64,
    #[serde(default)]
    pub total_patients: u64,
}

/// 修改密码请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// 待上传的影像文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// 新建会诊时提交的患者字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatient {
    pub name: String,
    pub cpf: String,
    pub sex: Sex,
    pub birth_date: Option<NaiveDate>,
}

/// 新建会诊请求（multipart）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultationCreateRequest {
    pub patient: NewPatient,
    pub images: Vec<ImageFile>,
}

impl ConsultationCreateRequest {
    /// multipart 文本字段，按提交顺序
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("patient.nome", self.patient.name.clone()),
            ("patient.cpf", self.patient.cpf.clone()),
            ("patient.sexo", self.patient.sex.as_str().to_string()),
        ];
        if let Some(date) = self.patient.birth_date {
            fields.push(("patient.dataNascimento", date.format("%Y-%m-%d").to_string()));
        }
        fields
    }
}
