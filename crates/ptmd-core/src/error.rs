//! 错误定义模块

use thiserror::Error;

/// 本地表单校验错误
///
/// 在提交前发现，永远不会触达网络
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Por favor, selecione pelo menos uma imagem")]
    MissingImages,

    #[error("Nome do paciente é obrigatório")]
    MissingPatientName,

    #[error("CPF do paciente é obrigatório")]
    MissingPatientCpf,

    #[error("Máximo de {limit} imagens por consulta")]
    TooManyImages { limit: usize },

    #[error("Tipo de imagem não suportado: {0}")]
    UnsupportedImageType(String),

    #[error("As senhas não coincidem")]
    PasswordMismatch,

    #[error("A senha deve ter no mínimo {min} caracteres")]
    PasswordTooShort { min: usize },

    #[error("Campo obrigatório: {0}")]
    MissingField(&'static str),

    #[error("Diagnóstico inválido: '{0}'")]
    InvalidDiagnosis(String),
}

/// PTMD客户端统一错误类型
#[derive(Error, Debug)]
pub enum PtmdError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// 非2xx响应或传输失败，`message` 为服务端提供的文本或兜底文案
    #[error("{message}")]
    Request { status: Option<u16>, message: String },

    #[error("影像加载失败: {0}")]
    ImageLoad(String),

    #[error("会话错误: {0}")]
    Session(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("操作进行中: {0}")]
    Busy(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

impl PtmdError {
    /// 构造请求错误，服务端消息为空时使用兜底文案
    pub fn request(status: Option<u16>, server_message: Option<String>, fallback: &str) -> Self {
        let message = server_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        PtmdError::Request { status, message }
    }

    /// 横幅中显示给用户的文本
    pub fn banner_message(&self) -> String {
        self.to_string()
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PtmdError::Validation(_))
    }

    /// HTTP状态码（如有）
    pub fn status(&self) -> Option<u16> {
        match self {
            PtmdError::Request { status, .. } => *status,
            _ => None,
        }
    }
}

/// PTMD客户端统一结果类型
pub type Result<T> = std::result::Result<T, PtmdError>;
