//! 会话上下文
//!
//! token与最小用户记录持久化在本地JSON文件中，进程启动时 `init` 加载，
//! 登出时 `teardown` 清除。路由守卫按角色放行。

use ptmd_core::{
    AuthApi, LoginRequest, PtmdError, RegisterRequest, Result, Role, SessionUser, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 注册时密码的最小长度
pub const MIN_PASSWORD_LEN: usize = 6;

/// 持久化的会话记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: SessionUser,
}

/// 会话文件存储
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取会话；文件不存在时返回 `None`
    pub async fn load(&self) -> Result<Option<StoredSession>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub async fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(session)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// 显式作用域的会话上下文，注入到需要认证的组件中
#[derive(Debug)]
pub struct SessionContext {
    store: SessionStore,
    current: Option<StoredSession>,
}

impl SessionContext {
    /// 从持久化存储恢复会话
    ///
    /// 损坏的会话文件按未登录处理
    pub async fn init(store: SessionStore) -> Result<Self> {
        let current = match store.load().await {
            Ok(current) => current,
            Err(PtmdError::Serialization(e)) => {
                warn!("Ignoring unreadable session file {}: {}", store.path().display(), e);
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(session) = &current {
            info!("Restored session for {} ({})", session.user.email, session.user.role.as_str());
        }
        Ok(Self { store, current })
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.current.as_ref().map(|s| &s.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.token.as_str())
    }

    /// 登录并持久化token和用户记录
    pub async fn login<A>(&mut self, api: &A, email: &str, password: &str) -> Result<SessionUser>
    where
        A: AuthApi + ?Sized,
    {
        if email.trim().is_empty() {
            return Err(ValidationError::MissingField("email").into());
        }
        if password.is_empty() {
            return Err(ValidationError::MissingField("password").into());
        }

        let response = api
            .login(&LoginRequest {
                email: email.trim().to_string(),
                password: password.to_string(),
            })
            .await?;

        let session = StoredSession {
            token: response.token,
            user: SessionUser {
                email: response.email,
                role: response.role,
            },
        };
        self.store.save(&session).await?;

        let user = session.user.clone();
        self.current = Some(session);
        Ok(user)
    }

    /// 登出：清除内存与持久化的会话
    pub async fn teardown(&mut self) -> Result<()> {
        self.store.clear().await?;
        if let Some(session) = self.current.take() {
            info!("Session for {} cleared", session.user.email);
        }
        Ok(())
    }

    /// 路由守卫：管理员可进入所有区域，医生只能进入医生区域
    pub fn require(&self, area: Role) -> Result<&SessionUser> {
        let user = self
            .user()
            .ok_or_else(|| PtmdError::Session("Sessão expirada, faça login novamente".to_string()))?;

        match (user.role, area) {
            (Role::Admin, _) | (Role::Medico, Role::Medico) => Ok(user),
            (Role::Medico, Role::Admin) => Err(PtmdError::Permission(format!(
                "{} não tem acesso à área {}",
                user.email,
                area.as_str()
            ))),
        }
    }
}

/// 校验医生注册表单
pub fn validate_registration(request: &RegisterRequest) -> std::result::Result<(), ValidationError> {
    let required = [
        ("nome", &request.nome),
        ("cpf", &request.cpf),
        ("crm", &request.crm),
        ("email", &request.email),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}

/// 医生自助注册，本地校验失败时不会发出请求
pub async fn register_medico<A>(api: &A, request: &RegisterRequest) -> Result<()>
where
    A: AuthApi + ?Sized,
{
    validate_registration(request)?;
    api.register(request).await
}
