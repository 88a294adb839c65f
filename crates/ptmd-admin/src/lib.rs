//! # PTMD管理模块
//!
//! 提供客户端配置、会话上下文和管理员控制台：
//! - 分层配置加载、验证与保存
//! - token持久化与基于角色的路由守卫
//! - 仪表盘统计、数据库备份下载、修改密码

pub mod backup;
pub mod config;
pub mod console;
pub mod session;

pub use backup::{backup_file_name, write_backup, BackupReceipt};
pub use config::{ApiConfig, BackupConfig, ClientConfig, ConfigValidator, LoggingConfig, SessionConfig};
pub use console::{AdminConsole, ConsoleState, PasswordDialog, PasswordForm, PASSWORD_DIALOG_AUTO_CLOSE};
pub use session::{register_medico, validate_registration, SessionContext, SessionStore, StoredSession};
