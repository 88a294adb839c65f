//! 管理员控制台
//!
//! 仪表盘统计、数据库备份下载和修改密码对话框

use crate::backup::{write_backup, BackupReceipt};
use crate::session::MIN_PASSWORD_LEN;
use chrono::Utc;
use ptmd_core::{AdminApi, ChangePasswordRequest, DashboardCounts, PtmdError, Result, ValidationError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 修改密码成功后对话框自动关闭的延迟
pub const PASSWORD_DIALOG_AUTO_CLOSE: Duration = Duration::from_secs(2);

/// 仪表盘加载失败时的固定提示
pub const DASHBOARD_FALLBACK: &str = "Erro ao carregar dashboard";

/// 修改密码表单
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordForm {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordForm {
    /// 先检查两次输入一致，再检查长度
    pub fn validate(&self) -> std::result::Result<ChangePasswordRequest, ValidationError> {
        if self.new_password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
        }
        Ok(ChangePasswordRequest {
            current_password: self.current_password.clone(),
            new_password: self.new_password.clone(),
        })
    }
}

/// 修改密码对话框状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordDialog {
    pub open: bool,
    pub form: PasswordForm,
    pub error: Option<String>,
    pub success: bool,
    pub submitting: bool,
}

/// 控制台状态
#[derive(Debug, Clone, Default)]
pub struct ConsoleState {
    pub dashboard: Option<DashboardCounts>,
    /// 可关闭的错误横幅
    pub error: Option<String>,
    pub password: PasswordDialog,
    /// 对话框每次打开或关闭时递增，自动关闭只作用于发起它的那一次打开
    dialog_generation: u64,
}

/// 管理员控制台
pub struct AdminConsole<A: AdminApi + 'static> {
    api: Arc<A>,
    state: Arc<RwLock<ConsoleState>>,
}

impl<A: AdminApi + 'static> AdminConsole<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(ConsoleState::default())),
        }
    }

    pub async fn snapshot(&self) -> ConsoleState {
        self.state.read().await.clone()
    }

    pub async fn dismiss_error(&self) {
        self.state.write().await.error = None;
    }

    // ==================== 仪表盘 ====================

    /// 加载统计数据，失败时显示固定提示
    pub async fn load_dashboard(&self) -> Result<DashboardCounts> {
        match self.api.dashboard().await {
            Ok(counts) => {
                let mut state = self.state.write().await;
                state.dashboard = Some(counts.clone());
                state.error = None;
                debug!(
                    "Dashboard: {} images, {} consultations, {} patients",
                    counts.total_images, counts.total_consultations, counts.total_patients
                );
                Ok(counts)
            }
            Err(e) => {
                warn!("Failed to load dashboard: {}", e);
                self.state.write().await.error = Some(DASHBOARD_FALLBACK.to_string());
                Err(PtmdError::request(e.status(), None, DASHBOARD_FALLBACK))
            }
        }
    }

    // ==================== 备份 ====================

    /// 下载数据库备份并写入 `output_dir`
    pub async fn download_backup(&self, output_dir: &Path) -> Result<BackupReceipt> {
        let result = match self.api.backup().await {
            Ok(data) => write_backup(output_dir, Utc::now().date_naive(), &data).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!("Backup download failed: {}", e);
            self.state.write().await.error = Some(e.banner_message());
        }
        result
    }

    // ==================== 修改密码 ====================

    pub async fn open_password_dialog(&self) {
        let mut state = self.state.write().await;
        state.dialog_generation += 1;
        state.password = PasswordDialog {
            open: true,
            ..Default::default()
        };
    }

    pub async fn close_password_dialog(&self) {
        let mut state = self.state.write().await;
        state.dialog_generation += 1;
        state.password = PasswordDialog::default();
    }

    pub async fn set_password_form(&self, form: PasswordForm) {
        self.state.write().await.password.form = form;
    }

    /// 提交修改密码
    ///
    /// 成功后清空表单并在 [`PASSWORD_DIALOG_AUTO_CLOSE`] 后关闭对话框；
    /// 返回的句柄仅用于等待关闭完成
    pub async fn submit_password_change(&self) -> Result<JoinHandle<()>> {
        let request = {
            let mut state = self.state.write().await;
            let dialog = &mut state.password;
            if dialog.submitting {
                return Err(PtmdError::Busy("password change already in progress".to_string()));
            }
            match dialog.form.validate() {
                Ok(request) => {
                    dialog.error = None;
                    dialog.submitting = true;
                    request
                }
                Err(e) => {
                    dialog.error = Some(e.to_string());
                    return Err(e.into());
                }
            }
        };

        let outcome = self.api.change_password(&request).await;

        let mut state = self.state.write().await;
        let dialog = &mut state.password;
        dialog.submitting = false;
        if let Err(e) = outcome {
            dialog.error = Some(e.banner_message());
            return Err(e);
        }

        info!("Password changed, dialog closes in {:?}", PASSWORD_DIALOG_AUTO_CLOSE);
        dialog.success = true;
        dialog.form = PasswordForm::default();
        let generation = state.dialog_generation;
        drop(state);

        let delay = tokio::time::sleep(PASSWORD_DIALOG_AUTO_CLOSE);
        let shared = Arc::clone(&self.state);
        Ok(tokio::spawn(async move {
            delay.await;
            let mut state = shared.write().await;
            if state.dialog_generation != generation {
                debug!("Password dialog was reopened, skipping stale auto-close");
                return;
            }
            if state.password.success {
                state.password.open = false;
                state.password.success = false;
                debug!("Password dialog auto-closed");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAdmin {
        fail_dashboard: AtomicBool,
        backup_error: Mutex<Option<String>>,
        password_calls: AtomicUsize,
        reject_password: AtomicBool,
    }

    #[async_trait]
    impl AdminApi for FakeAdmin {
        async fn dashboard(&self) -> Result<DashboardCounts> {
            if self.fail_dashboard.load(Ordering::SeqCst) {
                return Err(PtmdError::request(Some(500), Some("boom".into()), DASHBOARD_FALLBACK));
            }
            Ok(DashboardCounts {
                total_images: 9,
                total_consultations: 4,
                total_patients: 3,
            })
        }

        async fn backup(&self) -> Result<Vec<u8>> {
            match self.backup_error.lock().unwrap().clone() {
                Some(message) => Err(PtmdError::request(Some(500), Some(message), "Erro ao gerar database")),
                None => Ok(b"PK\x03\x04".to_vec()),
            }
        }

        async fn change_password(&self, _request: &ChangePasswordRequest) -> Result<()> {
            self.password_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_password.load(Ordering::SeqCst) {
                return Err(PtmdError::request(Some(400), Some("Senha atual incorreta".into()), "Erro ao alterar senha"));
            }
            Ok(())
        }
    }

    fn form(current: &str, new: &str, confirm: &str) -> PasswordForm {
        PasswordForm {
            current_password: current.into(),
            new_password: new.into(),
            confirm_password: confirm.into(),
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_password_form_validation_order() {
        assert_eq!(form("a", "abc", "abd").validate(), Err(ValidationError::PasswordMismatch));
        assert_eq!(
            form("a", "abc", "abc").validate(),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
        let request = form("old", "abcdef", "abcdef").validate().unwrap();
        assert_eq!(request.new_password, "abcdef");
    }

    #[tokio::test]
    async fn test_load_dashboard() {
        let api = Arc::new(FakeAdmin::default());
        let console = AdminConsole::new(api.clone());

        let counts = console.load_dashboard().await.unwrap();
        assert_eq!(counts.total_images, 9);
        assert_eq!(console.snapshot().await.dashboard, Some(counts));

        api.fail_dashboard.store(true, Ordering::SeqCst);
        let err = console.load_dashboard().await.unwrap_err();
        assert_eq!(err.banner_message(), DASHBOARD_FALLBACK);
        let state = console.snapshot().await;
        assert_eq!(state.error.as_deref(), Some(DASHBOARD_FALLBACK));
        assert!(state.dashboard.is_some());

        console.dismiss_error().await;
        assert!(console.snapshot().await.error.is_none());
    }

    #[tokio::test]
    async fn test_download_backup() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeAdmin::default());
        let console = AdminConsole::new(api.clone());

        let receipt = console.download_backup(dir.path()).await.unwrap();
        assert_eq!(receipt.size_bytes, 4);
        let name = receipt.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ptmd_database_") && name.ends_with(".zip"));

        *api.backup_error.lock().unwrap() = Some("pg_dump falhou".into());
        assert!(console.download_backup(dir.path()).await.is_err());
        assert_eq!(console.snapshot().await.error.as_deref(), Some("pg_dump falhou"));
    }

    #[tokio::test]
    async fn test_password_validation_never_calls_api() {
        let api = Arc::new(FakeAdmin::default());
        let console = AdminConsole::new(api.clone());
        console.open_password_dialog().await;
        console.set_password_form(form("old", "abcdef", "abcdeg")).await;

        let err = console.submit_password_change().await.unwrap_err();
        assert!(err.is_validation());
        let dialog = console.snapshot().await.password;
        assert_eq!(dialog.error.as_deref(), Some("As senhas não coincidem"));
        assert!(dialog.open);
        assert_eq!(api.password_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_password_server_error_keeps_dialog_open() {
        let api = Arc::new(FakeAdmin::default());
        api.reject_password.store(true, Ordering::SeqCst);
        let console = AdminConsole::new(api.clone());
        console.open_password_dialog().await;
        console.set_password_form(form("wrong", "abcdef", "abcdef")).await;

        assert!(console.submit_password_change().await.is_err());
        let dialog = console.snapshot().await.password;
        assert!(dialog.open);
        assert!(!dialog.success);
        assert!(!dialog.submitting);
        assert_eq!(dialog.error.as_deref(), Some("Senha atual incorreta"));
        assert_eq!(dialog.form.new_password, "abcdef");
    }

    #[tokio::test(start_paused = true)]
    async fn test_password_dialog_auto_closes_after_two_seconds() {
        let api = Arc::new(FakeAdmin::default());
        let console = AdminConsole::new(api.clone());
        console.open_password_dialog().await;
        console.set_password_form(form("old", "abcdef", "abcdef")).await;

        let _handle = console.submit_password_change().await.unwrap();
        let dialog = console.snapshot().await.password;
        assert!(dialog.open);
        assert!(dialog.success);
        assert_eq!(dialog.form, PasswordForm::default());

        tokio::time::advance(Duration::from_millis(1999)).await;
        settle().await;
        assert!(console.snapshot().await.password.open);

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        let dialog = console.snapshot().await.password;
        assert!(!dialog.open);
        assert!(!dialog.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopened_dialog_ignores_earlier_auto_close() {
        let api = Arc::new(FakeAdmin::default());
        let console = AdminConsole::new(api.clone());
        console.open_password_dialog().await;
        console.set_password_form(form("old", "abcdef", "abcdef")).await;
        let _first = console.submit_password_change().await.unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        console.close_password_dialog().await;
        console.open_password_dialog().await;
        console.set_password_form(form("abcdef", "ghijkl", "ghijkl")).await;
        let _second = console.submit_password_change().await.unwrap();

        // 第一次的定时器到期，新打开的对话框保持显示
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        let dialog = console.snapshot().await.password;
        assert!(dialog.open);
        assert!(dialog.success);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        let dialog = console.snapshot().await.password;
        assert!(!dialog.open);
        assert!(!dialog.success);
        assert_eq!(api.password_calls.load(Ordering::SeqCst), 2);
    }
}
