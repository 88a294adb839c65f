//! 管理员接口的HTTP实现

use crate::client::ApiClient;
use async_trait::async_trait;
use ptmd_core::{AdminApi, ChangePasswordRequest, DashboardCounts, PtmdError, Result};
use tracing::{info, warn};

const DASHBOARD_FALLBACK: &str = "Erro ao carregar dashboard";
const BACKUP_FALLBACK: &str = "Erro ao gerar database";
const PASSWORD_FALLBACK: &str = "Erro ao alterar senha";

#[async_trait]
impl AdminApi for ApiClient {
    async fn dashboard(&self) -> Result<DashboardCounts> {
        self.send_json(self.http().get(self.url("admin/dashboard")), DASHBOARD_FALLBACK)
            .await
    }

    async fn backup(&self) -> Result<Vec<u8>> {
        info!("Requesting database backup");
        let response = self
            .send(self.http().get(self.url("admin/backup")), BACKUP_FALLBACK)
            .await?;
        let status = response.status();

        let bytes = response.bytes().await.map_err(|e| {
            warn!("Backup download interrupted: {}", e);
            PtmdError::request(Some(status.as_u16()), None, BACKUP_FALLBACK)
        })?;
        if bytes.is_empty() {
            return Err(PtmdError::request(Some(status.as_u16()), None, BACKUP_FALLBACK));
        }

        info!("Backup downloaded: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn change_password(&self, request: &ChangePasswordRequest) -> Result<()> {
        self.send_empty(
            self.http().post(self.url("admin/change-password")).json(request),
            PASSWORD_FALLBACK,
        )
        .await?;
        info!("Admin password changed");
        Ok(())
    }
}
