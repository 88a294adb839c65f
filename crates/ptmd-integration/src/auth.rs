//! 认证接口的HTTP实现

use crate::client::ApiClient;
use async_trait::async_trait;
use ptmd_core::{AuthApi, AuthResponse, LoginRequest, RegisterRequest, Result};
use tracing::info;

const LOGIN_FALLBACK: &str = "Email ou senha inválidos";
const REGISTER_FALLBACK: &str = "Erro ao cadastrar médico";

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .send_json(self.http().post(self.url("auth/login")).json(request), LOGIN_FALLBACK)
            .await?;
        info!("Logged in as {} ({})", response.email, response.role.as_str());
        Ok(response)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<()> {
        self.send_empty(
            self.http().post(self.url("auth/register")).json(request),
            REGISTER_FALLBACK,
        )
        .await?;
        info!("Registered medico account {}", request.email);
        Ok(())
    }
}
