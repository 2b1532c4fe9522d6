// ── Control-plane gateway ──
//
// The engine's view of the remote control-plane: authentication, status,
// key issuance and payment. `ControlPlaneClient` is the production
// implementation; tests substitute their own.

use std::future::Future;

use secrecy::SecretString;

use keysync_api::{
    ControlPlaneClient, IssuedKey, LoginResponse, PaymentReceipt, PaymentSlip, PlanCatalog,
    UserStatus,
};

use crate::error::CoreError;

/// Result of a successful identity challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    /// Master identity of the account.
    pub owner_identity: String,
    /// Email address, when the control-plane knows one.
    pub email: Option<String>,
    /// Key material issued with the login. `None` means zero keys issued.
    pub key_material: Option<String>,
    /// Identity of the key to label as the account's primary.
    pub primary_key_identity: Option<String>,
}

impl From<LoginResponse> for LoginGrant {
    fn from(resp: LoginResponse) -> Self {
        Self {
            owner_identity: resp.uuid,
            email: Some(resp.email).filter(|e| !e.trim().is_empty()),
            key_material: resp.key.filter(|k| !k.trim().is_empty()),
            primary_key_identity: resp.key_uuid.filter(|k| !k.trim().is_empty()),
        }
    }
}

pub trait AuthGateway: Send + Sync + 'static {
    fn login_federated(
        &self,
        token: &SecretString,
    ) -> impl Future<Output = Result<LoginGrant, CoreError>> + Send;

    fn login_phone(
        &self,
        phone: &str,
    ) -> impl Future<Output = Result<LoginGrant, CoreError>> + Send;

    fn user_status(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<UserStatus, CoreError>> + Send;

    fn issued_keys(
        &self,
        owner: &str,
    ) -> impl Future<Output = Result<Vec<IssuedKey>, CoreError>> + Send;

    fn plan_catalog(&self) -> impl Future<Output = Result<PlanCatalog, CoreError>> + Send;

    fn verify_payment(
        &self,
        owner: &str,
        protocol: &str,
        slip: PaymentSlip,
    ) -> impl Future<Output = Result<PaymentReceipt, CoreError>> + Send;
}

impl AuthGateway for ControlPlaneClient {
    async fn login_federated(&self, token: &SecretString) -> Result<LoginGrant, CoreError> {
        Ok(ControlPlaneClient::login_federated(self, token).await?.into())
    }

    async fn login_phone(&self, phone: &str) -> Result<LoginGrant, CoreError> {
        Ok(ControlPlaneClient::login_phone(self, phone).await?.into())
    }

    async fn user_status(&self, identity: &str) -> Result<UserStatus, CoreError> {
        Ok(ControlPlaneClient::user_status(self, identity).await?)
    }

    async fn issued_keys(&self, owner: &str) -> Result<Vec<IssuedKey>, CoreError> {
        Ok(ControlPlaneClient::issued_keys(self, owner).await?)
    }

    async fn plan_catalog(&self) -> Result<PlanCatalog, CoreError> {
        Ok(ControlPlaneClient::plan_catalog(self).await?)
    }

    async fn verify_payment(
        &self,
        owner: &str,
        protocol: &str,
        slip: PaymentSlip,
    ) -> Result<PaymentReceipt, CoreError> {
        Ok(ControlPlaneClient::verify_payment(self, owner, protocol, slip).await?)
    }
}
