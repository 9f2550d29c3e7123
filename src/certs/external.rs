// Remote certificate authorities (government and commercial)
// Two-phase issuance over HTTP: request returns a tracking id, status is polled later

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::authority::{
    CertificateAuthorityProvider, CertificateRequest, IdentityValidation, PendingIssuance,
    ProviderResponse, ProviderStatus, RemoteCertificate,
};
use super::keys::{KeyVault, generate_rsa_key};
use crate::error::{FirmaError, FirmaResult};
use crate::models::{CertificateAuthority, ExternalProviderConfig, ProviderKind, SubjectIdentity};

#[derive(Debug, Serialize)]
struct IssueRequestBody<'a> {
    subject: &'a SubjectIdentity,
    certificate_type: &'a str,
    public_key_pem: &'a str,
}

#[derive(Debug, Deserialize)]
struct IssueResponseBody {
    tracking_id: String,
    #[serde(default)]
    required_documents: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RemoteState {
    Pending,
    Active,
    Failed,
    Revoked,
}

#[derive(Debug, Deserialize)]
struct StatusResponseBody {
    status: RemoteState,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    certificate: Option<RemoteCertificate>,
}

#[derive(Debug, Serialize)]
struct IdentityRequestBody<'a> {
    subject: &'a SubjectIdentity,
}

/// HTTP client for a remote CA
pub struct ExternalProvider {
    kind: ProviderKind,
    authority: CertificateAuthority,
    base_url: String,
    api_token: Option<String>,
    client: Client,
    vault: Arc<KeyVault>,
    rsa_bits: usize,
    required_documents: Vec<String>,
}

impl ExternalProvider {
    pub fn new(
        kind: ProviderKind,
        config: &ExternalProviderConfig,
        vault: Arc<KeyVault>,
        rsa_bits: usize,
    ) -> FirmaResult<Self> {
        if kind == ProviderKind::Internal {
            return Err(FirmaError::Validation(
                "external provider cannot be registered as internal".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FirmaError::Validation(format!("Invalid HTTP client setup: {}", e)))?;

        Ok(Self {
            kind,
            authority: CertificateAuthority {
                provider: kind,
                name: config.name.clone(),
                country: config.country.clone(),
                trust_tier: config.trust_tier,
                endpoint: Some(config.base_url.clone()),
            },
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            client,
            vault,
            rsa_bits,
            required_documents: config.required_documents.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> FirmaError {
        FirmaError::ProviderUnavailable {
            provider: self.kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Map transport failures and error statuses to provider errors
    async fn send(&self, builder: reqwest::RequestBuilder) -> FirmaResult<reqwest::Response> {
        let response = self.with_auth(builder).send().await.map_err(|e| {
            warn!("Provider {} request failed: {}", self.kind, e);
            if e.is_timeout() {
                self.unavailable("request timed out")
            } else {
                self.unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(self.unavailable(format!("provider answered {}", status)));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(FirmaError::NotFound(format!(
                "provider {} does not know the requested resource",
                self.kind
            )));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(FirmaError::ProviderRejected {
                provider: self.kind.to_string(),
                reason: format!("{}: {}", status, body),
            });
        }
        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> FirmaResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| self.unavailable(format!("malformed provider response: {}", e)))
    }
}

#[async_trait]
impl CertificateAuthorityProvider for ExternalProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn authority(&self) -> &CertificateAuthority {
        &self.authority
    }

    async fn request_certificate(
        &self,
        request: &CertificateRequest,
    ) -> FirmaResult<ProviderResponse> {
        // The key pair never leaves this service; only the public half is sent
        let bits = self.rsa_bits;
        let private_key = tokio::task::spawn_blocking(move || generate_rsa_key(bits))
            .await
            .map_err(|e| FirmaError::Crypto(format!("Key generation task failed: {}", e)))??;
        let public_key_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| FirmaError::Crypto(format!("Failed to encode public key: {}", e)))?;
        let sealed_private_key = self.vault.seal(&private_key)?;
        drop(private_key);

        let body = IssueRequestBody {
            subject: &request.subject,
            certificate_type: &request.certificate_type.code,
            public_key_pem: &public_key_pem,
        };
        let response = self
            .send(self.client.post(self.url("/certificates")).json(&body))
            .await?;
        let mut issued: IssueResponseBody = self.decode(response).await?;
        for document in &self.required_documents {
            if !issued.required_documents.contains(document) {
                issued.required_documents.push(document.clone());
            }
        }

        info!(
            "Provider {} accepted certificate request, tracking id {}",
            self.kind, issued.tracking_id
        );

        Ok(ProviderResponse::Pending(PendingIssuance {
            tracking_id: issued.tracking_id,
            required_documents: issued.required_documents,
            public_key_pem,
            sealed_private_key,
        }))
    }

    async fn validate_identity(
        &self,
        subject: &SubjectIdentity,
    ) -> FirmaResult<IdentityValidation> {
        let response = self
            .send(
                self.client
                    .post(self.url("/identity/validate"))
                    .json(&IdentityRequestBody { subject }),
            )
            .await?;
        self.decode(response).await
    }

    async fn get_status(&self, external_id: &str) -> FirmaResult<ProviderStatus> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/certificates/{}", external_id))),
            )
            .await?;
        let body: StatusResponseBody = self.decode(response).await?;
        debug!(
            "Provider {} reports {:?} for {}",
            self.kind, body.status, external_id
        );

        Ok(match body.status {
            RemoteState::Pending => ProviderStatus::Pending,
            RemoteState::Active => ProviderStatus::Active(body.certificate),
            RemoteState::Failed => ProviderStatus::Failed {
                reason: body
                    .reason
                    .unwrap_or_else(|| "rejected by provider".to_string()),
            },
            RemoteState::Revoked => ProviderStatus::Revoked,
        })
    }

    async fn revoke(&self, external_id: &str) -> FirmaResult<()> {
        self.send(
            self.client
                .post(self.url(&format!("/certificates/{}/revoke", external_id))),
        )
        .await?;
        info!("Provider {} revoked {}", self.kind, external_id);
        Ok(())
    }
}
