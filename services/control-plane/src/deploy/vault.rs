//! Post-install hook that initialises and unseals the secret store.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::registry::PostInstallHook;
use crate::db::Store;
use crate::topology::derived::VAULT_PORT;
use crate::topology::VmType;

const SECRET_SHARES: u32 = 5;
const SECRET_THRESHOLD: u32 = 3;

#[derive(Debug, Serialize)]
struct InitRequest {
    secret_shares: u32,
    secret_threshold: u32,
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    keys: Vec<String>,
    root_token: String,
}

#[derive(Debug, Serialize)]
struct UnsealRequest<'a> {
    key: &'a str,
}

#[derive(Debug, Deserialize)]
struct SealStatus {
    sealed: bool,
}

/// Initialises a freshly installed secret store, unseals it and persists
/// the key shares and root token.
#[derive(Debug, Clone)]
pub struct VaultBootstrap {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl VaultBootstrap {
    /// Hook that targets the first VAULT VM on port 8200.
    pub fn new() -> Result<Self> {
        // Freshly installed instances serve a self-signed certificate.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            endpoint: None,
        })
    }

    /// Use a fixed endpoint instead of the VAULT VM address.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into().trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, store: &Store) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let vms = store.list_vms(Some(VmType::Vault))?;
        let vm = vms.first().context("no VAULT VM in inventory")?;
        Ok(format!("https://{}:{VAULT_PORT}", vm.ip))
    }
}

#[async_trait]
impl PostInstallHook for VaultBootstrap {
    #[instrument(skip_all)]
    async fn post_install(&self, store: &Store) -> Result<()> {
        let endpoint = self.endpoint(store)?;

        let response = self
            .client
            .put(format!("{endpoint}/v1/sys/init"))
            .json(&InitRequest {
                secret_shares: SECRET_SHARES,
                secret_threshold: SECRET_THRESHOLD,
            })
            .send()
            .await
            .context("secret store init request failed")?;
        if !response.status().is_success() {
            bail!("secret store init returned {}", response.status());
        }
        let init: InitResponse = response
            .json()
            .await
            .context("invalid secret store init response")?;

        store.replace_vault_credentials(&init.keys, &init.root_token)?;
        info!(shares = init.keys.len(), "Secret store initialised");

        let mut sealed = true;
        for key in init.keys.iter().take(SECRET_THRESHOLD as usize) {
            let response = self
                .client
                .put(format!("{endpoint}/v1/sys/unseal"))
                .json(&UnsealRequest { key })
                .send()
                .await
                .context("secret store unseal request failed")?;
            if !response.status().is_success() {
                bail!("secret store unseal returned {}", response.status());
            }
            let status: SealStatus = response
                .json()
                .await
                .context("invalid secret store unseal response")?;
            sealed = status.sealed;
        }

        if sealed {
            bail!("secret store still sealed after {SECRET_THRESHOLD} key shares");
        }
        info!("Secret store unsealed");
        Ok(())
    }
}
