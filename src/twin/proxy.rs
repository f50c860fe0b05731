//! Twin directory backed by a grid-proxy REST endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::identity::{ss58, Identity};

use super::{Twin, TwinDb};

/// Looks twins up over the grid proxy's `/twins` endpoint.
///
/// Updates publish a signed twin document to the same endpoint; the proxy
/// forwards it to the chain on our behalf (building extrinsics locally is
/// out of scope for this SDK).
pub struct ProxyTwinDb {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TwinRecord {
    twin_id: u32,
    account_id: String,
    #[serde(default)]
    relay: Option<String>,
    #[serde(default)]
    public_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTwinDoc<'a> {
    twin_id: u32,
    relay: &'a str,
    public_key: String,
    timestamp: i64,
    signature: String,
}

impl ProxyTwinDb {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn fetch(&self, query: &[(&str, String)]) -> Result<Vec<TwinRecord>, DirectoryError> {
        let url = format!("{}/twins", self.base_url);
        let records = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records)
    }
}

fn into_twin(record: TwinRecord) -> Result<Twin, DirectoryError> {
    let public_key = ss58::decode(&record.account_id)
        .ok_or_else(|| {
            DirectoryError::BadRecord(format!("invalid account id '{}'", record.account_id))
        })?
        .to_vec();

    let e2e_key = match record.public_key.as_deref() {
        Some(raw) if !raw.is_empty() => hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| DirectoryError::BadRecord(format!("invalid e2e key: {e}")))?,
        _ => Vec::new(),
    };

    Ok(Twin {
        id: record.twin_id,
        public_key,
        relay: record.relay.filter(|relay| !relay.is_empty()),
        e2e_key,
    })
}

#[async_trait]
impl TwinDb for ProxyTwinDb {
    async fn get(&self, id: u32) -> Result<Twin, DirectoryError> {
        let records = self.fetch(&[("twin_id", id.to_string())]).await?;
        let record = records
            .into_iter()
            .next()
            .ok_or(DirectoryError::TwinNotFound(id))?;
        into_twin(record)
    }

    async fn get_by_public_key(&self, public_key: &[u8]) -> Result<u32, DirectoryError> {
        let account: [u8; 32] = public_key
            .try_into()
            .map_err(|_| DirectoryError::TwinNotFoundByKey)?;
        let records = self
            .fetch(&[("account_id", ss58::encode(&account))])
            .await?;
        records
            .into_iter()
            .next()
            .map(|record| record.twin_id)
            .ok_or(DirectoryError::TwinNotFoundByKey)
    }

    async fn update_self(
        &self,
        identity: &Identity,
        relay: &str,
        e2e_key: &[u8],
    ) -> Result<(), DirectoryError> {
        let twin_id = self.get_by_public_key(&identity.public_key()).await?;
        let public_key = hex::encode(e2e_key);
        let timestamp = chrono::Utc::now().timestamp();

        let signed = format!("{twin_id}:{relay}:{public_key}:{timestamp}");
        let signature = hex::encode(identity.sign(signed.as_bytes()).to_prefixed_bytes());

        let doc = UpdateTwinDoc {
            twin_id,
            relay,
            public_key,
            timestamp,
            signature,
        };

        let url = format!("{}/twins", self.base_url);
        self.http
            .post(&url)
            .json(&doc)
            .send()
            .await
            .map_err(|e| DirectoryError::UpdateFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| DirectoryError::UpdateFailed(e.to_string()))?;
        Ok(())
    }
}
