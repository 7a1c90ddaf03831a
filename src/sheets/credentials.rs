use std::path::Path;

use serde::Deserialize;

/// Fields a Google service-account key must carry.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "type",
    "project_id",
    "private_key_id",
    "private_key",
    "client_email",
    "client_id",
    "auth_uri",
    "token_uri",
    "auth_provider_x509_cert_url",
    "client_x509_cert_url",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Invalid service account credentials format. Missing required fields: {}",
    fields.join(", ")
)]
pub struct MissingFieldsError {
    pub fields: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("cannot read credentials file: {0}")]
    Io(#[from] std::io::Error),

    #[error("credentials are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    MissingFields(#[from] MissingFieldsError),
}

/// Presence check only: field contents and types are not inspected.
pub fn validate(descriptor: &serde_json::Value) -> Result<(), MissingFieldsError> {
    let fields: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|f| descriptor.get(**f).is_none())
        .map(|f| f.to_string())
        .collect();

    if fields.is_empty() {
        Ok(())
    } else {
        Err(MissingFieldsError { fields })
    }
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub kind: String,
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub auth_provider_x509_cert_url: String,
    pub client_x509_cert_url: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("type", &self.kind)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[REDACTED]")
            .field("client_email", &self.client_email)
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .field("auth_provider_x509_cert_url", &self.auth_provider_x509_cert_url)
            .field("client_x509_cert_url", &self.client_x509_cert_url)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json_str(raw: &str) -> Result<Self, CredentialsError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        validate(&value)?;
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, CredentialsError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
pub(crate) const TEST_KEY_JSON: &str = include_str!("testdata/service_account.json");
