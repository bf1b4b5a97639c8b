// SPDX-License-Identifier: AGPL-3.0-only
//! Data models for the secrets API.

use consul_secrets::IssuedCredential;
use serde::{Deserialize, Serialize};

/// Envelope for read responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Role names.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub keys: Vec<String>,
}

/// Warnings attached to an otherwise successful write.
#[derive(Debug, Serialize, Deserialize)]
pub struct WarningsResponse {
    pub warnings: Vec<String>,
}

/// Response of `creds/:name`.
#[derive(Debug, Serialize)]
pub struct CredsResponse {
    pub lease_id: String,
    /// Lease TTL in seconds.
    pub lease_duration: u64,
    pub renewable: bool,
    pub data: IssuedCredential,
}

/// Body of renew and revoke calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaseRequest {
    pub lease_id: String,
}

/// Response of a renewal.
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub lease_id: String,
    pub lease_duration: u64,
    pub renewable: bool,
}

/// Error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}
