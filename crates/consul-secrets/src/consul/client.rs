//! Consul HTTP client for the ACL API.

use super::types::{CreateTokenRequest, CreatedToken, TokenInfo, TokenScope};
use super::{AclClient, AclClientFactory, AclError};
use crate::config::{AccessConfig, ClientOptions};
use crate::secret::SecretString;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, StatusCode};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

const TOKEN_HEADER: &str = "X-Consul-Token";

/// Body fragment Consul returns for requests made before bootstrap.
const NOT_BOOTSTRAPPED_MARKER: &str = "must be bootstrapped";

/// Body fragment Consul returns when bootstrap was already done.
const BOOTSTRAP_DONE_MARKER: &str = "bootstrap no longer allowed";

/// Consul ACL HTTP client.
///
/// One instance serves a single request. The management token comes from the
/// stored access configuration every time; only the connection pool is shared.
pub struct ConsulClient {
    http: Client,
    base_url: String,
    token: SecretString,
}

/// Build the HTTP client for the TLS settings of `config`.
fn build_http(config: &AccessConfig, options: &ClientOptions) -> Result<Client, AclError> {
    let mut builder = ClientBuilder::new()
        .timeout(Duration::from_millis(options.timeout_ms))
        .pool_max_idle_per_host(options.pool_max_idle_per_host);

    if let Some(ca_pem) = config.ca_cert.as_deref() {
        let cert = reqwest::Certificate::from_pem(ca_pem.as_bytes())
            .map_err(|e| AclError::Config(format!("failed to parse CA certificate: {e}")))?;
        builder = builder.add_root_certificate(cert);
    }

    if let (Some(cert), Some(key)) = (config.client_cert.as_deref(), config.client_key.as_ref()) {
        let mut pem = Vec::with_capacity(cert.len() + key.expose().len() + 1);
        pem.extend_from_slice(cert.as_bytes());
        pem.push(b'\n');
        pem.extend_from_slice(key.expose().as_bytes());
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| AclError::Config(format!("failed to parse client certificate: {e}")))?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| AclError::Config(format!("failed to build HTTP client: {e}")))
}

impl ConsulClient {
    /// Build a client with its own connection pool.
    pub fn new(config: &AccessConfig, options: &ClientOptions) -> Result<Self, AclError> {
        Ok(Self::with_http(build_http(config, options)?, config))
    }

    /// Build a client on an existing connection pool.
    pub fn with_http(http: Client, config: &AccessConfig) -> Self {
        Self {
            http,
            base_url: format!(
                "{}://{}",
                config.scheme,
                config.address.trim_end_matches('/')
            ),
            token: config.token.clone(),
        }
    }

    fn request(&self, method: Method, path: &str, scope: &TokenScope) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.http.request(method, url).query(&scope.query());
        if !self.token.is_empty() {
            request = request.header(TOKEN_HEADER, self.token.expose());
        }
        request
    }

    /// Confirm the configured token is valid by reading it back.
    async fn token_is_valid(&self) -> Result<bool, AclError> {
        let response = self
            .request(Method::GET, "acl/token/self", &TokenScope::default())
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// Classify a missing-token response for `accessor`.
    ///
    /// Consul answers 403 "ACL not found" both for a missing target token and
    /// for an invalid management token. The two are told apart by checking
    /// the management token itself.
    async fn not_found_or_denied(&self, accessor: &str, body: String) -> AclError {
        match self.token_is_valid().await {
            Ok(true) => AclError::TokenNotFound(accessor.to_string()),
            Ok(false) => AclError::PermissionDenied(body),
            Err(e) => e,
        }
    }
}

/// Whether a failed token call may mean the addressed token is missing.
///
/// Consul answers 403 "ACL not found" for an unknown accessor, and older
/// servers report a delete of one as a 500 "Cannot find token to delete".
/// Other server errors never count, whatever their body says.
fn is_missing_token_response(status: StatusCode, body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    if status == StatusCode::FORBIDDEN {
        body.contains("not found") || body.contains("cannot find token")
    } else if status == StatusCode::INTERNAL_SERVER_ERROR {
        body.contains("cannot find token")
    } else {
        false
    }
}

async fn error_from(response: Response) -> AclError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
        AclError::PermissionDenied(body)
    } else {
        AclError::Api {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl AclClient for ConsulClient {
    async fn is_bootstrapped(&self) -> Result<bool, AclError> {
        // Probe anonymously; the configured token plays no part in the answer.
        let url = format!("{}/v1/acl/token/self", self.base_url);
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            let bootstrapped = !body.contains(NOT_BOOTSTRAPPED_MARKER);
            debug!(bootstrapped, "probed Consul ACL bootstrap state");
            return Ok(bootstrapped);
        }
        Err(error_from(response).await)
    }

    async fn bootstrap(&self) -> Result<SecretString, AclError> {
        let url = format!("{}/v1/acl/bootstrap", self.base_url);
        let response = self.http.put(url).send().await?;
        let status = response.status();

        if status.is_success() {
            let token: CreatedToken = response.json().await?;
            debug!(accessor = %token.accessor_id, "Consul ACL bootstrap completed");
            return Ok(token.secret_id);
        }

        let body = response.text().await.unwrap_or_default();
        if body.contains(BOOTSTRAP_DONE_MARKER) {
            return Err(AclError::AlreadyBootstrapped(body));
        }
        if status == StatusCode::FORBIDDEN {
            return Err(AclError::PermissionDenied(body));
        }
        Err(AclError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn create_token(&self, request: &CreateTokenRequest) -> Result<CreatedToken, AclError> {
        let response = self
            .request(Method::PUT, "acl/token", &request.scope())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        let token: CreatedToken = response.json().await?;
        debug!(accessor = %token.accessor_id, "created Consul ACL token");
        Ok(token)
    }

    async fn delete_token(&self, accessor: &str, scope: &TokenScope) -> Result<(), AclError> {
        let path = format!("acl/token/{accessor}");
        let response = self.request(Method::DELETE, &path, scope).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return Err(AclError::TokenNotFound(accessor.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        if is_missing_token_response(status, &body) {
            return Err(self.not_found_or_denied(accessor, body).await);
        }
        if status == StatusCode::FORBIDDEN {
            return Err(AclError::PermissionDenied(body));
        }
        Err(AclError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn read_token(
        &self,
        accessor: &str,
        scope: &TokenScope,
    ) -> Result<Option<TokenInfo>, AclError> {
        let path = format!("acl/token/{accessor}");
        let response = self.request(Method::GET, &path, scope).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(Some(response.json().await?));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await.unwrap_or_default();
        if is_missing_token_response(status, &body) {
            return match self.not_found_or_denied(accessor, body).await {
                AclError::TokenNotFound(_) => Ok(None),
                e => Err(e),
            };
        }
        if status == StatusCode::FORBIDDEN {
            return Err(AclError::PermissionDenied(body));
        }
        Err(AclError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

/// TLS settings a pooled HTTP client was built for.
#[derive(Clone, PartialEq, Eq)]
struct TlsMaterial {
    ca_cert: Option<String>,
    client_cert: Option<String>,
    client_key: Option<SecretString>,
}

impl TlsMaterial {
    fn of(config: &AccessConfig) -> Self {
        Self {
            ca_cert: config.ca_cert.clone(),
            client_cert: config.client_cert.clone(),
            client_key: config.client_key.clone(),
        }
    }
}

/// Factory producing [`ConsulClient`]s.
///
/// Keeps one `reqwest::Client` and reuses its connection pool until the TLS
/// settings of the access configuration change.
#[derive(Default)]
pub struct HttpClientFactory {
    options: ClientOptions,
    pool: Mutex<Option<(TlsMaterial, Client)>>,
}

impl HttpClientFactory {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            pool: Mutex::new(None),
        }
    }

    fn http_for(&self, config: &AccessConfig) -> Result<Client, AclError> {
        let material = TlsMaterial::of(config);
        let mut pool = self
            .pool
            .lock()
            .map_err(|_| AclError::Config("HTTP client pool lock poisoned".to_string()))?;
        if let Some((cached, http)) = pool.as_ref() {
            if *cached == material {
                return Ok(http.clone());
            }
        }
        let http = build_http(config, &self.options)?;
        debug!("built Consul HTTP client");
        *pool = Some((material, http.clone()));
        Ok(http)
    }
}

impl AclClientFactory for HttpClientFactory {
    fn connect(&self, config: &AccessConfig) -> Result<Box<dyn AclClient>, AclError> {
        let http = self.http_for(config)?;
        Ok(Box::new(ConsulClient::with_http(http, config)))
    }
}
