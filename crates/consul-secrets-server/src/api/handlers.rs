// SPDX-License-Identifier: AGPL-3.0-only
//! HTTP handlers for the secrets API endpoints.

use super::models::*;
use crate::leases::LeaseTable;
use crate::metrics::{metrics, result_label};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use consul_secrets::{
    AccessConfigWrite, ConsulBackend, EngineError, RoleWrite, TokenSource,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state for API handlers.
pub struct ApiState {
    pub backend: ConsulBackend,
    pub leases: LeaseTable,
}

/// Build the API router with all endpoints.
pub fn build_api_router(backend: ConsulBackend, leases: LeaseTable) -> Router {
    let state = ApiState { backend, leases };

    Router::new()
        .route(
            "/v1/consul/config/access",
            get(read_access).put(write_access).post(write_access),
        )
        .route("/v1/consul/roles", get(list_roles))
        .route(
            "/v1/consul/roles/:name",
            get(read_role)
                .put(write_role)
                .post(write_role)
                .delete(delete_role),
        )
        .route("/v1/consul/creds/:name", get(issue_creds))
        .route("/v1/sys/leases/renew", put(renew_lease))
        .route("/v1/sys/leases/revoke", put(revoke_lease))
        .with_state(Arc::new(state))
}

/// JSON request body whose rejections use the API error format.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct JsonBody<T>(T);

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    UnknownLease(String),
    /// The request body is not valid JSON for the endpoint.
    InvalidBody(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(e) => match e {
                EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
                e if e.is_client_error() => StatusCode::BAD_REQUEST,
                EngineError::External(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::UnknownLease(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::UnknownLease(id) => format!("lease '{id}' not found"),
            ApiError::InvalidBody(reason) => format!("invalid request body: {reason}"),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                errors: vec![message],
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// PUT/POST /v1/consul/config/access - Configure Consul access.
async fn write_access(
    State(state): State<Arc<ApiState>>,
    JsonBody(input): JsonBody<AccessConfigWrite>,
) -> ApiResult<StatusCode> {
    let result = state.backend.write_access(input).await;
    match &result {
        Ok(TokenSource::Bootstrapped) => {
            metrics().bootstrap_total.with_label_values(&["success"]).inc();
        }
        Err(EngineError::AlreadyBootstrapped) => {
            metrics()
                .bootstrap_total
                .with_label_values(&["already_bootstrapped"])
                .inc();
        }
        _ => {}
    }
    result?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/consul/config/access - Read access configuration without secrets.
async fn read_access(State(state): State<Arc<ApiState>>) -> ApiResult<Response> {
    match state.backend.read_access().await? {
        Some(view) => Ok(Json(DataResponse { data: view }).into_response()),
        None => Err(EngineError::NotFound {
            kind: "access configuration",
            name: "config/access".to_string(),
        }
        .into()),
    }
}

/// GET /v1/consul/roles - List role names.
async fn list_roles(State(state): State<Arc<ApiState>>) -> ApiResult<Response> {
    let keys = state.backend.list_roles().await?;
    Ok(Json(DataResponse {
        data: ListResponse { keys },
    })
    .into_response())
}

/// PUT/POST /v1/consul/roles/:name - Create or replace a role.
async fn write_role(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    JsonBody(input): JsonBody<RoleWrite>,
) -> ApiResult<Response> {
    let warnings = state.backend.write_role(&name, input).await?;
    if warnings.is_empty() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Json(WarningsResponse { warnings }).into_response())
    }
}

/// GET /v1/consul/roles/:name - Read a role.
async fn read_role(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    match state.backend.read_role(&name).await? {
        Some(role) => Ok(Json(DataResponse { data: role.view() }).into_response()),
        None => Err(EngineError::NotFound { kind: "role", name }.into()),
    }
}

/// DELETE /v1/consul/roles/:name - Delete a role. Missing roles are fine.
async fn delete_role(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.backend.delete_role(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/consul/creds/:name - Issue a token for a role.
async fn issue_creds(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<CredsResponse>> {
    let result = state.backend.issue(&name).await;
    metrics()
        .creds_issued_total
        .with_label_values(&[result_label(&result)])
        .inc();
    let (credential, lease) = result?;

    let lease_duration = lease.ttl.as_secs();
    let renewable = lease.renewable;
    let lease_id = state.leases.insert(lease).await;
    metrics().leases_active.set(state.leases.len().await as f64);
    info!(lease_id = %lease_id, accessor = %credential.accessor, "credential issued");

    Ok(Json(CredsResponse {
        lease_id,
        lease_duration,
        renewable,
        data: credential,
    }))
}

/// PUT /v1/sys/leases/renew - Renew a lease.
async fn renew_lease(
    State(state): State<Arc<ApiState>>,
    JsonBody(request): JsonBody<LeaseRequest>,
) -> ApiResult<Json<LeaseResponse>> {
    let lease = state
        .leases
        .get(&request.lease_id)
        .await
        .ok_or_else(|| ApiError::UnknownLease(request.lease_id.clone()))?;

    let result = state.backend.renew(&lease).await;
    metrics()
        .leases_renewed_total
        .with_label_values(&[result_label(&result)])
        .inc();
    let renewed = result?;

    let response = LeaseResponse {
        lease_id: request.lease_id.clone(),
        lease_duration: renewed.ttl.as_secs(),
        renewable: renewed.renewable,
    };
    if !state.leases.update(&request.lease_id, renewed).await {
        return Err(ApiError::UnknownLease(request.lease_id));
    }
    Ok(Json(response))
}

/// PUT /v1/sys/leases/revoke - Revoke a lease and delete its token.
///
/// The lease stays registered when revocation fails so it can be retried.
async fn revoke_lease(
    State(state): State<Arc<ApiState>>,
    JsonBody(request): JsonBody<LeaseRequest>,
) -> ApiResult<StatusCode> {
    let lease = state
        .leases
        .get(&request.lease_id)
        .await
        .ok_or_else(|| ApiError::UnknownLease(request.lease_id.clone()))?;

    let result = state.backend.revoke(&lease).await;
    metrics()
        .leases_revoked_total
        .with_label_values(&[result_label(&result)])
        .inc();
    result?;

    state.leases.remove(&request.lease_id).await;
    metrics().leases_active.set(state.leases.len().await as f64);
    info!(lease_id = %request.lease_id, "lease revoked");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use consul_secrets::{MemoryAcl, MemoryStorage, MountConfig};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(acl: &MemoryAcl) -> Router {
        let backend = ConsulBackend::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(acl.clone()),
            MountConfig::default(),
        );
        build_api_router(backend, LeaseTable::new())
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn configured(acl: &MemoryAcl) -> Router {
        let app = router(acl);
        let (status, _) = call(
            &app,
            Method::PUT,
            "/v1/consul/config/access",
            Some(json!({"address": "127.0.0.1:8500"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        app
    }

    #[tokio::test]
    async fn test_access_config_round_trip() {
        let acl = MemoryAcl::new();
        let app = router(&acl);

        let (status, body) = call(&app, Method::GET, "/v1/consul/config/access", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["errors"][0].as_str().unwrap().contains("not found"));

        let app = configured(&acl).await;
        let (status, body) = call(&app, Method::GET, "/v1/consul/config/access", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"],
            json!({"address": "127.0.0.1:8500", "scheme": "http"})
        );
    }

    #[tokio::test]
    async fn test_already_bootstrapped_is_bad_request() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/consul/config/access",
            Some(json!({"address": "127.0.0.1:8500"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"][0]
            .as_str()
            .unwrap()
            .contains("management token"));
    }

    #[tokio::test]
    async fn test_role_crud() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);

        for name in ["web", "api"] {
            let (status, _) = call(
                &app,
                Method::PUT,
                &format!("/v1/consul/roles/{name}"),
                Some(json!({"consul_policies": ["readonly"], "ttl": "10m"})),
            )
            .await;
            assert_eq!(status, StatusCode::NO_CONTENT);
        }

        let (status, body) = call(&app, Method::GET, "/v1/consul/roles?list=true", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["keys"], json!(["api", "web"]));

        let (status, body) = call(&app, Method::GET, "/v1/consul/roles/web", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["consul_policies"], json!(["readonly"]));
        assert_eq!(body["data"]["ttl"], 600);

        let (status, _) = call(&app, Method::DELETE, "/v1/consul/roles/web", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::DELETE, "/v1/consul/roles/web", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, Method::GET, "/v1/consul/roles/web", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_role_validation_errors() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/v1/consul/roles/empty",
            Some(json!({"ttl": "1h"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"].is_array());
    }

    #[tokio::test]
    async fn test_legacy_field_warning() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/consul/roles/both-error",
            Some(json!({"policies": ["x"], "consul_policies": ["y"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["warnings"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_issue_without_config() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);
        call(
            &app,
            Method::PUT,
            "/v1/consul/roles/web",
            Some(json!({"consul_policies": ["readonly"]})),
        )
        .await;

        let (status, body) = call(&app, Method::GET, "/v1/consul/creds/web", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"][0].as_str().unwrap().contains("config/access"));
    }

    #[tokio::test]
    async fn test_issue_renew_revoke() {
        let acl = MemoryAcl::new();
        let app = configured(&acl).await;
        call(
            &app,
            Method::PUT,
            "/v1/consul/roles/example",
            Some(json!({"consul_policies": ["readonly"], "ttl": "10m"})),
        )
        .await;

        let (status, body) = call(&app, Method::GET, "/v1/consul/creds/example", None).await;
        assert_eq!(status, StatusCode::OK);
        let lease_id = body["lease_id"].as_str().unwrap().to_string();
        assert!(lease_id.starts_with("consul/creds/example/"));
        assert_eq!(body["lease_duration"], 600);
        assert_eq!(body["renewable"], true);
        assert!(!body["data"]["token"].as_str().unwrap().is_empty());
        assert!(!body["data"]["accessor"].as_str().unwrap().is_empty());
        assert!(body.get("internal").is_none());
        assert_eq!(acl.token_count().await, 1);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/v1/sys/leases/renew",
            Some(json!({"lease_id": lease_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lease_duration"], 600);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/v1/sys/leases/revoke",
            Some(json!({"lease_id": lease_id})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(acl.token_count().await, 0);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/v1/sys/leases/revoke",
            Some(json!({"lease_id": lease_id})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_revoke_keeps_lease() {
        let acl = MemoryAcl::new();
        let app = configured(&acl).await;
        call(
            &app,
            Method::PUT,
            "/v1/consul/roles/web",
            Some(json!({"consul_policies": ["readonly"]})),
        )
        .await;
        let (_, body) = call(&app, Method::GET, "/v1/consul/creds/web", None).await;
        let lease_id = body["lease_id"].as_str().unwrap().to_string();

        acl.set_unavailable(true).await;
        let (status, _) = call(
            &app,
            Method::PUT,
            "/v1/sys/leases/revoke",
            Some(json!({"lease_id": lease_id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        acl.set_unavailable(false).await;
        let (status, _) = call(
            &app,
            Method::PUT,
            "/v1/sys/leases/revoke",
            Some(json!({"lease_id": lease_id})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unknown_lease_is_not_found() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);
        let (status, body) = call(
            &app,
            Method::PUT,
            "/v1/sys/leases/renew",
            Some(json!({"lease_id": "consul/creds/web/nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["errors"][0].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);

        let cases = [
            (
                Method::PUT,
                "/v1/consul/roles/web",
                json!({"consul_policies": ["x"], "ttl": -5}),
            ),
            (
                Method::PUT,
                "/v1/consul/roles/web",
                json!({"consul_policies": ["x"], "local": "true"}),
            ),
            (Method::PUT, "/v1/consul/config/access", json!({"address": 8500})),
            (Method::PUT, "/v1/sys/leases/renew", json!({})),
            (Method::PUT, "/v1/sys/leases/revoke", json!({"lease": "x"})),
        ];
        for (method, uri, body) in cases {
            let (status, response) = call(&app, method, uri, Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            let message = response["errors"][0].as_str().unwrap();
            assert!(message.starts_with("invalid request body"), "{message}");
        }

        let (status, _) = call(&app, Method::GET, "/v1/consul/roles/web", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_content_type_is_bad_request() {
        let acl = MemoryAcl::bootstrapped();
        let app = router(&acl);
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/v1/consul/roles/web")
            .body(Body::from(r#"{"consul_policies": ["x"]}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (EngineError::NotConfigured, StatusCode::BAD_REQUEST),
            (EngineError::AlreadyBootstrapped, StatusCode::BAD_REQUEST),
            (
                EngineError::NotFound {
                    kind: "role",
                    name: "web".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                EngineError::External(consul_secrets::AclError::Transport("refused".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                EngineError::Storage(consul_secrets::StorageError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.is_client_error(), expected.is_client_error());
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
