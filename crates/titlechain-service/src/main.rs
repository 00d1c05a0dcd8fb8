use std::net::SocketAddr;

use anyhow::Result;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use titlechain_api::{resolve, ResolveRequest, ResolveResult, API_CONTRACT_VERSION};
use titlechain_core::{describe_rules, RuleDescription};

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct RulesResponse {
    rules: Vec<RuleDescription>,
}

#[derive(Debug, Parser)]
#[command(name = "titlechain-service")]
#[command(about = "Local HTTP service for title chain ownership resolution")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:4021")]
    bind: SocketAddr,
}

impl ServiceError {
    fn new(message: impl Into<String>) -> Self {
        Self { service_contract_version: SERVICE_CONTRACT_VERSION, error: message.into() }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app() -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/classifier/rules", get(classifier_rules))
        .route("/v1/resolve", post(resolve_tract))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app()).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok" }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn classifier_rules() -> Json<ServiceEnvelope<RulesResponse>> {
    Json(envelope(RulesResponse { rules: describe_rules() }))
}

async fn resolve_tract(
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ServiceEnvelope<ResolveResult>>, ServiceError> {
    let result = resolve(request).map_err(|err| ServiceError::new(err.to_string()))?;
    Ok(Json(envelope(result)))
}
