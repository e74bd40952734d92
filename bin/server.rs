// Fraud Ring Detection - Web Server
// REST API with Axum: post a table, get the annotated graph back

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use fraud_rings::{
    analyze, AnalysisConfig, EntityTable, FieldMapping, GraphExport, LinkError, MAX_FIELDS,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fraud-server", version, about = "Fraud ring graph API")]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "FRAUD_SERVER_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Body of POST /api/analyze. Give either `rows` (header name → value) or
/// `columns` (one value list per field slot, identifier first).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalyzeRequest {
    config: AnalysisConfig,
    rows: Option<Vec<BTreeMap<String, Value>>>,
    columns: Option<Vec<Vec<String>>>,
}

#[derive(Serialize)]
struct FieldResponse {
    key: u8,
    display_name: String,
    identifier: bool,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/fields/default - Default field list
async fn default_fields() -> impl IntoResponse {
    let fields: Vec<FieldResponse> = FieldMapping::default_fraud_fields()
        .fields()
        .map(|def| FieldResponse {
            key: def.key.get(),
            display_name: def.display_name.clone(),
            identifier: def.key.is_identifier(),
        })
        .collect();

    Json(ApiResponse::ok(fields))
}

/// POST /api/analyze - Build the graph for one table
async fn analyze_table(Json(request): Json<AnalyzeRequest>) -> Response {
    let result = tokio::task::spawn_blocking(move || run_analysis(request)).await;

    match result {
        Ok(Ok(export)) => {
            info!(
                nodes = export.summary.total_entities,
                edges = export.summary.total_connections,
                "served analysis"
            );
            (StatusCode::OK, Json(ApiResponse::ok(export))).into_response()
        }
        Ok(Err(AnalyzeError::Rejected(e))) => bad_request(e.to_string()),
        Ok(Err(AnalyzeError::BadCell(message))) => bad_request(message),
        Ok(Err(AnalyzeError::Internal(e))) => {
            error!("analysis failed: {:#}", e);
            internal_error(e.to_string())
        }
        Err(e) => {
            error!("analysis task panicked: {}", e);
            internal_error("analysis task failed")
        }
    }
}

fn bad_request(message: String) -> Response {
    warn!("rejected analysis request: {}", message);
    (StatusCode::BAD_REQUEST, Json(ApiResponse::<GraphExport>::err(message))).into_response()
}

fn internal_error(message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<GraphExport>::err(message)),
    )
        .into_response()
}

enum AnalyzeError {
    /// Bad mapping or bad data: the caller can fix it
    Rejected(LinkError),
    /// A row cell that is not a string, number, bool or null
    BadCell(String),
    Internal(anyhow::Error),
}

impl From<LinkError> for AnalyzeError {
    fn from(e: LinkError) -> Self {
        AnalyzeError::Rejected(e)
    }
}

fn run_analysis(request: AnalyzeRequest) -> Result<GraphExport, AnalyzeError> {
    let config = request.config;
    config.validate()?;

    let columns = match (request.rows, request.columns) {
        (Some(_), Some(_)) => {
            return Err(LinkError::InvalidFieldMapping {
                reason: "give either rows or columns, not both".to_string(),
            }
            .into())
        }
        (Some(rows), None) => rows_to_columns(&config.fields, &rows).map_err(AnalyzeError::BadCell)?,
        (None, Some(columns)) => columns,
        (None, None) => Vec::new(),
    };

    let table = EntityTable::from_columns(&config.fields, &columns[..])?;
    let graph = analyze(table.entities(), &config)?;

    GraphExport::new(&graph, config.title(), &config.fields).map_err(AnalyzeError::Internal)
}

/// Rows keyed by header name become one column per field slot
fn rows_to_columns(
    mapping: &FieldMapping,
    rows: &[BTreeMap<String, Value>],
) -> Result<Vec<Vec<String>>, String> {
    let mut columns = vec![Vec::with_capacity(rows.len()); MAX_FIELDS];

    for (index, row) in rows.iter().enumerate() {
        for def in mapping.fields() {
            let value = match row.iter().find(|(header, _)| def.matches(header)) {
                Some((header, cell)) => cell_text(cell).ok_or_else(|| {
                    format!("Row {} column '{}' must be a string, number or bool", index + 1, header)
                })?,
                None => String::new(),
            };
            columns[def.key.get() as usize - 1].push(value);
        }
    }

    Ok(columns)
}

/// Scalars become their text form; null is an empty cell
fn cell_text(cell: &Value) -> Option<String> {
    match cell {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn router() -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/fields/default", get(default_fields))
        .route("/analyze", post(analyze_table));

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = ServerArgs::parse();

    info!("Starting fraud-server v{}", fraud_rings::VERSION);

    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    info!("Listening on http://{}", args.addr);
    info!("API: POST http://{}/api/analyze", args.addr);

    axum::serve(listener, router()).await?;
    Ok(())
}
