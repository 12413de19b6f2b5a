//! In-process mock of the Hologres cloud API, enough surface for the
//! remote backend to run end-to-end: table lifecycle, data insertion,
//! structured queries with L2 vector ranking, mutations, and index
//! acceptance. Also supports injected failures for retry tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

#[derive(Default)]
pub struct MockState {
    tables: Mutex<HashMap<String, MockTable>>,
    indexes: Mutex<HashMap<String, Vec<Value>>>,
    /// Requests to fail with HTTP 500 before behaving normally again.
    fail_next: AtomicUsize,
    /// Total requests observed, failed ones included.
    attempts: AtomicUsize,
}

#[derive(Clone)]
struct MockTable {
    schema: Value,
    rows: Vec<serde_json::Map<String, Value>>,
}

impl MockState {
    pub fn fail_next_requests(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn reset_attempts(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    fn gate(&self) -> Result<(), StatusCode> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut remaining = self.fail_next.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.fail_next.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
                Err(actual) => remaining = actual,
            }
        }
        Ok(())
    }
}

type AppState = Arc<MockState>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/databases", get(list_databases))
        .route(
            "/api/v1/databases/:db/tables",
            get(list_tables).post(create_table),
        )
        .route(
            "/api/v1/databases/:db/tables/:name",
            get(get_table).delete(drop_table),
        )
        .route("/api/v1/databases/:db/tables/:name/data", post(insert_data))
        .route("/api/v1/databases/:db/tables/:name/query", post(query))
        .route("/api/v1/databases/:db/tables/:name/update", post(update))
        .route("/api/v1/databases/:db/tables/:name/delete", post(delete_rows))
        .route(
            "/api/v1/databases/:db/tables/:name/indexes",
            get(list_indexes).post(create_index),
        )
        .with_state(state)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

/// Start the mock API on an ephemeral port inside the current runtime.
pub async fn start(state: AppState) -> SocketAddr {
    init_tracing();
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
        .serve(router(state).into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// Start the mock API on a dedicated thread with its own runtime, for
/// exercising the blocking facade from synchronous tests.
pub fn start_detached(state: AppState) -> SocketAddr {
    init_tracing();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
                .serve(router(state).into_make_service());
            tx.send(server.local_addr()).unwrap();
            server.await.unwrap();
        });
    });
    rx.recv().unwrap()
}

async fn list_databases(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    Ok(Json(json!([{ "name": "testdb" }])))
}

async fn list_tables(
    State(state): State<AppState>,
    Path(_db): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let tables = state.tables.lock().unwrap();
    let mut names: Vec<&String> = tables.keys().collect();
    names.sort();
    let listing: Vec<Value> = names.iter().map(|n| json!({ "name": n })).collect();
    Ok(Json(Value::Array(listing)))
}

async fn create_table(
    State(state): State<AppState>,
    Path(_db): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let name = body["name"]
        .as_str()
        .ok_or(StatusCode::BAD_REQUEST)?
        .to_string();
    let schema = body["schema"].clone();
    let mut tables = state.tables.lock().unwrap();
    if tables.contains_key(&name) {
        return Err(StatusCode::CONFLICT);
    }
    tables.insert(
        name.clone(),
        MockTable {
            schema,
            rows: Vec::new(),
        },
    );
    Ok(Json(json!({ "name": name })))
}

async fn get_table(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let tables = state.tables.lock().unwrap();
    let table = tables.get(&name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "name": name, "schema": table.schema })))
}

async fn drop_table(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let mut tables = state.tables.lock().unwrap();
    tables.remove(&name).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({})))
}

async fn insert_data(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let mut tables = state.tables.lock().unwrap();
    let table = tables.get_mut(&name).ok_or(StatusCode::NOT_FOUND)?;
    if body["mode"].as_str() == Some("overwrite") {
        table.rows.clear();
    }
    let rows = body["data"].as_array().ok_or(StatusCode::BAD_REQUEST)?;
    for row in rows {
        let record = row.as_object().ok_or(StatusCode::BAD_REQUEST)?;
        table.rows.push(record.clone());
    }
    Ok(Json(json!({ "inserted": rows.len() })))
}

async fn query(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let tables = state.tables.lock().unwrap();
    let table = tables.get(&name).ok_or(StatusCode::NOT_FOUND)?;

    let mut rows: Vec<serde_json::Map<String, Value>> = table
        .rows
        .iter()
        .filter(|row| match body["filter"].as_str() {
            Some(filter) => matches_filter(row, filter),
            None => true,
        })
        .cloned()
        .collect();

    if body["count"].as_bool() == Some(true) {
        return Ok(Json(json!({ "count": rows.len() })));
    }

    if let Some(vector) = body["vector"].as_array() {
        let query_vector: Vec<f32> = vector
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|f| f as f32)
            .collect();
        let column = body["vector_column"]
            .as_str()
            .ok_or(StatusCode::BAD_REQUEST)?
            .to_string();
        for row in &mut rows {
            let stored = row
                .get(&column)
                .and_then(parse_vector)
                .ok_or(StatusCode::BAD_REQUEST)?;
            let distance = l2_distance(&query_vector, &stored);
            row.insert("_distance".to_string(), json!(distance));
        }
        rows.sort_by(|a, b| {
            let da = a["_distance"].as_f64().unwrap_or(f64::MAX);
            let db = b["_distance"].as_f64().unwrap_or(f64::MAX);
            da.partial_cmp(&db).unwrap()
        });
    }

    if let Some(columns) = body["columns"].as_array() {
        let keep: Vec<&str> = columns.iter().filter_map(|c| c.as_str()).collect();
        for row in &mut rows {
            row.retain(|key, _| keep.contains(&key.as_str()) || key == "_distance");
        }
    }

    let offset = body["offset"].as_u64().unwrap_or(0) as usize;
    if offset > 0 {
        rows = rows.into_iter().skip(offset).collect();
    }
    if let Some(limit) = body["limit"].as_u64() {
        rows.truncate(limit as usize);
    }

    Ok(Json(json!({ "rows": rows })))
}

async fn update(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let mut tables = state.tables.lock().unwrap();
    let table = tables.get_mut(&name).ok_or(StatusCode::NOT_FOUND)?;
    let values = body["values"].as_object().cloned().unwrap_or_default();
    let filter = body["filter"].as_str();
    let mut updated = 0;
    for row in &mut table.rows {
        if filter.map(|f| matches_filter(row, f)).unwrap_or(true) {
            for (column, value) in &values {
                row.insert(column.clone(), value.clone());
            }
            updated += 1;
        }
    }
    Ok(Json(json!({ "updated": updated })))
}

async fn delete_rows(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let mut tables = state.tables.lock().unwrap();
    let table = tables.get_mut(&name).ok_or(StatusCode::NOT_FOUND)?;
    let filter = body["filter"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
    let before = table.rows.len();
    table.rows.retain(|row| !matches_filter(row, filter));
    Ok(Json(json!({ "deleted": before - table.rows.len() })))
}

async fn create_index(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let tables = state.tables.lock().unwrap();
    if !tables.contains_key(&name) {
        return Err(StatusCode::NOT_FOUND);
    }
    drop(tables);
    state
        .indexes
        .lock()
        .unwrap()
        .entry(name)
        .or_default()
        .push(body);
    Ok(Json(json!({ "accepted": true })))
}

async fn list_indexes(
    State(state): State<AppState>,
    Path((_db, name)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state.gate()?;
    let indexes = state.indexes.lock().unwrap();
    let listing = indexes.get(&name).cloned().unwrap_or_default();
    Ok(Json(Value::Array(listing)))
}

/// Minimal predicate evaluation: `column = literal` with a numeric or
/// single-quoted string literal. Anything else matches nothing.
fn matches_filter(row: &serde_json::Map<String, Value>, filter: &str) -> bool {
    let (column, literal) = match filter.split_once('=') {
        Some(parts) => parts,
        None => return false,
    };
    let column = column.trim().trim_start_matches('(');
    let literal = literal.trim().trim_end_matches(')');
    let cell = match row.get(column) {
        Some(cell) => cell,
        None => return false,
    };
    if let Some(quoted) = literal.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return cell.as_str() == Some(quoted);
    }
    match (cell.as_f64(), literal.parse::<f64>()) {
        (Some(a), Ok(b)) => (a - b).abs() < f64::EPSILON,
        _ => false,
    }
}

fn parse_vector(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::String(text) => serde_json::from_str(text).ok(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
        _ => None,
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (x - y) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}
