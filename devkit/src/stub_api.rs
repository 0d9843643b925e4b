/*!
Stub de l'API REST de l'orchestrateur ESXi

Serveur Axum éphémère (127.0.0.1:0) qui imite le backend sous `/api`:
- Inventaire en mémoire (hosts, jobs, patches, settings)
- Enregistrement de chaque requête reçue (méthode, chemin, query, auth, body)
- Auth HTTP Basic obligatoire sur les routes de commande
- Injection d'échecs `{detail}` sur une route donnée
*/

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State};
use axum::http::{header::AUTHORIZATION, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::fixtures;

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "VMware1!";

/// Requête telle que reçue par le stub
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Chemin complet, préfixe `/api` inclus
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Body décodé en JSON, si c'en est
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn is(&self, method: &str, path: &str) -> bool {
        self.method == method && self.path == path
    }
}

/// Fichier reçu via `POST /upload-patch`
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct Inventory {
    hosts: Vec<Value>,
    jobs: Vec<Value>,
    patches: Vec<Value>,
    settings: BTreeMap<String, Value>,
    uploads: Vec<ReceivedUpload>,
    requests: Vec<RecordedRequest>,
    failures: HashMap<(String, String), (u16, String)>,
    next_job_id: u64,
}

#[derive(Clone)]
struct StubState {
    inventory: Arc<Mutex<Inventory>>,
    expected_auth: String,
}

impl StubState {
    fn push_job(&self, ip: &str, job_type: &str) {
        let mut inv = self.inventory.lock().unwrap();
        inv.next_job_id += 1;
        let job = fixtures::job(inv.next_job_id, ip, job_type, "running");
        inv.jobs.insert(0, job);
    }
}

/// Orchestrateur factice pour les tests d'intégration
pub struct StubOrchestrator {
    addr: SocketAddr,
    state: StubState,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl StubOrchestrator {
    /// Démarre avec les identifiants par défaut
    pub async fn start() -> Result<Self> {
        Self::start_with_credentials(DEFAULT_USERNAME, DEFAULT_PASSWORD).await
    }

    pub async fn start_with_credentials(username: &str, password: &str) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let state = StubState {
            inventory: Arc::new(Mutex::new(Inventory::default())),
            expected_auth: format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", username, password))
            ),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = build_router(state.clone());

        let (shutdown, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    stopped.await.ok();
                })
                .await;
            if let Err(e) = result {
                log::error!("❌ [STUB] server error: {}", e);
            }
        });

        log::info!("🧪 [STUB] orchestrator listening on {}", addr);
        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown),
            server,
        })
    }

    /// URL de base à donner au client (`http://127.0.0.1:PORT/api`)
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn seed_hosts(&self, hosts: Vec<Value>) {
        self.state.inventory.lock().unwrap().hosts = hosts;
    }

    pub fn seed_jobs(&self, jobs: Vec<Value>) {
        self.state.inventory.lock().unwrap().jobs = jobs;
    }

    pub fn seed_patches(&self, patches: Vec<Value>) {
        self.state.inventory.lock().unwrap().patches = patches;
    }

    /// Prochain appel `method path` (chemin sans `/api`) échoue avec `{detail}`
    pub fn fail_next(&self, method: Method, path: &str, status: u16, detail: &str) {
        self.state.inventory.lock().unwrap().failures.insert(
            (method.to_string(), format!("/api{}", path)),
            (status, detail.to_string()),
        );
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.inventory.lock().unwrap().requests.clone()
    }

    /// Requêtes reçues sur `method path` (chemin sans `/api`)
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        let full = format!("/api{}", path);
        self.requests()
            .into_iter()
            .filter(|r| r.is(method, &full))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.inventory.lock().unwrap().requests.clear();
    }

    pub fn hosts(&self) -> Vec<Value> {
        self.state.inventory.lock().unwrap().hosts.clone()
    }

    pub fn jobs(&self) -> Vec<Value> {
        self.state.inventory.lock().unwrap().jobs.clone()
    }

    pub fn patches(&self) -> Vec<Value> {
        self.state.inventory.lock().unwrap().patches.clone()
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.inventory.lock().unwrap().uploads.clone()
    }

    pub fn settings(&self) -> BTreeMap<String, Value> {
        self.state.inventory.lock().unwrap().settings.clone()
    }

    /// Arrêt propre du serveur
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
        (&mut self.server).await.ok();
    }
}

fn build_router(state: StubState) -> Router {
    let api = Router::new()
        .route("/hosts", get(list_hosts))
        .route("/hosts/add", post(add_hosts))
        .route("/hosts/{ip}", delete(remove_host))
        .route("/refresh/{ip}", post(refresh_host))
        .route("/jobs", get(list_jobs))
        .route("/precheck", post(run_precheck))
        .route("/patch/phase1", post(run_phase1))
        .route("/patch/phase2", post(run_phase2))
        .route("/patches", get(list_patches))
        .route("/patches/{filename}", delete(delete_patch))
        .route("/upload-patch", post(upload_patch))
        .route("/settings", post(save_settings));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::from_fn_with_state(state.clone(), intercept))
        .with_state(state)
}

fn detail(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

/// Enregistre, applique les échecs injectés puis vérifie l'auth.
/// Les lectures (GET, refresh) passent sans auth mais rejettent une auth fausse.
async fn intercept(State(state): State<StubState>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => return detail(StatusCode::BAD_REQUEST, "Unreadable body"),
    };

    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let authorization = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let injected = {
        let mut inv = state.inventory.lock().unwrap();
        inv.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            query: parts.uri.query().map(str::to_string),
            authorization: authorization.clone(),
            body: bytes.to_vec(),
        });
        inv.failures.remove(&(method.clone(), path.clone()))
    };
    log::debug!("📨 [STUB] {} {}", method, path);

    if let Some((status, message)) = injected {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return detail(status, &message);
    }

    let read_only = parts.method == Method::GET || path.starts_with("/api/refresh/");
    let authorized = authorization.as_deref() == Some(state.expected_auth.as_str());
    if !authorized && (authorization.is_some() || !read_only) {
        log::warn!("🔒 [STUB] rejected credentials on {} {}", method, path);
        return detail(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn list_hosts(State(state): State<StubState>) -> Json<Vec<Value>> {
    Json(state.inventory.lock().unwrap().hosts.clone())
}

#[derive(Deserialize)]
struct AddParams {
    #[serde(default)]
    auto_precheck: bool,
}

#[derive(Deserialize)]
struct HostBatch {
    ip_addresses: Vec<String>,
}

async fn add_hosts(
    State(state): State<StubState>,
    Query(params): Query<AddParams>,
    Json(batch): Json<HostBatch>,
) -> Json<Value> {
    let added: Vec<String> = {
        let mut inv = state.inventory.lock().unwrap();
        let mut added = Vec::new();
        for ip in batch.ip_addresses {
            if !inv.hosts.iter().any(|h| h["ip_address"] == ip.as_str()) {
                inv.hosts.push(fixtures::host(&ip));
                added.push(ip);
            }
        }
        added
    };

    let mut response = json!({
        "message": format!("Added {} hosts", added.len()),
        "hosts": added,
    });
    if params.auto_precheck && !added.is_empty() {
        for ip in &added {
            state.push_job(ip, "precheck");
        }
        response["precheck_status"] =
            json!(format!("Pre-checks initiated for {} hosts", added.len()));
    }
    Json(response)
}

async fn remove_host(State(state): State<StubState>, Path(ip): Path<String>) -> Response {
    let mut inv = state.inventory.lock().unwrap();
    let before = inv.hosts.len();
    inv.hosts.retain(|h| h["ip_address"] != ip.as_str());
    if inv.hosts.len() == before {
        return detail(StatusCode::NOT_FOUND, "Host not found");
    }
    Json(json!({ "message": format!("Host {} removed", ip) })).into_response()
}

async fn refresh_host(State(state): State<StubState>, Path(ip): Path<String>) -> Response {
    {
        let mut inv = state.inventory.lock().unwrap();
        let Some(host) = inv.hosts.iter_mut().find(|h| h["ip_address"] == ip.as_str()) else {
            return detail(StatusCode::NOT_FOUND, "Host not found");
        };
        host["last_checked"] = json!(fixtures::now());
    }
    state.push_job(&ip, "refresh");
    Json(json!({ "message": format!("Refresh initiated for {}", ip) })).into_response()
}

async fn list_jobs(State(state): State<StubState>) -> Json<Vec<Value>> {
    Json(state.inventory.lock().unwrap().jobs.clone())
}

async fn run_precheck(State(state): State<StubState>, Json(batch): Json<HostBatch>) -> Json<Value> {
    for ip in &batch.ip_addresses {
        state.push_job(ip, "precheck");
    }
    Json(json!({
        "message": format!("Pre-checks initiated for {} hosts", batch.ip_addresses.len())
    }))
}

#[derive(Deserialize)]
struct StageRequest {
    hosts: Vec<String>,
    patch_file: String,
}

async fn run_phase1(State(state): State<StubState>, Json(request): Json<StageRequest>) -> Response {
    let known = state
        .inventory
        .lock()
        .unwrap()
        .patches
        .iter()
        .any(|p| p["filename"] == request.patch_file.as_str());
    if !known {
        return detail(StatusCode::BAD_REQUEST, "Patch file not found");
    }
    for ip in &request.hosts {
        state.push_job(ip, "phase1");
    }
    Json(json!({ "message": format!("Phase 1 initiated for {} hosts", request.hosts.len()) }))
        .into_response()
}

#[derive(Deserialize)]
struct RebootRequest {
    hosts: Vec<String>,
}

async fn run_phase2(State(state): State<StubState>, Json(request): Json<RebootRequest>) -> Json<Value> {
    for ip in &request.hosts {
        state.push_job(ip, "phase2");
    }
    Json(json!({ "message": format!("Phase 2 initiated for {} hosts", request.hosts.len()) }))
}

async fn list_patches(State(state): State<StubState>) -> Json<Vec<Value>> {
    Json(state.inventory.lock().unwrap().patches.clone())
}

async fn delete_patch(State(state): State<StubState>, Path(filename): Path<String>) -> Response {
    let mut inv = state.inventory.lock().unwrap();
    let before = inv.patches.len();
    inv.patches.retain(|p| p["filename"] != filename.as_str());
    if inv.patches.len() == before {
        return detail(StatusCode::NOT_FOUND, "Patch not found");
    }
    Json(json!({ "message": format!("Deleted {}", filename) })).into_response()
}

async fn upload_patch(State(state): State<StubState>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => return detail(StatusCode::BAD_REQUEST, &e.to_string()),
        };
        if !filename.ends_with(".zip") {
            return detail(StatusCode::BAD_REQUEST, "Only .zip depot files are accepted");
        }

        let mut inv = state.inventory.lock().unwrap();
        inv.patches.retain(|p| p["filename"] != filename.as_str());
        inv.patches.push(fixtures::patch(&filename, bytes.len()));
        inv.uploads.push(ReceivedUpload {
            filename: filename.clone(),
            content_type,
            bytes,
        });
        log::info!("📦 [STUB] received {}", filename);
        return Json(json!({ "message": format!("Uploaded {}", filename) })).into_response();
    }
    detail(StatusCode::BAD_REQUEST, "Missing file field")
}

async fn save_settings(
    State(state): State<StubState>,
    Json(settings): Json<BTreeMap<String, Value>>,
) -> Json<Value> {
    state.inventory.lock().unwrap().settings.extend(settings);
    Json(json!({ "message": "Settings updated successfully" }))
}
