use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::Encoder;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use warp::http::StatusCode;
use warp::Filter;

use crate::config::Config;
use crate::metrics::{init_metrics, record_api_request, set_active_sessions, Timer, REGISTRY};
use crate::session::{client_address, SessionManager};
use crate::store::{SessionStore, StoreError};
use crate::sweeper;

#[derive(Debug, Deserialize)]
pub struct AppendCode {
    /// Absent is allowed and stored as a null entry
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppendResult {
    pub status: &'static str,
    pub entries: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn json_error(message: &str, status: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&ErrorBody {
            error: message.to_string(),
        }),
        status,
    )
}

pub async fn run_server(config: Config) -> Result<(), StoreError> {
    init_metrics();

    let store = Arc::new(SessionStore::open(&config.database_path)?);
    let manager = Arc::new(SessionManager::new(store.clone()));

    if let Ok(active) = store.count() {
        set_active_sessions(active);
    }

    // Retention sweeper runs alongside the server for the process lifetime
    tokio::spawn(sweeper::run(
        store.clone(),
        config.retention.sweep_interval(),
        config.retention.threshold(),
    ));

    // CORS
    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type"])
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"]);

    // Create a new simulator session
    let create_session = warp::path("sessions")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and(warp::addr::remote())
        .and(with_manager(manager.clone()))
        .and_then(create_session_handler);

    // Record executed code in a session
    let append_code = warp::path!("sessions" / String / "code")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_manager(manager.clone()))
        .and_then(append_code_handler);

    // Fetch one session
    let get_session = warp::path!("sessions" / String)
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(get_session_handler);

    // List all sessions
    let list_sessions = warp::path("sessions")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(list_sessions_handler);

    // Instruction set reference data
    let list_instructions = warp::path("instructions")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(list_instructions_handler);

    let get_instruction = warp::path!("instructions" / i64)
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(get_instruction_handler);

    // Example program reference data
    let list_programs = warp::path("programs")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(list_programs_handler);

    let get_program = warp::path!("programs" / i64)
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(get_program_handler);

    // Metrics endpoint
    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(metrics_handler);

    let routes = create_session
        .or(append_code)
        .or(get_session)
        .or(list_sessions)
        .or(list_instructions)
        .or(get_instruction)
        .or(list_programs)
        .or(get_program)
        .or(metrics)
        .with(cors);

    info!("8-bit simulator backend listening on http://{}", config.bind);
    info!("  POST   /sessions           - Create a new simulator session");
    info!("  POST   /sessions/:id/code  - Record executed code in a session");
    info!("  GET    /sessions/:id       - Fetch one session");
    info!("  GET    /sessions           - List all sessions");
    info!("  GET    /instructions       - List the instruction set");
    info!("  GET    /instructions/:id   - Fetch one instruction");
    info!("  GET    /programs           - List example programs");
    info!("  GET    /programs/:id       - Fetch one example program");
    info!("  GET    /metrics            - Prometheus metrics endpoint");

    warp::serve(routes).run(config.bind).await;
    Ok(())
}

fn with_store(
    store: Arc<SessionStore>,
) -> impl Filter<Extract = (Arc<SessionStore>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || store.clone())
}

fn with_manager(
    manager: Arc<SessionManager>,
) -> impl Filter<Extract = (Arc<SessionManager>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || manager.clone())
}

async fn create_session_handler(
    forwarded_for: Option<String>,
    peer: Option<SocketAddr>,
    manager: Arc<SessionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let origin = client_address(forwarded_for.as_deref(), peer);

    match manager.start_session(&origin) {
        Ok(session) => {
            record_api_request("POST", "/sessions", 201, timer.elapsed());
            Ok(warp::reply::with_status(
                warp::reply::json(&session),
                StatusCode::CREATED,
            ))
        }
        Err(err) => {
            error!(%err, "session creation failed");
            record_api_request("POST", "/sessions", 500, timer.elapsed());
            Ok(json_error("storage failure", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn append_code_handler(
    id: String,
    request: AppendCode,
    manager: Arc<SessionManager>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();

    let (reply, status) = match manager.append_code(&id, request.code) {
        Ok(entries) => (
            warp::reply::json(&AppendResult {
                status: "code updated",
                entries,
            }),
            StatusCode::OK,
        ),
        Err(StoreError::NotFound) => (
            warp::reply::json(&ErrorBody {
                error: "Session not found".to_string(),
            }),
            StatusCode::NOT_FOUND,
        ),
        Err(err) => {
            error!(%err, session_id = %id, "code append failed");
            (
                warp::reply::json(&ErrorBody {
                    error: "storage failure".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };

    record_api_request("POST", "/sessions/:id/code", status.as_u16(), timer.elapsed());
    Ok(warp::reply::with_status(reply, status))
}

async fn get_session_handler(
    id: String,
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match store.get(&id) {
        Ok(session) => Ok(warp::reply::with_status(
            warp::reply::json(&session),
            StatusCode::OK,
        )),
        Err(StoreError::NotFound) => Ok(json_error("Session not found", StatusCode::NOT_FOUND)),
        Err(err) => {
            error!(%err, session_id = %id, "session lookup failed");
            Ok(json_error("storage failure", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn list_sessions_handler(
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match store.list() {
        Ok(sessions) => Ok(warp::reply::with_status(
            warp::reply::json(&sessions),
            StatusCode::OK,
        )),
        Err(err) => {
            error!(%err, "session listing failed");
            Ok(json_error("storage failure", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn list_instructions_handler(
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match store.list_instruction_sets() {
        Ok(instructions) => Ok(warp::reply::with_status(
            warp::reply::json(&instructions),
            StatusCode::OK,
        )),
        Err(err) => {
            error!(%err, "instruction listing failed");
            Ok(json_error("storage failure", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn get_instruction_handler(
    id: i64,
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match store.get_instruction_set(id) {
        Ok(instruction) => Ok(warp::reply::with_status(
            warp::reply::json(&instruction),
            StatusCode::OK,
        )),
        Err(StoreError::NotFound) => Ok(json_error("Instruction not found", StatusCode::NOT_FOUND)),
        Err(err) => {
            error!(%err, "instruction lookup failed");
            Ok(json_error("storage failure", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn list_programs_handler(
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match store.list_example_programs() {
        Ok(programs) => Ok(warp::reply::with_status(
            warp::reply::json(&programs),
            StatusCode::OK,
        )),
        Err(err) => {
            error!(%err, "program listing failed");
            Ok(json_error("storage failure", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn get_program_handler(
    id: i64,
    store: Arc<SessionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    match store.get_example_program(id) {
        Ok(program) => Ok(warp::reply::with_status(
            warp::reply::json(&program),
            StatusCode::OK,
        )),
        Err(StoreError::NotFound) => Ok(json_error("Program not found", StatusCode::NOT_FOUND)),
        Err(err) => {
            error!(%err, "program lookup failed");
            Ok(json_error("storage failure", StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

async fn metrics_handler() -> Result<impl warp::Reply, warp::Rejection> {
    let timer = Timer::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_text) => {
            record_api_request("GET", "/metrics", 200, timer.elapsed());
            Ok(warp::reply::with_header(
                metrics_text,
                "content-type",
                "text/plain; version=0.0.4",
            ))
        }
        Err(_) => {
            record_api_request("GET", "/metrics", 500, timer.elapsed());
            Ok(warp::reply::with_header(
                "Error encoding metrics".to_string(),
                "content-type",
                "text/plain",
            ))
        }
    }
}
