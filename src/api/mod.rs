mod request;
mod response;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CoreError, SimulationInputs, SimulationResult, project, simulate_seeded, simulate_with_cancel,
};

pub use request::{
    PhaseSpec, ProjectionArgs, ProjectionPayload, RequestLimits, args_from_payload,
    build_projection_inputs, build_simulation_inputs, default_args_for_api, parse_phase_arg,
};
pub use response::{CalculateResponse, ErrorResponse, SimulateResponse};

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Investment growth projector with fees, contribution phases and Monte Carlo bands"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Serve the JSON API over HTTP")]
    Serve(ServeArgs),
    #[command(about = "Print a deterministic year-by-year projection as JSON")]
    Project(ProjectionArgs),
    #[command(about = "Print Monte Carlo percentile bands as JSON")]
    Simulate(ProjectionArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, default_value_t = 50_000)]
    pub max_simulations: u32,
    #[arg(long, default_value_t = 100)]
    pub max_years: u32,
    #[arg(long, default_value_t = 12_000_000, help = "Upper bound on simulations times months per request")]
    pub max_path_months: u64,
    #[arg(long, default_value_t = 30, help = "Seconds a simulation may run before it is cancelled")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub port: u16,
    pub limits: RequestLimits,
    pub timeout: Duration,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            port: args.port,
            limits: RequestLimits {
                max_simulations: args.max_simulations,
                max_years: args.max_years,
                max_path_months: args.max_path_months,
            },
            timeout: Duration::from_secs(args.timeout_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            limits: RequestLimits::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum SimulationFailure {
    Core(CoreError),
    TimedOut,
    Worker(String),
}

pub fn run_project_command(args: &ProjectionArgs) -> Result<String, String> {
    let inputs = build_projection_inputs(args, RequestLimits::default())?;
    let result = project(&inputs).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&CalculateResponse::from(&result)).map_err(|e| e.to_string())
}

pub fn run_simulate_command(args: &ProjectionArgs) -> Result<String, String> {
    let inputs = build_simulation_inputs(args, RequestLimits::default())?;
    let result = simulate_seeded(&inputs).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&SimulateResponse::from(&result)).map_err(|e| e.to_string())
}

pub fn router(config: ServerConfig) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/calculate", post(calculate_handler))
        .route("/api/simulate", post(simulate_handler))
        .fallback(not_found_handler)
        .with_state(config)
}

pub async fn run_http_server(config: ServerConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "nestegg HTTP API listening");
    info!("local access: http://127.0.0.1:{}/api/health", config.port);

    axum::serve(listener, router(config)).await
}

async fn health_handler() -> Response {
    #[derive(Serialize)]
    struct Health {
        status: &'static str,
    }
    json_response(StatusCode::OK, Health { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_handler(
    State(config): State<ServerConfig>,
    payload: Result<Json<ProjectionPayload>, JsonRejection>,
) -> Response {
    let args = match payload {
        Ok(Json(payload)) => args_from_payload(payload),
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let inputs = match build_projection_inputs(&args, config.limits) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match project(&inputs) {
        Ok(result) => json_response(StatusCode::OK, CalculateResponse::from(&result)),
        Err(e) => core_error_response(&e),
    }
}

async fn simulate_handler(
    State(config): State<ServerConfig>,
    payload: Result<Json<ProjectionPayload>, JsonRejection>,
) -> Response {
    let args = match payload {
        Ok(Json(payload)) => args_from_payload(payload),
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let inputs = match build_simulation_inputs(&args, config.limits) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match run_simulation_with_timeout(inputs, config.timeout).await {
        Ok(result) => json_response(StatusCode::OK, SimulateResponse::from(&result)),
        Err(SimulationFailure::Core(e)) => core_error_response(&e),
        Err(SimulationFailure::TimedOut) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "simulation timed out; reduce the number of simulations or the horizon",
        ),
        Err(SimulationFailure::Worker(msg)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &msg)
        }
    }
}

async fn run_simulation_with_timeout(
    inputs: SimulationInputs,
    timeout: Duration,
) -> Result<SimulationResult, SimulationFailure> {
    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = Arc::clone(&cancel);
    let task = tokio::task::spawn_blocking(move || simulate_with_cancel(&inputs, &worker_cancel));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result.map_err(SimulationFailure::Core),
        Ok(Err(join_error)) => Err(SimulationFailure::Worker(format!(
            "simulation worker failed: {join_error}"
        ))),
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            warn!(timeout_ms = timeout.as_millis() as u64, "simulation timed out");
            Err(SimulationFailure::TimedOut)
        }
    }
}

fn core_error_response(err: &CoreError) -> Response {
    let status = match err {
        CoreError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        CoreError::NumericInstability { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, &err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(status, ErrorResponse::new(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    fn payload(json: &str) -> ProjectionPayload {
        serde_json::from_str(json).expect("payload parses")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body is readable");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    #[tokio::test]
    async fn calculate_returns_rounded_projection() {
        let response = calculate_handler(
            State(ServerConfig::default()),
            Ok(Json(payload(
                r#"{"starting_amount": 1000, "start_age": 30, "end_age": 31, "annual_return": 12}"#,
            ))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );

        let json = body_json(response).await;
        assert_eq!(json["success"], Value::Bool(true));
        assert_eq!(json["end_balance"].as_f64(), Some(1_126.83));
        assert_eq!(json["phase2_years"].as_u64(), Some(1));
        assert_eq!(json["schedule"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn calculate_rejects_invalid_horizon() {
        let response = calculate_handler(
            State(ServerConfig::default()),
            Ok(Json(payload(r#"{"start_age": 60, "end_age": 40}"#))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], Value::Bool(false));
        assert!(json["error"].as_str().is_some_and(|e| e.contains("--end-age")));
    }

    #[tokio::test]
    async fn calculate_reports_numeric_instability() {
        let response = calculate_handler(
            State(ServerConfig::default()),
            Ok(Json(payload(
                r#"{"starting_amount": 1e300, "end_age": 100, "annual_return": 5000}"#,
            ))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn simulate_returns_bands_and_stats() {
        let response = simulate_handler(
            State(ServerConfig::default()),
            Ok(Json(payload(
                r#"{
                  "starting_amount": 10000,
                  "start_age": 30,
                  "end_age": 40,
                  "contribution_phases": [
                    {"start_age": 30, "end_age": 35, "frequency": "monthly", "amount": 200}
                  ],
                  "expected_return": 7,
                  "volatility": 15,
                  "num_simulations": 200,
                  "seed": 5
                }"#,
            ))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["seed"].as_u64(), Some(5));
        assert_eq!(json["years"].as_array().map(Vec::len), Some(10));
        assert_eq!(json["percentiles"]["p50"].as_array().map(Vec::len), Some(10));
        assert_eq!(json["stats"]["total_invested"].as_f64(), Some(22_000.0));
        let positive = json["stats"]["prob_positive"].as_f64().expect("probability");
        let double = json["stats"]["prob_double"].as_f64().expect("probability");
        assert!(positive >= double);
    }

    #[tokio::test]
    async fn simulate_rejects_too_many_simulations() {
        let config = ServerConfig {
            limits: RequestLimits {
                max_simulations: 10,
                ..RequestLimits::default()
            },
            ..ServerConfig::default()
        };
        let response = simulate_handler(
            State(config),
            Ok(Json(payload(r#"{"end_age": 40, "num_simulations": 11}"#))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn simulate_times_out_long_runs() {
        let config = ServerConfig {
            timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        let response = simulate_handler(
            State(config),
            Ok(Json(payload(
                r#"{"start_age": 20, "end_age": 100, "num_simulations": 5000, "seed": 1}"#,
            ))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_routes_return_json_404() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], Value::String("Not found".to_string()));
    }

    #[test]
    fn project_command_prints_pretty_json() {
        let mut args = default_args_for_api();
        args.starting_amount = 1_000.0;
        args.contribution_years = None;
        args.end_age = Some(31);
        args.phases = vec![parse_phase_arg("30-31:monthly:100").expect("valid phase")];
        args.annual_return = 0.0;

        let json = run_project_command(&args).expect("command runs");
        let value: Value = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(value["end_balance"].as_f64(), Some(2_200.0));
        assert!(json.contains('\n'));
    }

    #[test]
    fn simulate_command_is_reproducible_with_seed() {
        let mut args = default_args_for_api();
        args.simulations = 100;
        args.seed = Some(77);

        let first = run_simulate_command(&args).expect("command runs");
        let second = run_simulate_command(&args).expect("command runs");
        assert_eq!(first, second);
    }

    #[test]
    fn cli_contribution_without_years_is_applied() {
        let cli = Cli::try_parse_from([
            "nestegg",
            "project",
            "--end-age",
            "40",
            "--contribution",
            "500",
            "--annual-return",
            "0",
        ])
        .expect("arguments parse");
        let Command::Project(args) = cli.command else {
            panic!("expected project command");
        };

        let json = run_project_command(&args).expect("command runs");
        let value: Value = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(value["total_contributions"].as_f64(), Some(60_000.0));
        assert_eq!(value["end_balance"].as_f64(), Some(70_000.0));
    }

    #[test]
    fn cli_parses_repeated_phases() {
        let cli = Cli::try_parse_from([
            "nestegg",
            "project",
            "--end-age",
            "60",
            "--phase",
            "30-40:monthly:500",
            "--phase",
            "35-45:yearly:2000",
            "--fund-fee",
            "0.2",
        ])
        .expect("arguments parse");
        let Command::Project(args) = cli.command else {
            panic!("expected project command");
        };
        assert_eq!(args.phases.len(), 2);
        assert_eq!(args.phases[1].frequency, "yearly");
        assert_eq!(args.fund_fee, 0.2);
        assert!(build_projection_inputs(&args, RequestLimits::default()).is_ok());
    }
}
