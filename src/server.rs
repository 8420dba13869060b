//! HTTP API server: axum router and request handlers.
//!
//! Handlers are thin: they look up the area in the shared `Controller` and
//! await the area's own transition. A mode change can take a second or
//! more because the old calculator is stopped before the new one starts;
//! status reads never wait for it since they go through each area's
//! published snapshot.
//!
//! ## Rust concepts
//! - `async fn` and `.await` for non-blocking I/O
//! - axum extractors: `State`, `Path`, `Json`
//! - `Arc` for sharing state across async tasks
//! - `tower-http` middleware for CORS and request tracing

use crate::Color;
use crate::animation::{Variant, VariantInfo};
use crate::area::{AreaError, AreaStatus};
use crate::calculator::CalculatorReport;
use crate::controller::{ActiveCalculator, Controller, StripStatus};
use crate::strip::SegmentStatus;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Rust concept: CLONE for Arc
/// axum clones the state for each request, so the controller lives behind
/// an `Arc` and cloning only bumps a counter.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_modes,
        get_areas,
        get_area,
        get_area_calculator,
        post_area_mode,
        post_area_stop,
        get_calculators,
        get_strips
    ),
    components(schemas(
        AreaStatus,
        ActiveCalculator,
        CalculatorReport,
        SegmentStatus,
        StripStatus,
        VariantInfo,
        Color,
        ModeRequest,
        ModeResponse,
    )),
    tags(
        (name = "areas", description = "Area status and mode control"),
        (name = "system", description = "Strips and available modes"),
    ),
    info(
        title = "LED Areas API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for animating LED strip areas"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ModeRequest {
    /// "black" to switch off, or a name from GET /api/v1/modes
    #[schema(example = "color_wipe")]
    mode: String,
    /// First color; red when the mode needs one and it is missing
    #[serde(default)]
    color1: Option<Color>,
    /// Second color; blue when the mode needs two and it is missing
    #[serde(default)]
    color2: Option<Color>,
}

#[derive(Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ModeResponse {
    successful: bool,
    /// True while any area is lit
    power: bool,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/modes", get(get_modes))
        .route("/api/v1/areas", get(get_areas))
        .route("/api/v1/areas/{name}", get(get_area))
        .route("/api/v1/areas/{name}/mode", post(post_area_mode))
        .route("/api/v1/areas/{name}/stop", post(post_area_stop))
        .route("/api/v1/areas/{name}/calculator", get(get_area_calculator))
        .route("/api/v1/calculators", get(get_calculators))
        .route("/api/v1/strips", get(get_strips))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn area_not_found(name: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Area {name} not found"))
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/modes — list the modes an area can run
#[utoipa::path(
    get,
    path = "/api/v1/modes",
    tag = "system",
    responses(
        (status = 200, description = "Registered modes", body = Vec<VariantInfo>)
    )
)]
async fn get_modes() -> Json<Vec<VariantInfo>> {
    Json(Variant::ALL.into_iter().map(VariantInfo::from).collect())
}

/// GET /api/v1/areas — status of every area
#[utoipa::path(
    get,
    path = "/api/v1/areas",
    tag = "areas",
    responses(
        (status = 200, description = "All areas", body = Vec<AreaStatus>)
    )
)]
async fn get_areas(State(state): State<AppState>) -> Json<Vec<AreaStatus>> {
    Json(state.controller.area_statuses())
}

/// GET /api/v1/areas/{name} — status of one area
#[utoipa::path(
    get,
    path = "/api/v1/areas/{name}",
    tag = "areas",
    params(("name" = String, Path, description = "Area name")),
    responses(
        (status = 200, description = "Area status", body = AreaStatus),
        (status = 404, description = "Area not found")
    )
)]
async fn get_area(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<AreaStatus>, (StatusCode, String)> {
    let status = state
        .controller
        .area_status(&name)
        .ok_or_else(|| area_not_found(&name))?;
    Ok(Json(status))
}

/// GET /api/v1/areas/{name}/calculator — the calculator an area is running
#[utoipa::path(
    get,
    path = "/api/v1/areas/{name}/calculator",
    tag = "areas",
    params(("name" = String, Path, description = "Area name")),
    responses(
        (status = 200, description = "Running calculator, null when the area is off", body = CalculatorReport),
        (status = 404, description = "Area not found")
    )
)]
async fn get_area_calculator(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Option<CalculatorReport>>, (StatusCode, String)> {
    let calculator = state
        .controller
        .calculator(&name)
        .ok_or_else(|| area_not_found(&name))?;
    Ok(Json(calculator))
}

/// POST /api/v1/areas/{name}/mode — switch an area to another mode
#[utoipa::path(
    post,
    path = "/api/v1/areas/{name}/mode",
    tag = "areas",
    params(("name" = String, Path, description = "Area name")),
    request_body = ModeRequest,
    responses(
        (status = 200, description = "Mode changed", body = ModeResponse),
        (status = 400, description = "Unknown mode"),
        (status = 404, description = "Area not found")
    )
)]
async fn post_area_mode(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<ModeResponse>, (StatusCode, String)> {
    let changed = state
        .controller
        .set_mode(&name, &req.mode, req.color1, req.color2)
        .await
        .map_err(|e| match e {
            AreaError::UnknownMode(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            AreaError::InvalidSegment { .. } => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        })?;

    if changed.is_none() {
        return Err(area_not_found(&name));
    }

    Ok(Json(ModeResponse {
        successful: true,
        power: state.controller.power(),
    }))
}

/// POST /api/v1/areas/{name}/stop — stop an area and blank its strips
#[utoipa::path(
    post,
    path = "/api/v1/areas/{name}/stop",
    tag = "areas",
    params(("name" = String, Path, description = "Area name")),
    responses(
        (status = 200, description = "Area stopped", body = ModeResponse),
        (status = 404, description = "Area not found")
    )
)]
async fn post_area_stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ModeResponse>, (StatusCode, String)> {
    let area = state.controller.area(&name).ok_or_else(|| area_not_found(&name))?;
    area.lock().await.stop().await;

    Ok(Json(ModeResponse {
        successful: true,
        power: state.controller.power(),
    }))
}

/// GET /api/v1/calculators — the calculator of every area
#[utoipa::path(
    get,
    path = "/api/v1/calculators",
    tag = "system",
    responses(
        (status = 200, description = "One entry per area", body = Vec<ActiveCalculator>)
    )
)]
async fn get_calculators(State(state): State<AppState>) -> Json<Vec<ActiveCalculator>> {
    Json(state.controller.calculators())
}

/// GET /api/v1/strips — configured strips and the areas using them
#[utoipa::path(
    get,
    path = "/api/v1/strips",
    tag = "system",
    responses(
        (status = 200, description = "Configured strips", body = Vec<StripStatus>)
    )
)]
async fn get_strips(State(state): State<AppState>) -> Json<Vec<StripStatus>> {
    Json(state.controller.strip_statuses())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"{
        "strips": [{ "id": "desk", "count": 8 }],
        "areas": [
            { "name": "desk", "strips": [[0, 8, "desk"]] },
            { "name": "spare", "strips": [[0, 4]] }
        ]
    }"#;

    fn state() -> AppState {
        let config = Config::from_json(CONFIG).unwrap();
        AppState {
            controller: Arc::new(Controller::from_config(&config).unwrap()),
        }
    }

    fn request(mode: &str, color1: Option<Color>) -> Json<ModeRequest> {
        Json(ModeRequest {
            mode: mode.to_string(),
            color1,
            color2: None,
        })
    }

    #[tokio::test]
    async fn modes_lists_the_registry() {
        let Json(modes) = get_modes().await;
        let names: Vec<&str> = modes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["no_color", "color", "color_wipe", "fire", "test"]);
    }

    #[tokio::test]
    async fn areas_report_initial_state() {
        let Json(areas) = get_areas(State(state())).await;
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].name, "desk");
        assert_eq!(areas[0].mode, "black");
        assert_eq!(areas[1].total_pixel_count, 4);
    }

    #[tokio::test]
    async fn unknown_area_is_404() {
        let err = get_area(State(state()), Path("attic".to_string())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let err = post_area_mode(State(state()), Path("attic".to_string()), request("fire", None))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_mode_is_400() {
        let err = post_area_mode(State(state()), Path("desk".to_string()), request("disco", None))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn mode_change_reports_power() {
        let state = state();
        let Json(resp) = post_area_mode(
            State(state.clone()),
            Path("desk".to_string()),
            request("color", Some(Color::GREEN)),
        )
        .await
        .unwrap();
        assert_eq!(
            resp,
            ModeResponse {
                successful: true,
                power: true
            }
        );

        let Json(status) = get_area(State(state.clone()), Path("desk".to_string())).await.unwrap();
        assert_eq!(status.mode, "color");

        let Json(resp) = post_area_stop(State(state.clone()), Path("desk".to_string()))
            .await
            .unwrap();
        assert!(!resp.power);
    }

    #[tokio::test(start_paused = true)]
    async fn calculator_endpoints_show_the_running_frame() {
        let state = state();
        let Json(none) = get_area_calculator(State(state.clone()), Path("desk".to_string()))
            .await
            .unwrap();
        assert_eq!(none, None);

        post_area_mode(
            State(state.clone()),
            Path("desk".to_string()),
            request("color", Some(Color::BLUE)),
        )
        .await
        .unwrap();

        let Json(report) = get_area_calculator(State(state.clone()), Path("desk".to_string()))
            .await
            .unwrap();
        let report = report.unwrap();
        assert_eq!(report.variant, "color");
        assert_eq!(report.length, 8);
        assert_eq!(report.frame, vec!["#0000FF".to_string(); 8]);

        let Json(all) = get_calculators(State(state.clone())).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].area, "spare");
        assert_eq!(all[1].calculator, None);

        let err = get_area_calculator(State(state.clone()), Path("attic".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        state.controller.stop_all().await;
    }

    #[tokio::test]
    async fn strips_list_their_areas() {
        let Json(strips) = get_strips(State(state())).await;
        assert_eq!(strips.len(), 1);
        assert_eq!(strips[0].config.count, 8);
        assert_eq!(strips[0].areas, vec!["desk".to_string()]);
    }

    #[test]
    fn mode_request_accepts_partial_colors() {
        let req: ModeRequest =
            serde_json::from_str(r#"{"mode": "color", "color1": {"red": 10, "white": 3}}"#).unwrap();
        assert_eq!(req.color1, Some(Color::rgbw(10, 0, 0, 3)));
        assert_eq!(req.color2, None);
    }
}
