// HTTP request dispatcher
//
// GET /api/motor/{forward,backward,left,right,stop}?duration=ms
// GET /api/camera/photo
// GET /api/status
// Anything else, including HEAD and other non-GET methods, is a JSON 404.
// OPTIONS on any path is an empty 200 and every response allows any origin.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, warn};

use crate::camera::CameraState;
use crate::messages::{ActionReply, ErrorReply, StatusReply};
use crate::motor::{DriveDuration, Maneuver};
use crate::network::NetworkInfo;
use crate::runtime::{HardwareError, HardwareQueue};

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    hardware: HardwareQueue,
    camera: CameraState,
    network: NetworkInfo,
}

impl AppState {
    pub fn new(hardware: HardwareQueue, camera: CameraState, network: NetworkInfo) -> Self {
        Self {
            hardware,
            camera,
            network,
        }
    }
}

pub fn router(state: AppState) -> Router {
    // HEAD is registered explicitly: axum would otherwise run the GET handler
    Router::new()
        .route(
            "/api/motor/{action}",
            get(motor).head(not_found).fallback(not_found),
        )
        .route(
            "/api/camera/photo",
            get(photo).head(not_found).fallback(not_found),
        )
        .route(
            "/api/status",
            get(status).head(not_found).fallback(not_found),
        )
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(answer_options))
        .with_state(state)
}

async fn motor(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Ok(maneuver) = action.parse::<Maneuver>() else {
        return not_found().await;
    };

    let duration = match maneuver {
        Maneuver::Stop => DriveDuration::default(),
        _ => DriveDuration::from_param(params.get("duration").map(String::as_str)),
    };

    match state.hardware.drive(maneuver, duration).await {
        Ok(()) => Json(ActionReply::ok(maneuver.action())).into_response(),
        Err(e) => {
            error!("{} failed: {}", maneuver, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorReply::new("Motor failed")),
            )
                .into_response()
        }
    }
}

async fn photo(State(state): State<AppState>) -> Response {
    let frame = match state.hardware.capture().await {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Capture failed: {}", e);
            let reply = match &e {
                HardwareError::Camera(err) => ErrorReply::from(err),
                HardwareError::Stopped => ErrorReply::new("Camera failed"),
            };
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(reply)).into_response();
        }
    };

    let len = frame.len();
    debug!("Streaming {} byte photo", len);
    let chunks = futures_util::stream::iter(frame.into_chunks().map(Ok::<_, Infallible>));

    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg")),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        Body::from_stream(chunks),
    )
        .into_response()
}

async fn status(State(state): State<AppState>) -> Json<StatusReply> {
    Json(StatusReply {
        camera: state.camera.is_ready(),
        wifi: state.network.display_address(),
    })
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorReply::not_found())).into_response()
}

/// Any OPTIONS request gets an empty 200 allowing every origin and method
async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let any = HeaderValue::from_static("*");
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, any.clone()),
            (header::ACCESS_CONTROL_ALLOW_METHODS, any.clone()),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, any),
        ],
    )
        .into_response()
}
