// End-to-end tests of the HTTP surface against simulated hardware

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use rover_control::api::{AppState, router};
use rover_control::camera::{CapturePipeline, SensorConfig, SensorStats, SimulatedSensor};
use rover_control::client::{ClientError, RoverClient};
use rover_control::motor::{Maneuver, MotionSequencer, Pause, SimulatedLines, ThreadSleep};
use rover_control::network::NetworkInfo;
use rover_control::runtime::{DeviceContext, HardwareQueue, HardwareWorker};

/// Records requested pauses without sleeping
#[derive(Clone, Default)]
struct RecordedPauses(Arc<Mutex<Vec<Duration>>>);

impl RecordedPauses {
    fn taken(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

impl Pause for RecordedPauses {
    fn pause(&mut self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

struct Rig {
    app: Router,
    lines: SimulatedLines,
    pauses: RecordedPauses,
    camera: SensorStats,
    _worker: HardwareWorker,
}

fn rig_with(
    sensor: SimulatedSensor,
    heap_limit: usize,
    network: NetworkInfo,
    real_time: bool,
) -> Rig {
    let lines = SimulatedLines::recording();
    let pauses = RecordedPauses::default();
    let camera = sensor.stats();

    let pause: Box<dyn Pause> = if real_time {
        Box::new(ThreadSleep)
    } else {
        Box::new(pauses.clone())
    };
    let sequencer = MotionSequencer::with_pause(Box::new(lines.clone()), pause);
    let pipeline = CapturePipeline::initialize(Box::new(sensor), SensorConfig::for_memory(false))
        .with_heap_limit(heap_limit);
    let device = DeviceContext::new(sequencer, pipeline);
    let camera_state = device.camera_state();

    let (queue, worker) = HardwareQueue::spawn(device).unwrap();
    let app = router(AppState::new(queue, camera_state, network));

    Rig {
        app,
        lines,
        pauses,
        camera,
        _worker: worker,
    }
}

fn rig() -> Rig {
    rig_with(
        SimulatedSensor::new(),
        1 << 20,
        NetworkInfo::connected(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
        false,
    )
}

async fn send(app: &Router, method: Method, uri: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    send(app, Method::GET, uri).await
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test]
async fn forward_with_duration() {
    let rig = rig();
    let response = get(&rig.app, "/api/motor/forward?duration=2000").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "action": "forward"})
    );
    // 10 ms settle + 2000 ms run
    assert_eq!(rig.pauses.taken(), vec![ms(10), ms(2000)]);
    assert_eq!(rig.lines.outputs(), [0; 4]);
}

#[tokio::test]
async fn left_duration_is_clamped() {
    let rig = rig();
    let response = get(&rig.app, "/api/motor/left?duration=99999").await;

    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "action": "left"})
    );
    assert_eq!(rig.pauses.taken(), vec![ms(10), ms(5000)]);
}

#[tokio::test]
async fn missing_or_malformed_duration_defaults() {
    let rig = rig();
    for uri in [
        "/api/motor/backward",
        "/api/motor/backward?duration=abc",
        "/api/motor/backward?duration=",
    ] {
        let response = get(&rig.app, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
    assert_eq!(
        rig.pauses.taken(),
        vec![ms(10), ms(500), ms(10), ms(500), ms(10), ms(500)]
    );

    let response = get(&rig.app, "/api/motor/right?duration=5").await;
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "action": "right"})
    );
    assert_eq!(rig.pauses.taken().last(), Some(&ms(50)));
}

#[tokio::test]
async fn stop_ignores_duration() {
    let rig = rig();
    let response = get(&rig.app, "/api/motor/stop?duration=3000").await;

    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "action": "stop"})
    );
    assert!(rig.pauses.taken().is_empty());
    assert_eq!(rig.lines.writes().len(), 4);
    assert_eq!(rig.lines.outputs(), [0; 4]);
}

#[tokio::test]
async fn status_reports_camera_and_address() {
    let rig = rig();
    let response = get(&rig.app, "/api/status").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"camera": true, "wifi": "10.0.0.5"})
    );
}

#[tokio::test]
async fn status_when_camera_failed_and_offline() {
    let rig = rig_with(SimulatedSensor::failing(), 1 << 20, NetworkInfo::offline(), false);
    let response = get(&rig.app, "/api/status").await;

    assert_eq!(
        body_json(response).await,
        json!({"camera": false, "wifi": ""})
    );
}

#[tokio::test]
async fn photo_streams_jpeg() {
    let rig = rig();
    let response = get(&rig.app, "/api/camera/photo").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let expected_len: usize = response.headers()[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let jpeg = body_bytes(response).await;
    assert_eq!(jpeg.len(), expected_len);
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

    assert_eq!(rig.camera.grabs(), 1);
    assert_eq!(rig.camera.outstanding(), 0);
}

#[tokio::test]
async fn photo_with_failed_camera() {
    let rig = rig_with(SimulatedSensor::failing(), 1 << 20, NetworkInfo::offline(), false);
    let response = get(&rig.app, "/api/camera/photo").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"status": "error", "message": "Camera failed"})
    );
    assert_eq!(rig.camera.grabs(), 0);
}

#[tokio::test]
async fn photo_out_of_memory() {
    let rig = rig_with(SimulatedSensor::new(), 16, NetworkInfo::offline(), false);
    let response = get(&rig.app, "/api/camera/photo").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"status": "error", "message": "Out of memory"})
    );
    assert_eq!(rig.camera.grabs(), 1);
    assert_eq!(rig.camera.outstanding(), 0);
}

#[tokio::test]
async fn unknown_routes_are_json_404() {
    let rig = rig();
    for uri in ["/api/foo", "/api/motor/sideways", "/", "/api/camera"] {
        let response = get(&rig.app, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            body_json(response).await,
            json!({"status": "error", "message": "Not found"})
        );
    }

    let response = send(&rig.app, Method::POST, "/api/status").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(rig.pauses.taken().is_empty());
}

#[tokio::test]
async fn head_never_reaches_hardware() {
    let rig = rig();
    for uri in [
        "/api/motor/forward?duration=2000",
        "/api/camera/photo",
        "/api/status",
    ] {
        let response = send(&rig.app, Method::HEAD, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    assert!(rig.lines.writes().is_empty());
    assert!(rig.pauses.taken().is_empty());
    assert_eq!(rig.camera.grabs(), 0);
}

#[tokio::test]
async fn options_is_empty_and_permissive() {
    let rig = rig();
    for uri in ["/api/motor/forward", "/api/nowhere"] {
        let response = send(&rig.app, Method::OPTIONS, uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "*");
        assert!(body_bytes(response).await.is_empty());
    }
    // Preflight never reaches the motors
    assert!(rig.lines.writes().is_empty());
}

#[tokio::test]
async fn every_response_allows_any_origin() {
    let rig = rig();
    for uri in ["/api/status", "/api/motor/stop", "/api/camera/photo"] {
        let response = get(&rig.app, uri).await;
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*",
            "{}",
            uri
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_answers_while_maneuver_runs() {
    let rig = rig_with(SimulatedSensor::new(), 1 << 20, NetworkInfo::offline(), true);

    let app = rig.app.clone();
    let drive = tokio::spawn(async move { get(&app, "/api/motor/forward?duration=1500").await });
    tokio::time::sleep(ms(100)).await;

    let response = get(&rig.app, "/api/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!drive.is_finished(), "status waited for the maneuver");

    let response = drive.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(rig.lines.outputs(), [0; 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn maneuvers_are_serialized() {
    let rig = rig();

    let mut requests = Vec::new();
    for uri in [
        "/api/motor/forward?duration=100",
        "/api/motor/backward?duration=200",
        "/api/motor/left?duration=300",
    ] {
        let app = rig.app.clone();
        requests.push(tokio::spawn(async move { get(&app, uri).await }));
    }
    for request in requests {
        assert_eq!(request.await.unwrap().status(), StatusCode::OK);
    }

    // Each maneuver runs settle then hold without interleaving
    let pauses = rig.pauses.taken();
    assert_eq!(pauses.len(), 6);
    for pair in pauses.chunks(2) {
        assert_eq!(pair[0], ms(10));
        assert!([ms(100), ms(200), ms(300)].contains(&pair[1]));
    }
    assert_eq!(rig.lines.outputs(), [0; 4]);
}

#[tokio::test]
async fn client_round_trip() {
    let rig = rig();
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let app = rig.app.clone();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = RoverClient::for_host(&addr.to_string());

    let status = client.status().await.unwrap();
    assert!(status.camera);
    assert_eq!(status.wifi, "10.0.0.5");

    let reply = client.drive(Maneuver::TurnRight, 250).await.unwrap();
    assert_eq!(reply.action, "right");
    assert_eq!(rig.pauses.taken(), vec![ms(10), ms(250)]);

    let reply = client.stop().await.unwrap();
    assert_eq!(reply.status, "ok");

    let jpeg = client.capture_photo().await.unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn client_surfaces_error_message() {
    let rig = rig_with(SimulatedSensor::failing(), 1 << 20, NetworkInfo::offline(), false);
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let app = rig.app.clone();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let err = RoverClient::for_host(&addr.to_string())
        .capture_photo()
        .await
        .unwrap_err();
    match err {
        ClientError::Rejected { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Camera failed");
        }
        other => panic!("unexpected error: {}", other),
    }
}
