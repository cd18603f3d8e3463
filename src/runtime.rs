// Device ownership, the hardware execution slot, and service startup
//
// Motion and capture block for hundreds of milliseconds. They run one at a
// time on a dedicated thread that owns the hardware; HTTP handlers queue jobs
// to it and await the reply, so the tokio event loop keeps answering
// status/OPTIONS/not-found requests meanwhile.

use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

// local imports
use crate::api::{self, AppState};
use crate::camera::{
    CameraError, CameraState, CapturePipeline, FixtureSensor, Frame, SensorConfig,
    SimulatedSensor,
};
use crate::config::{
    ActuationBackend, CameraBackend, HARDWARE_QUEUE_DEPTH, PCA9685_PWM_HZ, RoverConfig,
};
use crate::motor::{
    ActuationError, DriveDuration, LineDriver, Maneuver, MotionSequencer, SimulatedLines,
};
use crate::network::NetworkInfo;

/// The rover's hardware: constructed once, owned by the worker thread
pub struct DeviceContext {
    sequencer: MotionSequencer,
    camera: CapturePipeline,
}

impl DeviceContext {
    pub fn new(sequencer: MotionSequencer, camera: CapturePipeline) -> Self {
        Self { sequencer, camera }
    }

    /// Open the configured output backend, signal readiness with the boot
    /// wiggle, then initialize the camera.
    ///
    /// Blocks for the length of the wiggle.
    pub fn from_config(config: &RoverConfig) -> Result<Self, ActuationError> {
        let lines = open_lines(config)?;
        let sequencer = ready_motion(MotionSequencer::new(lines), !config.skip_wiggle)?;

        let sensor_config = SensorConfig::for_memory(config.psram);
        let camera = match config.camera {
            CameraBackend::Sim => {
                CapturePipeline::initialize(Box::new(SimulatedSensor::new()), sensor_config)
            }
            CameraBackend::Fixture => {
                let path = config.camera_fixture.clone().unwrap_or_default();
                CapturePipeline::initialize(Box::new(FixtureSensor::new(path)), sensor_config)
            }
            CameraBackend::Off => CapturePipeline::disabled(),
        };

        Ok(Self::new(sequencer, camera))
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera.state()
    }

    pub fn drive(
        &mut self,
        maneuver: Maneuver,
        duration: DriveDuration,
    ) -> Result<(), ActuationError> {
        self.sequencer.execute(maneuver, duration)
    }

    pub fn capture(&mut self) -> Result<Frame, CameraError> {
        self.camera.capture()
    }
}

/// Force a full stop on freshly opened outputs and, if asked, run the
/// readiness wiggle
fn ready_motion(
    mut sequencer: MotionSequencer,
    wiggle: bool,
) -> Result<MotionSequencer, ActuationError> {
    sequencer.all_stop()?;
    info!("Actuation backend: {}", sequencer.backend());
    if wiggle {
        sequencer.boot_wiggle()?;
    } else {
        info!("Boot wiggle skipped");
    }
    Ok(sequencer)
}

fn open_lines(config: &RoverConfig) -> Result<Box<dyn LineDriver>, ActuationError> {
    match config.actuation {
        ActuationBackend::Sim => Ok(Box::new(SimulatedLines::new())),
        #[cfg(target_os = "linux")]
        ActuationBackend::Pca9685 => Ok(Box::new(crate::motor::Pca9685Lines::open(
            &config.i2c_bus,
            config.pca_address,
            PCA9685_PWM_HZ,
        )?)),
        #[cfg(not(target_os = "linux"))]
        ActuationBackend::Pca9685 => Err(ActuationError::Init(format!(
            "PCA9685 at 0x{:02X} ({} Hz) needs Linux I2C",
            config.pca_address, PCA9685_PWM_HZ
        ))),
    }
}

/// Why a queued hardware job did not complete
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("hardware worker has stopped")]
    Stopped,

    #[error(transparent)]
    Camera(#[from] CameraError),
}

enum Job {
    Drive {
        maneuver: Maneuver,
        duration: DriveDuration,
        reply: oneshot::Sender<Result<(), HardwareError>>,
    },
    Capture {
        reply: oneshot::Sender<Result<Frame, HardwareError>>,
    },
}

/// Handle for queueing hardware jobs; cheap to clone
#[derive(Clone)]
pub struct HardwareQueue {
    tx: mpsc::Sender<Job>,
}

/// The worker thread and its fatal-error signal
pub struct HardwareWorker {
    thread: JoinHandle<()>,
    pub fatal: oneshot::Receiver<ActuationError>,
}

impl HardwareWorker {
    /// Wait for the worker thread to finish (all queue handles dropped)
    pub async fn join(self) {
        join_thread(self.thread).await;
    }
}

async fn join_thread(thread: JoinHandle<()>) {
    let joined = tokio::task::spawn_blocking(move || thread.join()).await;
    if !matches!(joined, Ok(Ok(()))) {
        warn!("Hardware worker did not shut down cleanly");
    }
}

impl HardwareQueue {
    /// Move `device` onto its own thread and return the queue feeding it
    pub fn spawn(device: DeviceContext) -> std::io::Result<(Self, HardwareWorker)> {
        let (tx, rx) = mpsc::channel(HARDWARE_QUEUE_DEPTH);
        let (fatal_tx, fatal_rx) = oneshot::channel();

        let thread = thread::Builder::new()
            .name("hardware".to_string())
            .spawn(move || worker_loop(device, rx, fatal_tx))?;

        Ok((
            Self { tx },
            HardwareWorker {
                thread,
                fatal: fatal_rx,
            },
        ))
    }

    /// Run a maneuver; resolves once the rover has stopped again
    pub async fn drive(
        &self,
        maneuver: Maneuver,
        duration: DriveDuration,
    ) -> Result<(), HardwareError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Job::Drive {
            maneuver,
            duration,
            reply,
        })
        .await?;
        rx.await.map_err(|_| HardwareError::Stopped)?
    }

    /// Capture one frame
    pub async fn capture(&self) -> Result<Frame, HardwareError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Job::Capture { reply }).await?;
        rx.await.map_err(|_| HardwareError::Stopped)?
    }

    async fn submit(&self, job: Job) -> Result<(), HardwareError> {
        self.tx.send(job).await.map_err(|_| HardwareError::Stopped)
    }
}

fn worker_loop(
    mut device: DeviceContext,
    mut rx: mpsc::Receiver<Job>,
    fatal: oneshot::Sender<ActuationError>,
) {
    while let Some(job) = rx.blocking_recv() {
        let outcome = match job {
            Job::Drive {
                maneuver,
                duration,
                reply,
            } => {
                let result = device.drive(maneuver, duration);
                finish(reply, result)
            }
            Job::Capture { reply } => {
                // Receiver gone means the client disconnected; the frame is just dropped
                let _ = reply.send(device.capture().map_err(HardwareError::from));
                Ok(())
            }
        };

        if let Err(e) = outcome {
            error!("Actuation failure, hardware worker stopping: {}", e);
            let _ = fatal.send(e);
            return;
        }
    }
    info!("Hardware queue closed, worker exiting");
}

/// Reply to a motion job. Actuation errors are handed back for the fatal path.
fn finish(
    reply: oneshot::Sender<Result<(), HardwareError>>,
    result: Result<(), ActuationError>,
) -> Result<(), ActuationError> {
    match result {
        Ok(()) => {
            let _ = reply.send(Ok(()));
            Ok(())
        }
        Err(e) => {
            let _ = reply.send(Err(HardwareError::Stopped));
            Err(e)
        }
    }
}

pub async fn run(config: RoverConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Initializing hardware...");
    let device = tokio::task::spawn_blocking({
        let config = config.clone();
        move || DeviceContext::from_config(&config)
    })
    .await??;
    let camera = device.camera_state();
    let (hardware, worker) = HardwareQueue::spawn(device)?;

    let network = NetworkInfo::resolve(config.advertise_ip);
    let addr = SocketAddr::new(config.bind, config.port);
    let listener = TcpListener::bind(addr).await?;

    info!("Camera: {:?}", camera);
    match network.address() {
        Some(ip) => info!("Network address: {}", ip),
        None => warn!("No network address detected"),
    }
    info!("Rover API listening on http://{}", listener.local_addr()?);

    let app = api::router(AppState::new(hardware, camera, network));
    let HardwareWorker { thread, fatal } = worker;
    let served = serve(listener, app, fatal).await;

    // Router and its queue handles are gone; the worker drains and stops the motors
    join_thread(thread).await;
    info!("Rover shut down");
    match served? {
        Some(failure) => Err(failure.into()),
        None => Ok(()),
    }
}

/// Serve `app` until Ctrl+C or an actuation failure reported on `fatal`.
///
/// Either way in-flight requests are answered before this returns, so the
/// request that hit the failure still gets its error reply. Returns the
/// failure, if that is what stopped the server.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    fatal: oneshot::Receiver<ActuationError>,
) -> std::io::Result<Option<ActuationError>> {
    let (failed_tx, failed_rx) = oneshot::channel();
    axum::serve(listener, app)
        .with_graceful_shutdown(halt_signal(fatal, failed_tx))
        .await?;
    Ok(failed_rx.await.ok())
}

async fn halt_signal(
    fatal: oneshot::Receiver<ActuationError>,
    failed: oneshot::Sender<ActuationError>,
) {
    tokio::select! {
        _ = shutdown_signal() => {}
        Ok(failure) = fatal => {
            error!("Stopping service after actuation failure: {}", failure);
            let _ = failed.send(failure);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
