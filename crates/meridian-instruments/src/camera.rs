//! Camera daemon: the exposure pipeline.
//!
//! One exposure at a time, advanced by the control loop through
//! `Idle -> Exposing -> ReadingOut -> ImagesReady -> Idle`. Transitions are
//! quorum-based over the units taking part: a unit whose poll failed simply
//! contributes nothing that tick, so a dead unit stalls the pipeline rather
//! than corrupting it, and the transition fires on the first tick after
//! every unit has reported. Saving runs on a spawned task so readout of the
//! next exposure is never blocked on disk.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use meridian_core::config::{CameraConfig, ObservatoryConfig};
use meridian_daemon::{CommandValidator, ControlProgram, ProgramTick, Validated};
use meridian_proto::{
    current_timestamp_ns, CameraInfo, CameraUnitInfo, DaemonId, ExposureRequest, ExposureState,
    FrameData, FrameType, Request, Response, RpcError, StatusSnapshot, SubsystemInfo, UnitHeaders,
    UnitId, Window,
};
use meridian_store::{ExposureLedger, ExposureRecord, FsImageStore, RunCounter};

use crate::hardware::{CameraInterface, CameraReading};

#[derive(Debug)]
pub enum CameraCommand {
    Start(ExposureRequest),
    Abort { units: Vec<UnitId> },
    SetWindow { units: Vec<UnitId>, window: Option<Window> },
    SetTemperature { units: Vec<UnitId>, target: f64 },
}

/// Headers and frames from the most recent completed exposure, shared
/// between the control loop (writer) and RPC connection tasks (readers).
#[derive(Debug, Default)]
pub struct LatestFrames {
    pub headers: Vec<UnitHeaders>,
    pub frames: HashMap<UnitId, FrameData>,
}

pub type SharedFrames = Arc<Mutex<LatestFrames>>;

fn latest_lock(latest: &SharedFrames) -> std::sync::MutexGuard<'_, LatestFrames> {
    match latest.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Gate between the pipeline and the save task: one save in flight at a
/// time.
#[derive(Debug, Clone, Default)]
struct SaveGate {
    inner: Arc<AtomicBool>,
}

impl SaveGate {
    fn saving(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }

    fn begin(&self) {
        self.inner.store(true, Ordering::Release);
    }

    fn finish(&self) {
        self.inner.store(false, Ordering::Release);
    }
}

/// The exposure in flight.
struct Active {
    request: ExposureRequest,
    /// Allocated durably before the hardware was triggered; `None` only for
    /// glances.
    run_number: Option<u32>,
    started: DateTime<Utc>,
    started_ns: u64,
    started_at: Instant,
    finished: HashSet<UnitId>,
    frames: HashMap<UnitId, FrameData>,
    headers: Option<Vec<UnitHeaders>>,
}

pub struct CameraProgram<C: CameraInterface> {
    hw: C,
    units: Vec<UnitId>,
    config: CameraConfig,
    site_name: String,
    counter: Arc<dyn RunCounter>,
    ledger: Arc<dyn ExposureLedger>,
    images: FsImageStore,
    latest: SharedFrames,
    state: ExposureState,
    current: Option<Active>,
    aborting: bool,
    gate: SaveGate,
}

impl<C: CameraInterface> CameraProgram<C> {
    pub fn new(
        hw: C,
        config: &ObservatoryConfig,
        counter: Arc<dyn RunCounter>,
        ledger: Arc<dyn ExposureLedger>,
        images: FsImageStore,
    ) -> Self {
        Self {
            hw,
            units: config.units.clone(),
            config: config.camera.clone(),
            site_name: config.site_name.clone(),
            counter,
            ledger,
            images,
            latest: SharedFrames::default(),
            state: ExposureState::Idle,
            current: None,
            aborting: false,
            gate: SaveGate::default(),
        }
    }

    /// Handle for the validator's read-only replies.
    #[must_use]
    pub fn latest(&self) -> SharedFrames {
        Arc::clone(&self.latest)
    }

    async fn advance(&mut self, readings: &HashMap<UnitId, CameraReading>, bad: &mut Vec<UnitId>) {
        let Some(active) = &mut self.current else {
            return;
        };
        match self.state {
            ExposureState::Idle => {}
            ExposureState::Exposing => {
                for (&unit, reading) in readings {
                    if active.request.units.contains(&unit) && reading.exposure_finished {
                        active.finished.insert(unit);
                    }
                }
                if active.request.units.iter().all(|u| active.finished.contains(u)) {
                    info!(run = ?active.run_number, "integration complete, reading out");
                    self.state = ExposureState::ReadingOut;
                }
            }
            ExposureState::ReadingOut => {
                // One fetch attempt per pending unit per tick; a failed
                // fetch leaves the unit pending and flags it for this tick.
                let pending: Vec<UnitId> = active
                    .request
                    .units
                    .iter()
                    .copied()
                    .filter(|u| !active.frames.contains_key(u))
                    .collect();
                for unit in pending {
                    match self.hw.fetch_frame(unit).await {
                        Ok(frame) => {
                            active.frames.insert(unit, frame);
                        }
                        Err(err) => {
                            warn!(unit, %err, "readout failed, will retry");
                            bad.push(unit);
                        }
                    }
                }
                if active.frames.len() == active.request.units.len() {
                    let cards = build_headers(&self.site_name, active, readings);
                    active.headers = Some(cards);
                    self.state = ExposureState::ImagesReady;
                }
            }
            ExposureState::ImagesReady => {
                // Frames from an exposure shorter than the minimum delay
                // are held, counted from when the shutter opened.
                let held_until = active.started_at + self.config.min_save_delay;
                if !self.gate.saving() && Instant::now() >= held_until {
                    self.spawn_save();
                }
            }
        }
    }

    fn spawn_save(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };
        self.state = ExposureState::Idle;
        self.gate.begin();

        let run_number = active.run_number;
        let headers = active.headers.unwrap_or_default();
        let frames = active.frames;
        let glance = active.request.glance;
        let images = self.images.clone();
        let ledger = Arc::clone(&self.ledger);
        let latest = Arc::clone(&self.latest);
        let gate = self.gate.clone();

        tokio::spawn(async move {
            for (unit, frame) in &frames {
                let cards: &[(String, String)] = headers
                    .iter()
                    .find(|h| h.unit == *unit)
                    .map_or(&[], |h| h.cards.as_slice());
                match images.save_frame(run_number, frame, cards).await {
                    Ok(filename) => {
                        info!(unit, filename, "frame saved");
                        if let (Some(run), false) = (run_number, glance) {
                            if let Err(err) = ledger.mark_completed(run, *unit).await {
                                error!(unit, run, %err, "ledger completion failed");
                            }
                        }
                    }
                    Err(err) => error!(unit, %err, "frame save failed"),
                }
            }
            {
                let mut shared = latest_lock(&latest);
                shared.headers = headers;
                shared.frames = frames;
            }
            gate.finish();
        });
    }

    async fn start(&mut self, request: ExposureRequest) {
        let run_number = if request.glance {
            None
        } else {
            // Durable before the shutter: a crash burns the number instead
            // of reusing it.
            match self.counter.next().await {
                Ok(run) => Some(run),
                Err(err) => {
                    error!(%err, "run counter failed, exposure refused");
                    return;
                }
            }
        };

        let started = Utc::now();
        for &unit in &request.units {
            let record = ExposureRecord {
                run_number,
                unit,
                filename: FsImageStore::filename(run_number, unit),
                exptime_ms: request.exptime_ms,
                binning: request.binning,
                image_type: request.image_type,
                target: request.target.clone(),
                glance: request.glance,
                set_num: request.set_num,
                set_pos: request.set_pos,
                set_tot: request.set_tot,
                pointing_id: request.pointing_id,
                started,
                finished: None,
                completed: false,
            };
            if let Err(err) = self.ledger.append(record).await {
                error!(unit, %err, "ledger append failed");
            }
        }

        let dark = matches!(request.frame_type, FrameType::Dark);
        for &unit in &request.units {
            if let Err(err) = self
                .hw
                .start_exposure(unit, request.exptime_ms, request.binning, dark)
                .await
            {
                warn!(unit, %err, "start exposure failed on unit");
            }
        }

        info!(
            run = ?run_number,
            units = ?request.units,
            exptime_ms = request.exptime_ms,
            image_type = %request.image_type,
            "exposure started"
        );
        self.current = Some(Active {
            request,
            run_number,
            started,
            started_ns: current_timestamp_ns(),
            started_at: Instant::now(),
            finished: HashSet::new(),
            frames: HashMap::new(),
            headers: None,
        });
        self.state = ExposureState::Exposing;
    }

    async fn abort(&mut self, units: Vec<UnitId>) {
        let Some(active) = &self.current else {
            return;
        };
        let targets: Vec<UnitId> = if units.is_empty() {
            active.request.units.clone()
        } else {
            units
        };
        for unit in targets {
            if let Err(err) = self.hw.abort_exposure(unit).await {
                warn!(unit, %err, "abort failed on unit");
            }
        }
        // The ledger records stay not-completed; refresh finalises the
        // pipeline on the next tick.
        self.aborting = true;
        info!(run = ?active.run_number, "exposure aborted");
    }
}

#[async_trait]
impl<C: CameraInterface> ControlProgram for CameraProgram<C> {
    type Command = CameraCommand;

    fn daemon_id(&self) -> DaemonId {
        DaemonId::Cam
    }

    async fn refresh(&mut self) -> ProgramTick {
        let mut bad = Vec::new();
        let mut readings = HashMap::new();
        for unit in self.units.clone() {
            match self.hw.reading(unit).await {
                Ok(reading) => {
                    readings.insert(unit, reading);
                }
                Err(err) => {
                    warn!(unit, %err, "camera poll failed");
                    bad.push(unit);
                }
            }
        }

        let was_aborting = self.aborting;
        if was_aborting {
            self.current = None;
            self.state = ExposureState::Idle;
            self.aborting = false;
        } else {
            self.advance(&readings, &mut bad).await;
        }

        let units = self
            .units
            .iter()
            .filter_map(|&unit| {
                readings.get(&unit).map(|r| CameraUnitInfo {
                    unit,
                    temperature: r.temperature,
                    target_temperature: r.target_temperature,
                    cooler_enabled: r.cooler_enabled,
                    exposure_finished: self
                        .current
                        .as_ref()
                        .is_some_and(|a| a.finished.contains(&unit)),
                    image_ready: self
                        .current
                        .as_ref()
                        .is_some_and(|a| a.frames.contains_key(&unit)),
                    window: r.window,
                })
            })
            .collect();

        ProgramTick {
            info: SubsystemInfo::Camera(CameraInfo {
                exposure_state: self.state,
                aborting: was_aborting,
                current_run_number: self.current.as_ref().and_then(|a| a.run_number),
                exposing_since_ns: self.current.as_ref().map(|a| a.started_ns),
                saving: self.gate.saving(),
                units,
            }),
            bad_units: bad,
        }
    }

    async fn execute(&mut self, command: CameraCommand) {
        match command {
            CameraCommand::Start(request) => self.start(request).await,
            CameraCommand::Abort { units } => self.abort(units).await,
            CameraCommand::SetWindow { units, window } => {
                for unit in units {
                    if let Err(err) = self.hw.set_window(unit, window).await {
                        warn!(unit, %err, "set window failed");
                    }
                }
            }
            CameraCommand::SetTemperature { units, target } => {
                for unit in units {
                    if let Err(err) = self.hw.set_temperature(unit, target).await {
                        warn!(unit, %err, "set temperature failed");
                    }
                }
            }
        }
    }
}

fn build_headers(
    site_name: &str,
    active: &Active,
    readings: &HashMap<UnitId, CameraReading>,
) -> Vec<UnitHeaders> {
    let request = &active.request;
    active
        .request
        .units
        .iter()
        .map(|&unit| {
            let mut cards: Vec<(String, String)> = vec![
                ("SITE".into(), site_name.to_owned()),
                (
                    "RUN".into(),
                    active
                        .run_number
                        .map_or_else(|| "GLANCE".to_owned(), |r| r.to_string()),
                ),
                ("UT".into(), unit.to_string()),
                (
                    "EXPTIME".into(),
                    format!("{:.3}", request.exptime_ms as f64 / 1000.0),
                ),
                ("BINNING".into(), request.binning.to_string()),
                ("IMGTYPE".into(), request.image_type.to_string()),
                ("FRAMETYP".into(), request.frame_type.to_string()),
                ("DATE-OBS".into(), active.started.to_rfc3339()),
                (
                    "SET".into(),
                    format!("{}/{}", request.set_pos, request.set_tot),
                ),
            ];
            if let Some(target) = &request.target {
                cards.push(("OBJECT".into(), target.clone()));
            }
            if let Some(reading) = readings.get(&unit) {
                cards.push(("CCD-TEMP".into(), format!("{:.1}", reading.temperature)));
            }
            UnitHeaders { unit, cards }
        })
        .collect()
}

/// RPC-side camera request checking.
pub struct CameraValidator {
    units: Vec<UnitId>,
    max_binning: u8,
    latest: SharedFrames,
}

impl CameraValidator {
    #[must_use]
    pub fn new(config: &ObservatoryConfig, latest: SharedFrames) -> Self {
        Self {
            units: config.units.clone(),
            max_binning: config.camera.max_binning,
            latest,
        }
    }

    fn check_units(&self, units: &[UnitId]) -> Result<(), RpcError> {
        if units.is_empty() {
            return Err(RpcError::InvalidArgument("no units given".to_owned()));
        }
        let unknown: Vec<UnitId> = units
            .iter()
            .copied()
            .filter(|u| !self.units.contains(u))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RpcError::HardwareNotConnected(unknown))
        }
    }
}

fn camera_state(latest: Option<&StatusSnapshot>) -> Option<&CameraInfo> {
    match latest {
        Some(StatusSnapshot {
            payload: SubsystemInfo::Camera(info),
            ..
        }) => Some(info),
        _ => None,
    }
}

impl CommandValidator for CameraValidator {
    type Command = CameraCommand;

    fn validate(
        &self,
        request: &Request,
        latest: Option<&StatusSnapshot>,
    ) -> Result<Validated<CameraCommand>, RpcError> {
        match request {
            Request::TakeExposure(exposure) => {
                self.check_units(&exposure.units)?;
                if exposure.binning == 0 || exposure.binning > self.max_binning {
                    return Err(RpcError::InvalidArgument(format!(
                        "binning must be 1..={}",
                        self.max_binning
                    )));
                }
                match camera_state(latest) {
                    Some(info) if info.exposure_state == ExposureState::Idle && !info.aborting => {}
                    Some(info) => {
                        return Err(RpcError::WrongState(format!(
                            "exposure pipeline is {}",
                            info.exposure_state
                        )));
                    }
                    None => {
                        return Err(RpcError::WrongState("camera state unknown".to_owned()));
                    }
                }
                let ack = format!(
                    "exposing {} ms on units {:?}",
                    exposure.exptime_ms, exposure.units
                );
                Ok(Validated::Queue {
                    command: CameraCommand::Start(exposure.clone()),
                    ack,
                })
            }
            Request::AbortExposure { units } => {
                match camera_state(latest) {
                    Some(info) if info.exposure_state != ExposureState::Idle => {}
                    _ => {
                        return Err(RpcError::WrongState("no exposure in flight".to_owned()));
                    }
                }
                Ok(Validated::Queue {
                    command: CameraCommand::Abort {
                        units: units.clone(),
                    },
                    ack: "aborting exposure".to_owned(),
                })
            }
            Request::SetWindow { units, window } => {
                self.check_units(units)?;
                Ok(Validated::Queue {
                    command: CameraCommand::SetWindow {
                        units: units.clone(),
                        window: *window,
                    },
                    ack: match window {
                        Some(w) => format!("window set to {}x{}", w.width, w.height),
                        None => "window cleared".to_owned(),
                    },
                })
            }
            Request::SetTemperature { units, target } => {
                self.check_units(units)?;
                Ok(Validated::Queue {
                    command: CameraCommand::SetTemperature {
                        units: units.clone(),
                        target: *target,
                    },
                    ack: format!("cooling to {target:.1} C"),
                })
            }
            Request::GetLatestHeaders => {
                let shared = latest_lock(&self.latest);
                Ok(Validated::Reply(Response::Headers(shared.headers.clone())))
            }
            Request::GetLatestImage { unit } => {
                let shared = latest_lock(&self.latest);
                match shared.frames.get(unit) {
                    Some(frame) => Ok(Validated::Reply(Response::Image(frame.clone()))),
                    None => Err(RpcError::InvalidArgument(format!(
                        "no stored image for unit {unit}"
                    ))),
                }
            }
            _ => Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Cam,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use meridian_proto::ImageType;
    use meridian_store::{MemoryLedger, MemoryRunCounter};

    use crate::hardware::HardwareError;

    #[derive(Default)]
    struct FakeState {
        finished: HashSet<UnitId>,
        dead: HashSet<UnitId>,
        aborted: Vec<UnitId>,
    }

    /// Hand-cranked camera: the test flips per-unit flags between ticks.
    #[derive(Clone, Default)]
    struct FakeCamera {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeCamera {
        fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
            match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }

    #[async_trait]
    impl CameraInterface for FakeCamera {
        async fn reading(&mut self, unit: UnitId) -> crate::hardware::Result<CameraReading> {
            let state = self.lock();
            if state.dead.contains(&unit) {
                return Err(HardwareError::NotConnected { unit });
            }
            Ok(CameraReading {
                temperature: -20.0,
                target_temperature: -20.0,
                cooler_enabled: true,
                exposure_finished: state.finished.contains(&unit),
                window: None,
            })
        }

        async fn start_exposure(
            &mut self,
            _unit: UnitId,
            _exptime_ms: u64,
            _binning: u8,
            _dark: bool,
        ) -> crate::hardware::Result<()> {
            Ok(())
        }

        async fn abort_exposure(&mut self, unit: UnitId) -> crate::hardware::Result<()> {
            self.lock().aborted.push(unit);
            Ok(())
        }

        async fn fetch_frame(&mut self, unit: UnitId) -> crate::hardware::Result<FrameData> {
            Ok(FrameData {
                unit,
                width: 4,
                height: 4,
                binning: 1,
                data: vec![u16::from(unit); 16],
            })
        }

        async fn set_window(
            &mut self,
            _unit: UnitId,
            _window: Option<Window>,
        ) -> crate::hardware::Result<()> {
            Ok(())
        }

        async fn set_temperature(
            &mut self,
            _unit: UnitId,
            _target: f64,
        ) -> crate::hardware::Result<()> {
            Ok(())
        }
    }

    fn request(units: Vec<UnitId>, glance: bool) -> ExposureRequest {
        ExposureRequest {
            units,
            exptime_ms: 100,
            binning: 1,
            frame_type: FrameType::Normal,
            image_type: ImageType::Science,
            target: Some("M31".to_owned()),
            glance,
            set_num: 1,
            set_pos: 1,
            set_tot: 1,
            pointing_id: None,
        }
    }

    fn info(tick: &ProgramTick) -> &CameraInfo {
        match &tick.info {
            SubsystemInfo::Camera(info) => info,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    struct Rig {
        program: CameraProgram<FakeCamera>,
        fake: FakeCamera,
        counter: Arc<MemoryRunCounter>,
        ledger: Arc<MemoryLedger>,
        _dir: tempfile::TempDir,
    }

    fn rig(units: Vec<UnitId>) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ObservatoryConfig::default();
        config.units = units;
        config.camera.min_save_delay = Duration::ZERO;
        let counter = Arc::new(MemoryRunCounter::new());
        let ledger = Arc::new(MemoryLedger::new());
        let fake = FakeCamera::default();
        let program = CameraProgram::new(
            fake.clone(),
            &config,
            Arc::clone(&counter) as Arc<dyn RunCounter>,
            Arc::clone(&ledger) as Arc<dyn ExposureLedger>,
            FsImageStore::new(dir.path()),
        );
        Rig {
            program,
            fake,
            counter,
            ledger,
            _dir: dir,
        }
    }

    async fn wait_for_save(ledger: &MemoryLedger, run: u32, units: usize) {
        for _ in 0..200 {
            let done = ledger
                .records_for_run(run)
                .await
                .unwrap()
                .iter()
                .filter(|r| r.completed)
                .count();
            if done == units {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("save never completed");
    }

    #[tokio::test]
    async fn pipeline_stalls_on_quorum_then_fires_in_one_tick() {
        let mut rig = rig(vec![1, 2]);
        rig.program
            .execute(CameraCommand::Start(request(vec![1, 2], false)))
            .await;

        // Run number allocated before the first Exposing snapshot.
        assert_eq!(rig.counter.current().await.unwrap(), 1);
        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).exposure_state, ExposureState::Exposing);
        assert_eq!(info(&tick).current_run_number, Some(1));

        // Unit 1 finishes; unit 2 has not reported, so the pipeline stalls.
        rig.fake.lock().finished.insert(1);
        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).exposure_state, ExposureState::Exposing);

        // Unit 2 dead for a tick: flagged bad, still no transition.
        rig.fake.lock().dead.insert(2);
        let tick = rig.program.refresh().await;
        assert_eq!(tick.bad_units, vec![2]);
        assert_eq!(info(&tick).exposure_state, ExposureState::Exposing);

        // Unit 2 back and finished: transition on the very next tick.
        {
            let mut state = rig.fake.lock();
            state.dead.clear();
            state.finished.insert(2);
        }
        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).exposure_state, ExposureState::ReadingOut);

        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).exposure_state, ExposureState::ImagesReady);

        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).exposure_state, ExposureState::Idle);

        wait_for_save(&rig.ledger, 1, 2).await;
        assert!(rig._dir.path().join("r0000001_ut1.raw").exists());
        assert!(rig._dir.path().join("r0000001_ut2.raw").exists());

        // Latest headers and frames are published for RPC retrieval.
        let latest = rig.program.latest();
        let shared = latest_lock(&latest);
        assert_eq!(shared.headers.len(), 2);
        assert!(shared.frames.contains_key(&1));
    }

    #[tokio::test]
    async fn glances_take_no_run_number_and_overwrite() {
        let mut rig = rig(vec![1]);
        rig.program
            .execute(CameraCommand::Start(request(vec![1], true)))
            .await;

        assert_eq!(rig.counter.current().await.unwrap(), 0);
        rig.fake.lock().finished.insert(1);
        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).current_run_number, None);

        rig.program.refresh().await; // ReadingOut
        rig.program.refresh().await; // ImagesReady -> but one tick each
        rig.program.refresh().await;

        for _ in 0..200 {
            if rig._dir.path().join("glance_ut1.raw").exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("glance frame never saved");
    }

    #[tokio::test]
    async fn short_exposures_are_held_until_the_start_anchored_delay() {
        let mut rig = rig(vec![1]);
        rig.program.config.min_save_delay = Duration::from_millis(200);

        rig.program
            .execute(CameraCommand::Start(request(vec![1], true)))
            .await;
        rig.fake.lock().finished.insert(1);
        rig.program.refresh().await; // ReadingOut
        rig.program.refresh().await; // ImagesReady

        // Well inside the window counted from the shutter opening.
        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).exposure_state, ExposureState::ImagesReady);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let tick = rig.program.refresh().await;
        assert_eq!(info(&tick).exposure_state, ExposureState::Idle);

        for _ in 0..200 {
            if rig._dir.path().join("glance_ut1.raw").exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("held frame never saved");
    }

    #[tokio::test]
    async fn abort_clears_the_pipeline_and_leaves_records_incomplete() {
        let mut rig = rig(vec![1, 2]);
        rig.program
            .execute(CameraCommand::Start(request(vec![1, 2], false)))
            .await;
        rig.program.refresh().await;

        rig.program
            .execute(CameraCommand::Abort { units: vec![] })
            .await;

        // The abort tick reports the flag once, already back at Idle.
        let tick = rig.program.refresh().await;
        assert!(info(&tick).aborting);
        assert_eq!(info(&tick).exposure_state, ExposureState::Idle);
        assert_eq!(info(&tick).current_run_number, None);

        let tick = rig.program.refresh().await;
        assert!(!info(&tick).aborting);

        assert_eq!(rig.fake.lock().aborted, vec![1, 2]);
        // The run number stays burnt and the records stay incomplete.
        assert_eq!(rig.counter.current().await.unwrap(), 1);
        let records = rig.ledger.records_for_run(1).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.completed));
    }

    fn snapshot_with(info: CameraInfo) -> StatusSnapshot {
        StatusSnapshot {
            daemon_id: DaemonId::Cam,
            time_ns: 1,
            uptime_secs: 1,
            payload: SubsystemInfo::Camera(info),
        }
    }

    fn idle_info() -> CameraInfo {
        CameraInfo {
            exposure_state: ExposureState::Idle,
            aborting: false,
            current_run_number: None,
            exposing_since_ns: None,
            saving: false,
            units: vec![],
        }
    }

    #[test]
    fn validator_rejections() {
        let mut config = ObservatoryConfig::default();
        config.units = vec![1, 2];
        let validator = CameraValidator::new(&config, SharedFrames::default());
        let idle = snapshot_with(idle_info());

        let mut bad_binning = request(vec![1], false);
        bad_binning.binning = 99;
        assert!(matches!(
            validator.validate(&Request::TakeExposure(bad_binning), Some(&idle)),
            Err(RpcError::InvalidArgument(_))
        ));

        assert!(matches!(
            validator.validate(&Request::TakeExposure(request(vec![7], false)), Some(&idle)),
            Err(RpcError::HardwareNotConnected(units)) if units == vec![7]
        ));

        let mut busy_info = idle_info();
        busy_info.exposure_state = ExposureState::Exposing;
        let busy = snapshot_with(busy_info);
        assert!(matches!(
            validator.validate(&Request::TakeExposure(request(vec![1], false)), Some(&busy)),
            Err(RpcError::WrongState(_))
        ));

        // No snapshot yet: refuse rather than guess.
        assert!(matches!(
            validator.validate(&Request::TakeExposure(request(vec![1], false)), None),
            Err(RpcError::WrongState(_))
        ));

        assert!(matches!(
            validator.validate(&Request::AbortExposure { units: vec![] }, Some(&idle)),
            Err(RpcError::WrongState(_))
        ));

        assert!(matches!(
            validator.validate(&Request::GetLatestImage { unit: 1 }, Some(&idle)),
            Err(RpcError::InvalidArgument(_))
        ));

        assert!(matches!(
            validator.validate(
                &Request::MoveFocusers { offsets: vec![] },
                Some(&idle)
            ),
            Err(RpcError::UnsupportedCommand {
                daemon: DaemonId::Cam
            })
        ));
    }

    #[test]
    fn validator_serves_headers_from_shared_state() {
        let config = ObservatoryConfig::default();
        let latest = SharedFrames::default();
        latest_lock(&latest).headers = vec![UnitHeaders {
            unit: 1,
            cards: vec![("RUN".into(), "7".into())],
        }];
        let validator = CameraValidator::new(&config, Arc::clone(&latest));

        match validator.validate(&Request::GetLatestHeaders, None) {
            Ok(Validated::Reply(Response::Headers(headers))) => {
                assert_eq!(headers.len(), 1);
                assert_eq!(headers[0].unit, 1);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
