use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::frame_source::FrameSource;
use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::face_locator::FaceLocator;
use crate::gaze::domain::eye_geometry::GazePoint;
use crate::gaze::gaze_estimator::{is_gaze_valid, GazeEstimator};
use crate::protection::domain::protection_mode::ProtectionError;
use crate::protection::screen_protector::ScreenProtector;
use crate::shared::constants::STOP_JOIN_TIMEOUT;
use crate::shared::frame::Frame;
use crate::shared::thread_util::{join_with_timeout, lock};

const NO_FRAME_DELAY: Duration = Duration::from_millis(10);
const ERROR_DELAY: Duration = Duration::from_millis(100);
const RATE_SLACK: Duration = Duration::from_millis(1);
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Non-blocking access to the newest camera frame.
pub trait LatestFrame: Send + Sync {
    fn latest_frame(&self) -> Option<Frame>;
}

impl LatestFrame for FrameSource {
    fn latest_frame(&self) -> Option<Frame> {
        self.get_frame()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    Remove,
    None,
}

/// Protection follows presence: a present user clears it, an absent one sets it.
pub fn decide(present: bool, protected: bool) -> Transition {
    match (present, protected) {
        (true, true) => Transition::Remove,
        (false, false) => Transition::Apply,
        _ => Transition::None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresencePolicy {
    pub recognition_enabled: bool,
    pub gaze_enabled: bool,
    pub tolerance_degrees: f64,
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self {
            recognition_enabled: false,
            gaze_enabled: true,
            tolerance_degrees: 15.0,
        }
    }
}

/// Flat view of the controller, shared with the application.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerState {
    pub is_protected: bool,
    pub face_detected: Option<bool>,
    pub gaze_direction: Option<GazePoint>,
    pub fps: f64,
    pub avg_reaction_time_ms: f64,
}

/// Reaction time and loop rate bookkeeping.
#[derive(Debug, Clone)]
pub struct TickMetrics {
    avg_reaction_ms: f64,
    ticks_in_window: u32,
    window_start: Instant,
    fps: f64,
}

impl TickMetrics {
    pub fn new(now: Instant) -> Self {
        Self {
            avg_reaction_ms: 0.0,
            ticks_in_window: 0,
            window_start: now,
            fps: 0.0,
        }
    }

    /// The first sample seeds the average; later ones halve towards the newest.
    pub fn record(&mut self, reaction: Duration, now: Instant) {
        let ms = reaction.as_secs_f64() * 1000.0;
        self.avg_reaction_ms = if self.avg_reaction_ms == 0.0 {
            ms
        } else {
            (self.avg_reaction_ms + ms) / 2.0
        };

        self.ticks_in_window += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= FPS_WINDOW {
            self.fps = self.ticks_in_window as f64 / elapsed.as_secs_f64();
            log::debug!(
                "Current FPS: {:.1}, Avg Reaction Time: {:.1}ms",
                self.fps,
                self.avg_reaction_ms
            );
            self.ticks_in_window = 0;
            self.window_start = now;
        }
    }

    pub fn avg_reaction_ms(&self) -> f64 {
        self.avg_reaction_ms
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

/// Everything one tick needs. Cloned into the loop thread.
#[derive(Clone)]
struct Ticker {
    frames: Arc<dyn LatestFrame>,
    locator: Arc<Mutex<FaceLocator>>,
    gaze: Arc<Mutex<GazeEstimator>>,
    protector: Arc<Mutex<ScreenProtector>>,
    policy: PresencePolicy,
    state: Arc<Mutex<ControllerState>>,
}

impl Ticker {
    /// `Ok(false)` when there was no frame to look at.
    fn tick(&self) -> Result<bool, ProtectionError> {
        let Some(frame) = self.frames.latest_frame() else {
            return Ok(false);
        };

        let faces = lock(&self.locator).detect_faces(&frame);
        let gaze = match faces.first() {
            Some(face) => lock(&self.gaze).estimate(&frame, face),
            None => None,
        };
        let present = self.is_user_present(&frame, &faces, gaze);

        let protected = lock(&self.state).is_protected;
        let transition = decide(present, protected);
        match transition {
            Transition::Remove => {
                if !lock(&self.protector).remove_protection() {
                    return Err(ProtectionError::Effect("could not remove protection".into()));
                }
                log::debug!("User detected, protection removed");
            }
            Transition::Apply => {
                if !lock(&self.protector).apply_protection() {
                    return Err(ProtectionError::Effect("could not apply protection".into()));
                }
                log::debug!("User not detected, protection applied");
            }
            Transition::None => {}
        }

        let mut state = lock(&self.state);
        match transition {
            Transition::Remove => state.is_protected = false,
            Transition::Apply => state.is_protected = true,
            Transition::None => {}
        }
        state.face_detected = Some(!faces.is_empty());
        state.gaze_direction = gaze;
        Ok(true)
    }

    fn is_user_present(&self, frame: &Frame, faces: &[DetectedFace], gaze: Option<GazePoint>) -> bool {
        let Some(first) = faces.first() else {
            return false;
        };
        if self.policy.recognition_enabled && lock(&self.locator).recognize_face(frame, first).is_none() {
            return false;
        }
        match gaze {
            Some(point) if self.policy.gaze_enabled => is_gaze_valid(point, self.policy.tolerance_degrees),
            _ => true,
        }
    }
}

/// Runs the presence decision loop on its own thread.
pub struct ProtectionController {
    ticker: Ticker,
    target_fps: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ProtectionController {
    pub fn new(
        frames: Arc<dyn LatestFrame>,
        locator: Arc<Mutex<FaceLocator>>,
        gaze: Arc<Mutex<GazeEstimator>>,
        protector: Arc<Mutex<ScreenProtector>>,
        policy: PresencePolicy,
        target_fps: u32,
    ) -> Self {
        Self {
            ticker: Ticker {
                frames,
                locator,
                gaze,
                protector,
                policy,
                state: Arc::new(Mutex::new(ControllerState::default())),
            },
            target_fps: Arc::new(AtomicU32::new(target_fps.max(1))),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            log::debug!("Protection loop already running");
            return true;
        }
        let handle = spawn_protection_loop(
            self.ticker.clone(),
            self.running.clone(),
            self.target_fps.clone(),
        );
        *lock(&self.worker) = Some(handle);
        true
    }

    /// Stop the loop and lift any active protection. Safe to call repeatedly.
    pub fn stop(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.worker).take() {
            if join_with_timeout(handle, STOP_JOIN_TIMEOUT).is_none() {
                log::warn!("Protection loop did not exit in time");
            }
        }

        let mut state = lock(&self.ticker.state);
        if state.is_protected {
            if !lock(&self.ticker.protector).remove_protection() {
                return false;
            }
            state.is_protected = false;
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_target_fps(&self, fps: u32) {
        self.target_fps.store(fps.max(1), Ordering::Relaxed);
    }

    pub fn state(&self) -> ControllerState {
        lock(&self.ticker.state).clone()
    }

    /// Run one tick on the calling thread.
    pub fn tick_once(&self) -> Result<bool, ProtectionError> {
        self.ticker.tick()
    }
}

impl Drop for ProtectionController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_protection_loop(
    ticker: Ticker,
    running: Arc<AtomicBool>,
    target_fps: Arc<AtomicU32>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        log::debug!("Starting protection loop");
        let mut metrics = TickMetrics::new(Instant::now());

        while running.load(Ordering::SeqCst) {
            let started = Instant::now();
            match ticker.tick() {
                Ok(false) => {
                    std::thread::sleep(NO_FRAME_DELAY);
                    continue;
                }
                Ok(true) => {}
                Err(e) => {
                    log::error!("Error in protection loop: {e}");
                    std::thread::sleep(ERROR_DELAY);
                    continue;
                }
            }

            let now = Instant::now();
            metrics.record(now.duration_since(started), now);
            {
                let mut state = lock(&ticker.state);
                state.fps = metrics.fps();
                state.avg_reaction_time_ms = metrics.avg_reaction_ms();
            }

            let fps = target_fps.load(Ordering::Relaxed).max(1);
            let interval = Duration::from_secs_f64(1.0 / fps as f64);
            std::thread::sleep(interval.saturating_sub(RATE_SLACK));
        }
        log::debug!("Protection loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detected_face::{BoundingBox, DetectionMethod};
    use crate::detection::domain::face_detector::FaceDetector;
    use crate::detection::face_locator::FaceLocatorConfig;
    use crate::gaze::gaze_estimator::GazeEstimatorConfig;
    use crate::protection::domain::effect_handler::EffectHandler;
    use crate::protection::domain::effect_parameters::EffectParameters;
    use crate::protection::domain::protection_mode::ProtectionMode;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::collections::VecDeque;

    struct OneFrame;

    impl LatestFrame for OneFrame {
        fn latest_frame(&self) -> Option<Frame> {
            Some(Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3, 0))
        }
    }

    struct NoFrame;

    impl LatestFrame for NoFrame {
        fn latest_frame(&self) -> Option<Frame> {
            None
        }
    }

    /// Replays a scripted presence sequence, one entry per call.
    struct ScriptedDetector {
        script: Arc<Mutex<VecDeque<bool>>>,
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&mut self, _: &Frame) -> Result<Vec<DetectedFace>, Box<dyn std::error::Error>> {
            let present = self.script.lock().unwrap().pop_front().unwrap_or(false);
            Ok(if present {
                vec![DetectedFace::new(
                    BoundingBox::new(1, 1, 4, 4),
                    0.95,
                    vec![],
                    DetectionMethod::Neural,
                )]
            } else {
                vec![]
            })
        }
    }

    #[derive(Clone, Default)]
    struct CountingHandler {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl EffectHandler for CountingHandler {
        fn apply(&mut self, _: ProtectionMode, _: &EffectParameters) -> Result<(), ProtectionError> {
            self.log.lock().unwrap().push("apply");
            Ok(())
        }

        fn remove(&mut self, _: ProtectionMode) -> Result<(), ProtectionError> {
            self.log.lock().unwrap().push("remove");
            Ok(())
        }
    }

    fn controller(
        frames: Arc<dyn LatestFrame>,
        presence: &[bool],
    ) -> (ProtectionController, Arc<Mutex<Vec<&'static str>>>) {
        let script = Arc::new(Mutex::new(presence.iter().copied().collect()));
        let locator = FaceLocator::new(
            Some(Box::new(ScriptedDetector { script })),
            None,
            FaceLocatorConfig::default(),
        );
        let gaze = GazeEstimator::new(None, GazeEstimatorConfig::default());
        let handler = CountingHandler::default();
        let log = handler.log.clone();
        let protector = ScreenProtector::new(
            Box::new(handler),
            ProtectionMode::Blur,
            EffectParameters::default(),
        );
        let controller = ProtectionController::new(
            frames,
            Arc::new(Mutex::new(locator)),
            Arc::new(Mutex::new(gaze)),
            Arc::new(Mutex::new(protector)),
            PresencePolicy::default(),
            30,
        );
        (controller, log)
    }

    // ── Decision ──

    #[rstest]
    #[case::present_protected(true, true, Transition::Remove)]
    #[case::absent_unprotected(false, false, Transition::Apply)]
    #[case::present_unprotected(true, false, Transition::None)]
    #[case::absent_protected(false, true, Transition::None)]
    fn test_decide(#[case] present: bool, #[case] protected: bool, #[case] expected: Transition) {
        assert_eq!(decide(present, protected), expected);
    }

    #[test]
    fn test_decide_sequence_toggles_on_crossings() {
        let mut protected = false;
        let mut transitions = Vec::new();
        for present in [false, false, true, true, false] {
            match decide(present, protected) {
                Transition::Apply => {
                    protected = true;
                    transitions.push(Transition::Apply);
                }
                Transition::Remove => {
                    protected = false;
                    transitions.push(Transition::Remove);
                }
                Transition::None => {}
            }
        }
        assert_eq!(
            transitions,
            vec![Transition::Apply, Transition::Remove, Transition::Apply]
        );
    }

    // ── Ticks ──

    #[test]
    fn test_ticks_follow_presence() {
        let (ctrl, log) = controller(Arc::new(OneFrame), &[false, false, true, true, false]);
        for _ in 0..5 {
            assert_eq!(ctrl.tick_once(), Ok(true));
        }
        assert_eq!(*log.lock().unwrap(), vec!["apply", "remove", "apply"]);
        let state = ctrl.state();
        assert!(state.is_protected);
        assert_eq!(state.face_detected, Some(false));
    }

    #[test]
    fn test_tick_without_frame_does_nothing() {
        let (ctrl, log) = controller(Arc::new(NoFrame), &[false]);
        assert_eq!(ctrl.tick_once(), Ok(false));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ctrl.state().face_detected, None);
    }

    #[test]
    fn test_stop_lifts_protection() {
        let (ctrl, log) = controller(Arc::new(OneFrame), &[false]);
        ctrl.tick_once().unwrap();
        assert!(ctrl.stop());
        assert!(!ctrl.state().is_protected);
        assert_eq!(*log.lock().unwrap(), vec!["apply", "remove"]);
    }

    #[test]
    fn test_loop_thread_starts_and_stops() {
        let (ctrl, log) = controller(Arc::new(OneFrame), &[]);
        assert!(ctrl.start());
        assert!(ctrl.is_running());
        std::thread::sleep(Duration::from_millis(100));
        assert!(ctrl.stop());
        assert!(!ctrl.is_running());
        let calls = log.lock().unwrap();
        assert_eq!(calls.first(), Some(&"apply"));
        assert_eq!(calls.last(), Some(&"remove"));
    }

    // ── Metrics ──

    #[test]
    fn test_reaction_average_seeds_then_halves() {
        let t0 = Instant::now();
        let mut m = TickMetrics::new(t0);
        m.record(Duration::from_millis(40), t0);
        assert_relative_eq!(m.avg_reaction_ms(), 40.0, epsilon = 1e-9);
        m.record(Duration::from_millis(20), t0);
        assert_relative_eq!(m.avg_reaction_ms(), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fps_computed_after_one_second() {
        let t0 = Instant::now();
        let mut m = TickMetrics::new(t0);
        for i in 1..=9 {
            m.record(Duration::from_millis(1), t0 + Duration::from_millis(100 * i));
        }
        assert_eq!(m.fps(), 0.0);
        m.record(Duration::from_millis(1), t0 + Duration::from_secs(1));
        assert_relative_eq!(m.fps(), 10.0, epsilon = 1e-9);
    }
}
