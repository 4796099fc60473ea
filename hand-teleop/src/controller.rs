use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use arm_ik::{ArmConfiguration, ArmMode, IkError, IkSolver, IkTarget, TargetFrame, WristOrientation};
use hand_mvg::{CameraId, HandPose, HandPoseEstimator, MvgError};

use crate::mailbox::{DetectionMailbox, MailboxRead};
use crate::sink::JointCommandSink;

/// Why a tick did not produce a new pose or joint command.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TickError {
    #[error("no projection matrix for {0}")]
    CalibrationMissing(CameraId),
    #[error("no hand detected by {0}")]
    DetectionUnavailable(CameraId),
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),
    #[error("target unreachable (elbow cosine {cos_elbow:.3})")]
    UnreachableTarget { cos_elbow: f64 },
}

impl From<MvgError> for TickError {
    fn from(orig: MvgError) -> Self {
        match orig {
            MvgError::CalibrationMissing(cam) => TickError::CalibrationMissing(cam),
            other => TickError::NumericalDegeneracy(other.to_string()),
        }
    }
}

impl From<IkError> for TickError {
    fn from(orig: IkError) -> Self {
        match orig {
            IkError::UnreachableTarget { cos_elbow } => TickError::UnreachableTarget { cos_elbow },
            other => TickError::NumericalDegeneracy(other.to_string()),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub tick: u64,
    /// A new pose was computed this tick.
    pub pose_updated: bool,
    pub emitted: Option<ArmConfiguration>,
    /// The first error of the tick, if any.
    pub error: Option<TickError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerParams {
    pub frame_width: u32,
    pub frame_height: u32,
    pub mode: ArmMode,
    pub target_frame: TargetFrame,
}

impl ControllerParams {
    pub fn from_config(cfg: &crate::TeleopConfig) -> Self {
        Self {
            frame_width: cfg.cameras.frame_width,
            frame_height: cfg.cameras.frame_height,
            mode: cfg.arm.mode,
            target_frame: cfg.arm.target_frame.clone(),
        }
    }
}

/// The per-tick pipeline from detections to joint commands.
///
/// The last valid hand pose is held while detections are missing or cannot
/// be triangulated, and joint commands keep being computed from it.
pub struct Controller<S: JointCommandSink> {
    estimator: HandPoseEstimator<f64>,
    solver: IkSolver,
    params: ControllerParams,
    cam0: DetectionMailbox,
    cam1: DetectionMailbox,
    sink: S,
    held_pose: Option<HandPose<f64>>,
    tick: u64,
    num_emitted: u64,
    calibration_warned: bool,
    /// Result of the last pose estimate.
    pose_error: Option<TickError>,
    /// A joint command error was warned for the held pose.
    command_warned: bool,
}

impl<S: JointCommandSink> Controller<S> {
    pub fn new(
        estimator: HandPoseEstimator<f64>,
        solver: IkSolver,
        params: ControllerParams,
        cam0: DetectionMailbox,
        cam1: DetectionMailbox,
        sink: S,
    ) -> Self {
        Self {
            estimator,
            solver,
            params,
            cam0,
            cam1,
            sink,
            held_pose: None,
            tick: 0,
            num_emitted: 0,
            calibration_warned: false,
            pose_error: None,
            command_warned: false,
        }
    }

    pub fn held_pose(&self) -> Option<&HandPose<f64>> {
        self.held_pose.as_ref()
    }

    pub fn num_ticks(&self) -> u64 {
        self.tick
    }

    pub fn num_emitted(&self) -> u64 {
        self.num_emitted
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run one iteration. Never fails: errors are logged and reported in the
    /// outcome.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick += 1;
        // Both slots are read exactly once per tick.
        let read0 = self.cam0.poll();
        let read1 = self.cam1.poll();

        // Unchanged detections give the same pose or error as last time.
        let fresh = read0.updated || read1.updated || self.tick == 1;
        let pose_updated = if fresh {
            match self.update_pose(&read0, &read1) {
                Ok(()) => {
                    self.pose_error = None;
                    self.command_warned = false;
                    true
                }
                Err(e) => {
                    self.log_tick_error(&e);
                    self.pose_error = Some(e);
                    false
                }
            }
        } else {
            trace!("tick {}: no new detections", self.tick);
            false
        };
        let mut error = self.pose_error.clone();

        let emitted = match self.held_pose.as_ref().map(|pose| self.command(pose)) {
            None => None,
            Some(Ok(cfg)) => {
                self.emit(&cfg);
                Some(cfg)
            }
            Some(Err(e)) => {
                // The held pose gives the same error every tick.
                if self.command_warned {
                    debug!("tick {}: {e}", self.tick);
                } else {
                    warn!("tick {}: {e}. Waiting for a new hand pose.", self.tick);
                    self.command_warned = true;
                }
                error.get_or_insert(e);
                None
            }
        };

        TickOutcome {
            tick: self.tick,
            pose_updated,
            emitted,
            error,
        }
    }

    fn update_pose(&mut self, read0: &MailboxRead, read1: &MailboxRead) -> Result<(), TickError> {
        let det0 = read0
            .detection
            .as_ref()
            .ok_or(TickError::DetectionUnavailable(CameraId::Camera0))?;
        let det1 = read1
            .detection
            .as_ref()
            .ok_or(TickError::DetectionUnavailable(CameraId::Camera1))?;
        let (w, h) = (self.params.frame_width, self.params.frame_height);
        let pose = self
            .estimator
            .estimate(&det0.to_pixels(w, h), &det1.to_pixels(w, h))?;
        debug!(
            "hand at ({:.1}, {:.1}, {:.1}), {}",
            pose.position.coords.x, pose.position.coords.y, pose.position.coords.z, pose.orientation
        );
        self.held_pose = Some(pose);
        Ok(())
    }

    fn command(&self, pose: &HandPose<f64>) -> Result<ArmConfiguration, TickError> {
        let position = self.params.target_frame.to_arm(&pose.position.coords);
        let target = match self.params.mode {
            ArmMode::Position => IkTarget::position(position),
            ArmMode::PositionAndOrientation => IkTarget::with_orientation(
                position,
                WristOrientation {
                    alpha: pose.orientation.tilt_2,
                    miu: pose.orientation.tilt_1,
                    phi: pose.orientation.twist,
                },
            ),
        };
        let solution = self.solver.solve(&target)?;
        let reached = self.solver.forward_position(&solution.theta)?;
        debug!(
            "wrist center at ({:.1}, {:.1}, {:.1}){}",
            reached.x,
            reached.y,
            reached.z,
            if solution.saturated { ", saturated" } else { "" }
        );
        Ok(self.solver.emit(&solution))
    }

    fn emit(&mut self, cfg: &ArmConfiguration) {
        self.sink.begin_tick(self.tick);
        for (joint_id, angle) in cfg.angles().iter().enumerate() {
            self.sink.set_joint_target(joint_id, *angle);
        }
        self.sink.end_tick();
        self.num_emitted += 1;
    }

    fn log_tick_error(&mut self, e: &TickError) {
        match e {
            TickError::DetectionUnavailable(_) => debug!("tick {}: {e}", self.tick),
            TickError::CalibrationMissing(_) => {
                if !self.calibration_warned {
                    warn!("{e}. No hand pose can be computed until calibration is loaded.");
                    self.calibration_warned = true;
                }
            }
            _ => warn!("tick {}: {e}", self.tick),
        }
    }
}

/// Tick the controller every `tick_period` until `shutdown` completes or
/// all detection producers have finished.
///
/// Producers still running at shutdown are aborted.
pub async fn run_control_loop<S, F>(
    mut controller: Controller<S>,
    tick_period: Duration,
    producers: Vec<JoinHandle<crate::Result<usize>>>,
    shutdown: F,
) -> Controller<S>
where
    S: JointCommandSink,
    F: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(tick_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            _ = interval.tick() => {
                // Checked before ticking so the final detections are seen.
                let exhausted = producers.iter().all(|h| h.is_finished());
                controller.tick();
                if exhausted {
                    info!("all detection sources finished");
                    break;
                }
            }
        }
    }

    for handle in producers {
        if !handle.is_finished() {
            handle.abort();
            continue;
        }
        match handle.await {
            Ok(Ok(n)) => debug!("detection source finished after {n} records"),
            Ok(Err(e)) => warn!("detection source failed: {e}"),
            Err(e) => warn!("detection source panicked: {e}"),
        }
    }
    info!(
        "{} joint commands emitted in {} ticks",
        controller.num_emitted(),
        controller.num_ticks()
    );
    controller
}
