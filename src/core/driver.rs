//! The boundary to the external motion engine.
//!
//! Everything the command layer needs from a real arm goes through
//! [`MotionDriver`]; kinematics, planning and the wire protocol of the
//! actual hardware live behind it. [`SimMotionDriver`] stands in when no
//! hardware is attached and carries the whole test suite.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::errors::DriverError;
use crate::core::structs::{ChannelState, Pose};

#[async_trait]
pub trait MotionDriver: Send + Sync {
    /// Joint-interpolated move. Blocks until the motion completes.
    async fn move_joint(&self, target: &Pose) -> Result<(), DriverError>;

    /// Linear (cartesian) move. Blocks until the motion completes.
    async fn move_linear(&self, target: &Pose) -> Result<(), DriverError>;

    async fn current_pose(&self) -> Result<Pose, DriverError>;

    async fn current_joints(&self) -> Result<Vec<f64>, DriverError>;

    async fn set_speed(&self, percent: f64) -> Result<(), DriverError>;

    async fn set_acceleration(&self, percent: f64) -> Result<(), DriverError>;

    async fn set_corner_rounding(&self, radius_mm: f64) -> Result<(), DriverError>;

    /// Health of the driver's own link, recomputed on demand.
    async fn connection_state(&self) -> ChannelState;

    /// Best-effort session re-establishment. May itself fail; callers are
    /// expected to keep going in degraded mode rather than abort.
    async fn reconnect(&self) -> Result<(), DriverError>;
}

pub fn validate_pose(target: &Pose) -> Result<(), DriverError> {
    if !target.is_finite() {
        return Err(DriverError::InvalidArgument(
            "pose components must be finite numbers".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_percent(value: f64, what: &str) -> Result<(), DriverError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(DriverError::InvalidArgument(format!(
            "{what} must be between 0 and 100, got {value}"
        )));
    }
    Ok(())
}

/// How long a simulated move takes, so concurrent-session behavior is
/// observable in tests without stalling them.
const SIM_MOVE_DURATION: Duration = Duration::from_millis(10);

struct SimState {
    pose: Pose,
    joints: [f64; 6],
    speed_percent: f64,
    acceleration_percent: f64,
    corner_radius_mm: f64,
    link: ChannelState,
    fail_next_move: Option<String>,
    fail_reconnect: bool,
}

/// In-process stand-in for a real arm. Moves complete after a short fixed
/// delay and update the stored pose; the link state and move failures can
/// be scripted from tests.
pub struct SimMotionDriver {
    state: Mutex<SimState>,
}

impl SimMotionDriver {
    pub fn new() -> Self {
        SimMotionDriver {
            state: Mutex::new(SimState {
                pose: Pose::new([400.0, 0.0, 300.0, 0.0, 90.0, 0.0]),
                joints: [0.0, -90.0, 0.0, -90.0, 0.0, 0.0],
                speed_percent: 50.0,
                acceleration_percent: 50.0,
                corner_radius_mm: 0.0,
                link: ChannelState::Ready,
                fail_next_move: None,
                fail_reconnect: false,
            }),
        }
    }

    pub fn set_link_state(&self, link: ChannelState) {
        self.state.lock().unwrap().link = link;
    }

    /// Make the next move fail with the given message.
    pub fn fail_next_move(&self, message: &str) {
        self.state.lock().unwrap().fail_next_move = Some(message.to_string());
    }

    pub fn fail_reconnect(&self, fail: bool) {
        self.state.lock().unwrap().fail_reconnect = fail;
    }

    fn complete_move(&self, target: &Pose) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.fail_next_move.take() {
            return Err(DriverError::Motion(message));
        }
        if state.link == ChannelState::Disconnected {
            return Err(DriverError::ConnectionLost);
        }
        state.pose = *target;
        state.joints = fake_joint_solution(target);
        Ok(())
    }
}

impl Default for SimMotionDriver {
    fn default() -> Self {
        SimMotionDriver::new()
    }
}

/// Coarse stand-in for a joint solution, not a kinematic solve. Enough to
/// make get_joints report something that tracks the pose.
fn fake_joint_solution(pose: &Pose) -> [f64; 6] {
    let [x, y, z] = pose.position();
    let [rx, ry, rz] = pose.orientation();
    let base = y.atan2(x).to_degrees();
    [base, -90.0 + z * 0.05, -z * 0.05, rx - 90.0, ry, rz]
}

#[async_trait]
impl MotionDriver for SimMotionDriver {
    async fn move_joint(&self, target: &Pose) -> Result<(), DriverError> {
        validate_pose(target)?;
        tokio::time::sleep(SIM_MOVE_DURATION).await;
        self.complete_move(target)
    }

    async fn move_linear(&self, target: &Pose) -> Result<(), DriverError> {
        validate_pose(target)?;
        tokio::time::sleep(SIM_MOVE_DURATION).await;
        self.complete_move(target)
    }

    async fn current_pose(&self) -> Result<Pose, DriverError> {
        Ok(self.state.lock().unwrap().pose)
    }

    async fn current_joints(&self) -> Result<Vec<f64>, DriverError> {
        Ok(self.state.lock().unwrap().joints.to_vec())
    }

    async fn set_speed(&self, percent: f64) -> Result<(), DriverError> {
        validate_percent(percent, "speed")?;
        self.state.lock().unwrap().speed_percent = percent;
        Ok(())
    }

    async fn set_acceleration(&self, percent: f64) -> Result<(), DriverError> {
        validate_percent(percent, "acceleration")?;
        self.state.lock().unwrap().acceleration_percent = percent;
        Ok(())
    }

    async fn set_corner_rounding(&self, radius_mm: f64) -> Result<(), DriverError> {
        if !radius_mm.is_finite() || radius_mm < 0.0 {
            return Err(DriverError::InvalidArgument(format!(
                "corner rounding radius must be non-negative, got {radius_mm}"
            )));
        }
        self.state.lock().unwrap().corner_radius_mm = radius_mm;
        Ok(())
    }

    async fn connection_state(&self) -> ChannelState {
        self.state.lock().unwrap().link
    }

    async fn reconnect(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reconnect {
            return Err(DriverError::ReconnectFailed(
                "simulated link refused to come back".to_string(),
            ));
        }
        state.link = ChannelState::Ready;
        Ok(())
    }
}
