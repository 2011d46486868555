//! Pick and place as multi-step sequences over the motion driver and the
//! gripper channel.
//!
//! The two links may terminate in the same physical controller, so
//! operating the gripper can silently invalidate the motion driver's
//! session. That is steady-state behavior here, not an exceptional path:
//! every actuation is followed by [`MotionSequencer::reconcile_motion_link`],
//! a bounded best-effort health check + reconnect + settle pause, before
//! motion resumes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::core::driver::MotionDriver;
use crate::core::errors::{SequenceError, SequencePhase};
use crate::core::structs::{ChannelState, Pose};
use crate::net::gripper::GripperChannel;

static LOG_TARGET: &'static str = "sequencer";

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Depth offset between an approach pose and its contact pose.
    pub pick_offset_mm: f64,
    /// Pause after every cross-channel operation before motion resumes;
    /// commanding motion immediately after a dashboard round trip is
    /// unreliable on the underlying link.
    pub settle: Duration,
    /// Bound on waiting for the gripper to report completion.
    pub completion_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        SequencerConfig {
            pick_offset_mm: 50.0,
            settle: Duration::from_secs(1),
            completion_timeout: Duration::from_secs(30),
        }
    }
}

enum GripAction {
    Open,
    Close,
}

pub struct MotionSequencer {
    driver: Arc<dyn MotionDriver>,
    gripper: GripperChannel,
    config: SequencerConfig,
}

impl MotionSequencer {
    pub fn new(
        driver: Arc<dyn MotionDriver>,
        gripper: GripperChannel,
        config: SequencerConfig,
    ) -> Self {
        MotionSequencer {
            driver,
            gripper,
            config,
        }
    }

    /// Pick at the contact pose below `approach`:
    /// approach (joint move), open gripper, descend (linear), close
    /// gripper, retreat back to the approach pose. Each actuation is
    /// followed by link reconciliation before the next move.
    pub async fn pick(&self, approach: Pose) -> Result<(), SequenceError> {
        log::info!(target: LOG_TARGET, "Pick at approach {:?}", approach.values());

        self.driver
            .move_joint(&approach)
            .await
            .map_err(|e| SequenceError::motion(SequencePhase::Approach, e))?;

        self.actuate(GripAction::Open, SequencePhase::GripperOpen)
            .await?;

        let contact = approach.with_depth_offset(-self.config.pick_offset_mm);
        self.driver
            .move_linear(&contact)
            .await
            .map_err(|e| SequenceError::motion(SequencePhase::Contact, e))?;

        self.actuate(GripAction::Close, SequencePhase::GripperClose)
            .await?;

        self.driver
            .move_linear(&approach)
            .await
            .map_err(|e| SequenceError::motion(SequencePhase::Retreat, e))?;

        log::info!(target: LOG_TARGET, "Pick completed");
        Ok(())
    }

    /// Place at `target`: joint move there, release. No retreat; the
    /// caller issues move_home or the next pick.
    pub async fn place(&self, target: Pose) -> Result<(), SequenceError> {
        log::info!(target: LOG_TARGET, "Place at {:?}", target.values());

        self.driver
            .move_joint(&target)
            .await
            .map_err(|e| SequenceError::motion(SequencePhase::Approach, e))?;

        self.actuate(GripAction::Open, SequencePhase::Release).await?;

        log::info!(target: LOG_TARGET, "Place completed");
        Ok(())
    }

    async fn actuate(
        &self,
        action: GripAction,
        phase: SequencePhase,
    ) -> Result<(), SequenceError> {
        match action {
            GripAction::Open => self.gripper.open_gripper().await,
            GripAction::Close => self.gripper.close_gripper().await,
        }
        .map_err(|e| SequenceError::actuator(phase, e))?;

        if !self
            .gripper
            .wait_for_completion(self.config.completion_timeout)
            .await
        {
            log::warn!(target: LOG_TARGET,
                "Gripper completion unconfirmed during {}, proceeding cautiously", phase);
        }

        self.reconcile_motion_link().await;
        Ok(())
    }

    /// Check the motion link after a dashboard round trip and try one
    /// reconnect if it is degraded, then settle. Never blocks beyond the
    /// settle delay and never fails: a reconnect failure is logged and the
    /// next motion call surfaces the real problem if the link is unusable.
    pub async fn reconcile_motion_link(&self) {
        let state = self.driver.connection_state().await;
        if state != ChannelState::Ready {
            log::warn!(target: LOG_TARGET,
                "Motion link {} after gripper actuation, reconnecting", state);
            match self.driver.reconnect().await {
                Ok(()) => log::info!(target: LOG_TARGET, "Motion link re-established"),
                Err(e) => log::error!(target: LOG_TARGET,
                    "Reconnect failed: {}. Continuing in degraded mode.", e),
            }
        }
        sleep(self.config.settle).await;
    }
}
