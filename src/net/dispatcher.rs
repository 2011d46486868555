//! Command routing: one fixed enumeration of command kinds, each bound to
//! a handler returning `Result<Response, CommandError>`. The dispatcher
//! converts every failure into an error response; a handler can never
//! terminate a session.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::sleep;

use crate::core::driver::MotionDriver;
use crate::core::errors::{CommandError, DriverError};
use crate::core::positions::PositionRegistry;
use crate::core::sequencer::{MotionSequencer, SequencerConfig};
use crate::core::structs::{Pose, Request, Response};
use crate::net::gripper::GripperChannel;

static LOG_TARGET: &'static str = "dispatcher";

/// Every command the server understands. Adding one is a compile-checked
/// match arm, not a dictionary insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    MoveHome,
    MovePose,
    Pick,
    Place,
    PickPiece,
    PlacePiece,
    Wait,
    GetPose,
    GetJoints,
    ListPositions,
}

impl CommandKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "move_home" => Some(CommandKind::MoveHome),
            "move_pose" => Some(CommandKind::MovePose),
            "pick" => Some(CommandKind::Pick),
            "place" => Some(CommandKind::Place),
            "pick_piece" => Some(CommandKind::PickPiece),
            "place_piece" => Some(CommandKind::PlacePiece),
            "wait" => Some(CommandKind::Wait),
            "get_pose" => Some(CommandKind::GetPose),
            "get_joints" => Some(CommandKind::GetJoints),
            "list_positions" => Some(CommandKind::ListPositions),
            _ => None,
        }
    }
}

/// The process-wide shared handle behind every session: one driver, one
/// gripper, one registry. Sessions share it read-mostly; nothing here
/// serializes access to the physical device across sessions.
pub struct CommandDispatcher {
    driver: Arc<dyn MotionDriver>,
    registry: Arc<PositionRegistry>,
    sequencer: MotionSequencer,
    home: Pose,
}

impl CommandDispatcher {
    /// Wires the shared collaborators together and records the pose the
    /// arm is in right now as its home.
    pub async fn new(
        driver: Arc<dyn MotionDriver>,
        gripper: GripperChannel,
        registry: Arc<PositionRegistry>,
        config: SequencerConfig,
    ) -> Result<Self, DriverError> {
        let home = driver.current_pose().await?;
        log::info!(target: LOG_TARGET, "Home pose recorded: {:?}", home.values());
        let sequencer = MotionSequencer::new(driver.clone(), gripper, config);
        Ok(CommandDispatcher {
            driver,
            registry,
            sequencer,
            home,
        })
    }

    pub async fn dispatch(&self, request: &Request) -> Response {
        let name = request.command.trim();
        match self.route(name, request).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Command '{}' failed: {}", name, e);
                let mut response = Response::error(&e.to_string());
                match &e {
                    // no resolved command to echo
                    CommandError::NoCommand | CommandError::UnknownCommand(_) => {}
                    CommandError::PositionNotFound { available, .. } => {
                        response = response
                            .with("command", json!(name))
                            .with("available_positions", json!(available));
                    }
                    _ => {
                        response = response.with("command", json!(name));
                    }
                }
                response
            }
        }
    }

    async fn route(&self, name: &str, request: &Request) -> Result<Response, CommandError> {
        if name.is_empty() {
            return Err(CommandError::NoCommand);
        }
        let kind = CommandKind::parse(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))?;
        self.execute(kind, request).await
    }

    async fn execute(&self, kind: CommandKind, request: &Request) -> Result<Response, CommandError> {
        match kind {
            CommandKind::MoveHome => {
                self.driver.move_joint(&self.home).await?;
                Ok(Response::success("move_home"))
            }
            CommandKind::MovePose => {
                let pose = pose_field(request, "pose")?;
                self.driver.move_joint(&pose).await?;
                Ok(Response::success("move_pose"))
            }
            CommandKind::Pick => {
                let approach = pose_from_parts(request)?;
                self.sequencer.pick(approach).await?;
                Ok(Response::success("pick"))
            }
            CommandKind::Place => {
                let target = pose_from_parts(request)?;
                self.sequencer.place(target).await?;
                Ok(Response::success("place"))
            }
            CommandKind::PickPiece => {
                let name = string_field(request, "piece")?;
                let pose = self.resolve(&name)?;
                self.sequencer.pick(pose).await?;
                Ok(Response::success("pick_piece")
                    .with("position", json!(pose.position()))
                    .with("orientation", json!(pose.orientation())))
            }
            CommandKind::PlacePiece => {
                let name = string_field(request, "location")?;
                let pose = self.resolve(&name)?;
                self.sequencer.place(pose).await?;
                Ok(Response::success("place_piece")
                    .with("position", json!(pose.position()))
                    .with("orientation", json!(pose.orientation())))
            }
            CommandKind::Wait => {
                let duration = duration_field(request, "duration")?;
                log::info!(target: LOG_TARGET, "Waiting for {:?}", duration);
                sleep(duration).await;
                Ok(Response::success("wait"))
            }
            CommandKind::GetPose => {
                let pose = self.driver.current_pose().await?;
                Ok(Response::success("get_pose").with("pose", json!(pose.values())))
            }
            CommandKind::GetJoints => {
                let joints = self.driver.current_joints().await?;
                Ok(Response::success("get_joints").with("joints", json!(joints)))
            }
            CommandKind::ListPositions => {
                Ok(Response::success("list_positions")
                    .with("positions", json!(self.registry.names())))
            }
        }
    }

    fn resolve(&self, name: &str) -> Result<Pose, CommandError> {
        self.registry
            .get(name)
            .ok_or_else(|| CommandError::PositionNotFound {
                name: name.to_string(),
                available: self.registry.names(),
            })
    }
}

fn required<'a>(request: &'a Request, key: &str) -> Result<&'a Value, CommandError> {
    request
        .field(key)
        .ok_or_else(|| CommandError::InvalidArgument(format!("Missing required field '{key}'")))
}

fn string_field(request: &Request, key: &str) -> Result<String, CommandError> {
    required(request, key)?
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| CommandError::InvalidArgument(format!("Field '{key}' must be a string")))
}

fn number_list(value: &Value, key: &str, expected: usize) -> Result<Vec<f64>, CommandError> {
    let items = value
        .as_array()
        .ok_or_else(|| CommandError::InvalidArgument(format!("Field '{key}' must be a list")))?;
    if items.len() != expected {
        return Err(CommandError::InvalidArgument(format!(
            "Field '{key}' must contain {expected} elements, got {}",
            items.len()
        )));
    }
    items
        .iter()
        .map(|item| {
            item.as_f64().filter(|v| v.is_finite()).ok_or_else(|| {
                CommandError::InvalidArgument(format!("Field '{key}' must contain only numbers"))
            })
        })
        .collect()
}

fn pose_field(request: &Request, key: &str) -> Result<Pose, CommandError> {
    let values = number_list(required(request, key)?, key, 6)?;
    Ok(Pose::new([
        values[0], values[1], values[2], values[3], values[4], values[5],
    ]))
}

/// pick/place take the target split as position + orientation triples.
fn pose_from_parts(request: &Request) -> Result<Pose, CommandError> {
    let position = number_list(required(request, "position")?, "position", 3)?;
    let orientation = number_list(required(request, "orientation")?, "orientation", 3)?;
    Ok(Pose::from_parts(
        [position[0], position[1], position[2]],
        [orientation[0], orientation[1], orientation[2]],
    ))
}

fn duration_field(request: &Request, key: &str) -> Result<Duration, CommandError> {
    let seconds = required(request, key)?.as_f64().ok_or_else(|| {
        CommandError::InvalidArgument(format!("Field '{key}' must be a number of seconds"))
    })?;
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        CommandError::InvalidArgument(format!(
            "Field '{key}' must be a non-negative number of seconds"
        ))
    })
}
