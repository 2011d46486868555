//! Remote command server for a single robot arm.
//!
//! Clients send newline-delimited JSON commands over TCP; the server
//! routes them to a motion driver, a gripper addressed over a separate
//! dashboard socket, and a registry of named positions. One task per
//! connection; the driver, gripper and registry are process-wide
//! singletons shared by all sessions. Nothing serializes access to the
//! physical device across sessions — operators who run multiple clients
//! against one arm must coordinate motion themselves.

pub mod core;
pub use self::core::driver::*;
pub use self::core::errors::*;
pub use self::core::positions::PositionRegistry;
pub use self::core::sequencer::*;
pub use self::core::structs::*;

pub mod net;
pub use self::net::dispatcher::*;
pub use self::net::gripper::*;
pub use self::net::server::*;
