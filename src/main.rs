use std::sync::Arc;
use std::time::Duration;

use ur_command_server::{
    CommandDispatcher, CommandServer, GripperChannel, GripperConfig, MotionDriver,
    PositionRegistry, SequencerConfig, SimMotionDriver,
};

pub static NODE_ID: &'static str = "ur_command_server";

fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) => value,
        Err(_) => {
            log::warn!(target: NODE_ID, "{} is not set, using '{}'.", key, default);
            default.to_string()
        }
    }
}

fn env_f64_or(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(value_str) => match value_str.parse::<f64>() {
            Ok(value) => value,
            Err(e) => {
                log::error!(target: NODE_ID,
                    "Failed to parse {} value '{}' as a number: {}", key, value_str, e);
                log::error!(target: NODE_ID, "Setting {} to {}.", key, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let server_address = env_or("SERVER_ADDRESS", "0.0.0.0:5000");
    let gripper_address = env_or("GRIPPER_ADDRESS", "192.168.1.10:29999");
    let positions_file = env_or("POSITIONS_FILE", "positions.txt");
    let speed_percent = env_f64_or("SPEED_PERCENT", 50.0);
    let acceleration_percent = env_f64_or("ACCELERATION_PERCENT", 50.0);
    let pick_offset_mm = env_f64_or("PICK_OFFSET_MM", 50.0);
    let settle_ms = env_f64_or("SETTLE_MS", 1000.0);
    let poll_ms = env_f64_or("ACTUATOR_POLL_MS", 300.0);
    let actuator_timeout_ms = env_f64_or("ACTUATOR_TIMEOUT_MS", 5000.0);

    let simulation = match std::env::var("SIMULATION") {
        Ok(value_str) => match value_str.to_lowercase().parse::<bool>() {
            Ok(value) => value,
            Err(e) => {
                log::error!(target: NODE_ID,
                    "Failed to parse SIMULATION value '{}' as boolean: {}", value_str, e);
                log::error!(target: NODE_ID, "Setting SIMULATION to true.");
                true
            }
        },
        Err(_) => {
            log::warn!(target: NODE_ID, "SIMULATION is not set, using the simulated driver.");
            true
        }
    };

    let registry = Arc::new(PositionRegistry::new(&positions_file));
    registry.load();

    let driver: Arc<dyn MotionDriver> = if simulation {
        Arc::new(SimMotionDriver::new())
    } else {
        // Wiring in a hardware driver means implementing MotionDriver for
        // it and constructing it here; until then the simulated driver
        // keeps the server usable.
        log::error!(target: NODE_ID,
            "No hardware motion driver is built in yet, falling back to simulation.");
        Arc::new(SimMotionDriver::new())
    };

    driver.set_speed(speed_percent).await?;
    driver.set_acceleration(acceleration_percent).await?;
    log::info!(target: NODE_ID,
        "Driver configured: speed {}%, acceleration {}%.", speed_percent, acceleration_percent);

    let gripper = GripperChannel::new(GripperConfig {
        address: gripper_address,
        response_timeout: Duration::from_millis(actuator_timeout_ms as u64),
        poll_interval: Duration::from_millis(poll_ms as u64),
        ..GripperConfig::default()
    });
    if let Err(e) = gripper.connect().await {
        log::warn!(target: NODE_ID,
            "Gripper dashboard not reachable: {}. Pick/place will fail until it is.", e);
    }

    let sequencer_config = SequencerConfig {
        pick_offset_mm,
        settle: Duration::from_millis(settle_ms as u64),
        ..SequencerConfig::default()
    };

    let dispatcher =
        Arc::new(CommandDispatcher::new(driver, gripper, registry, sequencer_config).await?);

    let server = CommandServer::bind(&server_address, dispatcher).await?;
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!(target: NODE_ID, "Failed to listen for ctrl-c: {}", e);
            return;
        }
        log::info!(target: NODE_ID, "Shutting down gracefully...");
        shutdown.cancel();
    });

    server.run().await?;
    Ok(())
}
