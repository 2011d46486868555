use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A 6-component spatial target: x, y, z in millimeters followed by
/// rx, ry, rz in degrees. Serializes as a flat 6-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose(pub [f64; 6]);

impl Pose {
    pub fn new(values: [f64; 6]) -> Self {
        Pose(values)
    }

    pub fn from_parts(position: [f64; 3], orientation: [f64; 3]) -> Self {
        Pose([
            position[0],
            position[1],
            position[2],
            orientation[0],
            orientation[1],
            orientation[2],
        ])
    }

    pub fn values(&self) -> [f64; 6] {
        self.0
    }

    pub fn position(&self) -> [f64; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    pub fn orientation(&self) -> [f64; 3] {
        [self.0[3], self.0[4], self.0[5]]
    }

    /// Same target shifted along the tool depth axis (z). Used to derive
    /// the contact pose from an approach pose.
    pub fn with_depth_offset(&self, offset_mm: f64) -> Self {
        let mut values = self.0;
        values[2] += offset_mm;
        Pose(values)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

/// Health of a command/response link, recomputed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Ready,
    Busy,
    Disconnected,
    Unknown,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Ready => write!(f, "ready"),
            ChannelState::Busy => write!(f, "busy"),
            ChannelState::Disconnected => write!(f, "disconnected"),
            ChannelState::Unknown => write!(f, "unknown"),
        }
    }
}

/// One decoded client request. Anything besides `command` stays in
/// `fields` for the handler to pull out.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub command: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Request {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// One JSON response object. Every response carries `status`; error
/// responses carry `message`; handlers attach whatever else they echo.
#[derive(Debug, Clone)]
pub struct Response(Map<String, Value>);

impl Response {
    pub fn success(command: &str) -> Self {
        let mut map = Map::new();
        map.insert("status".to_string(), json!("success"));
        map.insert("command".to_string(), json!(command));
        Response(map)
    }

    pub fn error(message: &str) -> Self {
        let mut map = Map::new();
        map.insert("status".to_string(), json!("error"));
        map.insert("message".to_string(), json!(message));
        Response(map)
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.0.get("status").and_then(Value::as_str) == Some("success")
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}
