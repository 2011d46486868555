//! Named positions loaded from a flat text file.
//!
//! Each non-blank line is `name : pose`, where the pose is either a flat
//! six-number list `[x, y, z, rx, ry, rz]` or the split form
//! `[x, y, z] with orientation: [rx, ry, rz]`. Names are matched after
//! trimming and lowercasing; the last occurrence of a duplicate wins.
//! Malformed lines are skipped with a logged warning, never an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::core::structs::Pose;

static LOG_TARGET: &'static str = "position_registry";

pub struct PositionRegistry {
    source: PathBuf,
    positions: RwLock<HashMap<String, Pose>>,
}

impl PositionRegistry {
    /// An empty registry bound to a source file. Call [`load`](Self::load)
    /// to populate it.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        PositionRegistry {
            source: source.into(),
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Read and parse the source file. A missing or unreadable file leaves
    /// the registry empty with a warning; it is not a failure.
    pub fn load(&self) {
        let content = match std::fs::read_to_string(&self.source) {
            Ok(content) => content,
            Err(e) => {
                log::warn!(target: LOG_TARGET,
                    "Positions file '{}' not readable: {}. Registry is empty.",
                    self.source.display(), e);
                return;
            }
        };
        self.load_str(&content);
    }

    /// Parse positions out of raw text content, replacing current entries.
    pub fn load_str(&self, content: &str) {
        let mut parsed = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((name_part, value_part)) = line.split_once(':') else {
                log::warn!(target: LOG_TARGET, "Skipping line without a name: '{}'", line);
                continue;
            };
            let name = name_part.trim().to_ascii_lowercase();
            if name.is_empty() {
                log::warn!(target: LOG_TARGET, "Skipping line with an empty name: '{}'", line);
                continue;
            }
            match parse_pose_expression(value_part) {
                Some(pose) => {
                    log::info!(target: LOG_TARGET, "Loaded '{}': {:?}", name, pose.values());
                    parsed.insert(name, pose);
                }
                None => {
                    log::warn!(target: LOG_TARGET, "Skipping malformed pose for '{}': '{}'",
                        name, value_part.trim());
                }
            }
        }
        log::info!(target: LOG_TARGET, "Loaded {} positions from '{}'",
            parsed.len(), self.source.display());
        *self.positions.write().unwrap() = parsed;
    }

    /// Case- and whitespace-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<Pose> {
        let key = name.trim().to_ascii_lowercase();
        self.positions.read().unwrap().get(&key).copied()
    }

    /// All known names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.positions.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.read().unwrap().is_empty()
    }

    /// Clear and re-read the source file. Not atomic with respect to
    /// concurrent readers; do not reload while commands are in flight.
    pub fn reload(&self) {
        self.positions.write().unwrap().clear();
        self.load();
    }
}

/// Parse either pose literal syntax. `value_part` is everything after the
/// first colon of the line. Split form first, since its position list
/// would also parse as a (too short) flat list.
fn parse_pose_expression(value_part: &str) -> Option<Pose> {
    if let Some((position_part, orientation_part)) = value_part.split_once("with orientation:") {
        let position = parse_bracket_list(position_part)?;
        let orientation = parse_bracket_list(orientation_part)?;
        if position.len() != 3 || orientation.len() != 3 {
            return None;
        }
        Some(Pose::from_parts(
            [position[0], position[1], position[2]],
            [orientation[0], orientation[1], orientation[2]],
        ))
    } else {
        let values = parse_bracket_list(value_part)?;
        if values.len() != 6 {
            return None;
        }
        Some(Pose::new([
            values[0], values[1], values[2], values[3], values[4], values[5],
        ]))
    }
}

/// `[a, b, c]` -> numbers. None on anything else.
fn parse_bracket_list(text: &str) -> Option<Vec<f64>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    inner
        .split(',')
        .map(|item| item.trim().parse::<f64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn registry_from(content: &str) -> PositionRegistry {
        let registry = PositionRegistry::new("unused.txt");
        registry.load_str(content);
        registry
    }

    #[test]
    fn parses_flat_and_split_syntax() {
        let registry = registry_from(
            "piece 1 : [10, 20, 30, 0, 90, 0]\n\
             bad bin : [100, 0, 50] with orientation: [0, 90, 0]\n",
        );
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("piece 1").unwrap().values(),
            [10.0, 20.0, 30.0, 0.0, 90.0, 0.0]
        );
        assert_eq!(
            registry.get("bad bin").unwrap().values(),
            [100.0, 0.0, 50.0, 0.0, 90.0, 0.0]
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let registry = registry_from(
            "good : [1, 2, 3, 4, 5, 6]\n\
             short : [1, 2, 3]\n\
             garbage : [a, b, c, d, e, f]\n\
             no brackets : 1, 2, 3, 4, 5, 6\n\
             nameless line\n\
             \n",
        );
        assert_eq!(registry.names(), vec!["good".to_string()]);
    }

    #[test]
    fn lookup_normalizes_case_and_whitespace() {
        let registry = registry_from("Piece 1 : [1, 2, 3, 4, 5, 6]\n");
        assert!(registry.get("  PIECE 1  ").is_some());
        assert!(registry.get("piece 2").is_none());
    }

    #[test]
    fn duplicate_names_last_wins() {
        let registry = registry_from(
            "spot : [1, 1, 1, 0, 0, 0]\n\
             spot : [2, 2, 2, 0, 0, 0]\n",
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("spot").unwrap().position(), [2.0, 2.0, 2.0]);
    }

    #[test]
    fn missing_file_leaves_registry_empty() {
        let registry = PositionRegistry::new("/nonexistent/positions.txt");
        registry.load();
        assert!(registry.is_empty());
    }

    #[test]
    fn reload_picks_up_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "home : [0, 0, 300, 0, 90, 0]").unwrap();
        file.flush().unwrap();

        let registry = PositionRegistry::new(file.path());
        registry.load();
        assert_eq!(registry.len(), 1);

        writeln!(file, "drop off : [50, 50, 100] with orientation: [0, 90, 0]").unwrap();
        file.flush().unwrap();
        registry.reload();

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["drop off".to_string(), "home".to_string()]);
    }
}
