//! MQTT command payloads understood by the printer firmware.

use serde::Serialize;

use crate::TARGET_DIR;

/// Sequence id the firmware echoes back in its report; not interpreted.
const SEQUENCE_ID: &str = "2000";

/// Plate gcode inside the uploaded 3MF project.
const PLATE_GCODE: &str = "Metadata/plate_1.gcode";

/// Top-level request envelope published to `device/{serial}/request`.
#[derive(Debug, Clone, Serialize)]
pub struct PrintRequest {
    pub print: PrintCommand,
}

/// Body of a `print` request.
#[derive(Debug, Clone, Serialize)]
pub struct PrintCommand {
    pub sequence_id: String,
    pub command: String,
    pub param: String,
    pub url: String,
    pub use_ams: bool,
    pub ams_mapping: Vec<i32>,
}

impl PrintRequest {
    /// Start the uploaded project `file_name` using the given AMS slots.
    pub fn project_file(file_name: &str, ams_mapping: &[i32]) -> Self {
        Self {
            print: PrintCommand {
                sequence_id: SEQUENCE_ID.to_string(),
                command: "project_file".to_string(),
                param: PLATE_GCODE.to_string(),
                url: format!("file://{TARGET_DIR}/{file_name}"),
                use_ams: true,
                ams_mapping: ams_mapping.to_vec(),
            },
        }
    }
}

/// Topic a printer listens on for commands.
pub fn request_topic(serial: &str) -> String {
    format!("device/{serial}/request")
}
