//! Bambu-style printer command client.
//!
//! Two stateless operations drive a networked printer: upload a build file
//! over implicit FTPS and publish a `project_file` command over MQTT/TLS.
//! Both skip all network I/O when the printer address is the simulation
//! loopback address.

pub mod commander;
pub mod commands;
pub mod ftps;
pub mod mqtt;
pub mod tls;

pub use commander::{CommandError, PrinterCommander, PrinterControl};

use std::time::Duration;

/// Login name every printer accepts; the password is its access code.
pub const PRINTER_USERNAME: &str = "bblp";

/// Implicit-TLS FTP port on the printer.
pub const FTPS_PORT: u16 = 990;

/// MQTT/TLS port on the printer.
pub const MQTT_PORT: u16 = 8883;

/// Directory on the printer's SD card that receives uploaded build files.
pub const TARGET_DIR: &str = "/sdcard/factoryos";

/// Per socket/path operation timeout for FTPS.
pub const FTPS_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the MQTT CONNACK.
pub const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the MQTT session stays open after publishing.
pub const PUBLISH_LINGER: Duration = Duration::from_millis(500);

/// Printers registered with this address are simulated.
pub const SIMULATION_ADDRESS: &str = "127.0.0.1";
