//! High-level printer operations used by the dispatcher.
//!
//! [`PrinterControl`] is the seam the dispatcher depends on;
//! [`PrinterCommander`] implements it with the real FTPS and MQTT protocols.
//! Both operations are stateless: every call opens and closes its own
//! sessions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::ClientConfig;

use crate::commands::PrintRequest;
use crate::ftps::{FtpsClient, FtpsError};
use crate::{mqtt, tls};
use crate::{
    FTPS_OPERATION_TIMEOUT, FTPS_PORT, PRINTER_USERNAME, SIMULATION_ADDRESS, TARGET_DIR,
};

/// Simulated upload duration.
const SIMULATED_UPLOAD: Duration = Duration::from_secs(1);

/// Simulated print-start duration.
const SIMULATED_START: Duration = Duration::from_millis(500);

/// Errors from printer operations. The display text is what ends up in a
/// failed job's error message.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Upload(#[from] FtpsError),

    #[error("connection timeout")]
    ConnectionTimeout,

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("print command was not delivered before disconnect")]
    NotDelivered,

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("failed to encode print command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Upload and start operations against one printer.
#[async_trait]
pub trait PrinterControl: Send + Sync {
    /// Copy `local_path` to the printer's target directory as `remote_name`.
    async fn upload_file(
        &self,
        ip: &str,
        access_code: &str,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<(), CommandError>;

    /// Start printing the uploaded `file_name` with the given slot mapping.
    async fn start_print(
        &self,
        ip: &str,
        serial: &str,
        access_code: &str,
        file_name: &str,
        ams_mapping: &[i32],
    ) -> Result<(), CommandError>;
}

/// Real printer client with a loopback simulation mode.
#[derive(Clone)]
pub struct PrinterCommander {
    tls: Arc<ClientConfig>,
}

impl PrinterCommander {
    pub fn new() -> Result<Self, CommandError> {
        Ok(Self {
            tls: tls::insecure_client_config()?,
        })
    }

    fn is_simulated(ip: &str) -> bool {
        ip == SIMULATION_ADDRESS
    }

    async fn ftps_upload(
        &self,
        ip: &str,
        access_code: &str,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<u64, FtpsError> {
        let mut client =
            FtpsClient::connect(ip, FTPS_PORT, Arc::clone(&self.tls), FTPS_OPERATION_TIMEOUT)
                .await?;

        let result = async {
            client.login(PRINTER_USERNAME, access_code).await?;
            client.make_directory(TARGET_DIR).await?;
            client.change_directory(TARGET_DIR).await?;
            client.upload(local_path, remote_name).await
        }
        .await;

        client.quit().await;
        result
    }
}

#[async_trait]
impl PrinterControl for PrinterCommander {
    async fn upload_file(
        &self,
        ip: &str,
        access_code: &str,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<(), CommandError> {
        if Self::is_simulated(ip) {
            tracing::info!(ip, remote_name, "Simulating upload");
            tokio::time::sleep(SIMULATED_UPLOAD).await;
            return Ok(());
        }

        tracing::info!(ip, remote_name, local = %local_path.display(), "Uploading build file");
        let bytes = self
            .ftps_upload(ip, access_code, local_path, remote_name)
            .await?;
        tracing::info!(ip, remote_name, bytes, "Upload complete");
        Ok(())
    }

    async fn start_print(
        &self,
        ip: &str,
        serial: &str,
        access_code: &str,
        file_name: &str,
        ams_mapping: &[i32],
    ) -> Result<(), CommandError> {
        if Self::is_simulated(ip) {
            tracing::info!(ip, serial, file_name, ?ams_mapping, "Simulating print start");
            tokio::time::sleep(SIMULATED_START).await;
            return Ok(());
        }

        let request = PrintRequest::project_file(file_name, ams_mapping);
        tracing::info!(ip, serial, file_name, ?ams_mapping, "Sending print command");
        mqtt::publish_command(ip, serial, access_code, &request, Arc::clone(&self.tls)).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn only_loopback_is_simulated() {
        assert!(PrinterCommander::is_simulated("127.0.0.1"));
        assert!(!PrinterCommander::is_simulated("192.168.1.40"));
        assert!(!PrinterCommander::is_simulated("localhost"));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_upload_skips_network() {
        let commander = PrinterCommander::new().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"G28\n").unwrap();

        let started = tokio::time::Instant::now();
        commander
            .upload_file("127.0.0.1", "12345678", file.path(), "cube.3mf")
            .await
            .unwrap();
        assert!(started.elapsed() >= SIMULATED_UPLOAD);
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_start_skips_network() {
        let commander = PrinterCommander::new().unwrap();
        let started = tokio::time::Instant::now();
        commander
            .start_print("127.0.0.1", "P1", "12345678", "cube.3mf", &[0])
            .await
            .unwrap();
        assert!(started.elapsed() >= SIMULATED_START);
    }

    #[test]
    fn timeout_reason_is_verbatim() {
        assert_eq!(CommandError::ConnectionTimeout.to_string(), "connection timeout");
    }

    #[test]
    fn upload_errors_keep_their_reason() {
        let err = CommandError::from(FtpsError::UnexpectedReply {
            code: 530,
            text: "Login incorrect.".into(),
        });
        assert_eq!(err.to_string(), "unexpected FTP reply 530: Login incorrect.");
        assert_matches!(err, CommandError::Upload(_));
    }
}
