//! Minimal implicit-TLS FTP client.
//!
//! Printers expose an FTPS server on port 990 that expects TLS from the first
//! byte (implicit mode) on both the control and the data connection. Only the
//! command subset needed to drop a build file into a directory is supported:
//! login, `MKD`, `CWD`, binary `STOR` over passive mode, and `QUIT`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Size of each read from the local file during `STOR`.
const CHUNK_SIZE: usize = 64 * 1024;

/// Errors raised by the FTPS client.
#[derive(Debug, thiserror::Error)]
pub enum FtpsError {
    #[error("FTPS I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FTPS timeout during {0}")]
    Timeout(&'static str),

    #[error("invalid FTPS host: {0}")]
    InvalidHost(String),

    #[error("FTPS connection closed by server")]
    ConnectionClosed,

    #[error("malformed FTP reply: {0}")]
    MalformedReply(String),

    #[error("unexpected FTP reply {code}: {text}")]
    UnexpectedReply { code: u16, text: String },
}

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    fn require(self, accepted: &[u16]) -> Result<Reply, FtpsError> {
        if accepted.contains(&self.code) {
            Ok(self)
        } else {
            Err(FtpsError::UnexpectedReply {
                code: self.code,
                text: self.text,
            })
        }
    }
}

/// An authenticated-or-not control session with one FTPS server.
pub struct FtpsClient {
    host: String,
    control: BufReader<TlsStream<TcpStream>>,
    connector: TlsConnector,
    server_name: ServerName<'static>,
    timeout: Duration,
}

impl FtpsClient {
    /// Open the control connection and consume the `220` greeting.
    pub async fn connect(
        host: &str,
        port: u16,
        tls: Arc<ClientConfig>,
        timeout: Duration,
    ) -> Result<Self, FtpsError> {
        let server_name = ServerName::try_from(host)
            .map_err(|_| FtpsError::InvalidHost(host.to_string()))?
            .to_owned();
        let connector = TlsConnector::from(tls);

        let tcp = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| FtpsError::Timeout("connect"))??;
        let stream = tokio::time::timeout(timeout, connector.connect(server_name.clone(), tcp))
            .await
            .map_err(|_| FtpsError::Timeout("TLS handshake"))??;

        let mut client = Self {
            host: host.to_string(),
            control: BufReader::new(stream),
            connector,
            server_name,
            timeout,
        };

        client.read_reply().await?.require(&[220])?;
        tracing::debug!(host, port, "FTPS control connection established");
        Ok(client)
    }

    /// Authenticate and switch the data channel to private protection.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), FtpsError> {
        let reply = self.command(&format!("USER {user}")).await?.require(&[230, 331])?;
        if reply.code == 331 {
            self.command(&format!("PASS {password}")).await?.require(&[230, 202])?;
        }

        self.command("PBSZ 0").await?.require(&[200])?;
        self.command("PROT P").await?.require(&[200])?;
        Ok(())
    }

    /// Create `path`. A permanent-failure reply is taken to mean the
    /// directory already exists.
    pub async fn make_directory(&mut self, path: &str) -> Result<(), FtpsError> {
        let reply = self.command(&format!("MKD {path}")).await?;
        match reply.code {
            257 => Ok(()),
            500..=599 => {
                tracing::debug!(path, code = reply.code, reply = %reply.text, "MKD refused, assuming directory exists");
                Ok(())
            }
            _ => Err(FtpsError::UnexpectedReply {
                code: reply.code,
                text: reply.text,
            }),
        }
    }

    pub async fn change_directory(&mut self, path: &str) -> Result<(), FtpsError> {
        self.command(&format!("CWD {path}")).await?.require(&[250])?;
        Ok(())
    }

    /// Store `local` as `remote_name` in the current directory.
    ///
    /// Returns the number of bytes sent.
    pub async fn upload(&mut self, local: &Path, remote_name: &str) -> Result<u64, FtpsError> {
        let mut file = File::open(local).await?;

        self.command("TYPE I").await?.require(&[200])?;
        let pasv = self.command("PASV").await?.require(&[227])?;
        let port = parse_pasv_port(&pasv.text)?;

        // The advertised address is ignored; printers behind NAT report
        // their internal one. The data channel goes to the control host.
        let tcp = tokio::time::timeout(self.timeout, TcpStream::connect((self.host.as_str(), port)))
            .await
            .map_err(|_| FtpsError::Timeout("data connect"))??;

        self.command(&format!("STOR {remote_name}")).await?.require(&[125, 150])?;

        // Same config and server name as the control channel so the TLS
        // session can be resumed on the data connection.
        let mut data = tokio::time::timeout(
            self.timeout,
            self.connector.connect(self.server_name.clone(), tcp),
        )
        .await
        .map_err(|_| FtpsError::Timeout("data TLS handshake"))??;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            tokio::time::timeout(self.timeout, data.write_all(&buf[..n]))
                .await
                .map_err(|_| FtpsError::Timeout("data transfer"))??;
            sent += n as u64;
        }

        tokio::time::timeout(self.timeout, data.shutdown())
            .await
            .map_err(|_| FtpsError::Timeout("data close"))??;
        drop(data);

        self.read_reply().await?.require(&[226, 250])?;
        tracing::debug!(remote_name, bytes = sent, "FTPS upload complete");
        Ok(sent)
    }

    /// Politely end the session. Errors are ignored; the upload already
    /// succeeded or failed by the time this runs.
    pub async fn quit(mut self) {
        if let Err(e) = self.command("QUIT").await {
            tracing::debug!(error = %e, "FTPS QUIT failed");
        }
        let _ = self.control.get_mut().shutdown().await;
    }

    async fn command(&mut self, line: &str) -> Result<Reply, FtpsError> {
        self.send_line(line).await?;
        self.read_reply().await
    }

    async fn send_line(&mut self, line: &str) -> Result<(), FtpsError> {
        let stream = self.control.get_mut();
        tokio::time::timeout(self.timeout, async {
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\r\n").await?;
            stream.flush().await
        })
        .await
        .map_err(|_| FtpsError::Timeout("command write"))??;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply, FtpsError> {
        let first = self.read_line().await?;
        let (code, more, text) = parse_reply_line(&first)?;
        let mut reply = Reply {
            code,
            text: text.to_string(),
        };

        if more {
            loop {
                let line = self.read_line().await?;
                match parse_reply_line(&line) {
                    Ok((c, false, text)) if c == code => {
                        reply.text.push('\n');
                        reply.text.push_str(text);
                        break;
                    }
                    _ => {
                        reply.text.push('\n');
                        reply.text.push_str(line.trim_end());
                    }
                }
            }
        }

        Ok(reply)
    }

    async fn read_line(&mut self) -> Result<String, FtpsError> {
        let mut line = String::new();
        let n = tokio::time::timeout(self.timeout, self.control.read_line(&mut line))
            .await
            .map_err(|_| FtpsError::Timeout("reply read"))??;
        if n == 0 {
            return Err(FtpsError::ConnectionClosed);
        }
        Ok(line)
    }
}

/// Split a reply line into `(code, continues, text)`.
///
/// `"150-Opening"` continues a multi-line reply; `"226 Done"` and a bare
/// `"226"` end one.
pub fn parse_reply_line(line: &str) -> Result<(u16, bool, &str), FtpsError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let malformed = || FtpsError::MalformedReply(line.to_string());

    let digits = line.get(..3).ok_or_else(malformed)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let code: u16 = digits.parse().map_err(|_| malformed())?;

    match line.as_bytes().get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, &line[4..])),
        Some(b'-') => Ok((code, true, &line[4..])),
        Some(_) => Err(malformed()),
    }
}

/// Extract the data port from a `227` reply text such as
/// `Entering Passive Mode (192,168,1,40,195,80)`.
pub fn parse_pasv_port(text: &str) -> Result<u16, FtpsError> {
    let malformed = || FtpsError::MalformedReply(text.to_string());

    let fields = match (text.find('('), text.rfind(')')) {
        (Some(open), Some(close)) if open < close => &text[open + 1..close],
        _ => text.rsplit(' ').next().ok_or_else(malformed)?,
    };

    let numbers = fields
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;

    match numbers.as_slice() {
        [_, _, _, _, hi, lo] => Ok((u16::from(*hi) << 8) | u16::from(*lo)),
        _ => Err(malformed()),
    }
}
