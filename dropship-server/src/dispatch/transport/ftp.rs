//! FTP transport
//!
//! The blocking FTP client runs on the blocking pool. Sessions sit behind
//! [`FtpConnector`]/[`FtpSession`] so order upload and catalog download can be
//! exercised against [`InMemoryFtp`].

use super::SubmissionReceipt;
use crate::core::error::{EngineError, EngineResult};
use crate::dispatch::payload::OutboundOrderPayload;
use shared::models::FtpConfig;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub trait FtpSession: Send {
    fn login(&mut self, username: &str, password: &str) -> EngineResult<()>;
    fn set_passive(&mut self, passive: bool);
    fn cwd(&mut self, directory: &str) -> EngineResult<()>;
    fn put(&mut self, filename: &str, data: &[u8]) -> EngineResult<()>;
    fn list(&mut self) -> EngineResult<Vec<String>>;
    /// Modification time in epoch millis, if the server reports one
    fn modified_at(&mut self, filename: &str) -> EngineResult<Option<i64>>;
    fn retrieve(&mut self, filename: &str) -> EngineResult<Vec<u8>>;
    fn quit(&mut self);
}

pub trait FtpConnector: Send + Sync {
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> EngineResult<Box<dyn FtpSession>>;
}

fn ftp_err(op: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::Transport(format!("ftp {op}: {e}"))
}

// ========== suppaftp ==========

#[derive(Debug, Default)]
pub struct SuppaFtpConnector;

struct SuppaFtpSession {
    stream: suppaftp::FtpStream,
}

impl FtpConnector for SuppaFtpConnector {
    fn connect(&self, host: &str, port: u16, timeout: Duration) -> EngineResult<Box<dyn FtpSession>> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| ftp_err("resolve", e))?
            .next()
            .ok_or_else(|| ftp_err("resolve", format!("no address for {host}")))?;
        let stream = suppaftp::FtpStream::connect_timeout(addr, timeout)
            .map_err(|e| ftp_err("connect", e))?;
        stream
            .get_ref()
            .set_read_timeout(Some(timeout))
            .map_err(|e| ftp_err("connect", e))?;
        Ok(Box::new(SuppaFtpSession { stream }))
    }
}

impl FtpSession for SuppaFtpSession {
    fn login(&mut self, username: &str, password: &str) -> EngineResult<()> {
        self.stream.login(username, password).map_err(|e| {
            EngineError::Configuration(format!("ftp login rejected: {e}"))
        })
    }

    fn set_passive(&mut self, passive: bool) {
        let mode = if passive {
            suppaftp::Mode::Passive
        } else {
            suppaftp::Mode::Active
        };
        self.stream.set_mode(mode);
    }

    fn cwd(&mut self, directory: &str) -> EngineResult<()> {
        self.stream.cwd(directory).map_err(|e| ftp_err("cwd", e))
    }

    fn put(&mut self, filename: &str, data: &[u8]) -> EngineResult<()> {
        self.stream
            .transfer_type(suppaftp::types::FileType::Binary)
            .map_err(|e| ftp_err("type", e))?;
        self.stream
            .put_file(filename, &mut Cursor::new(data))
            .map(|_| ())
            .map_err(|e| ftp_err("put", e))
    }

    fn list(&mut self) -> EngineResult<Vec<String>> {
        self.stream.nlst(None).map_err(|e| ftp_err("nlst", e))
    }

    fn modified_at(&mut self, filename: &str) -> EngineResult<Option<i64>> {
        match self.stream.mdtm(filename) {
            Ok(at) => Ok(Some(at.and_utc().timestamp_millis())),
            Err(e) => {
                tracing::debug!(filename, error = %e, "MDTM unsupported");
                Ok(None)
            }
        }
    }

    fn retrieve(&mut self, filename: &str) -> EngineResult<Vec<u8>> {
        self.stream
            .transfer_type(suppaftp::types::FileType::Binary)
            .map_err(|e| ftp_err("type", e))?;
        self.stream
            .retr_as_buffer(filename)
            .map(Cursor::into_inner)
            .map_err(|e| ftp_err("retr", e))
    }

    fn quit(&mut self) {
        if let Err(e) = self.stream.quit() {
            tracing::debug!(error = %e, "FTP quit failed");
        }
    }
}

// ========== In-memory server ==========

#[derive(Debug, Clone)]
struct StoredFile {
    data: Vec<u8>,
    modified_at: i64,
}

#[derive(Debug, Default)]
struct InMemoryState {
    /// full path -> file
    files: BTreeMap<String, StoredFile>,
    /// accepted credentials
    users: BTreeMap<String, String>,
    connections: usize,
}

/// FTP server double sharing one file tree across sessions
#[derive(Debug, Clone, Default)]
pub struct InMemoryFtp {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryFtp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.lock().users.insert(username.into(), password.into());
        self
    }

    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>, modified_at: i64) {
        self.lock().files.insert(
            normalize(path),
            StoredFile {
                data: data.into(),
                modified_at,
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&normalize(path)).map(|f| f.data.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        normalize(name)
    } else {
        format!("{dir}/{}", name.trim_matches('/'))
    }
}

struct InMemorySession {
    server: InMemoryFtp,
    cwd: String,
    logged_in: bool,
}

impl InMemorySession {
    fn require_login(&self) -> EngineResult<()> {
        if self.logged_in {
            Ok(())
        } else {
            Err(ftp_err("session", "not logged in"))
        }
    }
}

impl FtpConnector for InMemoryFtp {
    fn connect(&self, _host: &str, _port: u16, _timeout: Duration) -> EngineResult<Box<dyn FtpSession>> {
        self.lock().connections += 1;
        Ok(Box::new(InMemorySession {
            server: self.clone(),
            cwd: "/".into(),
            logged_in: false,
        }))
    }
}

impl FtpSession for InMemorySession {
    fn login(&mut self, username: &str, password: &str) -> EngineResult<()> {
        let state = self.server.lock();
        if !state.users.is_empty() && state.users.get(username).map(String::as_str) != Some(password) {
            return Err(EngineError::Configuration("ftp login rejected: 530".into()));
        }
        drop(state);
        self.logged_in = true;
        Ok(())
    }

    fn set_passive(&mut self, _passive: bool) {}

    fn cwd(&mut self, directory: &str) -> EngineResult<()> {
        self.require_login()?;
        self.cwd = if directory.starts_with('/') {
            normalize(directory)
        } else {
            join(&self.cwd, directory)
        };
        Ok(())
    }

    fn put(&mut self, filename: &str, data: &[u8]) -> EngineResult<()> {
        self.require_login()?;
        self.server
            .add_file(&join(&self.cwd, filename), data, shared::util::now_millis());
        Ok(())
    }

    fn list(&mut self) -> EngineResult<Vec<String>> {
        self.require_login()?;
        let prefix = if self.cwd == "/" {
            "/".to_string()
        } else {
            format!("{}/", self.cwd)
        };
        Ok(self
            .server
            .lock()
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn modified_at(&mut self, filename: &str) -> EngineResult<Option<i64>> {
        self.require_login()?;
        Ok(self
            .server
            .lock()
            .files
            .get(&join(&self.cwd, filename))
            .map(|f| f.modified_at))
    }

    fn retrieve(&mut self, filename: &str) -> EngineResult<Vec<u8>> {
        self.require_login()?;
        self.server
            .lock()
            .files
            .get(&join(&self.cwd, filename))
            .map(|f| f.data.clone())
            .ok_or_else(|| ftp_err("retr", format!("550 {filename} not found")))
    }

    fn quit(&mut self) {}
}

// ========== Operations ==========

fn open_session(
    connector: &dyn FtpConnector,
    config: &FtpConfig,
    timeout: Duration,
) -> EngineResult<Box<dyn FtpSession>> {
    let mut session = connector.connect(&config.host, config.port, timeout)?;
    session.login(&config.username, &config.password)?;
    session.set_passive(config.passive);
    if let Some(dir) = config.directory.as_deref().filter(|d| !d.is_empty()) {
        session.cwd(dir)?;
    }
    Ok(session)
}

async fn run_blocking<T, F>(f: F) -> EngineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> EngineResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ftp_err("worker", e))?
}

/// connect, login, passive, cwd, binary put
pub async fn upload(
    connector: Arc<dyn FtpConnector>,
    config: FtpConfig,
    timeout: Duration,
    filename: String,
    data: Vec<u8>,
) -> EngineResult<()> {
    run_blocking(move || {
        let mut session = open_session(connector.as_ref(), &config, timeout)?;
        let result = session.put(&filename, &data);
        session.quit();
        result
    })
    .await
}

/// Newest `.csv` in the configured directory, by server modification time
pub async fn fetch_latest_csv(
    connector: Arc<dyn FtpConnector>,
    config: FtpConfig,
    timeout: Duration,
) -> EngineResult<Option<(String, Vec<u8>)>> {
    run_blocking(move || {
        let mut session = open_session(connector.as_ref(), &config, timeout)?;
        let result = (|| -> EngineResult<Option<(String, Vec<u8>)>> {
            let mut newest: Option<(i64, String)> = None;
            for name in session.list()? {
                let base = name.rsplit('/').next().unwrap_or(&name).to_string();
                if !base.to_ascii_lowercase().ends_with(".csv") {
                    continue;
                }
                let modified = session.modified_at(&base)?.unwrap_or(i64::MIN);
                if newest.as_ref().is_none_or(|(at, _)| modified > *at) {
                    newest = Some((modified, base));
                }
            }
            match newest {
                Some((_, name)) => {
                    let data = session.retrieve(&name)?;
                    Ok(Some((name, data)))
                }
                None => Ok(None),
            }
        })();
        session.quit();
        result
    })
    .await
}

#[derive(Debug, Clone)]
pub struct FtpTransport {
    pub config: FtpConfig,
}

impl FtpTransport {
    pub async fn submit(
        &self,
        connector: Arc<dyn FtpConnector>,
        timeout: Duration,
        payload: &OutboundOrderPayload,
    ) -> EngineResult<SubmissionReceipt> {
        let filename = payload.csv_filename(chrono::Utc::now());
        let data = payload.to_csv()?;
        upload(connector, self.config.clone(), timeout, filename.clone(), data).await?;
        Ok(SubmissionReceipt {
            supplier_order_id: None,
            detail: format!("uploaded {filename} to {}", self.config.host),
        })
    }
}
