use std::sync::Arc;

use regex::Regex;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument};

use super::CLIENT_IMAGE;
use crate::core::error::{WeaveError, WeaveResult};
use crate::core::process::ProcessTable;

const AUTH_USER: &str = "riot";
const RESTART_PATH: &str = "/riotclient/kill-and-restart-ux";

/// Ephemeral credentials of one client launch. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub port: u16,
    pub auth_token: String,
    pub pid: u32,
}

/// Best-effort source of the running client's credentials.
pub trait CredentialSource: Send + Sync {
    fn session(&self) -> WeaveResult<ClientSession>;
}

/// Reads the token and port from the client's command line.
pub struct ProcessCredentialSource {
    processes: Arc<dyn ProcessTable>,
    image: String,
    token_re: Regex,
    port_re: Regex,
}

impl ProcessCredentialSource {
    pub fn new(processes: Arc<dyn ProcessTable>) -> WeaveResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| WeaveError::Other(format!("bad pattern {pattern}: {e}")))
        };
        Ok(Self {
            processes,
            image: CLIENT_IMAGE.to_string(),
            token_re: compile(r"--remoting-auth-token=(\S+)")?,
            port_re: compile(r"--app-port=(\S+)")?,
        })
    }

    fn capture(re: &Regex, line: &str) -> Option<String> {
        let value = re.captures(line)?.get(1)?.as_str().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    }
}

impl CredentialSource for ProcessCredentialSource {
    fn session(&self) -> WeaveResult<ClientSession> {
        let entries = self.processes.find(&self.image);
        if entries.is_empty() {
            return Err(WeaveError::CredentialExtraction(format!(
                "{} is not running",
                self.image
            )));
        }

        for entry in entries {
            let line = entry.command_line();
            let token = Self::capture(&self.token_re, &line);
            let port = Self::capture(&self.port_re, &line).and_then(|p| p.parse::<u16>().ok());
            if let (Some(auth_token), Some(port)) = (token, port) {
                return Ok(ClientSession {
                    port,
                    auth_token,
                    pid: entry.pid,
                });
            }
        }

        Err(WeaveError::CredentialExtraction(
            "auth token or port missing from client command line".into(),
        ))
    }
}

pub struct ClientLiaison {
    processes: Arc<dyn ProcessTable>,
    credentials: Arc<dyn CredentialSource>,
    http: Client,
    scheme: &'static str,
    host: String,
}

impl ClientLiaison {
    pub fn new(
        processes: Arc<dyn ProcessTable>,
        credentials: Arc<dyn CredentialSource>,
        http: Client,
    ) -> Self {
        Self {
            processes,
            credentials,
            http,
            scheme: "https",
            host: "127.0.0.1".into(),
        }
    }

    /// Point at a plain-HTTP endpoint instead of the client's TLS one.
    pub fn with_plain_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    pub fn is_running(&self) -> bool {
        self.processes.is_running(CLIENT_IMAGE)
    }

    /// Ask the client to restart its UI. Only 200 and 204 count as success.
    #[instrument(skip(self))]
    pub async fn restart(&self) -> WeaveResult<()> {
        let session = self.credentials.session()?;
        let url = format!("{}://{}:{}{}", self.scheme, self.host, session.port, RESTART_PATH);
        debug!("Restarting client UX via {} (pid {})", url, session.pid);

        let response = self
            .http
            .post(&url)
            .basic_auth(AUTH_USER, Some(&session.auth_token))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                info!("Client UX restart requested");
                Ok(())
            }
            other => Err(WeaveError::ClientStatus(other.as_u16())),
        }
    }
}
