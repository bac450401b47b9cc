//! Protocol client seams.
//!
//! The engine talks to every protocol through a trait so the embedding agent
//! can bind its own client libraries. System-backed implementations ship for
//! the protocols the agent drives through external tools: the local shell
//! ([`process::ProcessShell`]), ipmitool over LAN ([`ipmitool::IpmitoolLan`])
//! and HTTP ([`http::HttpClient`]).

pub mod http;
pub mod ipmitool;
pub mod process;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{
    IpmiConfiguration, SnmpConfiguration, SshConfiguration, WbemConfiguration, WinRmConfiguration,
    WmiConfiguration,
};
use crate::error::ProtocolError;

/// SNMP client seam.
///
/// `get` returns the value of the OID, `Ok(None)` when the agent answered
/// with no value. `get_next` returns the full varbind line
/// (`OID TYPE value`) of the lexicographic successor. `table` walks the
/// given columns under a table OID and returns one row per instance.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn get(
        &self,
        oid: &str,
        config: &SnmpConfiguration,
        hostname: &str,
    ) -> Result<Option<String>, ProtocolError>;

    async fn get_next(
        &self,
        oid: &str,
        config: &SnmpConfiguration,
        hostname: &str,
    ) -> Result<Option<String>, ProtocolError>;

    async fn table(
        &self,
        oid: &str,
        columns: &[String],
        config: &SnmpConfiguration,
        hostname: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError>;
}

/// Which WQL-capable protocol a query targets, with its configuration.
#[derive(Debug, Clone)]
pub enum WqlTarget {
    Wmi(WmiConfiguration),
    Wbem {
        config: WbemConfiguration,
        /// Session ticket replacing the credentials for
        /// virtualization-console queries.
        ticket: Option<String>,
    },
    WinRm(WinRmConfiguration),
}

impl WqlTarget {
    /// Target for a host's Windows-capable configuration.
    pub fn from_win(config: crate::config::WinConfig<'_>) -> Self {
        match config {
            crate::config::WinConfig::Wmi(wmi) => WqlTarget::Wmi(wmi.clone()),
            crate::config::WinConfig::WinRm(winrm) => WqlTarget::WinRm(winrm.clone()),
        }
    }

    pub fn timeout(&self) -> Duration {
        let seconds = match self {
            WqlTarget::Wmi(config) => config.timeout,
            WqlTarget::Wbem { config, .. } => config.timeout,
            WqlTarget::WinRm(config) => config.timeout,
        };
        Duration::from_secs(seconds)
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            WqlTarget::Wmi(_) => "WMI",
            WqlTarget::Wbem { .. } => "WBEM",
            WqlTarget::WinRm(_) => "WinRM",
        }
    }
}

/// WQL client seam covering WMI, WBEM and WinRM.
#[async_trait]
pub trait WqlTransport: Send + Sync {
    /// Run a WQL query and return the rows, one cell vector per row.
    async fn query(
        &self,
        hostname: &str,
        target: &WqlTarget,
        namespace: &str,
        query: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError>;

    /// Acquire a session ticket from a virtualization console.
    async fn acquire_vcenter_ticket(
        &self,
        vcenter: &str,
        hostname: &str,
        config: &WbemConfiguration,
    ) -> Result<String, ProtocolError>;
}

/// A prepared HTTP request. Credential macros are already substituted; the
/// `redacted` rendering is what may be logged.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub hostname: String,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// HTTP client seam. An `Err` means the request could not be carried out at
/// all; a response with an error status is still `Ok`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ProtocolError>;
}

/// Remote shell seam (SSH). Implementations try public-key authentication
/// first, then password, then username only. `upload` lists local files to
/// stage in the remote working directory before running the command.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn execute(
        &self,
        hostname: &str,
        config: &SshConfiguration,
        command: &str,
        upload: &[PathBuf],
    ) -> Result<String, ProtocolError>;
}

/// Local shell seam.
#[async_trait]
pub trait LocalShell: Send + Sync {
    async fn run(&self, command: &str) -> Result<String, ProtocolError>;
}

/// IPMI-over-LAN seam.
#[async_trait]
pub trait IpmiTransport: Send + Sync {
    /// Chassis status probe. `Ok(None)` means the BMC answered nothing.
    async fn chassis_status(
        &self,
        hostname: &str,
        config: &IpmiConfiguration,
    ) -> Result<Option<String>, ProtocolError>;

    /// Full sensor and FRU dump.
    async fn sensors(
        &self,
        hostname: &str,
        config: &IpmiConfiguration,
    ) -> Result<String, ProtocolError>;
}

/// Placeholder transport for protocols the embedding agent has not bound.
/// Every operation fails with [`ProtocolError::Unsupported`].
pub struct Unsupported;

#[async_trait]
impl SnmpTransport for Unsupported {
    async fn get(
        &self,
        _oid: &str,
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> Result<Option<String>, ProtocolError> {
        Err(unsupported("SNMP"))
    }

    async fn get_next(
        &self,
        _oid: &str,
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> Result<Option<String>, ProtocolError> {
        Err(unsupported("SNMP"))
    }

    async fn table(
        &self,
        _oid: &str,
        _columns: &[String],
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        Err(unsupported("SNMP"))
    }
}

#[async_trait]
impl WqlTransport for Unsupported {
    async fn query(
        &self,
        _hostname: &str,
        target: &WqlTarget,
        _namespace: &str,
        _query: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        Err(unsupported(target.protocol_name()))
    }

    async fn acquire_vcenter_ticket(
        &self,
        _vcenter: &str,
        _hostname: &str,
        _config: &WbemConfiguration,
    ) -> Result<String, ProtocolError> {
        Err(unsupported("WBEM"))
    }
}

#[async_trait]
impl HttpTransport for Unsupported {
    async fn send(&self, _request: &HttpRequest) -> Result<HttpResponse, ProtocolError> {
        Err(unsupported("HTTP"))
    }
}

#[async_trait]
impl RemoteShell for Unsupported {
    async fn execute(
        &self,
        _hostname: &str,
        _config: &SshConfiguration,
        _command: &str,
        _upload: &[PathBuf],
    ) -> Result<String, ProtocolError> {
        Err(unsupported("SSH"))
    }
}

#[async_trait]
impl IpmiTransport for Unsupported {
    async fn chassis_status(
        &self,
        _hostname: &str,
        _config: &IpmiConfiguration,
    ) -> Result<Option<String>, ProtocolError> {
        Err(unsupported("IPMI"))
    }

    async fn sensors(
        &self,
        _hostname: &str,
        _config: &IpmiConfiguration,
    ) -> Result<String, ProtocolError> {
        Err(unsupported("IPMI"))
    }
}

fn unsupported(protocol: &str) -> ProtocolError {
    ProtocolError::Unsupported(format!("No {protocol} transport is configured"))
}
