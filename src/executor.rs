//! Protocol execution facade.
//!
//! Every protocol call the engine makes goes through [`ProtocolExecutor`]:
//! it wraps each transport call in a [`TimeoutGuard`](crate::timeout::TimeoutGuard)
//! deadline and normalizes client-level failures into the per-protocol
//! contracts the engine relies on.

pub mod http;
pub mod ipmi;
pub mod oscmd;
pub mod snmp;
pub mod wql;

use std::sync::Arc;

use crate::transports::{
    http::HttpClient, ipmitool::IpmitoolLan, process::ProcessShell, HttpTransport, IpmiTransport,
    LocalShell, RemoteShell, SnmpTransport, Unsupported, WqlTransport,
};

pub(crate) const CREDENTIAL_MASK: &str = "********";

pub struct ProtocolExecutor {
    pub(crate) snmp: Arc<dyn SnmpTransport>,
    pub(crate) wql: Arc<dyn WqlTransport>,
    pub(crate) http: Arc<dyn HttpTransport>,
    pub(crate) remote_shell: Arc<dyn RemoteShell>,
    pub(crate) local_shell: Arc<dyn LocalShell>,
    pub(crate) ipmi: Arc<dyn IpmiTransport>,
}

impl Default for ProtocolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolExecutor {
    /// Executor with the system-backed transports (local shell, ipmitool,
    /// HTTP). SNMP, WQL and SSH stay unbound until the embedding agent
    /// provides its client libraries.
    pub fn new() -> Self {
        Self {
            snmp: Arc::new(Unsupported),
            wql: Arc::new(Unsupported),
            http: Arc::new(HttpClient::default()),
            remote_shell: Arc::new(Unsupported),
            local_shell: Arc::new(ProcessShell),
            ipmi: Arc::new(IpmitoolLan),
        }
    }

    pub fn with_snmp(mut self, transport: Arc<dyn SnmpTransport>) -> Self {
        self.snmp = transport;
        self
    }

    pub fn with_wql(mut self, transport: Arc<dyn WqlTransport>) -> Self {
        self.wql = transport;
        self
    }

    pub fn with_http(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.http = transport;
        self
    }

    pub fn with_remote_shell(mut self, transport: Arc<dyn RemoteShell>) -> Self {
        self.remote_shell = transport;
        self
    }

    pub fn with_local_shell(mut self, transport: Arc<dyn LocalShell>) -> Self {
        self.local_shell = transport;
        self
    }

    pub fn with_ipmi(mut self, transport: Arc<dyn IpmiTransport>) -> Self {
        self.ipmi = transport;
        self
    }
}

/// Substitute the credential macros in `text`.
pub(crate) fn update_macros(
    text: &str,
    username: &str,
    password: &str,
    token: &str,
    hostname: &str,
) -> String {
    text.replace("%{USERNAME}", username)
        .replace("%{PASSWORD}", password)
        .replace("%{AUTHENTICATIONTOKEN}", token)
        .replace("%{HOSTNAME}", hostname)
}

/// Same substitution with secrets replaced by a mask, safe for logging and
/// result messages.
pub(crate) fn update_macros_redacted(text: &str, username: &str, hostname: &str) -> String {
    update_macros(text, username, CREDENTIAL_MASK, CREDENTIAL_MASK, hostname)
}
