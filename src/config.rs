//! Per-protocol host configuration and the per-host runtime context.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// The kind of device a host is declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Aix,
    #[serde(alias = "hp-ux")]
    HpUx,
    Linux,
    Network,
    #[serde(alias = "out-of-band")]
    Oob,
    Solaris,
    Storage,
    Tru64,
    Vms,
    #[serde(alias = "win")]
    Windows,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Aix => "AIX",
            DeviceKind::HpUx => "HP-UX",
            DeviceKind::Linux => "Linux",
            DeviceKind::Network => "Network",
            DeviceKind::Oob => "Out-of-Band",
            DeviceKind::Solaris => "Oracle Solaris",
            DeviceKind::Storage => "Storage",
            DeviceKind::Tru64 => "Tru64",
            DeviceKind::Vms => "OpenVMS",
            DeviceKind::Windows => "Microsoft Windows",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnmpVersion {
    #[serde(rename = "v1")]
    V1,
    #[default]
    #[serde(rename = "v2c")]
    V2c,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpConfiguration {
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default)]
    pub version: SnmpVersion,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for SnmpConfiguration {
    fn default() -> Self {
        Self {
            community: default_community(),
            version: SnmpVersion::default(),
            port: default_snmp_port(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmiConfiguration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Forced namespace; when set, automatic resolution is skipped.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WbemConfiguration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub https: bool,
    #[serde(default = "default_wbem_port")]
    pub port: u16,
    /// Forced namespace; when set, automatic resolution is skipped.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Virtualization console to acquire a session ticket from. When set,
    /// queries authenticate with the ticket instead of the credentials.
    #[serde(default)]
    pub vcenter: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for WbemConfiguration {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            https: true,
            port: default_wbem_port(),
            namespace: None,
            vcenter: None,
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinRmAuthentication {
    Ntlm,
    Kerberos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinRmConfiguration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub https: bool,
    #[serde(default = "default_winrm_port")]
    pub port: u16,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_winrm_authentications")]
    pub authentications: Vec<WinRmAuthentication>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for WinRmConfiguration {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            https: true,
            port: default_winrm_port(),
            namespace: None,
            authentications: default_winrm_authentications(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfiguration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsCommandConfiguration {
    #[serde(default)]
    pub use_sudo: bool,
    /// Commands for which the `%{SUDO:...}` macro expands even when
    /// `use_sudo` is off.
    #[serde(default)]
    pub use_sudo_commands: Vec<String>,
    #[serde(default = "default_sudo_command")]
    pub sudo_command: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for OsCommandConfiguration {
    fn default() -> Self {
        Self {
            use_sudo: false,
            use_sudo_commands: Vec::new(),
            sudo_command: default_sudo_command(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfiguration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub https: bool,
    #[serde(default = "default_https_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// How many extra attempts a retryable status is granted.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between attempts when the server answers with a retryable
    /// status, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for HttpConfiguration {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            https: true,
            port: default_https_port(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpmiConfiguration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub bmc_key: Option<String>,
    #[serde(default)]
    pub skip_auth: bool,
    #[serde(default = "default_ipmi_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for IpmiConfiguration {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            bmc_key: None,
            skip_auth: false,
            port: default_ipmi_port(),
            timeout: default_timeout(),
        }
    }
}

pub fn default_community() -> String {
    "public".to_string()
}
pub fn default_snmp_port() -> u16 {
    161
}
pub fn default_wbem_port() -> u16 {
    5989
}
pub fn default_winrm_port() -> u16 {
    5986
}
pub fn default_https_port() -> u16 {
    443
}
pub fn default_ipmi_port() -> u16 {
    623
}
pub fn default_timeout() -> u64 {
    120
}
pub fn default_max_retries() -> u32 {
    1
}
pub fn default_retry_delay_ms() -> u64 {
    500
}
pub fn default_sudo_command() -> String {
    "sudo".to_string()
}
pub fn default_true() -> bool {
    true
}
pub fn default_winrm_authentications() -> Vec<WinRmAuthentication> {
    vec![WinRmAuthentication::Ntlm]
}

/// The protocols configured for one host. Absent protocols cannot be tested.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolConfigurations {
    #[serde(default)]
    pub snmp: Option<SnmpConfiguration>,
    #[serde(default)]
    pub wmi: Option<WmiConfiguration>,
    #[serde(default)]
    pub wbem: Option<WbemConfiguration>,
    #[serde(default)]
    pub winrm: Option<WinRmConfiguration>,
    #[serde(default)]
    pub ssh: Option<SshConfiguration>,
    #[serde(default)]
    pub os_command: Option<OsCommandConfiguration>,
    #[serde(default)]
    pub http: Option<HttpConfiguration>,
    #[serde(default)]
    pub ipmi: Option<IpmiConfiguration>,
}

/// The Windows-capable configuration of a host: WMI when present, WinRM
/// otherwise.
#[derive(Debug, Clone, Copy)]
pub enum WinConfig<'a> {
    Wmi(&'a WmiConfiguration),
    WinRm(&'a WinRmConfiguration),
}

/// Automatically resolved namespaces, cached per host so resolution happens
/// at most once per protocol.
#[derive(Debug, Clone, Default)]
pub struct NamespaceCache {
    pub automatic_wmi: Option<String>,
    pub automatic_wbem: Option<String>,
}

/// Mutable per-host state accumulated across detection runs.
#[derive(Debug, Clone, Default)]
pub struct HostProperties {
    /// In-band ipmitool command prefix, built once per host.
    pub ipmitool_command: Option<String>,
    pub ipmi_execution_count: u32,
    /// Session ticket for virtualization-console WBEM queries.
    pub vcenter_ticket: Option<String>,
}

/// Everything the engine knows about one host: identity, configured
/// protocols, and the per-host caches shared by concurrent detections.
#[derive(Debug)]
pub struct HostContext {
    pub hostname: String,
    pub device_kind: DeviceKind,
    pub is_localhost: bool,
    pub configurations: ProtocolConfigurations,
    pub namespace_cache: Mutex<NamespaceCache>,
    pub properties: Mutex<HostProperties>,
    serial_lock: Mutex<()>,
}

impl HostContext {
    pub fn new(
        hostname: impl Into<String>,
        device_kind: DeviceKind,
        is_localhost: bool,
        configurations: ProtocolConfigurations,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            device_kind,
            is_localhost,
            configurations,
            namespace_cache: Mutex::new(NamespaceCache::default()),
            properties: Mutex::new(HostProperties::default()),
            serial_lock: Mutex::new(()),
        }
    }

    /// WMI configuration when present, WinRM otherwise.
    pub fn win(&self) -> Option<WinConfig<'_>> {
        if let Some(wmi) = &self.configurations.wmi {
            return Some(WinConfig::Wmi(wmi));
        }
        self.configurations.winrm.as_ref().map(WinConfig::WinRm)
    }

    /// Coarse per-host lock for criteria that must not run concurrently with
    /// anything else on this host.
    pub async fn detection_lock(&self) -> MutexGuard<'_, ()> {
        self.serial_lock.lock().await
    }
}
