//! Detection criteria: the questions a connector asks about a host.
//!
//! A connector declares a list of criteria; the engine runs each one against
//! the host's configured protocols and the connector matches only when all of
//! them succeed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DeviceKind;

/// One detection criterion, tagged by protocol or local check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Criterion {
    SnmpGet(SnmpGetCriterion),
    SnmpGetNext(SnmpGetNextCriterion),
    Wbem(WbemCriterion),
    Wmi(WmiCriterion),
    Ipmi(IpmiCriterion),
    OsCommand(OsCommandCriterion),
    Http(HttpCriterion),
    Process(ProcessCriterion),
    Service(ServiceCriterion),
    DeviceType(DeviceTypeCriterion),
    ProductVersion(ProductVersionCriterion),
}

impl Criterion {
    /// Criteria that must not run concurrently with any other criterion on
    /// the same host. IPMI drivers misbehave under concurrent access.
    pub fn force_serialization(&self) -> bool {
        matches!(self, Criterion::Ipmi(_))
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::SnmpGet(c) => c.fmt(f),
            Criterion::SnmpGetNext(c) => c.fmt(f),
            Criterion::Wbem(c) => c.fmt(f),
            Criterion::Wmi(c) => c.fmt(f),
            Criterion::Ipmi(c) => c.fmt(f),
            Criterion::OsCommand(c) => c.fmt(f),
            Criterion::Http(c) => c.fmt(f),
            Criterion::Process(c) => c.fmt(f),
            Criterion::Service(c) => c.fmt(f),
            Criterion::DeviceType(c) => c.fmt(f),
            Criterion::ProductVersion(c) => c.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpGetCriterion {
    pub oid: String,
    #[serde(default)]
    pub expected_result: Option<String>,
}

impl fmt::Display for SnmpGetCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SNMP Get:\n- OID: {}", self.oid)?;
        if let Some(expected) = &self.expected_result {
            write!(f, "\n- ExpectedResult: {expected}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpGetNextCriterion {
    pub oid: String,
    #[serde(default)]
    pub expected_result: Option<String>,
}

impl fmt::Display for SnmpGetNextCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SNMP GetNext:\n- OID: {}", self.oid)?;
        if let Some(expected) = &self.expected_result {
            write!(f, "\n- ExpectedResult: {expected}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WbemCriterion {
    pub query: String,
    /// Defaults to `root/cimv2`; `automatic` triggers namespace resolution.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub expected_result: Option<String>,
}

impl fmt::Display for WbemCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WBEM query:\n- WQL: {}", self.query)?;
        if let Some(namespace) = &self.namespace {
            write!(f, "\n- Namespace: {namespace}")?;
        }
        if let Some(expected) = &self.expected_result {
            write!(f, "\n- ExpectedResult: {expected}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmiCriterion {
    pub query: String,
    /// Defaults to `root\cimv2`; `automatic` triggers namespace resolution.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub expected_result: Option<String>,
}

impl fmt::Display for WmiCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WMI query:\n- WQL: {}", self.query)?;
        if let Some(namespace) = &self.namespace {
            write!(f, "\n- Namespace: {namespace}")?;
        }
        if let Some(expected) = &self.expected_result {
            write!(f, "\n- ExpectedResult: {expected}")?;
        }
        Ok(())
    }
}

/// Checks that the host exposes a reachable IPMI BMC, in-band or over LAN
/// depending on the host kind. Carries no parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IpmiCriterion {}

impl fmt::Display for IpmiCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPMI detection")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsCommandCriterion {
    pub command_line: String,
    #[serde(default)]
    pub expected_result: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub execute_locally: bool,
    /// Overrides the configured command timeout, in seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl OsCommandCriterion {
    /// Rendering of this criterion with the given command text, used to keep
    /// passwords out of result messages.
    pub fn display_with_command(&self, command_line: &str) -> String {
        let mut out = format!(
            "OS command:\n- CommandLine: {}\n- ExecuteLocally: {}",
            command_line, self.execute_locally
        );
        if let Some(expected) = &self.expected_result {
            out.push_str(&format!("\n- ExpectedResult: {expected}"));
        }
        if let Some(timeout) = self.timeout {
            out.push_str(&format!("\n- Timeout: {timeout}"));
        }
        out
    }
}

impl fmt::Display for OsCommandCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_with_command(&self.command_line))
    }
}

/// Which part of the HTTP response makes up the test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultContent {
    #[default]
    Body,
    Header,
    HttpStatus,
    All,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCriterion {
    #[serde(default = "default_http_method")]
    pub method: String,
    /// Full URL; overrides `path` when present.
    #[serde(default)]
    pub url: Option<String>,
    /// Path appended to the scheme://host:port base built from configuration.
    #[serde(default)]
    pub path: Option<String>,
    /// Header lines, one `Name: value` per line. Supports credential macros.
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub authentication_token: Option<String>,
    #[serde(default)]
    pub result_content: ResultContent,
    #[serde(default)]
    pub expected_result: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

pub fn default_http_method() -> String {
    "GET".to_string()
}

impl fmt::Display for HttpCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP request:\n- Method: {}", self.method)?;
        if let Some(url) = &self.url {
            write!(f, "\n- URL: {url}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "\n- Path: {path}")?;
        }
        if let Some(expected) = &self.expected_result {
            write!(f, "\n- ExpectedResult: {expected}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessCriterion {
    /// Regular expression matched against running process command lines.
    pub command_line: String,
}

impl fmt::Display for ProcessCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process presence check:\n- CommandLine: {}", self.command_line)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCriterion {
    pub name: String,
}

impl fmt::Display for ServiceCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Windows Service check:\n- Name: {}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTypeCriterion {
    #[serde(default)]
    pub keep: Vec<DeviceKind>,
    #[serde(default)]
    pub exclude: Vec<DeviceKind>,
}

impl fmt::Display for DeviceTypeCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device type check:")?;
        if !self.keep.is_empty() {
            let kept: Vec<String> = self.keep.iter().map(|k| k.to_string()).collect();
            write!(f, "\n- Keep: {}", kept.join(", "))?;
        }
        if !self.exclude.is_empty() {
            let excluded: Vec<String> = self.exclude.iter().map(|k| k.to_string()).collect();
            write!(f, "\n- Exclude: {}", excluded.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductVersionCriterion {
    /// Minimum engine version required by the connector, dotted numeric.
    #[serde(default)]
    pub engine_version: Option<String>,
}

impl fmt::Display for ProductVersionCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Product version check:")?;
        if let Some(version) = &self.engine_version {
            write!(f, "\n- EngineVersion: {version}")?;
        }
        Ok(())
    }
}
