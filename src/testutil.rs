//! Scripted fake transports shared by module tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{IpmiConfiguration, SnmpConfiguration, SshConfiguration, WbemConfiguration};
use crate::error::ProtocolError;
use crate::transports::{
    HttpRequest, HttpResponse, HttpTransport, IpmiTransport, LocalShell, RemoteShell,
    SnmpTransport, WqlTarget, WqlTransport,
};

type SnmpResponse = Result<Option<String>, ProtocolError>;
type WqlResponse = Result<Vec<Vec<String>>, ProtocolError>;

/// SNMP fake answering every Get/GetNext/Table with a fixed response.
pub struct ScriptedSnmp {
    get: Option<SnmpResponse>,
    get_next: Option<SnmpResponse>,
    table: Option<Result<Vec<Vec<String>>, ProtocolError>>,
    calls: AtomicUsize,
}

impl ScriptedSnmp {
    pub fn with_get(response: SnmpResponse) -> Self {
        Self {
            get: Some(response),
            get_next: None,
            table: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_get_next(response: SnmpResponse) -> Self {
        Self {
            get: None,
            get_next: Some(response),
            table: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_table(rows: Vec<Vec<String>>) -> Self {
        Self {
            get: None,
            get_next: None,
            table: Some(Ok(rows)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnmpTransport for ScriptedSnmp {
    async fn get(
        &self,
        _oid: &str,
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> SnmpResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.get
            .clone()
            .unwrap_or_else(|| Err(ProtocolError::Query("no scripted Get response".into())))
    }

    async fn get_next(
        &self,
        _oid: &str,
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> SnmpResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.get_next
            .clone()
            .unwrap_or_else(|| Err(ProtocolError::Query("no scripted GetNext response".into())))
    }

    async fn table(
        &self,
        _oid: &str,
        _columns: &[String],
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table
            .clone()
            .unwrap_or_else(|| Err(ProtocolError::Query("no scripted Table response".into())))
    }
}

/// WQL fake keyed by (namespace, query). Responses for a key are consumed in
/// order, the last one repeating; unscripted keys answer with an invalid
/// namespace error, the acceptable kind during namespace probing.
#[derive(Default)]
pub struct ScriptedWql {
    responses: Mutex<HashMap<(String, String), Vec<WqlResponse>>>,
    cursors: Mutex<HashMap<(String, String), usize>>,
    calls: Mutex<Vec<(String, String)>>,
    tickets: AtomicUsize,
}

impl ScriptedWql {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, namespace: &str, query: &str, rows: Vec<Vec<String>>) -> Self {
        self.with_response(namespace, query, Ok(rows))
    }

    pub fn with_response(self, namespace: &str, query: &str, response: WqlResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry((namespace.to_string(), query.to_string()))
            .or_default()
            .push(response);
        self
    }

    /// How many times the given query ran in the given namespace.
    pub fn query_count(&self, namespace: &str, query: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, q)| n == namespace && q == query)
            .count()
    }

    pub fn ticket_requests(&self) -> usize {
        self.tickets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WqlTransport for ScriptedWql {
    async fn query(
        &self,
        _hostname: &str,
        _target: &WqlTarget,
        namespace: &str,
        query: &str,
    ) -> WqlResponse {
        // Yield once so concurrent callers interleave like a real client.
        tokio::task::yield_now().await;
        let key = (namespace.to_string(), query.to_string());
        self.calls.lock().unwrap().push(key.clone());

        let responses = self.responses.lock().unwrap();
        let Some(list) = responses.get(&key) else {
            return Err(ProtocolError::InvalidNamespace(format!(
                "{namespace} does not exist"
            )));
        };
        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.entry(key).or_insert(0);
        let index = (*cursor).min(list.len() - 1);
        *cursor += 1;
        list[index].clone()
    }

    async fn acquire_vcenter_ticket(
        &self,
        _vcenter: &str,
        _hostname: &str,
        _config: &WbemConfiguration,
    ) -> Result<String, ProtocolError> {
        let n = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ticket-{n}"))
    }
}

/// HTTP fake answering with a scripted sequence of (status, body) pairs, the
/// last one repeating.
pub struct ScriptedHttp {
    responses: Vec<(u16, String)>,
    cursor: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
    fail: bool,
}

impl ScriptedHttp {
    pub fn with_statuses(responses: Vec<(u16, String)>) -> Self {
        Self {
            responses,
            cursor: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            responses: Vec::new(),
            cursor: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ProtocolError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(ProtocolError::Query("connection refused".into()));
        }
        let index = self
            .cursor
            .fetch_add(1, Ordering::SeqCst)
            .min(self.responses.len().saturating_sub(1));
        let (status, body) = self.responses[index].clone();
        Ok(HttpResponse {
            status,
            headers: Vec::new(),
            body,
        })
    }
}

/// Local shell fake: substring-keyed outputs with a configurable default.
pub struct ScriptedShell {
    default: Result<String, String>,
    rules: Vec<(String, String)>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub fn with_output(output: &str) -> Self {
        Self {
            default: Ok(output.to_string()),
            rules: Vec::new(),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            default: Err(message.to_string()),
            rules: Vec::new(),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Answer commands containing `substring` with `output`.
    pub fn respond(mut self, substring: &str, output: &str) -> Self {
        self.rules.push((substring.to_string(), output.to_string()));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalShell for ScriptedShell {
    async fn run(&self, command: &str) -> Result<String, ProtocolError> {
        self.commands.lock().unwrap().push(command.to_string());
        for (substring, output) in &self.rules {
            if command.contains(substring.as_str()) {
                return Ok(output.clone());
            }
        }
        match &self.default {
            Ok(output) => Ok(output.clone()),
            Err(message) => Err(ProtocolError::CommandFailed {
                command: command.to_string(),
                output: message.clone(),
            }),
        }
    }
}

/// Remote shell fake recording commands and staged files.
pub struct ScriptedRemoteShell {
    default: Result<String, String>,
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<Vec<PathBuf>>>,
}

impl ScriptedRemoteShell {
    pub fn with_output(output: &str) -> Self {
        Self {
            default: Ok(output.to_string()),
            commands: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            default: Err(message.to_string()),
            commands: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Vec<PathBuf>> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteShell for ScriptedRemoteShell {
    async fn execute(
        &self,
        _hostname: &str,
        _config: &SshConfiguration,
        command: &str,
        upload: &[PathBuf],
    ) -> Result<String, ProtocolError> {
        self.commands.lock().unwrap().push(command.to_string());
        self.uploads.lock().unwrap().push(upload.to_vec());
        match &self.default {
            Ok(output) => Ok(output.clone()),
            Err(message) => Err(ProtocolError::CommandFailed {
                command: command.to_string(),
                output: message.clone(),
            }),
        }
    }
}

/// IPMI-over-LAN fake.
pub struct ScriptedIpmi {
    status: Result<Option<String>, ProtocolError>,
    sensors: String,
}

impl ScriptedIpmi {
    pub fn with_status(status: Option<String>) -> Self {
        Self {
            status: Ok(status),
            sensors: String::new(),
        }
    }

    pub fn failing(error: ProtocolError) -> Self {
        Self {
            status: Err(error),
            sensors: String::new(),
        }
    }
}

#[async_trait]
impl IpmiTransport for ScriptedIpmi {
    async fn chassis_status(
        &self,
        _hostname: &str,
        _config: &IpmiConfiguration,
    ) -> Result<Option<String>, ProtocolError> {
        self.status.clone()
    }

    async fn sensors(
        &self,
        _hostname: &str,
        _config: &IpmiConfiguration,
    ) -> Result<String, ProtocolError> {
        Ok(self.sensors.clone())
    }
}

/// A slow SNMP fake that never answers within any reasonable deadline.
pub struct StalledSnmp;

#[async_trait]
impl SnmpTransport for StalledSnmp {
    async fn get(
        &self,
        _oid: &str,
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> SnmpResponse {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Ok(None)
    }

    async fn get_next(
        &self,
        _oid: &str,
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> SnmpResponse {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Ok(None)
    }

    async fn table(
        &self,
        _oid: &str,
        _columns: &[String],
        _config: &SnmpConfiguration,
        _hostname: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Ok(Vec::new())
    }
}
