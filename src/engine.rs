//! The criterion engine: decides whether a detection criterion holds on a
//! host.
//!
//! [`CriterionEngine::process`] never lets a protocol failure unwind: every
//! environmental problem is folded into the returned
//! [`CriterionTestResult`], with the diagnostic text callers show to users.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::config::{DeviceKind, HostContext};
use crate::criterion::{
    Criterion, DeviceTypeCriterion, HttpCriterion, IpmiCriterion, OsCommandCriterion,
    ProcessCriterion, ProductVersionCriterion, ServiceCriterion, SnmpGetCriterion,
    SnmpGetNextCriterion, WbemCriterion, WmiCriterion,
};
use crate::error::ProtocolError;
use crate::executor::ProtocolExecutor;
use crate::ipmi_command;
use crate::result::CriterionTestResult;
use crate::transports::WqlTarget;
use crate::version;
use crate::wql::{self, WqlTestResult};

const NEITHER_WMI_NOR_WINRM: &str =
    "Neither WMI nor WinRM credentials are configured for this host.";
const WBEM_CREDENTIALS_NOT_CONFIGURED: &str =
    "The WBEM credentials are not configured for this host.";

const IPMI_SUCCESS_INBAND: &str =
    "Successfully connected to the IPMI BMC chip with the in-band driver interface.";
const IPMI_SUCCESS_LAN: &str =
    "Successfully connected to the IPMI BMC chip with the IPMI-over-LAN interface.";
const IPMI_NULL_LAN: &str =
    "Received <null> result after connecting to the IPMI BMC chip with the IPMI-over-LAN interface.";

pub struct CriterionEngine {
    executor: Arc<ProtocolExecutor>,
    engine_version: String,
}

impl CriterionEngine {
    pub fn new(executor: Arc<ProtocolExecutor>) -> Self {
        Self::with_version(executor, env!("CARGO_PKG_VERSION"))
    }

    /// Engine reporting a specific version to product version criteria.
    pub fn with_version(executor: Arc<ProtocolExecutor>, version: impl Into<String>) -> Self {
        Self {
            executor,
            engine_version: version.into(),
        }
    }

    /// Run one criterion against one host.
    pub async fn process(&self, criterion: &Criterion, ctx: &HostContext) -> CriterionTestResult {
        debug!("Hostname {} - Processing criterion:\n{}", ctx.hostname, criterion);

        if criterion.force_serialization() {
            let _serial = ctx.detection_lock().await;
            self.dispatch(criterion, ctx).await
        } else {
            self.dispatch(criterion, ctx).await
        }
    }

    async fn dispatch(&self, criterion: &Criterion, ctx: &HostContext) -> CriterionTestResult {
        match criterion {
            Criterion::SnmpGet(c) => self.process_snmp_get(c, ctx).await,
            Criterion::SnmpGetNext(c) => self.process_snmp_get_next(c, ctx).await,
            Criterion::Wbem(c) => self.process_wbem(c, ctx).await,
            Criterion::Wmi(c) => self.process_wmi(c, ctx).await,
            Criterion::Ipmi(c) => self.process_ipmi(c, ctx).await,
            Criterion::OsCommand(c) => self.process_os_command(c, ctx).await,
            Criterion::Http(c) => self.process_http(c, ctx).await,
            Criterion::Process(c) => self.process_process(c, ctx).await,
            Criterion::Service(c) => self.process_service(c, ctx).await,
            Criterion::DeviceType(c) => self.process_device_type(c, ctx).await,
            Criterion::ProductVersion(c) => self.process_product_version(c).await,
        }
    }

    async fn process_snmp_get(
        &self,
        criterion: &SnmpGetCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        if criterion.oid.trim().is_empty() {
            return CriterionTestResult::empty();
        }
        let Some(config) = &ctx.configurations.snmp else {
            return CriterionTestResult::empty();
        };

        let oid = &criterion.oid;
        let hostname = &ctx.hostname;
        match self.executor.execute_snmp_get(oid, config, hostname).await {
            Err(error) => plain_failure(
                format!(
                    "SNMP Test Failed - SNMP Get of {oid} on {hostname} was unsuccessful due to an exception. Message: {error}."
                ),
                None,
            ),
            Ok(None) => plain_failure(
                format!(
                    "SNMP Test Failed - SNMP Get of {oid} on {hostname} was unsuccessful due to a null result."
                ),
                None,
            ),
            Ok(Some(value)) if value.trim().is_empty() => plain_failure(
                format!(
                    "SNMP Test Failed - SNMP Get of {oid} on {hostname} was unsuccessful due to an empty result."
                ),
                Some(value),
            ),
            Ok(Some(value)) => {
                let success_message =
                    format!("Successful SNMP Get of {oid} on {hostname}. Returned Result: {value}.");
                match &criterion.expected_result {
                    None => plain_success(success_message, Some(value)),
                    Some(expected) => match expected_matches(expected, &value) {
                        Ok(true) => plain_success(success_message, Some(value)),
                        Ok(false) => plain_failure(
                            format!(
                                "SNMP Test Failed - SNMP Get of {oid} on {hostname} was successful but the value of the returned OID did not match with the expected result. Expected value: {expected} - returned value {value}."
                            ),
                            Some(value),
                        ),
                        Err(error) => plain_failure(
                            format!(
                                "SNMP Test Failed - SNMP Get of {oid} on {hostname} was unsuccessful due to an exception. Message: {error}."
                            ),
                            Some(value),
                        ),
                    },
                }
            }
        }
    }

    async fn process_snmp_get_next(
        &self,
        criterion: &SnmpGetNextCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        if criterion.oid.trim().is_empty() {
            return CriterionTestResult::empty();
        }
        let Some(config) = &ctx.configurations.snmp else {
            return CriterionTestResult::empty();
        };

        let oid = &criterion.oid;
        let hostname = &ctx.hostname;
        match self.executor.execute_snmp_get_next(oid, config, hostname).await {
            Err(error) => plain_failure(
                format!(
                    "SNMP Test Failed - SNMP GetNext of {oid} on {hostname} was unsuccessful due to an exception. Message: {error}."
                ),
                None,
            ),
            Ok(None) => plain_failure(
                format!(
                    "SNMP Test Failed - SNMP GetNext of {oid} on {hostname} was unsuccessful due to a null result."
                ),
                None,
            ),
            Ok(Some(line)) if line.trim().is_empty() => plain_failure(
                format!(
                    "SNMP Test Failed - SNMP GetNext of {oid} on {hostname} was unsuccessful due to an empty result."
                ),
                Some(line),
            ),
            Ok(Some(line)) if !line.starts_with(oid.as_str()) => {
                let returned_oid = line.split_whitespace().next().unwrap_or(&line).to_string();
                plain_failure(
                    format!(
                        "SNMP Test Failed - SNMP GetNext of {oid} on {hostname} was successful but the returned OID is not under the same tree. Returned OID: {returned_oid}."
                    ),
                    Some(line),
                )
            }
            Ok(Some(line)) => {
                let success_message = format!(
                    "Successful SNMP GetNext of {oid} on {hostname}. Returned Result: {line}."
                );
                match &criterion.expected_result {
                    None => plain_success(success_message, Some(line)),
                    Some(expected) => {
                        let value = getnext_value(&line).unwrap_or_default();
                        match expected_matches(expected, &value) {
                            Ok(true) => plain_success(success_message, Some(line)),
                            Ok(false) => plain_failure(
                                format!(
                                    "SNMP Test Failed - SNMP GetNext of {oid} on {hostname} was successful but the value of the returned OID did not match with the expected result. Expected value: {expected} - returned value {value}."
                                ),
                                Some(line),
                            ),
                            Err(error) => plain_failure(
                                format!(
                                    "SNMP Test Failed - SNMP GetNext of {oid} on {hostname} was unsuccessful due to an exception. Message: {error}."
                                ),
                                Some(line),
                            ),
                        }
                    }
                }
            }
        }
    }

    async fn process_wbem(&self, criterion: &WbemCriterion, ctx: &HostContext) -> CriterionTestResult {
        if criterion.query.trim().is_empty() {
            return CriterionTestResult::empty();
        }
        let Some(config) = &ctx.configurations.wbem else {
            return CriterionTestResult::error_message(criterion, WBEM_CREDENTIALS_NOT_CONFIGURED);
        };

        let namespace = criterion.namespace.as_deref().unwrap_or("root/cimv2");
        let target = WqlTarget::Wbem {
            config: config.clone(),
            ticket: None,
        };
        let outcome = wql::find_namespace(
            &self.executor,
            ctx,
            &target,
            namespace,
            &criterion.query,
            criterion.expected_result.as_deref(),
        )
        .await;
        wql_to_result(criterion, outcome)
    }

    async fn process_wmi(&self, criterion: &WmiCriterion, ctx: &HostContext) -> CriterionTestResult {
        if criterion.query.trim().is_empty() {
            return CriterionTestResult::empty();
        }
        let Some(win) = ctx.win() else {
            return CriterionTestResult::error_message(criterion, NEITHER_WMI_NOR_WINRM);
        };

        let namespace = criterion.namespace.as_deref().unwrap_or("root\\cimv2");
        let target = WqlTarget::from_win(win);
        let outcome = wql::find_namespace(
            &self.executor,
            ctx,
            &target,
            namespace,
            &criterion.query,
            criterion.expected_result.as_deref(),
        )
        .await;
        wql_to_result(criterion, outcome)
    }

    async fn process_ipmi(&self, criterion: &IpmiCriterion, ctx: &HostContext) -> CriterionTestResult {
        match ctx.device_kind {
            DeviceKind::Windows => self.process_windows_ipmi(criterion, ctx).await,
            DeviceKind::Linux | DeviceKind::Solaris => self.process_unix_ipmi(criterion, ctx).await,
            DeviceKind::Oob => self.process_out_of_band_ipmi(ctx).await,
            kind => plain_failure(
                format!("Failed to perform IPMI detection. {kind} is an unsupported OS for IPMI."),
                None,
            ),
        }
    }

    /// Windows exposes the BMC through the hardware instrumentation
    /// namespace; a WQL probe is enough.
    async fn process_windows_ipmi(
        &self,
        criterion: &IpmiCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        let Some(win) = ctx.win() else {
            return CriterionTestResult::error_message(criterion, NEITHER_WMI_NOR_WINRM);
        };

        let target = WqlTarget::from_win(win);
        let outcome = wql::perform_detection_test(
            &self.executor,
            ctx,
            &target,
            "root\\hardware",
            "SELECT Description FROM ComputerSystem",
            None,
        )
        .await;
        wql_to_result(criterion, outcome)
    }

    async fn process_unix_ipmi(
        &self,
        criterion: &IpmiCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        let Some(os_config) = ctx.configurations.os_command.clone() else {
            return plain_failure(
                "No OS command configuration for this host. Returning an empty result",
                Some(String::new()),
            );
        };

        // The ipmitool command prefix is stable per host; build it once.
        let cached = { ctx.properties.lock().await.ipmitool_command.clone() };
        let command = match cached {
            Some(command) => command,
            None => {
                match ipmi_command::build_ipmi_command(&self.executor, ctx, &os_config).await {
                    Ok(command) => {
                        ctx.properties.lock().await.ipmitool_command = Some(command.clone());
                        command
                    }
                    Err(error) => return CriterionTestResult::error_message(criterion, error),
                }
            }
        };

        let full_command = format!("{command}bmc info");
        match self
            .executor
            .run_os_command(&full_command, ctx, false, Some(os_config.timeout), &[])
            .await
        {
            Err(error) => CriterionTestResult::error(criterion, error),
            Ok(outcome) if outcome.result.contains("IPMI Version") => {
                ctx.properties.lock().await.ipmi_execution_count += 1;
                plain_success(IPMI_SUCCESS_INBAND, Some(outcome.result))
            }
            Ok(outcome) => plain_failure(
                format!(
                    "Did not get the expected result from the IPMI tool command: {}",
                    outcome.no_password_command
                ),
                Some(outcome.result),
            ),
        }
    }

    async fn process_out_of_band_ipmi(&self, ctx: &HostContext) -> CriterionTestResult {
        let Some(config) = &ctx.configurations.ipmi else {
            return CriterionTestResult::empty();
        };

        match self.executor.execute_ipmi_detection(&ctx.hostname, config).await {
            Ok(Some(status)) => plain_success(IPMI_SUCCESS_LAN, Some(status)),
            Ok(None) => plain_failure(IPMI_NULL_LAN, None),
            Err(error) => CriterionTestResult {
                success: false,
                result: None,
                message: format!(
                    "Cannot execute the IPMI-over-LAN command to get the chassis status on {}. Message: {}",
                    ctx.hostname, error
                ),
                exception: Some(error),
            },
        }
    }

    async fn process_os_command(
        &self,
        criterion: &OsCommandCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        let expected = criterion.expected_result.as_deref().unwrap_or("");
        if criterion.command_line.trim().is_empty() || expected.trim().is_empty() {
            return plain_success(
                "CommandLine or ExpectedResult are empty. Skipping this test.",
                None,
            );
        }

        let outcome = self
            .executor
            .run_os_command(
                &criterion.command_line,
                ctx,
                criterion.execute_locally,
                criterion.timeout,
                &[],
            )
            .await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => return CriterionTestResult::error(criterion, error),
        };

        let display = criterion.display_with_command(&outcome.no_password_command);
        let pattern = match RegexBuilder::new(expected)
            .case_insensitive(true)
            .multi_line(true)
            .build()
        {
            Ok(pattern) => pattern,
            Err(error) => {
                return CriterionTestResult::error_message(
                    &display,
                    format!("Invalid expected result pattern: {error}"),
                )
            }
        };

        if pattern.is_match(&outcome.result) {
            CriterionTestResult::success(&display, outcome.result)
        } else {
            CriterionTestResult::failure(&display, outcome.result)
        }
    }

    async fn process_http(&self, criterion: &HttpCriterion, ctx: &HostContext) -> CriterionTestResult {
        let Some(config) = &ctx.configurations.http else {
            return CriterionTestResult::empty();
        };

        let hostname = &ctx.hostname;
        let Some(result) = self.executor.execute_http(criterion, config, hostname).await else {
            return plain_failure(
                format!("HTTP Test Failed - the HTTP Test on {hostname} did not return any result."),
                None,
            );
        };

        match criterion.expected_result.as_deref().filter(|e| !e.trim().is_empty()) {
            None => {
                if result.is_empty() {
                    plain_failure(
                        format!(
                            "HTTP Test Failed - the HTTP Test on {hostname} did not return any result."
                        ),
                        Some(result),
                    )
                } else {
                    plain_success(
                        format!("Successful HTTP Test on {hostname}. Returned Result: {result}."),
                        Some(result),
                    )
                }
            }
            Some(expected) => match expected_matches(expected, &result) {
                Ok(true) => plain_success(
                    format!("Successful HTTP Test on {hostname}. Returned Result: {result}."),
                    Some(result),
                ),
                _ => plain_failure(
                    format!(
                        "HTTP Test Failed - the returned result ({result}) of the HTTP Test on {hostname} did not match the expected result ({expected}). Expected value: {expected} - returned value {result}."
                    ),
                    Some(result),
                ),
            },
        }
    }

    async fn process_process(
        &self,
        criterion: &ProcessCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        if criterion.command_line.trim().is_empty() {
            return plain_success("Process presence check: No test will be performed.", None);
        }
        if !ctx.is_localhost {
            return plain_success(
                "Process presence check: No test will be performed remotely.",
                None,
            );
        }

        match std::env::consts::OS {
            "windows" => self.process_windows_process(criterion, ctx).await,
            "linux" => self.process_local_process(criterion),
            os => plain_success(
                format!("Process presence check: No tests will be performed for OS: {os}."),
                None,
            ),
        }
    }

    async fn process_windows_process(
        &self,
        criterion: &ProcessCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        // Local WMI works without credentials; use the configured ones when
        // present.
        let target = match ctx.win() {
            Some(win) => WqlTarget::from_win(win),
            None => WqlTarget::Wmi(Default::default()),
        };
        let outcome = wql::perform_detection_test(
            &self.executor,
            ctx,
            &target,
            "root\\cimv2",
            "SELECT ProcessId,Name,ParentProcessId,CommandLine FROM Win32_Process",
            Some(&criterion.command_line),
        )
        .await;

        if outcome.success {
            plain_success(process_match_message(true, &criterion.command_line), outcome.result)
        } else if let Some(error) = outcome.exception {
            CriterionTestResult::error(criterion, error)
        } else {
            plain_failure(process_match_message(false, &criterion.command_line), outcome.result)
        }
    }

    fn process_local_process(&self, criterion: &ProcessCriterion) -> CriterionTestResult {
        let pattern = match RegexBuilder::new(&criterion.command_line)
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => pattern,
            Err(error) => {
                return CriterionTestResult::error_message(
                    criterion,
                    format!("Invalid process command line pattern: {error}"),
                )
            }
        };

        let commands = running_process_commands();
        let matching: Vec<&String> = commands.iter().filter(|c| pattern.is_match(c)).collect();
        if matching.is_empty() {
            plain_failure(process_match_message(false, &criterion.command_line), None)
        } else {
            let found = matching
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            plain_success(process_match_message(true, &criterion.command_line), Some(found))
        }
    }

    async fn process_service(
        &self,
        criterion: &ServiceCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        let Some(win) = ctx.win() else {
            return CriterionTestResult::error_message(criterion, NEITHER_WMI_NOR_WINRM);
        };
        if ctx.device_kind != DeviceKind::Windows {
            return CriterionTestResult::error_message(
                criterion,
                "Host OS is not Windows. Skipping this test.",
            );
        }
        if criterion.name.trim().is_empty() {
            return plain_success(
                "Windows Service check: the service name is empty. No test will be performed.",
                None,
            );
        }

        let target = WqlTarget::from_win(win);
        let query = format!(
            "SELECT Name, State FROM Win32_Service WHERE Name = '{}'",
            criterion.name
        );
        let outcome =
            wql::perform_detection_test(&self.executor, ctx, &target, "root\\cimv2", &query, None)
                .await;

        if !outcome.success {
            return wql_to_result(criterion, outcome);
        }

        let result = outcome.result.unwrap_or_default();
        if result.to_lowercase().contains(";running") {
            plain_success(
                format!("The {} Windows Service is currently running.", criterion.name),
                Some(result),
            )
        } else {
            plain_failure(
                format!(
                    "The {} Windows Service is not reported as running:\n{}",
                    criterion.name, result
                ),
                Some(result),
            )
        }
    }

    async fn process_device_type(
        &self,
        criterion: &DeviceTypeCriterion,
        ctx: &HostContext,
    ) -> CriterionTestResult {
        let kind = ctx.device_kind;
        let matched = if criterion.keep.contains(&kind) {
            true
        } else if criterion.exclude.contains(&kind) {
            false
        } else {
            criterion.keep.is_empty()
        };

        let result = format!("Configured OS type : {kind}");
        if matched {
            plain_success("Successful OS detection operation", Some(result))
        } else {
            plain_failure("Failed OS detection operation", Some(result))
        }
    }

    async fn process_product_version(
        &self,
        criterion: &ProductVersionCriterion,
    ) -> CriterionTestResult {
        let Some(required) = criterion
            .engine_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
        else {
            return plain_success("No version requirement. No test will be performed.", None);
        };

        if version::satisfies_minimum(&self.engine_version, required) {
            plain_success(
                format!(
                    "Engine version {} satisfies the required version {}.",
                    self.engine_version, required
                ),
                Some(self.engine_version.clone()),
            )
        } else {
            plain_failure(
                format!(
                    "Engine version {} does not satisfy the required version {}.",
                    self.engine_version, required
                ),
                Some(self.engine_version.clone()),
            )
        }
    }
}

fn plain_success(message: impl Into<String>, result: Option<String>) -> CriterionTestResult {
    CriterionTestResult {
        success: true,
        result,
        message: message.into(),
        exception: None,
    }
}

fn plain_failure(message: impl Into<String>, result: Option<String>) -> CriterionTestResult {
    CriterionTestResult {
        success: false,
        result,
        message: message.into(),
        exception: None,
    }
}

fn process_match_message(matched: bool, command_line: &str) -> String {
    let verdict = if matched {
        "One or more currently running processes match the following regular expression"
    } else {
        "No currently running processes match the following regular expression"
    };
    format!(
        "{verdict}:\n- Regexp (should match with the command of a currently running process): {command_line}"
    )
}

/// Convert a WQL detection outcome into a criterion verdict.
fn wql_to_result(criterion: &impl fmt::Display, outcome: WqlTestResult) -> CriterionTestResult {
    if outcome.success {
        return CriterionTestResult::success(criterion, outcome.result.unwrap_or_default());
    }
    if let Some(error) = outcome.exception {
        return CriterionTestResult::error(criterion, error);
    }
    CriterionTestResult {
        success: false,
        result: outcome.result,
        message: format!(
            "Criterion test failed:\n{criterion}\n{}",
            outcome.message.unwrap_or_else(|| "No result.".to_string())
        ),
        exception: None,
    }
}

/// Case-insensitive regular-expression search of `expected` in `value`.
fn expected_matches(expected: &str, value: &str) -> Result<bool, regex::Error> {
    let pattern = RegexBuilder::new(expected).case_insensitive(true).build()?;
    Ok(pattern.is_match(value))
}

static GETNEXT_VALUE: OnceLock<Regex> = OnceLock::new();

/// Extract the value part of a GetNext varbind line (`OID TYPE value`).
fn getnext_value(line: &str) -> Option<String> {
    let pattern = GETNEXT_VALUE
        .get_or_init(|| Regex::new(r"\w+\s+\w+\s+(.*)").expect("hard-coded pattern"));
    pattern
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Command lines of the processes currently running on this machine.
fn running_process_commands() -> Vec<String> {
    let mut system = sysinfo::System::new();
    system.refresh_processes();
    system
        .processes()
        .values()
        .map(|process| {
            let command = process.cmd().join(" ");
            if command.is_empty() {
                process.name().to_string()
            } else {
                command
            }
        })
        .collect()
}
