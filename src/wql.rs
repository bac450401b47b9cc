//! WQL detection test and automatic namespace resolution.
//!
//! WMI, WBEM, WinRM, Service and Windows IPMI criteria all boil down to the
//! same operation: run a WQL query somewhere and check the rows against an
//! optional expected pattern. When a criterion declares its namespace as
//! `automatic`, the actual namespace is discovered by enumerating the
//! children of `root` and probing each candidate with the criterion's own
//! query; the winner is cached per host so resolution happens at most once
//! per protocol.

use regex::RegexBuilder;
use tracing::{debug, trace, warn};

use crate::config::HostContext;
use crate::error::ProtocolError;
use crate::executor::ProtocolExecutor;
use crate::transports::WqlTarget;

/// Cell separator used when serializing query rows.
pub const TABLE_SEP: &str = ";";

const NAMESPACE_ENUMERATION_QUERY: &str = "SELECT Name FROM __NAMESPACE";

/// Administrative namespaces that never host hardware instrumentation.
const IGNORED_NAMESPACES: &[&str] = &["rsop", "cli", "default"];

/// Outcome of one WQL detection test.
#[derive(Debug, Clone, PartialEq)]
pub struct WqlTestResult {
    pub success: bool,
    pub result: Option<String>,
    pub message: Option<String>,
    pub exception: Option<ProtocolError>,
}

impl WqlTestResult {
    fn success(result: String) -> Self {
        Self {
            success: true,
            result: Some(result),
            message: None,
            exception: None,
        }
    }

    fn failure(result: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            result,
            message: Some(message.into()),
            exception: None,
        }
    }

    fn error(error: ProtocolError) -> Self {
        Self {
            success: false,
            result: None,
            message: Some(error.to_string()),
            exception: Some(error),
        }
    }
}

/// Run `query` in `namespace` and check the serialized rows against
/// `expected`, a case-insensitive multi-line regular expression.
pub async fn perform_detection_test(
    executor: &ProtocolExecutor,
    ctx: &HostContext,
    target: &WqlTarget,
    namespace: &str,
    query: &str,
    expected: Option<&str>,
) -> WqlTestResult {
    let rows = match executor.execute_wql(ctx, target, namespace, query).await {
        Ok(rows) => rows,
        Err(error) => return WqlTestResult::error(error),
    };

    let actual = rows_to_csv(&rows);
    if actual.trim().is_empty() {
        return WqlTestResult::failure(Some(actual), "No result.");
    }

    let Some(expected) = expected.filter(|e| !e.trim().is_empty()) else {
        return WqlTestResult::success(actual);
    };

    let pattern = match RegexBuilder::new(expected)
        .case_insensitive(true)
        .multi_line(true)
        .build()
    {
        Ok(pattern) => pattern,
        Err(error) => {
            return WqlTestResult::failure(
                Some(actual),
                format!("Invalid expected result pattern: {error}"),
            )
        }
    };

    match pattern.find(&actual) {
        Some(found) => WqlTestResult::success(found.as_str().to_string()),
        None => WqlTestResult::failure(
            Some(actual.clone()),
            format!("The result does not match the expected pattern. Expected value: {expected} - returned value {actual}."),
        ),
    }
}

/// Run the detection test in the criterion's namespace, resolving `automatic`
/// through the per-host cache and, when empty, through discovery.
pub async fn find_namespace(
    executor: &ProtocolExecutor,
    ctx: &HostContext,
    target: &WqlTarget,
    namespace: &str,
    query: &str,
    expected: Option<&str>,
) -> WqlTestResult {
    // A namespace forced in the configuration wins over the criterion.
    if let Some(forced) = forced_namespace(target) {
        return perform_detection_test(executor, ctx, target, &forced, query, expected).await;
    }

    if !namespace.eq_ignore_ascii_case("automatic") {
        return perform_detection_test(executor, ctx, target, namespace, query, expected).await;
    }

    // The cache lock is held across discovery so that concurrent automatic
    // criteria for the same host run the enumeration sweep at most once;
    // later arrivals block here and then find the cache filled.
    let mut cache = ctx.namespace_cache.lock().await;
    let slot = match target {
        WqlTarget::Wbem { .. } => &mut cache.automatic_wbem,
        _ => &mut cache.automatic_wmi,
    };
    if let Some(resolved) = slot.clone() {
        drop(cache);
        trace!(
            "Hostname {} - Using the cached automatic {} namespace {}",
            ctx.hostname,
            target.protocol_name(),
            resolved
        );
        return perform_detection_test(executor, ctx, target, &resolved, query, expected).await;
    }

    match detect_namespace(executor, ctx, target, query, expected).await {
        Ok((resolved, result)) => {
            *slot = Some(resolved);
            result
        }
        Err(message) => WqlTestResult::failure(None, message),
    }
}

fn forced_namespace(target: &WqlTarget) -> Option<String> {
    let namespace = match target {
        WqlTarget::Wmi(config) => config.namespace.as_deref(),
        WqlTarget::Wbem { config, .. } => config.namespace.as_deref(),
        WqlTarget::WinRm(config) => config.namespace.as_deref(),
    };
    namespace
        .filter(|n| !n.trim().is_empty() && !n.eq_ignore_ascii_case("automatic"))
        .map(str::to_string)
}

/// Probe each candidate namespace with the criterion's own query; the first
/// one that matches wins. Candidate order is the enumeration order.
async fn detect_namespace(
    executor: &ProtocolExecutor,
    ctx: &HostContext,
    target: &WqlTarget,
    query: &str,
    expected: Option<&str>,
) -> Result<(String, WqlTestResult), String> {
    let candidates = find_possible_namespaces(executor, ctx, target).await?;

    for candidate in &candidates {
        let result = perform_detection_test(executor, ctx, target, candidate, query, expected).await;
        if result.success {
            debug!(
                "Hostname {} - Detected {} namespace: {}",
                ctx.hostname,
                target.protocol_name(),
                candidate
            );
            return Ok((candidate.clone(), result));
        }

        // An error on one candidate only disqualifies that candidate, unless
        // it says the server will never answer anything.
        if let Some(error) = &result.exception {
            if !error.is_acceptable_namespace_error() {
                warn!(
                    "Hostname {} - {} does not respond during namespace detection: {}",
                    ctx.hostname,
                    target.protocol_name(),
                    error
                );
            }
        }
    }

    Err(format!(
        "None of the possible namespaces match the criterion on {}:\n- {}",
        ctx.hostname,
        candidates.join("\n- ")
    ))
}

/// Enumerate the children of `root` and keep the plausible instrumentation
/// namespaces, in discovery order.
async fn find_possible_namespaces(
    executor: &ProtocolExecutor,
    ctx: &HostContext,
    target: &WqlTarget,
) -> Result<Vec<String>, String> {
    let rows = executor
        .execute_wql(ctx, target, "root", NAMESPACE_ENUMERATION_QUERY)
        .await
        .map_err(|error| {
            format!(
                "{} does not respond to {} requests: {}. Cancelling namespace detection.",
                ctx.hostname,
                target.protocol_name(),
                error
            )
        })?;

    let prefix = match target {
        WqlTarget::Wbem { .. } => "root/",
        _ => "root\\",
    };

    let mut candidates: Vec<String> = Vec::new();
    for row in &rows {
        let Some(name) = row.first().map(|n| n.trim()).filter(|n| !n.is_empty()) else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if lower.contains("interop")
            || lower.contains("security")
            || IGNORED_NAMESPACES.contains(&lower.as_str())
        {
            continue;
        }
        let namespace = format!("{prefix}{name}");
        if !candidates.iter().any(|c| c.eq_ignore_ascii_case(&namespace)) {
            candidates.push(namespace);
        }
    }

    if candidates.is_empty() {
        return Err(format!(
            "No suitable namespace could be found to query host {}.",
            ctx.hostname
        ));
    }

    trace!(
        "Hostname {} - Possible {} namespaces: {}",
        ctx.hostname,
        target.protocol_name(),
        candidates.join(", ")
    );
    Ok(candidates)
}

/// Serialize query rows: cells joined with `;`, one row per line.
pub fn rows_to_csv(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join(TABLE_SEP))
        .collect::<Vec<_>>()
        .join("\n")
}
