//! IPMI-over-LAN transport backed by the ipmitool binary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, trace};

use crate::config::IpmiConfiguration;
use crate::error::ProtocolError;
use crate::executor::CREDENTIAL_MASK;
use crate::transports::IpmiTransport;

/// Drives a remote BMC with `ipmitool -I lanplus`.
pub struct IpmitoolLan;

/// Common ipmitool arguments for a LAN session against `hostname`.
fn session_args(hostname: &str, config: &IpmiConfiguration) -> Vec<String> {
    let mut args = vec![
        "-I".to_string(),
        "lanplus".to_string(),
        "-H".to_string(),
        hostname.to_string(),
        "-p".to_string(),
        config.port.to_string(),
    ];
    if !config.skip_auth {
        if let Some(username) = &config.username {
            args.push("-U".to_string());
            args.push(username.clone());
        }
        if let Some(password) = &config.password {
            args.push("-P".to_string());
            args.push(password.clone());
        }
        if let Some(bmc_key) = &config.bmc_key {
            args.push("-y".to_string());
            args.push(bmc_key.clone());
        }
    }
    args
}

/// Argument list with the password value masked, safe for logging.
fn loggable(args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push(CREDENTIAL_MASK.to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "-P" || arg == "-y";
        out.push(arg.clone());
    }
    out.join(" ")
}

async fn run_ipmitool(args: &[String]) -> Result<std::process::Output> {
    trace!("Executing: ipmitool {}", loggable(args));
    tokio::process::Command::new("ipmitool")
        .args(args)
        .output()
        .await
        .context("Failed to execute ipmitool")
}

async fn run_ipmitool_text(args: Vec<String>) -> Result<String, ProtocolError> {
    let output = run_ipmitool(&args).await.map_err(|e| ProtocolError::CommandFailed {
        command: format!("ipmitool {}", loggable(&args)),
        output: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(ProtocolError::CommandFailed {
            command: format!("ipmitool {}", loggable(&args)),
            output: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[async_trait]
impl IpmiTransport for IpmitoolLan {
    async fn chassis_status(
        &self,
        hostname: &str,
        config: &IpmiConfiguration,
    ) -> Result<Option<String>, ProtocolError> {
        debug!("Hostname {} - Querying the chassis status over LAN", hostname);
        let mut args = session_args(hostname, config);
        args.extend(["chassis".to_string(), "status".to_string()]);

        let status = run_ipmitool_text(args).await?;
        if status.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(status))
    }

    async fn sensors(
        &self,
        hostname: &str,
        config: &IpmiConfiguration,
    ) -> Result<String, ProtocolError> {
        debug!("Hostname {} - Dumping FRUs and sensors over LAN", hostname);

        let mut fru_args = session_args(hostname, config);
        fru_args.extend(["fru".to_string(), "print".to_string()]);
        let frus = run_ipmitool_text(fru_args).await?;

        let mut sdr_args = session_args(hostname, config);
        sdr_args.extend(["sdr".to_string(), "elist".to_string(), "all".to_string()]);
        let sensors = run_ipmitool_text(sdr_args).await?;

        Ok(format!("{frus}\n{sensors}"))
    }
}
