//! In-band ipmitool command construction.
//!
//! The in-band IPMI test shells out to ipmitool on the monitored host. The
//! command prefix depends on the OS: Linux talks to the BMC through the
//! OpenIPMI driver, Solaris picks its driver from the kernel release.

use tracing::debug;

use crate::config::{DeviceKind, HostContext, OsCommandConfiguration};
use crate::executor::ProtocolExecutor;

/// ipmitool lives outside the default PATH on several Unix flavors.
const PATH_PROLOGUE: &str = "PATH=$PATH:/usr/local/bin:/usr/sfw/bin;export PATH;";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpmiCommandError {
    #[error("Solaris version ({0}) is too old for in-band IPMI")]
    VersionTooOld(String),
    #[error("Unknown Solaris version ({0})")]
    UnknownVersion(String),
    #[error("Could not identify the Solaris version: {0}")]
    Probe(String),
}

/// Build the ipmitool command prefix for the host, up to and including the
/// interface flag. Callers append the subcommand (`bmc info`, `sensor`...).
pub async fn build_ipmi_command(
    executor: &ProtocolExecutor,
    ctx: &HostContext,
    os_config: &OsCommandConfiguration,
) -> Result<String, IpmiCommandError> {
    let sudo = if os_config.use_sudo
        || os_config
            .use_sudo_commands
            .iter()
            .any(|c| c.eq_ignore_ascii_case("ipmitool"))
    {
        format!("{} ", os_config.sudo_command)
    } else {
        String::new()
    };

    let driver = match ctx.device_kind {
        DeviceKind::Solaris => {
            let uname = executor
                .run_os_command("/usr/bin/uname -r", ctx, false, Some(os_config.timeout), &[])
                .await
                .map_err(|error| IpmiCommandError::Probe(error.to_string()))?;
            solaris_driver(uname.result.trim())?
        }
        _ => "open",
    };

    let command = format!("{PATH_PROLOGUE}{sudo}ipmitool -I {driver} ");
    debug!("Hostname {} - In-band IPMI command: {}", ctx.hostname, command);
    Ok(command)
}

/// Pick the ipmitool interface for a Solaris kernel release string.
///
/// Solaris 9 uses the legacy lipmi driver, Solaris 10 and later use bmc,
/// anything older cannot do in-band IPMI.
fn solaris_driver(release: &str) -> Result<&'static str, IpmiCommandError> {
    let mut parts = release.split('.');
    let minor = parts.nth(1);
    let Some(minor) = minor.and_then(|m| m.parse::<u32>().ok()) else {
        return Err(IpmiCommandError::UnknownVersion(release.to_string()));
    };

    match minor {
        9 => Ok("lipmi"),
        m if m < 9 => Err(IpmiCommandError::VersionTooOld(release.to_string())),
        _ => Ok("bmc"),
    }
}
