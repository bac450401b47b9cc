//! IPMI-over-LAN execution.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::config::IpmiConfiguration;
use crate::error::ProtocolError;
use crate::executor::ProtocolExecutor;
use crate::timeout::TimeoutGuard;

impl ProtocolExecutor {
    /// Chassis status probe against the BMC. `Ok(None)` means the BMC
    /// answered nothing.
    pub async fn execute_ipmi_detection(
        &self,
        hostname: &str,
        config: &IpmiConfiguration,
    ) -> Result<Option<String>, ProtocolError> {
        trace!("Hostname {} - IPMI-over-LAN detection", hostname);

        let transport = Arc::clone(&self.ipmi);
        let timeout = Duration::from_secs(config.timeout);
        let hostname = hostname.to_string();
        let config = config.clone();

        TimeoutGuard::run(
            async move { transport.chassis_status(&hostname, &config).await },
            timeout,
        )
        .await
        .map_err(ProtocolError::from)
    }

    /// Full FRU and sensor dump from the BMC.
    pub async fn execute_ipmi_sensors(
        &self,
        hostname: &str,
        config: &IpmiConfiguration,
    ) -> Result<String, ProtocolError> {
        trace!("Hostname {} - IPMI-over-LAN sensor dump", hostname);

        let transport = Arc::clone(&self.ipmi);
        let timeout = Duration::from_secs(config.timeout);
        let hostname = hostname.to_string();
        let config = config.clone();

        TimeoutGuard::run(
            async move { transport.sensors(&hostname, &config).await },
            timeout,
        )
        .await
        .map_err(ProtocolError::from)
    }
}
