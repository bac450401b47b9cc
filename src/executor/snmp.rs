//! SNMP Get and GetNext execution.

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::config::SnmpConfiguration;
use crate::error::ProtocolError;
use crate::executor::ProtocolExecutor;
use crate::timeout::TimeoutGuard;

impl ProtocolExecutor {
    /// SNMP Get of `oid`. `Ok(None)` means the agent answered with no value.
    /// Session resources are scoped to the call on every exit path.
    pub async fn execute_snmp_get(
        &self,
        oid: &str,
        config: &SnmpConfiguration,
        hostname: &str,
    ) -> Result<Option<String>, ProtocolError> {
        trace!("Hostname {} - Executing SNMP Get of {}", hostname, oid);

        let transport = Arc::clone(&self.snmp);
        let timeout = Duration::from_secs(config.timeout);
        let oid = oid.to_string();
        let config = config.clone();
        let hostname = hostname.to_string();

        TimeoutGuard::run(
            async move { transport.get(&oid, &config, &hostname).await },
            timeout,
        )
        .await
        .map_err(ProtocolError::from)
    }

    /// SNMP GetNext of `oid`. Returns the full varbind line of the successor.
    pub async fn execute_snmp_get_next(
        &self,
        oid: &str,
        config: &SnmpConfiguration,
        hostname: &str,
    ) -> Result<Option<String>, ProtocolError> {
        trace!("Hostname {} - Executing SNMP GetNext of {}", hostname, oid);

        let transport = Arc::clone(&self.snmp);
        let timeout = Duration::from_secs(config.timeout);
        let oid = oid.to_string();
        let config = config.clone();
        let hostname = hostname.to_string();

        TimeoutGuard::run(
            async move { transport.get_next(&oid, &config, &hostname).await },
            timeout,
        )
        .await
        .map_err(ProtocolError::from)
    }

    /// SNMP table walk of `columns` under `oid`, one row per instance.
    pub async fn execute_snmp_table(
        &self,
        oid: &str,
        columns: &[String],
        config: &SnmpConfiguration,
        hostname: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        trace!("Hostname {} - Executing SNMP Table of {}", hostname, oid);

        let transport = Arc::clone(&self.snmp);
        let timeout = Duration::from_secs(config.timeout);
        let oid = oid.to_string();
        let columns = columns.to_vec();
        let config = config.clone();
        let hostname = hostname.to_string();

        TimeoutGuard::run(
            async move { transport.table(&oid, &columns, &config, &hostname).await },
            timeout,
        )
        .await
        .map_err(ProtocolError::from)
    }
}
