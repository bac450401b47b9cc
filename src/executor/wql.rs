//! WQL query execution, including the virtualization-console ticket session.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::{HostContext, WbemConfiguration};
use crate::error::ProtocolError;
use crate::executor::ProtocolExecutor;
use crate::timeout::TimeoutGuard;
use crate::transports::WqlTarget;

impl ProtocolExecutor {
    /// Run a WQL query against the target. WBEM targets configured with a
    /// virtualization console authenticate with a cached session ticket,
    /// refreshed once when the server reports an access denial.
    pub async fn execute_wql(
        &self,
        ctx: &HostContext,
        target: &WqlTarget,
        namespace: &str,
        query: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        trace!(
            "Hostname {} - Executing {} query in {}: {}",
            ctx.hostname,
            target.protocol_name(),
            namespace,
            query
        );

        match target {
            WqlTarget::Wbem { config, .. } if config.vcenter.is_some() => {
                self.execute_vcenter_wql(ctx, config, namespace, query).await
            }
            _ => self.run_wql(&ctx.hostname, target.clone(), namespace, query).await,
        }
    }

    async fn run_wql(
        &self,
        hostname: &str,
        target: WqlTarget,
        namespace: &str,
        query: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        let transport = Arc::clone(&self.wql);
        let timeout = target.timeout();
        let hostname = hostname.to_string();
        let namespace = namespace.to_string();
        let query = query.to_string();

        TimeoutGuard::run(
            async move {
                transport
                    .query(&hostname, &target, &namespace, &query)
                    .await
            },
            timeout,
        )
        .await
        .map_err(ProtocolError::from)
    }

    async fn execute_vcenter_wql(
        &self,
        ctx: &HostContext,
        config: &WbemConfiguration,
        namespace: &str,
        query: &str,
    ) -> Result<Vec<Vec<String>>, ProtocolError> {
        let cached = { ctx.properties.lock().await.vcenter_ticket.clone() };
        let ticket = match cached {
            Some(ticket) => ticket,
            None => self.refresh_vcenter_ticket(ctx, config).await?,
        };

        let target = WqlTarget::Wbem {
            config: config.clone(),
            ticket: Some(ticket),
        };
        match self.run_wql(&ctx.hostname, target, namespace, query).await {
            Err(error) if error.is_access_denied() => {
                debug!(
                    "Hostname {} - Access denied with the current console ticket, refreshing it",
                    ctx.hostname
                );
                let ticket = self.refresh_vcenter_ticket(ctx, config).await?;
                let target = WqlTarget::Wbem {
                    config: config.clone(),
                    ticket: Some(ticket),
                };
                self.run_wql(&ctx.hostname, target, namespace, query).await
            }
            other => other,
        }
    }

    async fn refresh_vcenter_ticket(
        &self,
        ctx: &HostContext,
        config: &WbemConfiguration,
    ) -> Result<String, ProtocolError> {
        let Some(vcenter) = config.vcenter.clone() else {
            return Err(ProtocolError::NoCredentials(
                "No virtualization console configured for this host".to_string(),
            ));
        };

        debug!(
            "Hostname {} - Acquiring a session ticket from {}",
            ctx.hostname, vcenter
        );

        let transport = Arc::clone(&self.wql);
        let timeout = std::time::Duration::from_secs(config.timeout);
        let hostname = ctx.hostname.clone();
        let config = config.clone();
        let ticket = TimeoutGuard::run(
            async move {
                transport
                    .acquire_vcenter_ticket(&vcenter, &hostname, &config)
                    .await
            },
            timeout,
        )
        .await
        .map_err(ProtocolError::from)?;

        ctx.properties.lock().await.vcenter_ticket = Some(ticket.clone());
        Ok(ticket)
    }
}
