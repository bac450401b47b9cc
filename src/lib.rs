//! Criterion-based connector detection for hardware monitoring.
//!
//! A connector describes one family of monitorable devices and declares the
//! detection criteria under which it applies: an SNMP OID that must answer, a
//! WQL query that must return rows, a running process, a reachable IPMI BMC.
//! This crate evaluates those criteria against a host through pluggable
//! protocol transports and reports a [`CriterionTestResult`] per criterion.
//!
//! The embedding agent wires its protocol clients into a
//! [`ProtocolExecutor`], builds a [`HostContext`] from the host's configured
//! protocols, and hands each [`Criterion`] to the [`CriterionEngine`].

pub mod config;
pub mod criterion;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ipmi_command;
pub mod result;
pub mod timeout;
pub mod transports;
pub mod version;
pub mod wql;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{DeviceKind, HostContext, ProtocolConfigurations};
pub use criterion::Criterion;
pub use engine::CriterionEngine;
pub use error::ProtocolError;
pub use executor::ProtocolExecutor;
pub use result::CriterionTestResult;
