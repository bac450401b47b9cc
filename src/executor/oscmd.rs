//! Local and remote OS command execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::config::{HostContext, OsCommandConfiguration};
use crate::error::ProtocolError;
use crate::executor::{ProtocolExecutor, CREDENTIAL_MASK};
use crate::timeout::TimeoutGuard;

/// Remote directory where referenced local files are staged before a remote
/// run.
pub const REMOTE_STAGING_DIR: &str = "/var/tmp/";

static SUDO_MACRO: OnceLock<Regex> = OnceLock::new();

fn sudo_macro() -> &'static Regex {
    SUDO_MACRO.get_or_init(|| Regex::new(r"%\{SUDO:([^}]*)\}").expect("hard-coded pattern"))
}

/// Outcome of an OS command run: the output and a rendering of the command
/// with credentials masked, safe for messages and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct OsCommandResult {
    pub result: String,
    pub no_password_command: String,
}

impl ProtocolExecutor {
    /// Run `command_line` on the host, locally when the host is local or
    /// `execute_locally` is set, through the remote shell otherwise.
    ///
    /// `%{SUDO:...}`, `%{USERNAME}`, `%{PASSWORD}` and `%{HOSTNAME}` macros
    /// are substituted first; `local_files` referenced by the command are
    /// staged to the remote working directory and their paths rewritten.
    pub async fn run_os_command(
        &self,
        command_line: &str,
        ctx: &HostContext,
        execute_locally: bool,
        timeout_override: Option<u64>,
        local_files: &[PathBuf],
    ) -> Result<OsCommandResult, ProtocolError> {
        let os_config = ctx.configurations.os_command.clone().unwrap_or_default();
        let ssh_config = ctx.configurations.ssh.clone();
        let run_locally = ctx.is_localhost || execute_locally;

        let mut command = expand_sudo(command_line, &os_config);
        let username = ssh_config
            .as_ref()
            .and_then(|c| c.username.as_deref())
            .unwrap_or("");
        command = command
            .replace("%{USERNAME}", username)
            .replace("%{HOSTNAME}", &ctx.hostname);

        if !run_locally {
            command = rewrite_local_files(&command, local_files);
        }

        let no_password_command = command.replace("%{PASSWORD}", CREDENTIAL_MASK);
        let password = ssh_config
            .as_ref()
            .and_then(|c| c.password.as_deref())
            .unwrap_or("");
        command = command.replace("%{PASSWORD}", password);

        let timeout = Duration::from_secs(
            timeout_override.unwrap_or(if run_locally {
                os_config.timeout
            } else {
                ssh_config.as_ref().map_or(os_config.timeout, |c| c.timeout)
            }),
        );

        debug!(
            "Hostname {} - Running OS command {}: {}",
            ctx.hostname,
            if run_locally { "locally" } else { "remotely" },
            no_password_command
        );

        let outcome = if run_locally {
            let shell = Arc::clone(&self.local_shell);
            TimeoutGuard::run(async move { shell.run(&command).await }, timeout)
                .await
                .map_err(ProtocolError::from)
        } else {
            let Some(ssh_config) = ssh_config.filter(|c| {
                c.username.as_deref().is_some_and(|u| !u.is_empty())
            }) else {
                return Err(ProtocolError::NoCredentials(format!(
                    "No credentials provided for {}. A username is required for remote command execution.",
                    ctx.hostname
                )));
            };

            let shell = Arc::clone(&self.remote_shell);
            let hostname = ctx.hostname.clone();
            let upload = local_files.to_vec();
            TimeoutGuard::run(
                async move { shell.execute(&hostname, &ssh_config, &command, &upload).await },
                timeout,
            )
            .await
            .map_err(ProtocolError::from)
        };

        match outcome {
            Ok(result) => Ok(OsCommandResult {
                result,
                no_password_command,
            }),
            // Re-sanitize: the transport only saw the substituted command.
            Err(ProtocolError::CommandFailed { output, .. }) => Err(ProtocolError::CommandFailed {
                command: no_password_command,
                output,
            }),
            Err(other) => Err(other),
        }
    }
}

/// Expand every `%{SUDO:binary}` macro per the sudo policy: the configured
/// sudo command when elevation applies to that binary, nothing otherwise.
fn expand_sudo(command_line: &str, config: &OsCommandConfiguration) -> String {
    sudo_macro()
        .replace_all(command_line, |captures: &regex::Captures<'_>| {
            let binary = &captures[1];
            let elevate = config.use_sudo
                || config
                    .use_sudo_commands
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(binary));
            if elevate {
                config.sudo_command.clone()
            } else {
                String::new()
            }
        })
        .trim_start()
        .to_string()
}

/// Rewrite references to local files into their remote staging paths.
fn rewrite_local_files(command: &str, local_files: &[PathBuf]) -> String {
    let mut out = command.to_string();
    for file in local_files {
        if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
            let staged = format!("{REMOTE_STAGING_DIR}{name}");
            out = out.replace(&file.display().to_string(), &staged);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceKind, ProtocolConfigurations, SshConfiguration};
    use crate::testutil::{ScriptedRemoteShell, ScriptedShell};
    use crate::transports::{LocalShell, RemoteShell};

    fn local_ctx() -> HostContext {
        HostContext::new(
            "localhost",
            DeviceKind::Linux,
            true,
            ProtocolConfigurations::default(),
        )
    }

    fn remote_ctx(ssh: Option<SshConfiguration>) -> HostContext {
        HostContext::new(
            "server-12",
            DeviceKind::Linux,
            false,
            ProtocolConfigurations {
                ssh,
                ..Default::default()
            },
        )
    }

    #[test]
    fn sudo_macro_expands_per_policy() {
        let config = OsCommandConfiguration {
            use_sudo_commands: vec!["ipmitool".to_string()],
            ..Default::default()
        };
        assert_eq!(
            expand_sudo("%{SUDO:ipmitool} ipmitool bmc info", &config),
            "sudo ipmitool bmc info"
        );
        assert_eq!(expand_sudo("%{SUDO:dmidecode} dmidecode", &config), "dmidecode");

        let all_sudo = OsCommandConfiguration {
            use_sudo: true,
            ..Default::default()
        };
        assert_eq!(expand_sudo("%{SUDO:anything} ls", &all_sudo), "sudo ls");
    }

    #[test]
    fn local_file_paths_are_rewritten_for_remote_runs() {
        let rewritten = rewrite_local_files(
            "sh /opt/connectors/check_raid.sh --verbose",
            &[PathBuf::from("/opt/connectors/check_raid.sh")],
        );
        assert_eq!(rewritten, "sh /var/tmp/check_raid.sh --verbose");
    }

    #[tokio::test]
    async fn runs_locally_on_a_local_host() {
        let shell = Arc::new(ScriptedShell::with_output("Linux 6.1"));
        let executor = ProtocolExecutor::new().with_local_shell(Arc::clone(&shell) as Arc<dyn LocalShell>);
        let out = executor
            .run_os_command("uname -a", &local_ctx(), false, None, &[])
            .await
            .unwrap();
        assert_eq!(out.result, "Linux 6.1");
        assert_eq!(shell.commands().len(), 1);
    }

    #[tokio::test]
    async fn remote_run_without_a_username_is_a_credentials_error() {
        let executor = ProtocolExecutor::new();
        let err = executor
            .run_os_command("uname -a", &remote_ctx(None), false, None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NoCredentials(_)));

        let blank = SshConfiguration {
            username: Some(String::new()),
            ..Default::default()
        };
        let err = executor
            .run_os_command("uname -a", &remote_ctx(Some(blank)), false, None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NoCredentials(_)));
    }

    #[tokio::test]
    async fn remote_runs_stage_referenced_local_files() {
        let ssh = SshConfiguration {
            username: Some("root".to_string()),
            ..Default::default()
        };
        let remote = Arc::new(ScriptedRemoteShell::with_output("RAID OK"));
        let executor = ProtocolExecutor::new().with_remote_shell(Arc::clone(&remote) as Arc<dyn RemoteShell>);
        let script = PathBuf::from("/opt/connectors/check_raid.sh");

        let out = executor
            .run_os_command(
                "sh /opt/connectors/check_raid.sh",
                &remote_ctx(Some(ssh)),
                false,
                None,
                &[script.clone()],
            )
            .await
            .unwrap();

        assert_eq!(out.result, "RAID OK");
        assert_eq!(remote.commands()[0], "sh /var/tmp/check_raid.sh");
        assert_eq!(remote.uploads(), vec![vec![script]]);
    }

    #[tokio::test]
    async fn passwords_never_reach_the_sanitized_command() {
        let ssh = SshConfiguration {
            username: Some("root".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let remote = Arc::new(ScriptedRemoteShell::with_output("ok"));
        let executor = ProtocolExecutor::new().with_remote_shell(Arc::clone(&remote) as Arc<dyn RemoteShell>);
        let out = executor
            .run_os_command(
                "login %{USERNAME} %{PASSWORD}",
                &remote_ctx(Some(ssh)),
                false,
                None,
                &[],
            )
            .await
            .unwrap();

        assert_eq!(out.no_password_command, format!("login root {CREDENTIAL_MASK}"));
        // The executed command carries the real password.
        assert_eq!(remote.commands()[0], "login root hunter2");
    }

    /// In-memory log sink for asserting on emitted log lines.
    #[derive(Clone, Default)]
    struct LogSink(Arc<std::sync::Mutex<Vec<u8>>>);

    impl LogSink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
        type Writer = LogSink;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn command_logging_carries_only_the_sanitized_command() {
        let sink = LogSink::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let ssh = SshConfiguration {
            username: Some("root".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let remote = Arc::new(ScriptedRemoteShell::with_output("ok"));
        let executor = ProtocolExecutor::new().with_remote_shell(remote);
        executor
            .run_os_command(
                "login %{USERNAME} %{PASSWORD}",
                &remote_ctx(Some(ssh)),
                false,
                None,
                &[],
            )
            .await
            .unwrap();

        let logged = sink.contents();
        assert!(logged.contains(&format!("login root {CREDENTIAL_MASK}")), "{logged}");
        assert!(!logged.contains("hunter2"), "{logged}");
    }

    #[tokio::test]
    async fn command_failures_are_reported_with_the_sanitized_command() {
        let ssh = SshConfiguration {
            username: Some("root".to_string()),
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        let remote = Arc::new(ScriptedRemoteShell::failing("permission denied"));
        let executor = ProtocolExecutor::new().with_remote_shell(remote);
        let err = executor
            .run_os_command(
                "secret-tool %{PASSWORD}",
                &remote_ctx(Some(ssh)),
                false,
                None,
                &[],
            )
            .await
            .unwrap_err();

        match err {
            ProtocolError::CommandFailed { command, output } => {
                assert!(!command.contains("hunter2"));
                assert_eq!(output, "permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
