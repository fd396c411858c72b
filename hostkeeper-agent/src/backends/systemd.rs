use super::{ActionReport, UnitAction, UnitBackend, UnitState};
use crate::error::{MonitorError, MonitorResult};
use crate::execution::CommandExecutor;
use async_trait::async_trait;
use tracing::{debug, warn};

/// systemd through `systemctl`
pub struct SystemdBackend {
    executor: CommandExecutor,
}

impl SystemdBackend {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl UnitBackend for SystemdBackend {
    async fn query_unit_state(&self, unit: &str) -> UnitState {
        // `systemctl status` exits 3 for inactive units, so the exit code alone
        // says nothing; the Active: line decides.
        match self.executor.run("systemctl", &["status", "--no-pager", unit]).await {
            Ok(result) => {
                let state = parse_systemctl_status(&result.stdout);
                if let UnitState::Error(reason) = &state {
                    if !result.stderr.trim().is_empty() {
                        return UnitState::Error(format!("{}: {}", reason, result.stderr.trim()));
                    }
                }
                debug!("systemctl status {} -> {:?}", unit, state);
                state
            }
            Err(e) => {
                warn!("Error while checking service {}: {:#}", unit, e);
                UnitState::Error(format!("{:#}", e))
            }
        }
    }

    async fn unit_action(&self, unit: &str, action: UnitAction) -> MonitorResult<ActionReport> {
        let result = self
            .executor
            .run("systemctl", &[action.as_str(), unit])
            .await
            .map_err(|e| MonitorError::RemediationExecution {
                entity: unit.to_string(),
                action: format!("systemctl {}", action),
                reason: format!("{:#}", e),
            })?;

        Ok(ActionReport {
            success: result.success,
            output: result.combined_output(),
        })
    }
}

/// Classify `systemctl status` output by its `Active:` line
///
/// ```text
///      Active: active (running) since Mon 2024-01-08 10:00:00 UTC; 2h ago
/// ```
pub fn parse_systemctl_status(stdout: &str) -> UnitState {
    let Some(active_line) = stdout
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with("Active:"))
    else {
        return UnitState::Error("no Active: line in systemctl output".to_string());
    };

    let rest = active_line.trim_start_matches("Active:").trim();
    let mut words = rest.split_whitespace();
    let state = words.next().unwrap_or_default();
    // keep "inactive (dead)" / "failed (Result: exit-code)" for the message
    let summary = match rest.find(')') {
        Some(end) => rest[..=end].to_string(),
        None => state.to_string(),
    };

    match state {
        "active" => UnitState::Active,
        "inactive" | "failed" => UnitState::Inactive(summary),
        "" => UnitState::Error("empty Active: line".to_string()),
        other => UnitState::Error(format!("unit is {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING: &str = "\
● nginx.service - A high performance web server and a reverse proxy server
     Loaded: loaded (/lib/systemd/system/nginx.service; enabled; vendor preset: enabled)
     Active: active (running) since Mon 2024-01-08 10:00:00 UTC; 2h 3min ago
       Docs: man:nginx(8)
   Main PID: 812 (nginx)
";

    const DEAD: &str = "\
○ nginx.service - A high performance web server and a reverse proxy server
     Loaded: loaded (/lib/systemd/system/nginx.service; enabled; vendor preset: enabled)
     Active: inactive (dead) since Mon 2024-01-08 12:04:11 UTC; 5s ago
";

    const FAILED: &str = "\
× grafana-server.service - Grafana instance
     Loaded: loaded (/lib/systemd/system/grafana-server.service; enabled)
     Active: failed (Result: exit-code) since Tue 2024-01-09 08:00:00 UTC; 1min ago
";

    const STARTING: &str = "\
● pihole-FTL.service - Pi-hole FTL
     Active: activating (start-pre) since Tue 2024-01-09 08:00:00 UTC; 1s ago
";

    #[test]
    fn test_running_unit_is_active() {
        assert_eq!(parse_systemctl_status(RUNNING), UnitState::Active);
    }

    #[test]
    fn test_dead_and_failed_units_are_inactive() {
        assert_eq!(
            parse_systemctl_status(DEAD),
            UnitState::Inactive("inactive (dead)".to_string())
        );
        assert_eq!(
            parse_systemctl_status(FAILED),
            UnitState::Inactive("failed (Result: exit-code)".to_string())
        );
    }

    #[test]
    fn test_transitional_state_is_not_a_confirmed_down() {
        assert!(matches!(parse_systemctl_status(STARTING), UnitState::Error(_)));
    }

    #[test]
    fn test_missing_unit_output_is_error() {
        // `Unit foo.service could not be found.` goes to stderr, stdout is empty
        assert!(matches!(parse_systemctl_status(""), UnitState::Error(_)));
    }
}
