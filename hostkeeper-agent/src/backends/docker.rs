use super::{ActionReport, ContainerBackend, ContainerState, UnitAction};
use crate::error::{MonitorError, MonitorResult};
use crate::execution::CommandExecutor;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Docker through the `docker` CLI
pub struct DockerBackend {
    executor: CommandExecutor,
}

impl DockerBackend {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn query_container_state(&self, container: &str) -> ContainerState {
        let filter = format!("name={}", container);
        match self.executor.run("docker", &["ps", "-a", "--filter", &filter]).await {
            Ok(result) if result.success => {
                let state = parse_docker_ps(&result.stdout, container);
                debug!("docker ps {} -> {:?}", container, state);
                state
            }
            Ok(result) => ContainerState::Error(result.combined_output().trim().to_string()),
            Err(e) => {
                warn!("Error while checking container {}: {:#}", container, e);
                ContainerState::Error(format!("{:#}", e))
            }
        }
    }

    async fn container_action(
        &self,
        container: &str,
        action: UnitAction,
    ) -> MonitorResult<ActionReport> {
        let result = self
            .executor
            .run("docker", &[action.as_str(), container])
            .await
            .map_err(|e| MonitorError::RemediationExecution {
                entity: container.to_string(),
                action: format!("docker {}", action),
                reason: format!("{:#}", e),
            })?;

        Ok(ActionReport {
            success: result.success,
            output: result.combined_output(),
        })
    }
}

/// Classify `docker ps -a --filter name=<container>` output
///
/// The name filter matches substrings, so a row whose NAMES column equals the
/// container is preferred. Otherwise the last listed row is used.
pub fn parse_docker_ps(stdout: &str, container: &str) -> ContainerState {
    let rows: Vec<&str> = stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with("CONTAINER ID"))
        .collect();

    let Some(row) = rows
        .iter()
        .find(|row| row.split_whitespace().last() == Some(container))
        .or_else(|| rows.last())
    else {
        return ContainerState::Absent;
    };

    let columns: Vec<&str> = row.split_whitespace().collect();
    if columns.contains(&"Up") {
        ContainerState::Up(row.trim().to_string())
    } else if columns.contains(&"Exited") {
        ContainerState::Exited(row.trim().to_string())
    } else {
        ContainerState::Error(format!("unrecognized status line: {}", row.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "CONTAINER ID   IMAGE                 COMMAND                  CREATED        STATUS                      PORTS                  NAMES";

    #[test]
    fn test_up_container() {
        let out = format!(
            "{}\n3f4e8a1b2c3d   nginx:latest          \"/docker-entrypoint.…\"   2 weeks ago    Up 3 days                   0.0.0.0:80->80/tcp     web\n",
            HEADER
        );
        assert!(matches!(parse_docker_ps(&out, "web"), ContainerState::Up(_)));
    }

    #[test]
    fn test_exited_container() {
        let out = format!(
            "{}\n9a8b7c6d5e4f   homeassistant/home-assistant   \"/init\"   3 days ago   Exited (137) 2 hours ago             homeassistant\n",
            HEADER
        );
        assert!(matches!(parse_docker_ps(&out, "homeassistant"), ContainerState::Exited(_)));
    }

    #[test]
    fn test_header_only_is_absent() {
        let out = format!("{}\n", HEADER);
        assert_eq!(parse_docker_ps(&out, "ghost"), ContainerState::Absent);
        assert_eq!(parse_docker_ps("", "ghost"), ContainerState::Absent);
    }

    #[test]
    fn test_exact_name_preferred_over_substring_match() {
        let out = format!(
            "{}\n\
             111111111111   postgres:16   \"docker-entrypoint.s…\"   1 day ago   Up 1 day                5432/tcp   db\n\
             222222222222   adminer       \"entrypoint.sh php …\"   1 day ago   Exited (0) 1 hour ago              db-admin\n",
            HEADER
        );
        assert!(matches!(parse_docker_ps(&out, "db"), ContainerState::Up(_)));
        assert!(matches!(parse_docker_ps(&out, "db-admin"), ContainerState::Exited(_)));
    }

    #[test]
    fn test_created_container_is_unrecognized() {
        let out = format!(
            "{}\n333333333333   redis:7   \"docker-entrypoint.s…\"   5 seconds ago   Created             cache\n",
            HEADER
        );
        assert!(matches!(parse_docker_ps(&out, "cache"), ContainerState::Error(_)));
    }
}
