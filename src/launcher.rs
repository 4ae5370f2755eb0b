//! Process launcher
//!
//! A run is one OS process per rank. Each process learns its identity from
//! environment variables, the way an MPI launcher hands out ranks:
//!
//! - `COMPOSITOR_RANK`: this process's rank
//! - `COMPOSITOR_SIZE`: number of ranks in the run
//! - `COMPOSITOR_COORDINATOR`: optional coordinator address override
//!
//! `spawn_group` plays the launcher: it starts one child per rank with those
//! variables set and waits for all of them.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};

pub const RANK_VAR: &str = "COMPOSITOR_RANK";
pub const SIZE_VAR: &str = "COMPOSITOR_SIZE";
pub const COORDINATOR_VAR: &str = "COMPOSITOR_COORDINATOR";

/// Launch-related errors
#[derive(Debug)]
pub enum LaunchError {
    /// A rank variable is set but not a valid number
    InvalidVariable { name: &'static str, value: String },
    /// Only one of rank and size was set, or rank >= size
    InconsistentIdentity(String),
    /// A child process could not be started or waited on
    Spawn(std::io::Error),
    /// One or more ranks exited unsuccessfully
    RankFailed(Vec<(usize, ExitStatus)>),
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchError::InvalidVariable { name, value } => write!(f, "{}={:?} is not a valid number", name, value),
            LaunchError::InconsistentIdentity(msg) => write!(f, "Inconsistent rank identity: {}", msg),
            LaunchError::Spawn(e) => write!(f, "Failed to start rank process: {}", e),
            LaunchError::RankFailed(failed) => {
                write!(f, "{} rank(s) failed:", failed.len())?;
                for (rank, status) in failed {
                    write!(f, " rank {} ({})", rank, status)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for LaunchError {}

/// Identity of a rank process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub rank: usize,
    pub size: usize,
    pub coordinator_address: Option<String>,
}

impl LaunchContext {
    /// Read the rank identity from the process environment.
    ///
    /// Returns `Ok(None)` when neither rank nor size is set, meaning this
    /// process is the launcher rather than a rank.
    pub fn from_env() -> Result<Option<Self>, LaunchError> {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(k, _)| k == RANK_VAR || k == SIZE_VAR || k == COORDINATOR_VAR)
            .collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Option<Self>, LaunchError> {
        let rank = parse_var(vars, RANK_VAR)?;
        let size = parse_var(vars, SIZE_VAR)?;

        match (rank, size) {
            (None, None) => Ok(None),
            (Some(rank), Some(size)) => {
                if size == 0 || rank >= size {
                    return Err(LaunchError::InconsistentIdentity(format!(
                        "rank {} in a group of {}",
                        rank, size
                    )));
                }
                Ok(Some(Self {
                    rank,
                    size,
                    coordinator_address: vars.get(COORDINATOR_VAR).cloned(),
                }))
            }
            _ => Err(LaunchError::InconsistentIdentity(format!(
                "{} and {} must be set together",
                RANK_VAR, SIZE_VAR
            ))),
        }
    }
}

fn parse_var(vars: &HashMap<String, String>, name: &'static str) -> Result<Option<usize>, LaunchError> {
    match vars.get(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| LaunchError::InvalidVariable {
                name,
                value: value.clone(),
            }),
    }
}

/// Build the command for one rank of a group
pub fn rank_command(executable: &Path, args: &[String], rank: usize, size: usize, coordinator: &str) -> Command {
    let mut command = Command::new(executable);
    command
        .args(args)
        .env(RANK_VAR, rank.to_string())
        .env(SIZE_VAR, size.to_string())
        .env(COORDINATOR_VAR, coordinator);
    command
}

/// Start `size` rank processes and wait for all of them.
///
/// Every rank must exit successfully; a single failure fails the run.
pub fn spawn_group(executable: &Path, args: &[String], size: usize, coordinator: &str) -> Result<(), LaunchError> {
    let mut children: Vec<(usize, Child)> = Vec::with_capacity(size);
    for rank in 0..size {
        match rank_command(executable, args, rank, size, coordinator).spawn() {
            Ok(child) => {
                tracing::info!(rank, pid = child.id(), "Rank process started");
                children.push((rank, child));
            }
            Err(e) => {
                // The group can never assemble; take down what already started
                for (_, child) in &mut children {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                return Err(LaunchError::Spawn(e));
            }
        }
    }

    let mut failed = Vec::new();
    for (rank, mut child) in children {
        let status = child.wait().map_err(LaunchError::Spawn)?;
        if status.success() {
            tracing::info!(rank, "Rank process finished");
        } else {
            tracing::error!(rank, %status, "Rank process failed");
            failed.push((rank, status));
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(LaunchError::RankFailed(failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_no_identity_means_launcher() {
        assert_eq!(LaunchContext::from_vars(&vars(&[])).unwrap(), None);
    }

    #[test]
    fn test_rank_identity() {
        let ctx = LaunchContext::from_vars(&vars(&[
            (RANK_VAR, "2"),
            (SIZE_VAR, "4"),
            (COORDINATOR_VAR, "10.0.0.1:9000"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(ctx.rank, 2);
        assert_eq!(ctx.size, 4);
        assert_eq!(ctx.coordinator_address.as_deref(), Some("10.0.0.1:9000"));
    }

    #[test]
    fn test_inconsistent_identity() {
        assert!(matches!(
            LaunchContext::from_vars(&vars(&[(RANK_VAR, "0")])),
            Err(LaunchError::InconsistentIdentity(_))
        ));
        assert!(matches!(
            LaunchContext::from_vars(&vars(&[(RANK_VAR, "4"), (SIZE_VAR, "4")])),
            Err(LaunchError::InconsistentIdentity(_))
        ));
        assert!(matches!(
            LaunchContext::from_vars(&vars(&[(RANK_VAR, "x"), (SIZE_VAR, "4")])),
            Err(LaunchError::InvalidVariable { name: RANK_VAR, .. })
        ));
    }

    #[test]
    fn test_rank_command_sets_environment() {
        let command = rank_command(Path::new("/bin/true"), &["run.xml".to_string()], 1, 3, "127.0.0.1:1");
        let envs: HashMap<String, String> = command
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_string_lossy().to_string(), v?.to_string_lossy().to_string())))
            .collect();
        assert_eq!(envs.get(RANK_VAR).map(String::as_str), Some("1"));
        assert_eq!(envs.get(SIZE_VAR).map(String::as_str), Some("3"));
        assert_eq!(envs.get(COORDINATOR_VAR).map(String::as_str), Some("127.0.0.1:1"));
        assert_eq!(command.get_args().count(), 1);
    }
}
