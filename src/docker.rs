use crate::env::{PortConfig, POSTGRES_PORT_KEY, REDIS_PORT_KEY};
use crate::error::CommandError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// The container orchestration tool as the launch flow sees it.
pub trait Orchestrator: Send + Sync {
    /// Any failure to query counts as "not running".
    fn already_running(&self) -> impl Future<Output = bool> + Send;
    fn up(&self, ports: PortConfig) -> impl Future<Output = Result<(), CommandError>> + Send;
    fn status(&self) -> impl Future<Output = Result<String, CommandError>> + Send;
}

/// Finds what is listening on a port. Diagnostic only.
pub trait OwnerLookup: Send + Sync {
    fn port_owner(&self, port: u16) -> impl Future<Output = Option<PortOwner>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortOwner {
    pub command: String,
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "State", default)]
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct DockerCompose {
    pub docker_bin: String,
    pub cwd: PathBuf,
    pub env_file: Option<PathBuf>,
}

impl DockerCompose {
    pub fn new(docker_bin: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            cwd: cwd.into(),
            env_file: None,
        }
    }

    pub fn with_env_file(mut self, env_file: impl Into<PathBuf>) -> Self {
        self.env_file = Some(env_file.into());
        self
    }

    fn compose_args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full: Vec<&str> = vec!["compose"];
        // compose refuses a missing --env-file
        if let Some(p) = self.env_file.as_deref().filter(|p| p.exists()) {
            if let Some(s) = p.to_str() {
                full.push("--env-file");
                full.push(s);
            }
        }
        full.extend_from_slice(args);
        full
    }

    pub async fn ps_json(&self) -> Result<String, CommandError> {
        let args = self.compose_args(&["ps", "--format", "json"]);
        cmd_out(&self.docker_bin, &self.cwd, &args).await
    }
}

impl Orchestrator for DockerCompose {
    async fn already_running(&self) -> bool {
        match self.ps_json().await {
            Ok(out) => {
                for svc in parse_ps(&out) {
                    tracing::debug!(service = %svc.service, name = %svc.name, state = %svc.state, "compose service");
                }
                is_running_output(&out)
            }
            Err(e) => {
                tracing::debug!(error = %e, "status query failed, assuming not running");
                false
            }
        }
    }

    async fn up(&self, ports: PortConfig) -> Result<(), CommandError> {
        let args = self.compose_args(&["up", "-d"]);
        let out = Command::new(&self.docker_bin)
            .current_dir(&self.cwd)
            .args(&args)
            .env(POSTGRES_PORT_KEY, ports.postgres.to_string())
            .env(REDIS_PORT_KEY, ports.redis.to_string())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                cmd: display_cmd(&self.docker_bin, &args),
                source,
            })?;
        check_output(&self.docker_bin, &args, out).map(|_| ())
    }

    async fn status(&self) -> Result<String, CommandError> {
        let args = self.compose_args(&["ps"]);
        cmd_out(&self.docker_bin, &self.cwd, &args).await
    }
}

/// `lsof`-based owner lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lsof;

impl OwnerLookup for Lsof {
    async fn port_owner(&self, port: u16) -> Option<PortOwner> {
        let filter = format!("-iTCP:{port}");
        let out = Command::new("lsof")
            .args(["-nP", filter.as_str(), "-sTCP:LISTEN"])
            .output()
            .await
            .ok()?;
        parse_lsof(&String::from_utf8_lossy(&out.stdout))
    }
}

pub fn is_running_output(out: &str) -> bool {
    let t = out.trim();
    !t.is_empty() && t != "[]"
}

/// Services reported by `compose ps --format json`, tolerating both the
/// JSON array and the one-object-per-line formats.
pub fn parse_ps(out: &str) -> Vec<ServiceStatus> {
    let t = out.trim();
    if t.starts_with('[') {
        return serde_json::from_str(t).unwrap_or_default();
    }
    t.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str::<ServiceStatus>(l).ok())
        .collect()
}

/// First data row of `lsof` output: COMMAND and PID columns.
pub fn parse_lsof(out: &str) -> Option<PortOwner> {
    let row = out.lines().skip(1).find(|l| !l.trim().is_empty())?;
    let mut cols = row.split_whitespace();
    let command = cols.next()?.to_string();
    let pid = cols.next()?.parse().ok()?;
    Some(PortOwner { command, pid })
}

fn display_cmd(bin: &str, args: &[&str]) -> String {
    std::iter::once(bin)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_output(bin: &str, args: &[&str], out: Output) -> Result<String, CommandError> {
    if out.status.success() {
        return Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_string());
    }
    let output = String::from_utf8_lossy(&out.stdout)
        .lines()
        .chain(String::from_utf8_lossy(&out.stderr).lines())
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    Err(CommandError::Failed {
        cmd: display_cmd(bin, args),
        code: crate::tasks::exit_code(out.status),
        output,
    })
}

async fn cmd_out(bin: &str, cwd: &Path, args: &[&str]) -> Result<String, CommandError> {
    let out = Command::new(bin)
        .current_dir(cwd)
        .args(args)
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            cmd: display_cmd(bin, args),
            source,
        })?;
    check_output(bin, args, out)
}
