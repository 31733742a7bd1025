//! Bring up the local Postgres/Redis stack, moving host ports out of the way
//! of anything already listening on them.

use crate::docker::{Orchestrator, OwnerLookup, PortOwner};
use crate::env::{database_url, EnvFile, EnvStore, PortConfig, DATABASE_URL_KEY};
use crate::ports::{find_available, PortProbe};
use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Postgres,
    Redis,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Service::Postgres => "postgres",
            Service::Redis => "redis",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortReassignment {
    pub service: Service,
    pub from: u16,
    pub to: u16,
    pub owner: Option<PortOwner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AlreadyRunning,
    Started,
}

#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub outcome: Outcome,
    pub ports: PortConfig,
    pub reassignments: Vec<PortReassignment>,
    pub status: Option<String>,
}

impl LaunchReport {
    /// What `dev-up` prints. The container status appears once, at the end.
    pub fn summary_lines(&self, env_file: &Path) -> Vec<String> {
        let mut lines = Vec::new();
        match self.outcome {
            Outcome::AlreadyRunning => lines.push("✅ Containers already running".to_string()),
            Outcome::Started => {
                for r in &self.reassignments {
                    let owner = r
                        .owner
                        .as_ref()
                        .map(|o| format!(" by {} (pid {})", o.command, o.pid))
                        .unwrap_or_default();
                    lines.push(format!(
                        "⚠️  {}: port {} in use{owner}, using {}",
                        r.service, r.from, r.to
                    ));
                }
                if !self.reassignments.is_empty() {
                    lines.push(format!("📝 Updated {}", env_file.display()));
                }
                lines.push("✅ Containers started".to_string());
            }
        }

        lines.push(format!("   Postgres: localhost:{}", self.ports.postgres));
        lines.push(format!("   Redis:    localhost:{}", self.ports.redis));
        if let Some(status) = &self.status {
            lines.push(String::new());
            lines.push(status.clone());
        }
        lines
    }
}

/// Treats ports already assigned in this launch as busy.
struct Reserved<'a, P> {
    inner: &'a P,
    taken: &'a [u16],
}

impl<P: PortProbe> PortProbe for Reserved<'_, P> {
    async fn is_available(&self, port: u16) -> bool {
        !self.taken.contains(&port) && self.inner.is_available(port).await
    }
}

pub struct Launcher<'a, O, P, L, S> {
    pub orchestrator: &'a O,
    pub probe: &'a P,
    pub owners: &'a L,
    pub env: &'a EnvFile<S>,
    pub scan_attempts: u16,
}

impl<O, P, L, S> Launcher<'_, O, P, L, S>
where
    O: Orchestrator,
    P: PortProbe,
    L: OwnerLookup,
    S: EnvStore,
{
    pub async fn launch(&self) -> Result<LaunchReport> {
        if self.orchestrator.already_running().await {
            tracing::info!("containers already running");
            let ports = self.env.read_ports()?;
            return Ok(LaunchReport {
                outcome: Outcome::AlreadyRunning,
                ports,
                reassignments: Vec::new(),
                status: self.status().await,
            });
        }

        let configured = self.env.read_ports()?;
        let mut ports = configured;
        let mut reassignments = Vec::new();
        // ports already handed to an earlier service
        let mut taken: Vec<u16> = Vec::new();

        for service in [Service::Postgres, Service::Redis] {
            let slot = match service {
                Service::Postgres => &mut ports.postgres,
                Service::Redis => &mut ports.redis,
            };
            if let Some(r) = self.resolve(service, *slot, &taken).await? {
                *slot = r.to;
                reassignments.push(r);
            }
            taken.push(*slot);
        }

        if ports != configured {
            self.env
                .write_ports(ports)
                .context("failed to persist resolved ports")?;
            if ports.postgres != configured.postgres {
                self.env
                    .set_var(DATABASE_URL_KEY, &database_url(ports.postgres))
                    .context("failed to update DATABASE_URL")?;
            }
        }

        tracing::info!(postgres = ports.postgres, redis = ports.redis, "starting containers");
        self.orchestrator
            .up(ports)
            .await
            .context("docker compose up failed")?;

        Ok(LaunchReport {
            outcome: Outcome::Started,
            ports,
            reassignments,
            status: self.status().await,
        })
    }

    async fn resolve(
        &self,
        service: Service,
        port: u16,
        taken: &[u16],
    ) -> Result<Option<PortReassignment>> {
        let owner = if taken.contains(&port) {
            tracing::warn!("port {port} ({service}) was just assigned to another service");
            None
        } else if self.probe.is_available(port).await {
            return Ok(None);
        } else {
            let owner = self.owners.port_owner(port).await;
            match &owner {
                Some(o) => tracing::warn!("port {port} ({service}) is used by {} (pid {})", o.command, o.pid),
                None => tracing::warn!("port {port} ({service}) is already in use"),
            }
            owner
        };

        let probe = Reserved {
            inner: self.probe,
            taken,
        };
        let to = find_available(&probe, port, self.scan_attempts)
            .await
            .with_context(|| format!("no free port for {service}"))?;
        tracing::info!("{service}: using port {to} instead of {port}");

        Ok(Some(PortReassignment {
            service,
            from: port,
            to,
            owner,
        }))
    }

    async fn status(&self) -> Option<String> {
        match self.orchestrator.status().await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "could not read container status");
                None
            }
        }
    }
}
