use crate::ports::DEFAULT_SCAN_ATTEMPTS;
use std::path::{Path, PathBuf};

pub const DEFAULT_SCHEMA_PUSH_CMD: &str = "npx drizzle-kit push --force";

const COMPOSE_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub docker_bin: String,
    pub env_file: PathBuf,
    pub scan_attempts: u16,
    pub schema_push_cmd: String,
}

impl Config {
    /// Settings from the process environment, rooted at the project
    /// containing `start_dir`. `env_file` overrides `DEV_ENV_FILE`.
    pub fn from_env(start_dir: &Path, env_file: Option<PathBuf>) -> Self {
        let root = find_project_root(start_dir);

        let env_file = env_file
            .or_else(|| std::env::var("DEV_ENV_FILE").ok().map(PathBuf::from))
            .map(|p| if p.is_relative() { root.join(p) } else { p })
            .unwrap_or_else(|| root.join(".env"));

        let scan_attempts = std::env::var("PORT_SCAN_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SCAN_ATTEMPTS);

        let schema_push_cmd = std::env::var("SCHEMA_PUSH_CMD")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEMA_PUSH_CMD.to_string());

        Config {
            root,
            docker_bin: resolve_docker_binary(),
            env_file,
            scan_attempts,
            schema_push_cmd,
        }
    }
}

pub fn resolve_docker_binary() -> String {
    std::env::var("DOCKER_BIN").unwrap_or_else(|_| "docker".to_string())
}

pub fn find_project_root(start_dir: &Path) -> PathBuf {
    // Walk up until we find a compose file. A package.json is remembered as a
    // fallback but the search keeps going.
    let mut dir = start_dir.to_path_buf();
    let mut fallback: Option<PathBuf> = None;

    for _ in 0..12 {
        if COMPOSE_FILES.iter().any(|f| dir.join(f).exists()) {
            return dir;
        }
        if fallback.is_none() && dir.join("package.json").exists() {
            fallback = Some(dir.clone());
        }

        match dir.parent() {
            Some(parent) if parent != dir => dir = parent.to_path_buf(),
            _ => break,
        }
    }

    fallback.unwrap_or_else(|| start_dir.to_path_buf())
}
