use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortError {
    #[error("no free port among {attempts} ports starting at {start}")]
    Exhausted { start: u16, attempts: u16 },
}

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load {path} into the environment: {source}")]
    Load {
        path: String,
        #[source]
        source: dotenvy::Error,
    },
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{cmd}` exited with status {code}")]
    Failed {
        cmd: String,
        code: i32,
        output: Vec<String>,
    },
}

impl CommandError {
    /// Captured output lines of a failed command, empty for spawn errors.
    pub fn output(&self) -> &[String] {
        match self {
            CommandError::Failed { output, .. } => output,
            CommandError::Spawn { .. } => &[],
        }
    }
}
