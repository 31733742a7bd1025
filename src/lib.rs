pub mod config;
pub mod docker;
pub mod env;
pub mod error;
pub mod launch;
pub mod logging;
pub mod ports;
pub mod tasks;

pub use config::Config;
pub use env::{EnvFile, EnvStore, FsEnvStore, MemoryEnvStore, PortConfig};
pub use error::{CommandError, EnvError, PortError};
pub use launch::{LaunchReport, Launcher, Outcome};
pub use ports::{find_available, is_available, PortProbe, TcpProbe};
pub use tasks::{run_with_affirmative_input, ExitPolicy, ShellCommand};
