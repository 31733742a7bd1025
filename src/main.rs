use anyhow::Result;
use clap::Parser;
use devstack::docker::{DockerCompose, Lsof};
use devstack::{logging, CommandError, Config, EnvFile, Launcher, TcpProbe};
use std::path::PathBuf;

/// Start the local Postgres and Redis containers, moving their host ports
/// if something else already listens on them.
#[derive(Parser, Debug)]
#[command(name = "dev-up", version)]
struct Cli {
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Env file holding POSTGRES_PORT / REDIS_PORT (default: <project>/.env)
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("❌ {e:#}");
        if let Some(cmd) = e.downcast_ref::<CommandError>() {
            for line in cmd.output() {
                eprintln!("   {line}");
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let start_dir = std::env::current_dir()?;
    let cfg = Config::from_env(&start_dir, cli.env_file);
    tracing::debug!(root = %cfg.root.display(), env_file = %cfg.env_file.display(), "config");

    let compose = DockerCompose::new(&cfg.docker_bin, &cfg.root).with_env_file(&cfg.env_file);
    let env = EnvFile::open(&cfg.env_file);

    let launcher = Launcher {
        orchestrator: &compose,
        probe: &TcpProbe,
        owners: &Lsof,
        env: &env,
        scan_attempts: cfg.scan_attempts,
    };
    let report = launcher.launch().await?;

    for line in report.summary_lines(&cfg.env_file) {
        println!("{line}");
    }
    Ok(())
}
