use clap::Parser;
use devstack::tasks::{failure_report, process_exit_code};
use devstack::{env, logging, run_with_affirmative_input, Config, ExitPolicy, ShellCommand};
use std::path::PathBuf;

/// Force-push the database schema, answering the migration tool's
/// confirmation prompts with "y".
#[derive(Parser, Debug)]
#[command(name = "db-push", version)]
struct Cli {
    /// Debug logging and live tool output
    #[arg(short, long)]
    verbose: bool,

    /// Env file loaded before running the tool (default: <project>/.env)
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.verbose);

    let start_dir = match std::env::current_dir() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };
    let cfg = Config::from_env(&start_dir, cli.env_file);

    match env::load_into_process(&cfg.env_file) {
        Ok(true) => tracing::debug!("loaded {}", cfg.env_file.display()),
        Ok(false) => tracing::debug!("no env file at {}", cfg.env_file.display()),
        Err(e) => tracing::warn!("{e}"),
    }

    let cmd = ShellCommand::new(&cfg.schema_push_cmd, &cfg.root)
        .policy(ExitPolicy::tolerate_broken_pipe())
        .echo(cli.verbose);

    println!("🔄 Pushing schema: {}", cfg.schema_push_cmd);
    let result = run_with_affirmative_input(&cmd).await;
    match &result {
        Ok(outcome) => {
            tracing::debug!(code = outcome.code, lines = outcome.output.len(), "schema push finished");
            println!("✅ Schema pushed");
        }
        Err(e) => {
            for line in failure_report(e, cli.verbose) {
                eprintln!("{line}");
            }
        }
    }
    std::process::exit(process_exit_code(&result));
}
