//! CLI entry point.
//!
//! Loads `.env`, installs logging, resolves settings and dispatches to the
//! command handlers. Errors are printed once and mapped to an exit code.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use murmur_cli::bootstrap::{SettingsOverrides, parse_assignments};
use murmur_cli::{Cli, CliError, Commands, bootstrap, handlers, resolve_settings};
use murmur_core::ParamsPatch;
use murmur_core::settings::env_vars;

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads `env = ...` defaults
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}

/// Log to stderr so stdout carries only generated text.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let env = |key: &str| std::env::var(key).ok();

    match command {
        Commands::Run(args) => {
            let overrides = SettingsOverrides::for_run(cli.server_url, &args);
            let settings = resolve_settings(&overrides, env).map_err(CliError::from)?;
            let initial = parse_assignments(&args.set)?;
            let context_configured =
                args.context.is_some() || env(env_vars::INITIAL_CONTEXT).is_some();
            let ctx = bootstrap(settings, &initial)?;
            handlers::run::execute(&ctx, &args, context_configured).await?;
        }
        Commands::Contexts => {
            let ctx = connect(cli.server_url, env)?;
            handlers::contexts::list(&ctx).await?;
        }
        Commands::UseContext { index } => {
            let ctx = connect(cli.server_url, env)?;
            handlers::contexts::use_context(&ctx, index).await?;
        }
        Commands::TogglePause => {
            let ctx = connect(cli.server_url, env)?;
            handlers::pause::execute(&ctx).await?;
        }
        Commands::Params { set } => {
            let ctx = connect(cli.server_url, env)?;
            handlers::params::execute(&ctx, &set).await?;
        }
    }

    Ok(())
}

fn connect<F>(server_url: Option<String>, env: F) -> Result<murmur_cli::CliContext, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let settings = resolve_settings(&SettingsOverrides::global(server_url), env)?;
    bootstrap(settings, &ParamsPatch::default())
}
