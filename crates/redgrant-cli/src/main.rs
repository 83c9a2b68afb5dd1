use facet::Facet;
use facet_args as args;
use owo_colors::OwoColorize;
use redgrant::{Change, GrantSpec, GrantState};
use tracing_subscriber::EnvFilter;

mod config;
mod reconcile;
mod state;

use reconcile::{Action, BoxError, Outcome, Planned};

/// Declarative grants for Amazon Redshift.
#[derive(Facet, Debug)]
struct Cli {
    /// Show version information
    #[facet(args::named, args::short = 'V')]
    version: bool,

    /// Command to run
    #[facet(default, args::subcommand)]
    command: Option<Commands>,
}

/// Available commands
#[derive(Facet, Debug)]
#[repr(u8)]
enum Commands {
    /// Show what apply would change, including drift
    Plan {
        /// Database connection URL
        #[facet(default, args::named)]
        database_url: Option<String>,
    },
    /// Converge the database to the configured grants
    Apply {
        /// Database connection URL
        #[facet(default, args::named)]
        database_url: Option<String>,
    },
    /// Revoke every grant recorded in the state file
    Destroy {
        /// Database connection URL
        #[facet(default, args::named)]
        database_url: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plan,
    Apply,
    Destroy,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args_ref: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

    let result: Result<Cli, _> = args::from_slice(&args_ref);

    match result {
        Ok(cli) => {
            init_tracing();
            if let Err(err) = run(cli).await {
                eprintln!("{} {}", "error:".red().bold(), err);
                std::process::exit(1);
            }
        }
        Err(err) if err.is_help_request() => {
            print!("{}", err.help_text().unwrap_or(""));
        }
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr so plan output on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("redgrant=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    if cli.version {
        println!("redgrant {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let (mode, database_url) = match cli.command {
        Some(Commands::Plan { database_url }) => (Mode::Plan, database_url),
        Some(Commands::Apply { database_url }) => (Mode::Apply, database_url),
        Some(Commands::Destroy { database_url }) => (Mode::Destroy, database_url),
        None => {
            let config = args::HelpConfig {
                program_name: Some("redgrant".to_string()),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
                ..Default::default()
            };
            print!("{}", args::generate_help::<Cli>(&config));
            return Ok(());
        }
    };

    let loaded = config::load()?;
    let url = loaded.database_url(database_url)?;
    let state_path = loaded.state_path();
    let mut state_file = state::load(&state_path)?;

    let declared = declared_grants(&loaded.config)?;
    let stored = stored_grants(&state_file)?;

    println!("{} {}", "database:".dimmed(), mask_password(&url));
    let pool = connect(&url, loaded.config.database.pool_size)?;

    let planned = match mode {
        Mode::Plan | Mode::Apply => {
            let planned = reconcile::changes(&declared, &stored)?;
            reconcile::check_drift(&pool, planned).await?
        }
        Mode::Destroy => reconcile::destroy_all(&stored),
    };

    print_plan(&planned);
    if mode == Mode::Plan || planned.iter().all(|p| p.action.is_noop()) {
        return Ok(());
    }

    let results = reconcile::execute(&pool, &planned).await;
    let mut failed = 0;
    for (p, result) in planned.iter().zip(&results) {
        match result {
            Ok(outcome) => {
                print_outcome(&p.name, outcome);
                reconcile::record(&mut state_file, &p.name, outcome);
            }
            Err(err) => {
                failed += 1;
                eprintln!("{} {}: {}", "failed".red().bold(), p.name, err);
            }
        }
    }

    state::save(&state_path, &state_file)?;

    if failed > 0 {
        return Err(format!("{} of {} grants failed", failed, planned.len()).into());
    }
    Ok(())
}

fn declared_grants(config: &config::Config) -> Result<Vec<(String, GrantSpec)>, BoxError> {
    config
        .grants
        .iter()
        .map(|(name, decl)| {
            let spec = decl
                .to_spec()
                .map_err(|e| format!("grant `{}`: {}", name, e))?;
            Ok((name.clone(), spec))
        })
        .collect()
}

fn stored_grants(state: &redgrant_config::StateFile) -> Result<Vec<(String, GrantState)>, BoxError> {
    state
        .grants
        .iter()
        .map(|stored| {
            let grant = stored
                .to_state()
                .map_err(|e| format!("stored grant `{}`: {}", stored.name, e))?;
            Ok((stored.name.clone(), grant))
        })
        .collect()
}

fn connect(url: &str, pool_size: Option<usize>) -> Result<deadpool_postgres::Pool, BoxError> {
    let mut config = deadpool_postgres::Config::new();
    config.url = Some(url.to_string());
    if let Some(size) = pool_size {
        config.pool = Some(deadpool_postgres::PoolConfig::new(size));
    }
    let pool = config.create_pool(
        Some(deadpool_postgres::Runtime::Tokio1),
        tokio_postgres::NoTls,
    )?;
    Ok(pool)
}

fn print_plan(planned: &[Planned]) {
    let pending = planned.iter().filter(|p| !p.action.is_noop()).count();
    if pending == 0 {
        println!("{}", "No changes. Grants match the configuration.".green());
        return;
    }

    for p in planned {
        match &p.action {
            Action::InSync(_) => {}
            Action::Change(change @ Change::Create(_)) => {
                println!("{} {}", format!("{}", change).green(), p.name.bold())
            }
            Action::Change(change @ Change::Update { .. }) => {
                println!("{} {}", format!("{}", change).yellow(), p.name.bold())
            }
            Action::Change(change @ Change::Replace { .. }) => {
                println!("{} {}", format!("{}", change).magenta(), p.name.bold())
            }
            Action::Change(change @ Change::Delete(_)) => {
                println!("{} {}", format!("{}", change).red(), p.name.bold())
            }
            Action::Drift { state, outcome } => {
                println!(
                    "{} {} {}",
                    "~ drift".yellow(),
                    state.identity,
                    p.name.bold()
                );
                for line in outcome.plan.to_string().lines() {
                    println!("    {}", line);
                }
            }
            Action::Absent(state) => {
                println!(
                    "{} {} {} (target objects are gone)",
                    "+ recreate".green(),
                    state.identity,
                    p.name.bold()
                );
            }
        }
    }
    println!();
    println!("{} grant(s) to change.", pending);
}

fn print_outcome(name: &str, outcome: &Outcome) {
    let statements = match outcome {
        Outcome::Unchanged => return,
        Outcome::Recorded { statements, .. } => {
            println!("{} {}", "applied".green().bold(), name);
            statements
        }
        Outcome::Removed { statements } => {
            println!("{} {}", "removed".red().bold(), name);
            statements
        }
    };
    for sql in statements {
        println!("    {}", sql.dimmed());
    }
}

/// Mask password in database URL for display
fn mask_password(url: &str) -> String {
    // Simple masking: replace password between :// and @
    if let Some(start) = url.find("://")
        && let Some(at) = url.rfind('@')
        && at > start
    {
        let prefix = &url[..start + 3];
        let suffix = &url[at..];
        if let Some(colon) = url[start + 3..at].find(':') {
            let user = &url[start + 3..start + 3 + colon];
            return format!("{}{}:***{}", prefix, user, suffix);
        }
    }
    url.to_string()
}
