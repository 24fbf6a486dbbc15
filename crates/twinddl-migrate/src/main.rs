//! twinddl CLI
//!
//! Command-line tool for compiling schemas and managing migrations.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use twinddl_core::{Dialect, SchemaSnapshot};
use twinddl_migrate::config::DEFAULT_MIGRATIONS_DIR;
use twinddl_migrate::prelude::*;

/// One schema, PostgreSQL and Spanner DDL, managed migrations.
#[derive(Parser)]
#[command(name = "twinddl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Migrations directory.
    #[arg(long, env = "TWINDDL_MIGRATIONS_DIR", default_value = DEFAULT_MIGRATIONS_DIR, global = true)]
    migrations_dir: PathBuf,

    /// Baseline snapshot path [default: <migrations-dir>/schema.snapshot.json].
    #[arg(long, env = "TWINDDL_BASELINE", global = true)]
    baseline: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a schema snapshot into DDL.
    Ddl {
        /// Schema snapshot (JSON).
        #[arg(short, long)]
        schema: PathBuf,

        /// Target dialect (postgres or spanner).
        #[arg(short, long, env = "TWINDDL_DIALECT")]
        dialect: Dialect,

        /// Write the statements to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create, apply and revert migrations.
    Migrate {
        #[command(subcommand)]
        command: MigrateCommand,
    },
}

#[derive(Subcommand)]
enum MigrateCommand {
    /// Generate a migration from schema changes.
    Create {
        /// Migration name.
        name: String,

        /// Current schema snapshot (JSON).
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Apply pending migrations.
    Latest(TargetArgs),

    /// Revert the last applied migration.
    Down(TargetArgs),

    /// Show migration status.
    Status(TargetArgs),
}

#[derive(Args)]
struct TargetArgs {
    /// Target dialect (postgres or spanner).
    #[arg(short, long, env = "TWINDDL_DIALECT")]
    dialect: Dialect,

    /// Database URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Print the SQL against an empty target instead of executing it.
    #[arg(long)]
    dry_run: bool,
}

fn read_schema(path: &Path) -> anyhow::Result<SchemaSnapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    SchemaSnapshot::from_json(&json).with_context(|| format!("parsing schema {}", path.display()))
}

fn ddl(schema: &Path, dialect: Dialect, output: Option<&Path>) -> anyhow::Result<()> {
    let schema = read_schema(schema)?;
    let compiled = dialect.compiler().compile_schema(&schema)?;
    let script = compiled.to_script();

    match output {
        Some(path) => {
            std::fs::write(path, &script)?;
            info!(
                path = %path.display(),
                statements = compiled.statements().len(),
                "Wrote DDL"
            );
        }
        None => print!("{script}"),
    }
    Ok(())
}

async fn migrate<E: Executor>(
    command: &MigrateCommand,
    mut runner: MigrationRunner<E>,
) -> anyhow::Result<MigrationRunner<E>> {
    match command {
        MigrateCommand::Latest(_) => {
            let applied = runner.run_pending().await?;
            for name in &applied {
                info!(name = %name, "Applied");
            }
        }

        MigrateCommand::Down(_) => match runner.revert_last().await? {
            Some(name) => info!(name = %name, "Reverted"),
            None => info!("Nothing to revert."),
        },

        MigrateCommand::Status(_) => {
            let statuses = runner.status().await?;
            if statuses.is_empty() {
                info!("No migrations found.");
            } else {
                println!("\nMigrations ({}):", runner.dialect());
                println!("{:-<60}", "");
                for status in &statuses {
                    let mark = if status.is_applied() { "X" } else { " " };
                    let missing = if status.on_disk { "" } else { " (file missing)" };
                    match status.applied_at {
                        Some(at) => println!(
                            " [{mark}] {} ({}){missing}",
                            status.name,
                            at.format("%Y-%m-%d %H:%M:%S")
                        ),
                        None => println!(" [{mark}] {}{missing}", status.name),
                    }
                }
                println!();
            }
        }

        MigrateCommand::Create { .. } => unreachable!("create does not need a target"),
    }
    Ok(runner)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = MigrateConfig::new(&cli.migrations_dir);
    if let Some(baseline) = &cli.baseline {
        config = config.baseline_path(baseline);
    }

    match cli.command {
        Commands::Ddl {
            schema,
            dialect,
            output,
        } => ddl(&schema, dialect, output.as_deref())?,

        Commands::Migrate {
            command: MigrateCommand::Create { name, schema },
        } => {
            let current = read_schema(&schema)?;
            match MigrationWriter::new(config).create(&name, &current).await? {
                CreateOutcome::NoChanges => info!("No changes detected."),
                CreateOutcome::Created {
                    path,
                    actions,
                    diagnostics,
                } => info!(
                    path = %path.display(),
                    actions,
                    diagnostics,
                    "Created migration"
                ),
            }
        }

        Commands::Migrate { command } => {
            let (MigrateCommand::Latest(target)
            | MigrateCommand::Down(target)
            | MigrateCommand::Status(target)) = &command
            else {
                unreachable!("create is handled above");
            };

            if target.dry_run {
                info!(dialect = %target.dialect, "Dry run against an empty target");
                let runner =
                    MigrationRunner::new(RecordingExecutor::new(), target.dialect, &config.migrations_dir);
                let runner = migrate(&command, runner).await?;
                for sql in runner.executor().schema_statements() {
                    println!("{sql};");
                }
                return Ok(());
            }

            let Some(url) = &target.database_url else {
                bail!("DATABASE_URL (or --database-url) is required");
            };
            match target.dialect {
                Dialect::Postgres => {
                    let mut executor = PgExecutor::new(url.as_str());
                    executor.connect().await?;
                    let runner = MigrationRunner::new(executor, target.dialect, &config.migrations_dir);
                    let mut runner = migrate(&command, runner).await?;
                    runner.executor_mut().disconnect().await?;
                }
                Dialect::Spanner => bail!(
                    "no Spanner executor is bundled; use --dry-run or embed MigrationRunner with your own Executor"
                ),
            }
        }
    }

    Ok(())
}
