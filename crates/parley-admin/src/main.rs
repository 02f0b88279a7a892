use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use parley_admin::{
    Cli, Command, Configuration, find_schema, init_logging, lock_status, migrate,
    schema_search_dirs,
};
use parley_persistence::PersistenceService;
use tracing::{error, info};

enum Task {
    Migrate(PathBuf),
    LockStatus(String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli).context("Failed to load configuration")?;
    let _logging_guard = init_logging(&configuration.logging_config())?;

    // Resolve the schema before connecting so a missing file fails fast
    let task = match cli.command {
        Command::Migrate { schema } => {
            Task::Migrate(find_schema(schema.as_deref(), &schema_search_dirs())?)
        }
        Command::LockStatus { name } => Task::LockStatus(name),
    };

    let database_config = configuration
        .database_config()
        .context("db.url is not configured")?;
    let service = PersistenceService::connect(&database_config)
        .await
        .context("Failed to connect to the database")?
        .with_lock_defaults(configuration.lock_defaults());

    let result = run(task, &service, &configuration).await;

    if let Err(e) = service.close().await {
        error!(error = %e, "Failed to close database connections");
    }
    result
}

async fn run(
    task: Task,
    service: &PersistenceService,
    configuration: &Configuration,
) -> anyhow::Result<()> {
    match task {
        Task::Migrate(schema) => {
            let applied = migrate(service, &schema, configuration.migration_lock_timeout()).await?;
            info!(applied, schema = %schema.display(), "Migration complete");
        }
        Task::LockStatus(name) => {
            let status = lock_status(service, &name).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
