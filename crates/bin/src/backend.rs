//! Backend creation and persistence.

use std::path::PathBuf;

use ordinal::{
    Board,
    backend::{
        BackendImpl,
        database::{InMemory, Postgres, Sqlite},
    },
};

use crate::cli::{Backend, BackendConfig};

const SQLITE_FILE: &str = "ordinal.db";
const JSON_FILE: &str = "ordinal.json";

/// Redact credentials from a PostgreSQL connection URL for safe logging
pub fn redact_postgres_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut redacted = parsed.clone();
        if !parsed.username().is_empty() {
            let _ = redacted.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        redacted.to_string()
    } else {
        "postgres://***@<unparsable-url>".to_string()
    }
}

fn data_dir(config: &BackendConfig) -> PathBuf {
    config.data_dir.clone().unwrap_or_else(|| PathBuf::from("."))
}

/// Create the appropriate backend based on configuration
pub async fn create_backend(
    config: &BackendConfig,
) -> Result<Box<dyn BackendImpl>, Box<dyn std::error::Error>> {
    let data_dir = data_dir(config);

    match config.backend {
        Backend::Sqlite => {
            tokio::fs::create_dir_all(&data_dir).await?;
            let db_path = data_dir.join(SQLITE_FILE);
            tracing::info!(path = %db_path.display(), "Using SQLite backend");
            Ok(Box::new(Sqlite::open_sqlite(&db_path).await?))
        }
        Backend::Postgres => {
            let url = config
                .postgres_url
                .as_ref()
                .ok_or("PostgreSQL backend requires --postgres-url or ORDINAL_POSTGRES_URL")?;

            let display_url = redact_postgres_url(url);
            tracing::info!(url = %display_url, "Connecting to PostgreSQL backend");

            match Postgres::connect_postgres(url).await {
                Ok(backend) => Ok(Box::new(backend)),
                Err(e) => {
                    Err(format!("Failed to connect to PostgreSQL at {display_url}: {e}").into())
                }
            }
        }
        Backend::Inmemory => {
            let json_path = data_dir.join(JSON_FILE);
            tracing::info!(path = %json_path.display(), "Using in-memory backend");
            // A missing file starts empty; a corrupt one is an error.
            Ok(Box::new(InMemory::load_from_file(&json_path).await?))
        }
    }
}

/// Write the in-memory state back to disk. SQL backends persist on every
/// write, so this is a no-op for them.
pub async fn persist(board: &Board, config: &BackendConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Some(memory) = board.backend().as_any().downcast_ref::<InMemory>() else {
        return Ok(());
    };
    let data_dir = data_dir(config);
    tokio::fs::create_dir_all(&data_dir).await?;
    let json_path = data_dir.join(JSON_FILE);
    memory.save_to_file(&json_path).await?;
    tracing::debug!(path = %json_path.display(), "Saved in-memory state");
    Ok(())
}
