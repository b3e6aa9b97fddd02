use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use luckybox::repositories::users::{MemoryUserRepository, PgUserRepository, UserStore};
use luckybox::services;
use luckybox::settings::{Settings, StorageBackend};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "luckybox.toml")]
    config: String,
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs).expect("Failed to initialize logging.");
    let mut settings = Settings::load(&args.config).expect("Could not load settings.");
    if let Some(listen) = args.listen {
        settings.server.listen = listen;
    }

    let store: Arc<dyn UserStore> = match settings.storage.backend {
        StorageBackend::Postgres => {
            let conn = PgPoolOptions::new()
                .max_connections(settings.postgres.max_connections)
                .connect(&settings.postgres.url)
                .await
                .expect("Could not connect to database.");
            let repository = PgUserRepository::new(conn);
            repository
                .migrate()
                .await
                .expect("Could not apply database migrations.");
            Arc::new(repository)
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage; records are lost on restart.");
            Arc::new(MemoryUserRepository::new())
        }
    };

    log::info!("Starting LuckyBoxes services.");
    services::start_services(store, settings).await
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
