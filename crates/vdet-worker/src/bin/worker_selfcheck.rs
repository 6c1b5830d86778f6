use std::path::Path;

use vdet_media::DetectorConfig;
use vdet_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with analytics_dir={}",
        config.analytics_dir.display()
    );
    ensure_writable_dir(&config.analytics_dir).await?;
    ensure_engine(&DetectorConfig::from_env())?;
    ensure_env_present(&["REDIS_URL", "GCP_PROJECT_ID", "S3_BUCKET_NAME"])?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_writable_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_engine(config: &DetectorConfig) -> anyhow::Result<()> {
    let path = which::which(&config.program)
        .map_err(|e| anyhow::anyhow!("detection engine '{}' not found: {}", config.program, e))?;
    println!("worker-selfcheck: engine at {}", path.display());

    if !Path::new(&config.model_path).exists() {
        println!(
            "worker-selfcheck: model {} not present locally, engine must resolve it",
            config.model_path
        );
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
