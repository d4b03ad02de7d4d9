use anyhow::{Result, bail};

use crate::core::AppConfig;
use crate::gateway::{BackendGateway, HealthStatus, HttpGateway};

pub async fn run(config: &AppConfig) -> Result<()> {
    let gateway = HttpGateway::new(&config.api_base_url, config.request_timeout)?;
    match gateway.check_health().await {
        HealthStatus::Healthy => {
            println!("Backend at {} is healthy", config.api_base_url);
            Ok(())
        }
        HealthStatus::Unhealthy => bail!("Backend at {} is unreachable", config.api_base_url),
    }
}
