//! `echelon serve` — Start the HTTP gateway server.

use echelon_config::AppConfig;

pub async fn run(
    host_override: Option<String>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(host) = host_override {
        config.gateway.host = host;
    }
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Echelon Gateway");
    println!("  Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  Basic auth: {}",
        if config.gateway.auth_username.is_some() && config.gateway.auth_password.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    echelon_gateway::start(config).await?;

    Ok(())
}
