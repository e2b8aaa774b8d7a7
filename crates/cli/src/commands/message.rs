//! `echelon message` — One-shot message through the agent chain.

use echelon_config::AppConfig;
use echelon_engine::ContextRegistry;
use std::sync::Arc;

pub async fn run(
    text: String,
    context_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let runtime = Arc::new(echelon_gateway::build_runtime(&config)?);

    let registry = ContextRegistry::new();
    let context = registry.create(runtime, context_id, None)?;

    let task = context.communicate(text, 1);
    let response = task.result().await?;

    println!("{response}");
    Ok(())
}
