//! `echelon doctor` — Diagnose configuration health.

use echelon_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Echelon Doctor");
    println!("==============");
    println!();

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ok: config file valid");
                println!("  ok: chat model is {}", config.chat_model.model);

                if config.has_api_key() {
                    println!("  ok: API key configured");
                } else if config.chat_model.provider == "ollama" {
                    println!("  ok: ollama backend needs no API key");
                } else {
                    println!("  warn: no API key configured — add api_key to config.toml");
                    issues += 1;
                }
            }
            Err(e) => {
                println!("  fail: config file invalid: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  fail: no config file — run `echelon init`");
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
