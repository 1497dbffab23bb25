use super::Context;
use colored::Colorize;
use keyflow_cloud::Declared;

pub fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "Validating configuration...".blue());
    println!("Config file: {}", ctx.config_path.display().to_string().cyan());

    let mut errors = Vec::new();
    for (name, key) in &ctx.config.keys {
        if let Err(e) = key.validate() {
            errors.push(format!("{}: {}", name, e));
        }
    }

    if !errors.is_empty() {
        eprintln!();
        eprintln!("{}", "✗ Configuration error".red().bold());
        for error in &errors {
            eprintln!("  {}", error);
        }
        anyhow::bail!("{} invalid key(s)", errors.len());
    }

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    let provider = &ctx.config.provider;
    println!(
        "  Provider: fusionauth ({})",
        provider.host.as_deref().unwrap_or("host from FUSIONAUTH_HOST")
    );
    println!(
        "  Convergence: timeout {}s, interval {}s, parallelism {}",
        ctx.poll.timeout.as_secs(),
        ctx.poll.interval.as_secs(),
        provider.parallelism
    );
    println!("  Keys: {}", ctx.config.keys.len());
    for (name, key) in &ctx.config.keys {
        let length = key
            .effective_length()
            .map(|l| format!(", {} bits", l))
            .unwrap_or_default();
        let id = key
            .key_id
            .as_deref()
            .map(|id| format!(", id {}", id))
            .unwrap_or_default();
        println!("    - {} ({}{}{})", name.cyan(), key.algorithm, length, id);
    }

    Ok(())
}
