use super::Context;
use colored::Colorize;
use keyflow_cloud::PlanDecision;

pub async fn handle(ctx: &Context, name: &str, id: &str) -> anyhow::Result<()> {
    let declared = ctx.config.keys.get(name).ok_or_else(|| {
        anyhow::anyhow!(
            "key {:?} is not declared in {}; add a key block before importing",
            name,
            ctx.config_path.display()
        )
    })?;

    println!("{}", format!("Importing {} as {}...", id, name).blue());

    let reconciler = ctx.reconciler()?;
    let manager = ctx.state_manager();
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    let tracked = reconciler.import(name, id, &mut state).await?;
    manager.save(&state).await?;
    lock.release().await?;

    let key = &tracked.attributes;
    println!("{}", "✓ Imported".green().bold());
    println!("  name:      {}", key.name);
    println!("  algorithm: {}", key.algorithm);
    if let Some(length) = key.length {
        println!("  length:    {}", length);
    }

    match reconciler.manager().plan(&tracked, declared)? {
        PlanDecision::NoOp => {
            println!("  Matches the declared configuration.");
        }
        decision => {
            println!(
                "  {} next apply will {} ({})",
                "!".yellow(),
                decision.action_type(),
                decision.fields().join(", ")
            );
        }
    }
    Ok(())
}
