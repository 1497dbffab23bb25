use super::{Context, print_apply_result, print_plan, print_refresh};
use colored::Colorize;

pub async fn handle(ctx: &Context, yes: bool) -> anyhow::Result<()> {
    println!("{}", "Refreshing state...".blue());

    let reconciler = ctx.reconciler()?;
    let manager = ctx.state_manager();
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    let report = reconciler.refresh(&mut state).await?;
    print_refresh(&report);
    if !report.removed.is_empty() || !report.drifted.is_empty() {
        manager.save(&state).await?;
    }

    let plan = reconciler.plan(&ctx.config.keys, &state)?;
    print_plan(&plan);

    if !plan.has_changes {
        lock.release().await?;
        return Ok(());
    }

    if !yes {
        println!();
        println!("Run with {} to apply these changes.", "--yes".cyan());
        lock.release().await?;
        return Ok(());
    }

    println!();
    println!("{}", "Applying changes...".blue().bold());
    let result = reconciler.apply(&plan, &ctx.config.keys, &mut state).await?;
    manager.save(&state).await?;
    lock.release().await?;

    print_apply_result(&result);
    if !result.is_success() {
        anyhow::bail!(
            "{} of {} actions failed",
            result.failed.len(),
            result.failed.len() + result.succeeded.len()
        );
    }

    println!("{}", "✓ Apply complete".green().bold());
    Ok(())
}
