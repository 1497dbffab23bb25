use super::{Context, print_apply_result, print_plan};
use colored::Colorize;

pub async fn handle(ctx: &Context, name: Option<String>, yes: bool) -> anyhow::Result<()> {
    let names: Vec<String> = name.into_iter().collect();

    let reconciler = ctx.reconciler()?;
    let manager = ctx.state_manager();
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    let plan = reconciler.plan_destroy(&names, &state)?;
    if plan.actions.is_empty() {
        println!("{}", "Nothing to destroy.".green());
        lock.release().await?;
        return Ok(());
    }
    print_plan(&plan);

    if !yes {
        println!();
        println!(
            "{}",
            "⚠ Warning: destroyed signing keys cannot be recovered"
                .red()
                .bold()
        );
        println!("  Tokens signed by these keys will no longer verify. Pass --yes to proceed.");
        lock.release().await?;
        return Ok(());
    }

    println!();
    println!("{}", "Destroying...".yellow().bold());
    let result = reconciler.destroy(&names, &mut state).await?;
    manager.save(&state).await?;
    lock.release().await?;

    print_apply_result(&result);
    if !result.is_success() {
        anyhow::bail!("{} key(s) could not be destroyed", result.failed.len());
    }
    Ok(())
}
