use super::{Context, print_plan, print_refresh};
use colored::Colorize;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "Refreshing state...".blue());

    let reconciler = ctx.reconciler()?;
    let mut state = ctx.state_manager().load().await?;

    // Refreshed attributes are only used for planning; plan never writes state
    let report = reconciler.refresh(&mut state).await?;
    print_refresh(&report);

    let plan = reconciler.plan(&ctx.config.keys, &state)?;
    print_plan(&plan);
    Ok(())
}
