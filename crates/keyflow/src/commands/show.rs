use super::Context;
use colored::Colorize;
use keyflow_cloud::LifecycleStatus;
use keyflow_fusionauth::SigningKey;
use keyflow_fusionauth::key::RESOURCE_TYPE;

pub async fn handle(ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.state_manager();
    let state = manager.load().await?;
    let names = state.names_of_type(RESOURCE_TYPE);

    if names.is_empty() {
        println!("{}", "No keys tracked.".yellow());
    } else {
        println!("{}", format!("Tracked keys ({}):", names.len()).bold());
        for name in &names {
            let Some(tracked) = state.tracked::<SigningKey>(name)? else {
                continue;
            };
            let key = &tracked.attributes;
            let length = key
                .length
                .map(|l| format!(" {} bits", l))
                .unwrap_or_default();
            println!(
                "  {} {} [{}{}] {}",
                name.cyan(),
                tracked.id,
                key.algorithm,
                length,
                tracked.status
            );
            println!("      name: {}, updated {}", key.name, tracked.updated_at);
            if !tracked.status.is_terminal() {
                println!(
                    "      {}",
                    format!("{}: not settled, run refresh or apply", tracked.status).yellow()
                );
            }
        }
    }

    let pending: Vec<_> = ctx
        .config
        .keys
        .keys()
        .filter(|name| !names.contains(*name))
        .collect();
    if !pending.is_empty() {
        println!();
        println!("Declared but not created:");
        for name in pending {
            println!("  {} {} {}", "+".green(), name, LifecycleStatus::Planned);
        }
    }
    Ok(())
}
