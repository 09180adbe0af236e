use crate::project::Project;
use colored::Colorize;
use gasoline_cloud::{DeployError, DeployOptions, DeployState, Deployer};
use gasoline_cloud_cloudflare::CloudflareConfig;
use std::sync::Arc;

pub async fn handle(project: &Project, max_concurrency: Option<usize>) -> anyhow::Result<()> {
    let max_concurrency = max_concurrency.or(project.loaded.config.max_concurrency);
    anyhow::ensure!(max_concurrency != Some(0), "--max-concurrency must be at least 1");

    // Credentials are checked before anything is discovered or provisioned
    let credentials = CloudflareConfig::from_env()?;

    println!("{} {}", "Project:".bold(), project.name().cyan());

    let resources = project.resources().await?;
    let backend = Arc::new(gasoline_cloud_cloudflare::registry(credentials, project.name()));
    let deployer = Deployer::new(
        project.snapshot_store(),
        backend,
        DeployOptions { max_concurrency },
    );

    let plan = deployer.plan(resources).await?;
    if !plan.has_changes() {
        println!("{}", "✓ No changes".green());
        return Ok(());
    }

    println!();
    super::print_plan(&plan);
    println!();

    match deployer.apply(plan).await {
        Ok(report) => {
            for (id, state) in &report.states {
                if let DeployState::Complete(_) = state {
                    println!("  {} {} {}", "✓".green(), state, id.as_str().cyan());
                }
            }
            println!();
            println!("{}", "✓ Deploy complete".green().bold());
            Ok(())
        }
        Err(DeployError::Aggregate { failed, canceled }) => {
            eprintln!();
            eprintln!("{}", "✗ Deploy failed".red().bold());
            for resource in &failed {
                eprintln!(
                    "  {} {}_FAILED {}: {}",
                    "✗".red(),
                    resource.action.label(),
                    resource.id.as_str().cyan(),
                    resource.error
                );
            }
            for id in &canceled {
                eprintln!("  {} CANCELED {}", "-".yellow(), id.as_str().cyan());
            }
            anyhow::bail!("{} failed, {} canceled", failed.len(), canceled.len())
        }
        Err(e) => Err(e.into()),
    }
}
