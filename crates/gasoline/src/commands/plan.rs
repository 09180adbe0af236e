use crate::project::Project;
use colored::Colorize;
use gasoline_cloud::DeployPlan;

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    println!("{} {}", "Project:".bold(), project.name().cyan());

    let resources = project.resources().await?;
    let previous = project.snapshot_store().load().await?;
    let plan = DeployPlan::build(resources, previous)?;

    if !plan.has_changes() {
        println!("{}", "✓ No changes".green());
        return Ok(());
    }

    println!();
    super::print_plan(&plan);
    Ok(())
}
