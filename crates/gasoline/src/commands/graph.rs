use crate::project::Project;
use colored::Colorize;
use gasoline_core::{DependencyGraph, dependency_map};

pub async fn handle(project: &Project) -> anyhow::Result<()> {
    let resources = project.resources().await?;
    let graph = DependencyGraph::new(dependency_map(&resources))?;

    if graph.is_empty() {
        println!("{}", "No resources found".yellow());
        return Ok(());
    }

    for (group, depths) in graph.group_to_depth_to_nodes() {
        println!("{}", format!("Group {}", group).bold());
        for (depth, ids) in depths.iter().rev() {
            println!("  depth {}", depth);
            for id in ids {
                let dependencies = graph
                    .dependencies(id)
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>();
                println!(
                    "    {} (in-degree {}){}",
                    id.as_str().cyan(),
                    graph.in_degree(id),
                    if dependencies.is_empty() {
                        String::new()
                    } else {
                        format!(" -> {}", dependencies.join(", "))
                    }
                );
            }
        }
    }
    Ok(())
}
