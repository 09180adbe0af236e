pub mod graph;
pub mod plan;
pub mod up;

use colored::{ColoredString, Colorize};
use gasoline_cloud::DeployPlan;
use gasoline_core::DiffState;

fn colored_state(state: DiffState) -> ColoredString {
    match state {
        DiffState::Created => state.as_str().green(),
        DiffState::Updated => state.as_str().yellow(),
        DiffState::Deleted => state.as_str().red(),
        DiffState::Unchanged => state.as_str().dimmed(),
    }
}

/// Print the plan as group -> depth -> resource
pub(crate) fn print_plan(plan: &DeployPlan) {
    for (group, depths) in plan.layout() {
        println!("{}", format!("Group {}", group).bold());
        for (depth, states) in depths.iter().rev() {
            println!("  depth {}", depth);
            for (id, state) in states {
                println!("    {} {}", colored_state(*state), id.as_str().cyan());
            }
        }
    }
    println!();
    println!("{}", plan.summary());
}
