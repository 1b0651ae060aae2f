//! Create a new Storyreel project.

use storyreel_common::AppConfig;
use storyreel_project_model::Project;

use super::{commit, open_store};

pub fn run(config: &AppConfig, title: String, description: String) -> anyhow::Result<()> {
    let store = open_store(config);
    let mut project = Project::new(title);
    project.description = description;
    commit(&store, &mut project)?;

    println!("Project created successfully:");
    println!("  ID: {}", project.id);
    println!("  Title: {}", project.title);
    println!("  Store: {}", store.root().display());

    Ok(())
}
