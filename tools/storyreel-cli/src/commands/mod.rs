//! Subcommand implementations.

use anyhow::Context;
use storyreel_common::AppConfig;
use storyreel_project_model::{load_project, save_project, FileProjectStore, Project};

pub mod edit;
pub mod export;
pub mod import;
pub mod info;
pub mod init;
pub mod play;

/// Store rooted at the configured projects directory.
pub fn open_store(config: &AppConfig) -> FileProjectStore {
    FileProjectStore::new(&config.projects_dir)
}

/// Load a stored project, failing when the key is unknown.
pub fn load(store: &FileProjectStore, key: &str) -> anyhow::Result<Project> {
    load_project(store, key)
        .with_context(|| format!("Failed to load project {key}"))?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No project {key} in {} (see `storyreel list`)",
                store.root().display()
            )
        })
}

/// Bump the modification time and write the project back.
pub fn commit(store: &FileProjectStore, project: &mut Project) -> anyhow::Result<()> {
    project.touch();
    save_project(store, project).with_context(|| format!("Failed to save project {}", project.id))
}
