use anyhow::{Result, Context as AnyhowContext};
use std::fs;
use std::path::Path;
use crate::dsl::ProcessDefinition;
use crate::runtime::state::ProcessState;

pub fn load_process_from_yaml(file_path: impl AsRef<Path>) -> Result<ProcessDefinition> {
    let file_path = file_path.as_ref();
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read YAML file from {}", file_path.display()))?;

    let definition: ProcessDefinition = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize YAML content from {}", file_path.display()))?;

    Ok(definition)
}

pub fn load_state(file_path: impl AsRef<Path>) -> Result<ProcessState> {
    let file_path = file_path.as_ref();
    let json = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read state file from {}", file_path.display()))?;

    ProcessState::from_json(&json)
        .with_context(|| format!("Failed to deserialize process state from {}", file_path.display()))
}

pub fn save_state(file_path: impl AsRef<Path>, state: &ProcessState) -> Result<()> {
    let file_path = file_path.as_ref();
    let json = state.to_json().context("Failed to serialize process state")?;
    fs::write(file_path, json)
        .with_context(|| format!("Failed to write state file to {}", file_path.display()))
}
