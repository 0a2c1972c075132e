//! 运行结束后写入的两个文件：上下文快照与 skip-with-outputs 流程配置

use anyhow::{Context, Result};
use blockflow_context::{ContextStore, Scope};
use blockflow_core::{BlockState, Group, Mode, Status};
use blockflow_yaml::{augment_with_outputs, FlowConfiguration, FlowLoader};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONTEXT_DIR: &str = "context";
pub const SKIP_WITH_OUTPUTS_DIR: &str = "skip_with_outputs";

/// `<MODE>_<blockId>_<STATUS>_unmodified.json`
pub fn context_file_name(mode: Mode, block_id: &str, status: Status) -> String {
    format!("{mode}_{block_id}_{status}_unmodified.json")
}

pub fn skip_with_outputs_file_name(timestamp: chrono::DateTime<chrono::Local>) -> String {
    format!(
        "skip-with-outputs-flow-config-{}.yml",
        timestamp.format("%Y%m%d%H%M%S%3f")
    )
}

/// 将完整上下文写为 JSON
pub fn write_context(
    output_dir: &Path,
    mode: Mode,
    block_id: &str,
    status: Status,
    store: &ContextStore,
) -> Result<PathBuf> {
    let dir = output_dir.join(CONTEXT_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory: {dir:?}"))?;

    let path = dir.join(context_file_name(mode, block_id, status));
    let content = serde_json::to_string_pretty(&store.to_value())
        .with_context(|| "Failed to serialize context")?;
    fs::write(&path, content).with_context(|| format!("Failed to write context file: {path:?}"))?;

    tracing::debug!(path = %path.display(), "context written");
    Ok(path)
}

/// Outputs of the successful before-block, main and after-block activities,
/// keyed by activity id.
pub fn collect_outputs(
    store: &ContextStore,
    state: &BlockState,
) -> HashMap<String, Map<String, Value>> {
    state
        .activities()
        .iter()
        .filter(|activity| activity.status == Status::Success)
        .filter(|activity| {
            matches!(
                activity.group,
                Group::BeforeBlock | Group::MainActivity | Group::AfterBlock
            )
        })
        .map(|activity| {
            let scope = Scope::activity(&activity.block_id, &activity.id);
            (activity.id.clone(), store.user_values(&scope))
        })
        .collect()
}

/// 写出附带本次输出的流程配置，供下次运行重放
pub fn write_skip_with_outputs(
    output_dir: &Path,
    flow: &FlowConfiguration,
    block_id: &str,
    outputs: &HashMap<String, Map<String, Value>>,
) -> Result<PathBuf> {
    let augmented = augment_with_outputs(flow, block_id, outputs)?;
    let path = output_dir
        .join(SKIP_WITH_OUTPUTS_DIR)
        .join(skip_with_outputs_file_name(chrono::Local::now()));
    FlowLoader::save_to_yaml(&augmented, &path)?;

    tracing::debug!(path = %path.display(), "skip-with-outputs configuration written");
    Ok(path)
}
