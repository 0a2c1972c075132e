use crate::ContextError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Storage a context tree can be synced with.
pub trait RemoteContext: Send + Sync {
    /// Loads the stored tree for a flow run, `None` when nothing is stored.
    fn load(
        &self,
        flow_run_id: &str,
    ) -> Result<Option<Map<String, Value>>, ContextError>;

    /// Replaces the stored tree for a flow run.
    fn store(
        &self,
        flow_run_id: &str,
        root: &Map<String, Value>,
    ) -> Result<(), ContextError>;
}

/// Process-local backend, mostly useful in tests.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    runs: Mutex<HashMap<String, Map<String, Value>>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RemoteContext for InMemoryRemote {
    fn load(
        &self,
        flow_run_id: &str,
    ) -> Result<Option<Map<String, Value>>, ContextError> {
        let runs = self
            .runs
            .lock()
            .map_err(|e| ContextError::Remote(e.to_string()))?;
        Ok(runs.get(flow_run_id).cloned())
    }

    fn store(
        &self,
        flow_run_id: &str,
        root: &Map<String, Value>,
    ) -> Result<(), ContextError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|e| ContextError::Remote(e.to_string()))?;
        runs.insert(flow_run_id.to_string(), root.clone());
        Ok(())
    }
}

/// Keeps one `<flowRunId>.json` file per flow run in a directory.
#[derive(Debug, Clone)]
pub struct JsonDirRemote {
    dir: PathBuf,
}

impl JsonDirRemote {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, flow_run_id: &str) -> PathBuf {
        self.dir.join(format!("{flow_run_id}.json"))
    }
}

impl RemoteContext for JsonDirRemote {
    fn load(
        &self,
        flow_run_id: &str,
    ) -> Result<Option<Map<String, Value>>, ContextError> {
        let path = self.path(flow_run_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| {
            ContextError::Remote(format!("failed to read {path:?}: {e}"))
        })?;
        match serde_json::from_str(&content) {
            Ok(Value::Object(root)) => Ok(Some(root)),
            Ok(_) => Err(ContextError::Malformed(format!(
                "{path:?} does not hold a JSON object"
            ))),
            Err(e) => Err(ContextError::Malformed(format!("{path:?}: {e}"))),
        }
    }

    fn store(
        &self,
        flow_run_id: &str,
        root: &Map<String, Value>,
    ) -> Result<(), ContextError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ContextError::Remote(format!("failed to create {:?}: {e}", self.dir))
        })?;
        let path = self.path(flow_run_id);
        let content = serde_json::to_string_pretty(root)
            .map_err(|e| ContextError::Remote(e.to_string()))?;
        fs::write(&path, content).map_err(|e| {
            ContextError::Remote(format!("failed to write {path:?}: {e}"))
        })
    }
}
