use crate::ContextError;
use regex::Regex;
use std::sync::OnceLock;

/// Reserved key holding the per-block nodes at flow level.
pub const ACTIVITY_BLOCKS_KEY: &str = "_activityBlocks";
/// Reserved key holding the per-activity nodes at block level.
pub const ACTIVITIES_KEY: &str = "_activities";

/// Framework metadata keys.
pub const STATUS_KEY: &str = "_status";
pub const ACTION_KEY: &str = "_action";
pub const RUN_ID_KEY: &str = "_runId";
pub const TYPE_KEY: &str = "_type";
pub const FLOW_RUN_ID_KEY: &str = "_flowRunId";

fn camel_case() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-zA-Z0-9]*$").expect("static regex is valid")
    })
}

pub fn is_reserved(key: &str) -> bool {
    key == ACTIVITY_BLOCKS_KEY || key == ACTIVITIES_KEY
}

/// Keys starting with `_` belong to the framework.
pub fn is_meta(key: &str) -> bool {
    key.starts_with('_')
}

/// Validates a key written by user code (outputs, inputs, listeners).
pub fn validate_user_key(key: &str) -> Result<(), ContextError> {
    if key.is_empty() {
        return Err(ContextError::InvalidKey {
            key: key.to_string(),
            reason: "key must not be empty".to_string(),
        });
    }
    if is_reserved(key) {
        return Err(ContextError::InvalidKey {
            key: key.to_string(),
            reason: "key is reserved".to_string(),
        });
    }
    if is_meta(key) {
        return Err(ContextError::InvalidKey {
            key: key.to_string(),
            reason: "keys starting with '_' are framework metadata".to_string(),
        });
    }
    Ok(())
}

/// Input keys additionally have to be camelCase.
pub fn validate_input_key(key: &str) -> Result<(), ContextError> {
    validate_user_key(key)?;
    if !camel_case().is_match(key) {
        return Err(ContextError::InvalidKey {
            key: key.to_string(),
            reason: "input keys must be camelCase".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_meta_key(key: &str) -> Result<(), ContextError> {
    if !is_meta(key) || is_reserved(key) {
        return Err(ContextError::InvalidKey {
            key: key.to_string(),
            reason: "metadata keys start with '_' and are not reserved"
                .to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_keys_rejected() {
        assert!(validate_user_key(ACTIVITY_BLOCKS_KEY).is_err());
        assert!(validate_user_key(ACTIVITIES_KEY).is_err());
        assert!(validate_user_key("").is_err());
        assert!(validate_user_key("_status").is_err());
        assert!(validate_user_key("max").is_ok());
    }

    #[test]
    fn test_input_keys_camel_case() {
        assert!(validate_input_key("maxValue").is_ok());
        assert!(validate_input_key("max_value").is_err());
        assert!(validate_input_key("MaxValue").is_err());
        assert!(validate_input_key("max2").is_ok());
    }

    #[test]
    fn test_meta_keys() {
        assert!(validate_meta_key(STATUS_KEY).is_ok());
        assert!(validate_meta_key("status").is_err());
        assert!(validate_meta_key(ACTIVITIES_KEY).is_err());
    }
}
