use serde_json::{json, Value};

/// The single source of truth for a freshly created session's config.
///
/// `ensure` never writes partial defaults to existing rows — this function
/// is only consulted when a session does not yet exist.
pub fn default_session_config() -> Value {
    json!({
        "model": "reeflow-default",
        "temperature": 0.7,
        "max_tokens": 4096,
        "system_prompt": "You are a helpful aquaculture operations assistant.",
        "rag": {
            "collection_name": "aquaculture-default",
            "topk_single": 5,
            "topk_multi": 3,
        },
        "mode": "single",
        // Whether a needs_expert turn forwards expert chunks directly to
        // the client or buffers the expert answer and resynthesizes from it.
        "expert_stream_policy": "synthesize_from_expert",
    })
}

/// Recursively merge `patch` into `base`, recognized keys only.
///
/// Object values merge key-by-key; any other JSON value (including arrays)
/// in `patch` replaces the corresponding value in `base` wholesale. Keys
/// present only in `patch` are added. `base` is mutated in place.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}
