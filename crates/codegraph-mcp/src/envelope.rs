use codegraph_core::CodeGraphError;
use serde::Serialize;
use serde_json::Value;

/// Response profile selecting the token budget and truncation caps applied
/// by the shaper (§4.6.5). `compact` is the transport default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Compact,
    Balanced,
    Debug,
}

impl Profile {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("balanced") => Self::Balanced,
            Some("debug") => Self::Debug,
            _ => Self::Compact,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Balanced => "balanced",
            Self::Debug => "debug",
        }
    }

    fn budget(&self) -> Option<usize> {
        match self {
            Self::Compact => Some(300),
            Self::Balanced => Some(1200),
            Self::Debug => None,
        }
    }

    fn string_cap(&self) -> Option<usize> {
        match self {
            Self::Compact => Some(1_200),
            Self::Balanced => Some(4_000),
            Self::Debug => None,
        }
    }

    fn collection_cap(&self) -> Option<usize> {
        match self {
            Self::Compact => Some(20),
            Self::Balanced => Some(100),
            Self::Debug => None,
        }
    }

    fn depth_cap(&self) -> usize {
        match self {
            Self::Compact => 6,
            Self::Balanced => 20,
            Self::Debug => 20,
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::Compact
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldPriority {
    Low,
    Medium,
    High,
    Required,
}

/// A tool's declarative field-priority schema: top-level key -> priority.
/// Keys absent from the schema default to `High` — safer than silently
/// dropping an undeclared field as `Low`.
pub type ToolSchema = &'static [(&'static str, FieldPriority)];

pub fn estimate_tokens(value: &Value) -> usize {
    let encoded = serde_json::to_string(value).unwrap_or_default();
    encoded.len().div_ceil(4)
}

fn truncate_value(value: &Value, profile: Profile, depth: usize) -> Value {
    match value {
        Value::String(s) => match profile.string_cap() {
            Some(cap) if s.chars().count() > cap => {
                let head: String = s.chars().take(cap).collect();
                Value::String(format!("{head}…[truncated]"))
            }
            _ => value.clone(),
        },
        Value::Array(items) => {
            if depth >= profile.depth_cap() {
                return Value::String("…[max depth]".into());
            }
            let cap = profile.collection_cap().unwrap_or(items.len());
            let mut out: Vec<Value> = items
                .iter()
                .take(cap)
                .map(|v| truncate_value(v, profile, depth + 1))
                .collect();
            if items.len() > cap {
                out.push(Value::String(format!("…{} more items", items.len() - cap)));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            if depth >= profile.depth_cap() {
                return Value::String("…[max depth]".into());
            }
            let cap = profile.collection_cap().unwrap_or(map.len());
            let mut out = serde_json::Map::new();
            for (k, v) in map.iter().take(cap) {
                out.insert(k.clone(), truncate_value(v, profile, depth + 1));
            }
            if map.len() > cap {
                out.insert("…omitted".into(), Value::String(format!("{} more keys", map.len() - cap)));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Applies depth/string/collection truncation, then drops top-level object
/// fields in priority order `low -> medium -> high` (never `required`) until
/// the estimate fits the profile budget or only required fields remain
/// (§4.6.5).
pub fn shape(data: Value, schema: ToolSchema, profile: Profile) -> (Value, usize) {
    let truncated = truncate_value(&data, profile, 0);

    let Some(budget) = profile.budget() else {
        let tokens = estimate_tokens(&truncated);
        return (truncated, tokens);
    };

    let Value::Object(mut map) = truncated else {
        let tokens = estimate_tokens(&truncated);
        return (truncated, tokens);
    };

    let priority_of = |key: &str| -> FieldPriority {
        schema
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, p)| *p)
            .unwrap_or(FieldPriority::High)
    };

    for tier in [FieldPriority::Low, FieldPriority::Medium, FieldPriority::High] {
        if estimate_tokens(&Value::Object(map.clone())) <= budget {
            break;
        }
        let droppable: Vec<String> = map.keys().filter(|k| priority_of(k) == tier).cloned().collect();
        for key in droppable {
            if estimate_tokens(&Value::Object(map.clone())) <= budget {
                break;
            }
            map.remove(&key);
        }
    }

    let shaped = Value::Object(map);
    let tokens = estimate_tokens(&shaped);
    (shaped, tokens)
}

/// The uniform tool-call response envelope (§4.6, §6.1).
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub ok: bool,
    pub profile: String,
    pub summary: String,
    pub data: Value,
    #[serde(rename = "_tokenEstimate")]
    pub token_estimate: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "errorCode")]
    pub error_code: Option<String>,
}

impl Envelope {
    pub fn success(profile: Profile, summary: impl Into<String>, data: Value, schema: ToolSchema) -> Self {
        Self::success_with_hint(profile, summary, data, schema, None)
    }

    pub fn success_with_hint(
        profile: Profile,
        summary: impl Into<String>,
        data: Value,
        schema: ToolSchema,
        hint: Option<String>,
    ) -> Self {
        let (shaped, tokens) = shape(data, schema, profile);
        Self {
            ok: true,
            profile: profile.name().into(),
            summary: summary.into(),
            data: shaped,
            token_estimate: tokens,
            hint,
            error_code: None,
        }
    }

    pub fn error(profile: Profile, error: &CodeGraphError) -> Self {
        Self {
            ok: false,
            profile: profile.name().into(),
            summary: error.to_string(),
            data: Value::Null,
            token_estimate: 0,
            hint: Some(error.hint()),
            error_code: Some(error.code().into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: ToolSchema = &[
        ("intent", FieldPriority::Required),
        ("projectId", FieldPriority::Required),
        ("results", FieldPriority::Required),
        ("count", FieldPriority::High),
        ("workspaceRoot", FieldPriority::Low),
    ];

    #[test]
    fn drops_low_before_high_and_keeps_required() {
        let data = json!({
            "intent": "structure",
            "projectId": "ab12",
            "results": ["a"],
            "count": 1,
            "workspaceRoot": "/very/long/path/that/pushes/the/estimate/over/budget/repeated/a/lot/of/times/to/force/a/drop",
        });
        let (shaped, tokens) = shape(data, SCHEMA, Profile::Compact);
        let obj = shaped.as_object().unwrap();
        assert!(obj.contains_key("intent"));
        assert!(obj.contains_key("results"));
        assert!(tokens <= 300 || !obj.contains_key("workspaceRoot"));
    }

    #[test]
    fn debug_profile_never_truncates_strings() {
        let long = "x".repeat(10_000);
        let data = json!({"intent": long});
        let (shaped, _) = shape(data, &[], Profile::Debug);
        assert_eq!(shaped["intent"].as_str().unwrap().len(), 10_000);
    }

    #[test]
    fn array_past_cap_gets_trailing_marker() {
        let items: Vec<i32> = (0..30).collect();
        let data = json!({"results": items});
        let (shaped, _) = shape(data, &[("results", FieldPriority::Required)], Profile::Compact);
        let arr = shaped["results"].as_array().unwrap();
        assert_eq!(arr.len(), 21);
        assert!(arr.last().unwrap().as_str().unwrap().contains("more items"));
    }
}
