use crate::chain::{ChainResolver, QuestId};
use crate::error::{QuestchainError, Result};
use crate::mcp::types::{Tool, ToolsCallResult};
use crate::zone::{validate_zone_id, MapId};
use serde::Serialize;
use serde_json::{json, Value};

/// Get all tool definitions for tools/list
pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "find_quest_chains_in_zone".to_string(),
            description: "Find every distinct quest chain that starts in a zone, longest first. Quest givers are matched by zone tag, or by coordinates when the zone has a registered boundary.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "zone_id": {
                        "type": "integer",
                        "description": "Zone identifier (e.g. 12 for Elwynn Forest)",
                        "minimum": 1
                    }
                },
                "required": ["zone_id"]
            }),
        },
        Tool {
            name: "trace_quest_chain".to_string(),
            description: "Follow the prerequisite chain forward from a single quest".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "quest_id": {
                        "type": "integer",
                        "description": "Quest to start from",
                        "minimum": 1
                    }
                },
                "required": ["quest_id"]
            }),
        },
        Tool {
            name: "list_zones".to_string(),
            description: "List zones that have quest givers, with the number of distinct quests offered there".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "map_id": {
                        "type": "integer",
                        "description": "Only list zones on this map",
                        "minimum": 0
                    }
                }
            }),
        },
        Tool {
            name: "get_zone_boundaries".to_string(),
            description: "Show the registered bounding rectangles used to match quest givers to a zone by coordinates".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "zone_id": {
                        "type": "integer",
                        "description": "Zone identifier",
                        "minimum": 1
                    }
                },
                "required": ["zone_id"]
            }),
        },
    ]
}

/// Dispatch a tools/call by name. `None` means the tool does not exist.
pub async fn call_tool(
    resolver: &ChainResolver,
    name: &str,
    arguments: &Value,
) -> Option<Result<ToolsCallResult>> {
    let outcome = match name {
        "find_quest_chains_in_zone" => handle_find_chains(resolver, arguments).await,
        "trace_quest_chain" => handle_trace_chain(resolver, arguments).await,
        "list_zones" => handle_list_zones(resolver, arguments).await,
        "get_zone_boundaries" => handle_zone_boundaries(resolver, arguments).await,
        _ => return None,
    };

    // Caller mistakes are reported in-band; store failures stay protocol errors
    Some(match outcome {
        Err(e @ QuestchainError::InvalidInput(_)) | Err(e @ QuestchainError::QuestNotFound(_)) => {
            Ok(ToolsCallResult::error(format!("Error: {}", e)))
        }
        other => other,
    })
}

/// Handle find_quest_chains_in_zone tool
pub async fn handle_find_chains(resolver: &ChainResolver, arguments: &Value) -> Result<ToolsCallResult> {
    let zone_id = validate_zone_id(required_integer(arguments, "zone_id")?)?;
    let chains = resolver.find_quest_chains_in_zone(zone_id).await?;

    json_result(&json!({
        "zoneId": zone_id,
        "chainCount": chains.len(),
        "chains": chains,
    }))
}

/// Handle trace_quest_chain tool
pub async fn handle_trace_chain(resolver: &ChainResolver, arguments: &Value) -> Result<ToolsCallResult> {
    let raw = required_integer(arguments, "quest_id")?;
    let quest_id = QuestId::try_from(raw)
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            QuestchainError::InvalidInput(format!("quest_id must be a positive integer, got {}", raw))
        })?;

    let chain = resolver.trace_quest_chain(quest_id).await?;
    json_result(&chain)
}

/// Handle list_zones tool
pub async fn handle_list_zones(resolver: &ChainResolver, arguments: &Value) -> Result<ToolsCallResult> {
    let map_id = match optional_integer(arguments, "map_id")? {
        Some(raw) => Some(MapId::try_from(raw).map_err(|_| {
            QuestchainError::InvalidInput(format!("map_id must be non-negative, got {}", raw))
        })?),
        None => None,
    };

    let zones = resolver.list_zones(map_id).await?;
    json_result(&json!({
        "mapId": map_id,
        "zoneCount": zones.len(),
        "zones": zones,
    }))
}

/// Handle get_zone_boundaries tool
pub async fn handle_zone_boundaries(resolver: &ChainResolver, arguments: &Value) -> Result<ToolsCallResult> {
    let zone_id = validate_zone_id(required_integer(arguments, "zone_id")?)?;
    let boundaries = resolver.zone_boundaries(zone_id).await?;

    json_result(&json!({
        "zoneId": zone_id,
        "spatialFallback": !boundaries.is_empty(),
        "boundaries": boundaries,
    }))
}

fn json_result<T: Serialize + ?Sized>(value: &T) -> Result<ToolsCallResult> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| QuestchainError::McpProtocol(format!("JSON serialization failed: {}", e)))?;
    Ok(ToolsCallResult::text(text))
}

fn required_integer(arguments: &Value, name: &str) -> Result<i64> {
    optional_integer(arguments, name)?
        .ok_or_else(|| QuestchainError::InvalidInput(format!("missing required argument `{}`", name)))
}

/// Integers may arrive as JSON numbers or numeric strings.
fn optional_integer(arguments: &Value, name: &str) -> Result<Option<i64>> {
    let parsed = match arguments.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };

    parsed
        .map(Some)
        .ok_or_else(|| QuestchainError::InvalidInput(format!("`{}` must be an integer", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{QuestRecord, ResolverOptions};
    use crate::store::InMemoryQuestStore;
    use crate::zone::{SpawnPoint, ZoneBoundary};
    use std::sync::Arc;

    fn resolver() -> ChainResolver {
        let store = InMemoryQuestStore::new()
            .with_boundary(ZoneBoundary::new(12, 0, -9500.0, -8700.0, -250.0, 500.0).unwrap())
            .with_quest(QuestRecord::new(783, "A Threat Within").with_level(1))
            .with_quest(QuestRecord::new(7, "Kobold Camp Cleanup").with_level(2).with_prerequisite(783))
            .with_spawn(823, SpawnPoint { map_id: 0, zone_id: 12, x: -8902.0, y: -162.0 })
            .with_offering(823, 783);
        ChainResolver::new(Arc::new(store), ResolverOptions::default())
    }

    fn parse(result: &ToolsCallResult) -> Value {
        serde_json::from_str(&result.content[0].text).unwrap()
    }

    #[test]
    fn test_tool_definitions() {
        let names: Vec<String> = get_tool_definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["find_quest_chains_in_zone", "trace_quest_chain", "list_zones", "get_zone_boundaries"]
        );
    }

    #[test]
    fn test_optional_integer_accepts_strings() {
        let args = json!({"zone_id": "12", "bad": true, "neg": -3});
        assert_eq!(optional_integer(&args, "zone_id").unwrap(), Some(12));
        assert_eq!(optional_integer(&args, "neg").unwrap(), Some(-3));
        assert_eq!(optional_integer(&args, "absent").unwrap(), None);
        assert!(optional_integer(&args, "bad").is_err());
    }

    #[tokio::test]
    async fn test_find_chains_tool() {
        let result = call_tool(&resolver(), "find_quest_chains_in_zone", &json!({"zone_id": 12}))
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_error.is_none());

        let body = parse(&result);
        assert_eq!(body["chainCount"], 1);
        assert_eq!(body["chains"][0]["startQuest"], 783);
        assert_eq!(body["chains"][0]["totalQuests"], 2);
        assert_eq!(body["chains"][0]["quests"][1]["title"], "Kobold Camp Cleanup");
        assert_eq!(body["chains"][0]["quests"][1]["depth"], 1);
    }

    #[tokio::test]
    async fn test_invalid_zone_reported_in_band() {
        for args in [json!({"zone_id": 0}), json!({"zone_id": -5}), json!({})] {
            let result = call_tool(&resolver(), "find_quest_chains_in_zone", &args)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(result.is_error, Some(true));
        }
    }

    #[tokio::test]
    async fn test_trace_unknown_quest_reported_in_band() {
        let result = call_tool(&resolver(), "trace_quest_chain", &json!({"quest_id": 99999}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(result.content[0].text.contains("99999"));
    }

    #[tokio::test]
    async fn test_zone_boundaries_tool() {
        let result = call_tool(&resolver(), "get_zone_boundaries", &json!({"zone_id": 12}))
            .await
            .unwrap()
            .unwrap();
        let body = parse(&result);
        assert_eq!(body["spatialFallback"], true);
        assert_eq!(body["boundaries"][0]["minX"], -9500.0);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        assert!(call_tool(&resolver(), "search_documents", &json!({})).await.is_none());
    }
}
