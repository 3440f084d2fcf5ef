use crate::entity::EntityCategory;
use serde_json::{json, Value};

/// System instruction sent with every classification request.
pub fn build_system_prompt(max_entities: u32) -> String {
    let categories = EntityCategory::ALL
        .iter()
        .map(|c| format!("**{}**", c.label()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"# ROLE:
You are an expert research analyst. Extract the key entities from a text and enrich them with your general knowledge.

# INSTRUCTIONS:
1. **Entity Identification**: Extract up to {max_entities} of the most important entities. Prefer entities that are central to the text's narrative or argument.
2. **Canonical Naming**: Consolidate every mention of an entity (e.g. "The Company", "Acme Corp.", "Acme") under its single, most complete and formal name (e.g. "Acme Corporation").
3. **Information Synthesis**:
    * `description`: a *single, concise sentence* defining the entity's role as presented in the text.
    * `summary_from_text`: a *3-4 sentence paragraph* built *only* from the text.
    * `contextual_enrichment`: supplementary facts from your general knowledge, or null when the entity is fictional or unknown to you.
4. **Categorization**: `entity_type` must be one of {categories}.

# OUTPUT:
Respond with JSON only, no prose: {{"entities": [{{"entity_name": string, "entity_type": string, "description": string, "summary_from_text": string, "contextual_enrichment": string | null}}]}}"#
    )
}

/// Response schema for providers that support constrained JSON output. It
/// describes the same `{"entities": [...]}` object the system prompt asks for.
pub fn entity_list_schema() -> Value {
    let labels: Vec<&str> = EntityCategory::ALL.iter().map(|c| c.label()).collect();

    let entity = json!({
        "type": "OBJECT",
        "properties": {
            "entity_name": { "type": "STRING" },
            "entity_type": { "type": "STRING", "enum": labels },
            "description": { "type": "STRING" },
            "summary_from_text": { "type": "STRING" },
            "contextual_enrichment": { "type": "STRING", "nullable": true }
        },
        "required": ["entity_name", "entity_type", "description", "summary_from_text"],
        "propertyOrdering": [
            "entity_name",
            "entity_type",
            "description",
            "summary_from_text",
            "contextual_enrichment"
        ]
    });

    json!({
        "type": "OBJECT",
        "properties": {
            "entities": { "type": "ARRAY", "items": entity }
        },
        "required": ["entities"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_entity_budget_and_categories() {
        let prompt = build_system_prompt(12);
        assert!(prompt.contains("up to 12 of"));
        assert!(prompt.contains("Key Concept/Theme"));
        assert!(prompt.contains(r#"{"entities": [{"entity_name""#));
    }

    #[test]
    fn schema_enumerates_wire_categories() {
        let schema = entity_list_schema();
        let labels = &schema["properties"]["entities"]["items"]["properties"]["entity_type"]["enum"];
        assert_eq!(labels.as_array().map(|a| a.len()), Some(4));
    }

    #[test]
    fn schema_and_prompt_agree_on_the_wrapper_object() {
        let schema = entity_list_schema();
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["required"][0], "entities");
        assert_eq!(schema["properties"]["entities"]["type"], "ARRAY");
        assert!(build_system_prompt(8).contains(r#"{"entities": ["#));
    }
}
