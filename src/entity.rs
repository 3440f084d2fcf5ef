use serde::{Deserialize, Deserializer, Serialize};

/// Category of an extracted entity. Serialized with the labels the providers
/// are asked to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    Person,
    Organization,
    Location,
    #[serde(
        rename = "Key Concept/Theme",
        alias = "Concept",
        alias = "Key Concept",
        alias = "Theme"
    )]
    Concept,
}

impl EntityCategory {
    pub const ALL: [EntityCategory; 4] = [
        EntityCategory::Person,
        EntityCategory::Organization,
        EntityCategory::Location,
        EntityCategory::Concept,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EntityCategory::Person => "Person",
            EntityCategory::Organization => "Organization",
            EntityCategory::Location => "Location",
            EntityCategory::Concept => "Key Concept/Theme",
        }
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One extracted entity. Field names on the wire follow the provider schema
/// (`entity_name`, `entity_type`, ...), which is also what the content script
/// receives inside `{entities: {nodes}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "entity_name")]
    pub name: String,
    #[serde(rename = "entity_type")]
    pub category: EntityCategory,
    #[serde(rename = "description")]
    pub short_description: String,
    #[serde(rename = "summary_from_text", default)]
    pub summary: String,
    #[serde(
        rename = "contextual_enrichment",
        default,
        deserialize_with = "deserialize_enrichment"
    )]
    pub enrichment: Option<String>,
}

// Providers occasionally send "" or "null" instead of a JSON null.
fn deserialize_enrichment<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| {
        let trimmed = text.trim();
        !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("null")
    }))
}
