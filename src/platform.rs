use std::collections::BTreeMap;

use crate::error::MinerError;

const BUNDLED_PLATFORMS: &str = include_str!("../data/platforms.json");

/// Resolves GEO platform (GPL) identifiers to readable platform names.
#[derive(Debug, Clone)]
pub struct PlatformMapper {
    table: BTreeMap<String, String>,
    fallback_label: String,
}

impl PlatformMapper {
    pub fn builtin(fallback_label: &str) -> Result<Self, MinerError> {
        Self::from_json(BUNDLED_PLATFORMS, fallback_label)
    }

    pub fn from_json(content: &str, fallback_label: &str) -> Result<Self, MinerError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(content)
            .map_err(|err| MinerError::Configuration(format!("platform table: {err}")))?;
        let table = raw
            .into_iter()
            .map(|(id, name)| (normalize_platform_id(&id), name))
            .collect();
        Ok(Self {
            table,
            fallback_label: fallback_label.to_string(),
        })
    }

    /// Same table, different label for unmapped ids.
    pub fn with_label(&self, fallback_label: &str) -> Self {
        Self {
            table: self.table.clone(),
            fallback_label: fallback_label.to_string(),
        }
    }

    pub fn fallback_label(&self) -> &str {
        &self.fallback_label
    }

    /// Total: never empty, never fails. Unknown ids become `"<label> (<id>)"`.
    pub fn resolve(&self, platform_id: Option<&str>) -> String {
        let Some(raw) = platform_id else {
            return self.fallback_label.clone();
        };

        let mut names: Vec<String> = Vec::new();
        for part in raw.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id = normalize_platform_id(part);
            let name = match self.table.get(&id) {
                Some(name) => name.clone(),
                None => format!("{} ({id})", self.fallback_label),
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }

        if names.is_empty() {
            return self.fallback_label.clone();
        }
        names.join("; ")
    }
}

fn normalize_platform_id(value: &str) -> String {
    let trimmed = value.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return format!("GPL{trimmed}");
    }
    match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("gpl") => {
            format!("GPL{}", &trimmed[3..])
        }
        _ => trimmed.to_string(),
    }
}
