use crate::domain::OrganismClass;

pub const HUMAN_TOKENS: [&str; 2] = ["homo sapiens", "human"];

/// Exact, case-insensitive match against human-designating tokens.
///
/// GEO reports multi-species series as `"Homo sapiens; Mus musculus"`; each
/// `;`-separated component is matched on its own. Anything else is `Other`.
#[derive(Debug, Clone)]
pub struct OrganismClassifier {
    tokens: Vec<String>,
}

impl Default for OrganismClassifier {
    fn default() -> Self {
        Self::with_tokens(HUMAN_TOKENS)
    }
}

impl OrganismClassifier {
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|token| token.as_ref().trim().to_lowercase())
                .filter(|token| !token.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, organism_raw: Option<&str>) -> OrganismClass {
        let Some(text) = organism_raw else {
            return OrganismClass::Other;
        };
        let is_human = text
            .split(';')
            .map(|part| part.trim().to_lowercase())
            .any(|part| self.tokens.iter().any(|token| *token == part));
        if is_human {
            OrganismClass::Human
        } else {
            OrganismClass::Other
        }
    }

    pub fn is_human(&self, organism_raw: &str) -> bool {
        self.classify(Some(organism_raw)) == OrganismClass::Human
    }
}
