use serde::{Deserialize, Serialize};

use super::VectorizerError;

/// Ordered set of known flag names; a flag's slot is its position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagVocabulary {
    names: Vec<String>,
}

impl FlagVocabulary {
    /// Build a vocabulary, rejecting blank or repeated names.
    pub fn fit<S: AsRef<str>>(names: &[S]) -> Result<Self, VectorizerError> {
        let mut fitted: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(VectorizerError::InvalidFlag("flag name is empty".to_string()));
            }
            if fitted.iter().any(|existing| existing == name) {
                return Err(VectorizerError::InvalidFlag(format!("duplicate flag {name}")));
            }
            fitted.push(name.to_string());
        }
        Ok(Self { names: fitted })
    }

    pub fn slot(&self, flag: &str) -> Option<usize> {
        self.names.iter().position(|name| name == flag.trim())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Slots for the known flags of one span, deduplicated, unknown ones skipped.
    pub(super) fn slots_for(&self, flags: &[String]) -> Vec<usize> {
        let mut slots: Vec<usize> = flags
            .iter()
            .filter_map(|flag| {
                let slot = self.slot(flag);
                if slot.is_none() {
                    tracing::debug!("Ignoring unknown flag {flag}");
                }
                slot
            })
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_declaration_order() {
        let vocab = FlagVocabulary::fit(&["heading", "amount", "date"]).unwrap();
        assert_eq!(vocab.slot("heading"), Some(0));
        assert_eq!(vocab.slot("date"), Some(2));
        assert_eq!(vocab.slot("recital"), None);
    }

    #[test]
    fn rejects_duplicates_and_blanks() {
        assert!(matches!(
            FlagVocabulary::fit(&["heading", " heading "]),
            Err(VectorizerError::InvalidFlag(_))
        ));
        assert!(matches!(
            FlagVocabulary::fit(&["heading", "  "]),
            Err(VectorizerError::InvalidFlag(_))
        ));
    }

    #[test]
    fn span_slots_are_sorted_and_unique() {
        let vocab = FlagVocabulary::fit(&["heading", "amount", "date"]).unwrap();
        let flags = vec!["date".to_string(), "bogus".into(), "heading".into(), "date".into()];
        assert_eq!(vocab.slots_for(&flags), vec![0, 2]);
    }
}
