use super::bucket::StepBucket;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wizard step of the intake form. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepId {
    Personal,
    Social,
    Incapacity,
    Professional,
    Documents,
}

impl StepId {
    /// Steps in wizard order.
    pub const ALL: [StepId; 5] = [
        StepId::Personal,
        StepId::Social,
        StepId::Incapacity,
        StepId::Professional,
        StepId::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Personal => "personal",
            StepId::Social => "social",
            StepId::Incapacity => "incapacity",
            StepId::Professional => "professional",
            StepId::Documents => "documents",
        }
    }

    fn position(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or_default()
    }

    pub fn next(&self) -> Option<StepId> {
        Self::ALL.get(self.position() + 1).copied()
    }

    pub fn prev(&self) -> Option<StepId> {
        self.position().checked_sub(1).map(|i| Self::ALL[i])
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown step `{0}`")]
pub struct StepParseError(pub String);

impl FromStr for StepId {
    type Err = StepParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| StepParseError(s.to_string()))
    }
}

/// One bucket per wizard step. All five always exist; any other top-level
/// key is rejected when decoding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormSteps {
    #[serde(default)]
    pub personal: StepBucket,
    #[serde(default)]
    pub social: StepBucket,
    #[serde(default)]
    pub incapacity: StepBucket,
    #[serde(default)]
    pub professional: StepBucket,
    #[serde(default)]
    pub documents: StepBucket,
}

impl FormSteps {
    pub fn bucket(&self, step: StepId) -> &StepBucket {
        match step {
            StepId::Personal => &self.personal,
            StepId::Social => &self.social,
            StepId::Incapacity => &self.incapacity,
            StepId::Professional => &self.professional,
            StepId::Documents => &self.documents,
        }
    }

    pub fn bucket_mut(&mut self, step: StepId) -> &mut StepBucket {
        match step {
            StepId::Personal => &mut self.personal,
            StepId::Social => &mut self.social,
            StepId::Incapacity => &mut self.incapacity,
            StepId::Professional => &mut self.professional,
            StepId::Documents => &mut self.documents,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (StepId, &StepBucket)> {
        StepId::ALL.into_iter().map(move |step| (step, self.bucket(step)))
    }

    /// Compacts every bucket, returning the number of dropped keys.
    pub fn compact(&mut self) -> usize {
        StepId::ALL
            .into_iter()
            .map(|step| self.bucket_mut(step).compact())
            .sum()
    }
}

/// Root aggregate held in memory for the whole session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormState {
    pub steps: FormSteps,
    pub active_step: Option<StepId>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_parse_and_order() {
        assert_eq!("social".parse::<StepId>(), Ok(StepId::Social));
        assert!("review".parse::<StepId>().is_err());
        assert_eq!(StepId::Personal.next(), Some(StepId::Social));
        assert_eq!(StepId::Documents.next(), None);
        assert_eq!(StepId::Personal.prev(), None);
        assert_eq!(StepId::Documents.prev(), Some(StepId::Professional));
    }

    #[test]
    fn test_steps_shape() {
        let steps = FormSteps::default();
        let value = serde_json::to_value(&steps).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["documents", "incapacity", "personal", "professional", "social"]
        );

        let partial: FormSteps =
            serde_json::from_value(json!({ "social": { "familiar_nome": ["Assistido"] } }))
                .unwrap();
        assert_eq!(partial.social.list_len("familiar_nome"), 1);
        assert!(partial.personal.is_empty());

        let unknown = serde_json::from_value::<FormSteps>(json!({ "review": {} }));
        assert!(unknown.is_err());
    }
}
