use super::checksum::checksum;
use super::step::{FormState, FormSteps, StepId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Versioned, checksummed wrapper written to the single storage slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    pub form_data: FormSteps,
    pub current_step: Option<StepId>,
    pub version: String,
    pub timestamp: i64,
    pub checksum: String,
}

impl CacheEnvelope {
    /// Wraps a snapshot of `state`, computing the checksum over its steps.
    pub fn seal(state: &FormState, version: &str, now_ms: i64) -> serde_json::Result<Self> {
        Ok(Self {
            checksum: checksum(&state.steps)?,
            form_data: state.steps.clone(),
            current_step: state.active_step,
            version: version.to_string(),
            timestamp: now_ms,
        })
    }

    pub fn into_state(self) -> FormState {
        FormState {
            steps: self.form_data,
            active_step: self.current_step,
        }
    }
}

/// Reasons an envelope read back from storage is discarded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvelopeRejection {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("envelope has no timestamp")]
    MissingTimestamp,
    #[error("envelope expired ({age_ms} ms old, limit {max_age_ms} ms)")]
    Expired { age_ms: i64, max_age_ms: i64 },
    #[error("envelope version {0} carries no checksum")]
    MissingChecksum(String),
    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },
    #[error("unknown current step `{0}`")]
    UnknownStep(String),
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedEnvelope {
    /// Written by the running version.
    Current(CacheEnvelope),
    /// Written by another (or no) version; data reused as-is and relabelled
    /// with the running version so the caller can re-persist it.
    Migrated {
        from: Option<String>,
        envelope: CacheEnvelope,
    },
}

impl ValidatedEnvelope {
    pub fn envelope(&self) -> &CacheEnvelope {
        match self {
            ValidatedEnvelope::Current(envelope) => envelope,
            ValidatedEnvelope::Migrated { envelope, .. } => envelope,
        }
    }

    pub fn into_envelope(self) -> CacheEnvelope {
        match self {
            ValidatedEnvelope::Current(envelope) => envelope,
            ValidatedEnvelope::Migrated { envelope, .. } => envelope,
        }
    }
}

/// Lenient view of whatever sits in the storage slot, including envelopes
/// written before versioning and checksums existed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    pub form_data: Value,
    #[serde(default)]
    pub current_step: Option<Value>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl RawEnvelope {
    pub fn parse(text: &str) -> Result<Self, EnvelopeRejection> {
        serde_json::from_str(text).map_err(|e| EnvelopeRejection::Malformed(e.to_string()))
    }

    /// Checks age, checksum and shape. Nothing is trusted partially: any
    /// failure rejects the whole envelope.
    pub fn validate(
        self,
        current_version: &str,
        now_ms: i64,
        max_age_ms: i64,
    ) -> Result<ValidatedEnvelope, EnvelopeRejection> {
        let timestamp = self.timestamp.ok_or(EnvelopeRejection::MissingTimestamp)?;
        let age_ms = now_ms.saturating_sub(timestamp);
        if age_ms > max_age_ms {
            return Err(EnvelopeRejection::Expired { age_ms, max_age_ms });
        }

        let is_current = self.version.as_deref() == Some(current_version);
        let computed =
            checksum(&self.form_data).map_err(|e| EnvelopeRejection::Malformed(e.to_string()))?;
        match self.checksum {
            Some(stored) if stored != computed => {
                return Err(EnvelopeRejection::ChecksumMismatch { stored, computed });
            }
            None if is_current => {
                return Err(EnvelopeRejection::MissingChecksum(current_version.to_string()));
            }
            _ => {}
        }

        let form_data: FormSteps = serde_json::from_value(self.form_data)
            .map_err(|e| EnvelopeRejection::Malformed(e.to_string()))?;
        let current_step = match self.current_step {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(
                s.parse::<StepId>()
                    .map_err(|_| EnvelopeRejection::UnknownStep(s.clone()))?,
            ),
            Some(other) => return Err(EnvelopeRejection::UnknownStep(other.to_string())),
        };

        let envelope = CacheEnvelope {
            form_data,
            current_step,
            version: current_version.to_string(),
            timestamp,
            checksum: computed,
        };
        if is_current {
            Ok(ValidatedEnvelope::Current(envelope))
        } else {
            Ok(ValidatedEnvelope::Migrated {
                from: self.version,
                envelope,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn sample_state() -> FormState {
        let mut state = FormState::new();
        state.steps.personal.insert("colaborador", "João");
        state.steps.personal.insert("autor_nome", vec!["Ana Silva"]);
        state.active_step = Some(StepId::Personal);
        state
    }

    #[test]
    fn test_wire_shape() {
        let envelope = CacheEnvelope::seal(&sample_state(), "2.0", 1_000).unwrap();
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["currentStep"], json!("personal"));
        assert_eq!(value["version"], json!("2.0"));
        assert_eq!(value["timestamp"], json!(1_000));
        assert_eq!(value["formData"]["personal"]["autor_nome"], json!(["Ana Silva"]));
        assert!(value["checksum"].is_string());
    }

    #[test]
    fn test_current_envelope_validates() {
        let envelope = CacheEnvelope::seal(&sample_state(), "2.0", 1_000).unwrap();
        let text = serde_json::to_string(&envelope).unwrap();
        let validated = RawEnvelope::parse(&text)
            .unwrap()
            .validate("2.0", 2_000, DAY_MS)
            .unwrap();
        assert_eq!(validated, ValidatedEnvelope::Current(envelope));
    }

    #[test]
    fn test_flipped_character_is_rejected() {
        let envelope = CacheEnvelope::seal(&sample_state(), "2.0", 1_000).unwrap();
        let text = serde_json::to_string(&envelope).unwrap().replace("Ana Silva", "Ana Silvb");
        let result = RawEnvelope::parse(&text).unwrap().validate("2.0", 2_000, DAY_MS);
        assert!(matches!(result, Err(EnvelopeRejection::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_expired_envelope_is_rejected() {
        let envelope = CacheEnvelope::seal(&sample_state(), "2.0", 0).unwrap();
        let text = serde_json::to_string(&envelope).unwrap();
        let result = RawEnvelope::parse(&text)
            .unwrap()
            .validate("2.0", DAY_MS + 1, DAY_MS);
        assert!(matches!(result, Err(EnvelopeRejection::Expired { .. })));
    }

    #[test]
    fn test_legacy_envelope_migrates() {
        let legacy = json!({
            "formData": { "social": { "familiar_nome": ["Assistido", "Maria"] } },
            "currentStep": "social",
            "timestamp": 5_000
        });
        let validated = RawEnvelope::parse(&legacy.to_string())
            .unwrap()
            .validate("2.0", 6_000, DAY_MS)
            .unwrap();
        match validated {
            ValidatedEnvelope::Migrated { from, envelope } => {
                assert_eq!(from, None);
                assert_eq!(envelope.version, "2.0");
                assert_eq!(envelope.current_step, Some(StepId::Social));
                assert_eq!(envelope.form_data.social.list_len("familiar_nome"), 2);
            }
            other => panic!("expected migration, got {other:?}"),
        }
    }

    #[test]
    fn test_current_version_without_checksum_is_rejected() {
        let raw = json!({ "formData": {}, "version": "2.0", "timestamp": 1 });
        let result = RawEnvelope::parse(&raw.to_string())
            .unwrap()
            .validate("2.0", 2, DAY_MS);
        assert!(matches!(result, Err(EnvelopeRejection::MissingChecksum(_))));
    }

    #[test]
    fn test_unknown_step_bucket_is_rejected() {
        let raw = json!({ "formData": { "review": {} }, "timestamp": 1 });
        let result = RawEnvelope::parse(&raw.to_string())
            .unwrap()
            .validate("2.0", 2, DAY_MS);
        assert!(matches!(result, Err(EnvelopeRejection::Malformed(_))));
    }
}
