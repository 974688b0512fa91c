//! Envelope persistence: seal, compact when oversized, store, and validate
//! on the way back.

use crate::shared::clock::Clock;
use crate::shared::config::PersistenceConfig;
use crate::shared::storage::StorageAdapter;
use contracts::shared::form_state::{CacheEnvelope, FormState, RawEnvelope, ValidatedEnvelope};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("could not encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("storage rejected the envelope ({0} bytes)")]
    Rejected(usize),
}

pub struct CacheManager {
    storage: StorageAdapter,
    config: PersistenceConfig,
    clock: Rc<dyn Clock>,
}

impl CacheManager {
    pub fn new(storage: StorageAdapter, config: PersistenceConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            storage,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    fn encode(&self, state: &FormState, now_ms: i64) -> Result<String, CacheError> {
        let envelope = CacheEnvelope::seal(state, &self.config.version, now_ms)?;
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Writes the whole state to the storage slot. Returns the stored size.
    pub fn try_persist(&self, state: &FormState) -> Result<usize, CacheError> {
        let now = self.clock.now_ms();
        let mut text = self.encode(state, now)?;

        if text.len() > self.config.max_bytes {
            let mut compacted = state.clone();
            let dropped = compacted.steps.compact();
            let before = text.len();
            text = self.encode(&compacted, now)?;
            log::info!(
                "envelope of {} bytes over {} byte ceiling, compacted {} blank entries ({} bytes)",
                before,
                self.config.max_bytes,
                dropped,
                text.len()
            );
            if text.len() > self.config.max_bytes {
                log::warn!("envelope still over ceiling after compaction, writing anyway");
            }
        }

        if !self.storage.set_raw(&self.config.storage_key, &text) {
            return Err(CacheError::Rejected(text.len()));
        }
        Ok(text.len())
    }

    /// Persists, logging instead of failing; state in memory is untouched
    /// either way.
    pub fn persist(&self, state: &FormState) -> bool {
        match self.try_persist(state) {
            Ok(bytes) => {
                log::debug!("form state persisted ({} bytes)", bytes);
                true
            }
            Err(err) => {
                log::warn!("form state kept in memory only: {}", err);
                false
            }
        }
    }

    /// Reads the slot back. Corrupted, expired or otherwise invalid envelopes
    /// are removed and reported as absent.
    pub fn load(&self) -> Option<FormState> {
        let raw = self.storage.get_raw(&self.config.storage_key)?;
        let validated = RawEnvelope::parse(&raw).and_then(|envelope| {
            envelope.validate(
                &self.config.version,
                self.clock.now_ms(),
                self.config.max_age_ms(),
            )
        });

        match validated {
            Ok(ValidatedEnvelope::Current(envelope)) => {
                log::info!("restored form state saved at {}", envelope.timestamp);
                Some(envelope.into_state())
            }
            Ok(ValidatedEnvelope::Migrated { from, envelope }) => {
                log::info!(
                    "migrating form state from version {} to {}",
                    from.as_deref().unwrap_or("<none>"),
                    self.config.version
                );
                let state = envelope.into_state();
                self.persist(&state);
                Some(state)
            }
            Err(rejection) => {
                log::warn!("discarding cached form state: {}", rejection);
                self.storage.remove(&self.config.storage_key);
                None
            }
        }
    }

    pub fn clear(&self) -> bool {
        self.storage.remove(&self.config.storage_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::clock::ManualClock;
    use crate::shared::config::default_config;
    use crate::shared::storage::MemoryBackend;
    use contracts::shared::form_state::{FieldValue, StepId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn manager(backend: &MemoryBackend, clock: &ManualClock) -> CacheManager {
        CacheManager::new(
            StorageAdapter::new(Rc::new(backend.clone())),
            default_config().unwrap().persistence,
            Rc::new(clock.clone()),
        )
    }

    fn sample_state() -> FormState {
        let mut state = FormState::new();
        state.steps.personal.insert("autor_nome", vec!["Ana Silva"]);
        state.steps.personal.insert("colaborador", "João");
        state.active_step = Some(StepId::Personal);
        state
    }

    #[test]
    fn test_persist_then_load_in_fresh_manager() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(1_000_000);
        assert!(manager(&backend, &clock).persist(&sample_state()));

        clock.advance(HOUR_MS);
        let loaded = manager(&backend, &clock).load().unwrap();
        assert_eq!(loaded, sample_state());
    }

    #[test]
    fn test_tampered_envelope_is_discarded() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(1_000_000);
        let cache = manager(&backend, &clock);
        cache.persist(&sample_state());

        let key = &cache.config().storage_key;
        let tampered = backend.raw(key).unwrap().replace("João", "Joao");
        backend.put_raw(key, &tampered);

        assert_eq!(cache.load(), None);
        assert_eq!(backend.raw(key), None);
    }

    #[test]
    fn test_expired_envelope_is_discarded() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(1_000_000);
        let cache = manager(&backend, &clock);
        cache.persist(&sample_state());

        clock.advance(24 * HOUR_MS + 1);
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_unparseable_slot_is_discarded() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(0);
        let cache = manager(&backend, &clock);
        backend.put_raw(&cache.config().storage_key, "{not json");
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_legacy_envelope_is_migrated_and_repersisted() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(10_000);
        let cache = manager(&backend, &clock);
        let key = cache.config().storage_key.clone();
        backend.put_raw(
            &key,
            &json!({
                "formData": { "personal": { "colaborador": "João" } },
                "currentStep": "personal",
                "version": "1.0",
                "timestamp": 9_000
            })
            .to_string(),
        );

        let state = cache.load().unwrap();
        assert_eq!(
            state.steps.personal.get("colaborador"),
            Some(&FieldValue::from("João"))
        );

        let stored: serde_json::Value = serde_json::from_str(&backend.raw(&key).unwrap()).unwrap();
        assert_eq!(stored["version"], json!("2.0"));
        assert!(stored["checksum"].is_string());
    }

    #[test]
    fn test_oversized_envelope_is_compacted() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(0);
        let mut config = default_config().unwrap().persistence;
        config.max_bytes = 400;
        let cache = CacheManager::new(
            StorageAdapter::new(Rc::new(backend.clone())),
            config,
            Rc::new(clock.clone()),
        );

        let mut state = sample_state();
        let blanks: Vec<&str> = vec![""; 200];
        state.steps.social.insert("familiar_nome", blanks);
        assert!(cache.persist(&state));

        let loaded = cache.load().unwrap();
        assert!(!loaded.steps.social.contains("familiar_nome"));
        assert_eq!(loaded.steps.personal, state.steps.personal);
    }

    #[test]
    fn test_quota_failure_keeps_going() {
        let backend = MemoryBackend::with_quota(10);
        let clock = ManualClock::new(0);
        let cache = manager(&backend, &clock);
        assert!(!cache.persist(&sample_state()));
        assert!(matches!(
            cache.try_persist(&sample_state()),
            Err(CacheError::Rejected(_))
        ));
        assert_eq!(cache.load(), None);
    }
}
