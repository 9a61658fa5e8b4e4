use std::collections::BTreeMap;
use std::sync::Arc;

use candle_core::Device;
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    error::{CoreError, CoreResult},
    kind::ModelKind,
    model::{Model, ModelConfig},
    quantized::QuantizedModel,
    tokenizer::Tokenizer,
};

/// Shared handle to a loaded model. Generation needs `&mut`, so calls to
/// the same model are serialized through the mutex.
pub type SharedModel = Arc<Mutex<dyn Model + Send>>;

/// One loaded model and the tokenizer that goes with it.
#[derive(Clone)]
pub struct RegistryEntry {
    pub model: SharedModel,
    pub tokenizer: Arc<Tokenizer>,
}

impl RegistryEntry {
    pub fn new<M: Model + 'static>(model: M, tokenizer: Arc<Tokenizer>) -> Self {
        Self { model: Arc::new(Mutex::new(model)), tokenizer }
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("vocab_size", &self.tokenizer.vocab_size())
            .finish_non_exhaustive()
    }
}

/// Models loaded once at startup and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    entries: BTreeMap<ModelKind, RegistryEntry>,
}

impl ModelRegistry {
    /// Load every known model. Any failure aborts the whole load.
    pub fn load_all(configs: &BTreeMap<ModelKind, ModelConfig>) -> CoreResult<Self> {
        Self::load(&ModelKind::ALL, configs)
    }

    /// Load only `kinds`, each from its entry in `configs` and onto the
    /// device its placement selects.
    pub fn load(kinds: &[ModelKind], configs: &BTreeMap<ModelKind, ModelConfig>) -> CoreResult<Self> {
        Self::load_with(kinds, configs, |config, device| {
            let model = QuantizedModel::load(config, device)?;
            let tokenizer = model.tokenizer_arc();
            Ok(RegistryEntry::new(model, tokenizer))
        })
    }

    fn load_with<F>(
        kinds: &[ModelKind],
        configs: &BTreeMap<ModelKind, ModelConfig>,
        mut build: F,
    ) -> CoreResult<Self>
    where
        F: FnMut(&ModelConfig, &Device) -> CoreResult<RegistryEntry>,
    {
        let mut entries = BTreeMap::new();
        for &kind in kinds {
            let config = configs.get(&kind).ok_or_else(|| CoreError::Config {
                field: format!("models.{}", kind.name()),
                reason: "no artifacts configured".to_string(),
            })?;
            let device = config.placement.select()?;
            let entry = build(config, &device)?;
            info!(
                model = %kind,
                placement = ?config.placement,
                vocab_size = entry.tokenizer.vocab_size(),
                "Registry entry ready"
            );
            entries.insert(kind, entry);
        }
        Ok(Self { entries })
    }

    /// Build a registry from already-constructed entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (ModelKind, RegistryEntry)>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    pub fn get(&self, kind: ModelKind) -> CoreResult<&RegistryEntry> {
        self.entries
            .get(&kind)
            .ok_or_else(|| CoreError::ModelNotLoaded(kind.to_string()))
    }

    /// Kinds with a loaded entry, in wire-id order.
    pub fn loaded(&self) -> impl Iterator<Item = ModelKind> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Placement;
    use crate::model::{FinishReason, GenerateInput, Generation, SamplingParams};
    use crate::tokenizer::tests::word_tokenizer;

    struct Echo;

    impl Model for Echo {
        fn load(_config: &ModelConfig, _device: &Device) -> CoreResult<Self> {
            Ok(Echo)
        }

        fn generate(&mut self, input: GenerateInput, _params: SamplingParams) -> CoreResult<Generation> {
            Ok(Generation { token_ids: input.token_ids, finish_reason: FinishReason::Length })
        }
    }

    #[test]
    fn test_missing_config_is_fatal() {
        let err = ModelRegistry::load_all(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::Config { ref field, .. } if field == "models.nous"));
    }

    #[test]
    fn test_get_unloaded_kind() {
        let registry = ModelRegistry::from_entries([(
            ModelKind::Nous,
            RegistryEntry::new(Echo, Arc::new(word_tokenizer(&["hi"]))),
        )]);
        assert!(registry.get(ModelKind::Nous).is_ok());
        let err = registry.get(ModelKind::Pygmalion).unwrap_err();
        assert!(err.is_model_lookup());
    }

    #[test]
    fn test_loaded_in_wire_order() {
        let tok = Arc::new(word_tokenizer(&[]));
        let registry = ModelRegistry::from_entries([
            (ModelKind::Pygmalion, RegistryEntry::new(Echo, Arc::clone(&tok))),
            (ModelKind::Nous, RegistryEntry::new(Echo, tok)),
        ]);
        let kinds: Vec<_> = registry.loaded().collect();
        assert_eq!(kinds, vec![ModelKind::Nous, ModelKind::Pygmalion]);
    }

    #[test]
    fn test_unreadable_weights_abort_load() {
        let mut configs = BTreeMap::new();
        for kind in ModelKind::ALL {
            configs.insert(
                kind,
                ModelConfig {
                    name: kind.name().to_string(),
                    weights: "/nonexistent/weights.gguf".into(),
                    tokenizer: None,
                    max_sequence_length: 2048,
                    placement: Placement::CPU,
                },
            );
        }
        assert!(ModelRegistry::load_all(&configs).is_err());
    }

    fn config(kind: ModelKind, placement: Placement) -> ModelConfig {
        ModelConfig {
            name: kind.name().to_string(),
            weights: format!("/models/{}.gguf", kind.name()).into(),
            tokenizer: None,
            max_sequence_length: 2048,
            placement,
        }
    }

    #[test]
    fn test_each_entry_built_from_its_own_config() {
        let configs = BTreeMap::from([
            (ModelKind::Nous, config(ModelKind::Nous, Placement { prefer_gpu: true, cuda_device_id: 0 })),
            (ModelKind::Pygmalion, config(ModelKind::Pygmalion, Placement::CPU)),
        ]);
        let mut seen = Vec::new();
        let registry = ModelRegistry::load_with(&ModelKind::ALL, &configs, |cfg, device| {
            seen.push((cfg.name.clone(), cfg.placement, device.is_cpu()));
            Ok(RegistryEntry::new(Echo, Arc::new(word_tokenizer(&[]))))
        })
        .unwrap();

        assert_eq!(registry.loaded().count(), 2);
        assert_eq!(seen[0].0, "nous");
        assert!(seen[0].1.prefer_gpu);
        assert_eq!(seen[1], ("pygmalion".to_string(), Placement::CPU, true));
    }

    #[test]
    fn test_build_failure_stops_loading() {
        let configs = BTreeMap::from([
            (ModelKind::Nous, config(ModelKind::Nous, Placement::CPU)),
            (ModelKind::Pygmalion, config(ModelKind::Pygmalion, Placement::CPU)),
        ]);
        let mut calls = 0;
        let err = ModelRegistry::load_with(&ModelKind::ALL, &configs, |_, _| {
            calls += 1;
            Err(CoreError::Generation("no memory".into()))
        })
        .unwrap_err();
        assert!(matches!(err, CoreError::Generation(_)));
        assert_eq!(calls, 1);
    }
}
