use std::collections::HashMap;
use std::path::Path;

use candle_core::quantized::gguf_file;
use tokenizers::{AddedToken, Tokenizer as HfTokenizer};
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

/// Where the vocabulary came from, which decides who adds BOS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenizerSource {
    /// `tokenizer.json`; its post-processor owns special-token insertion.
    File,
    /// SentencePiece vocabulary rebuilt from GGUF metadata. There is no
    /// post-processor, so `encode` prepends BOS itself.
    GgufSentencePiece,
}

/// Thin wrapper around the Hugging Face `tokenizers` crate.
#[derive(Debug)]
pub struct Tokenizer {
    inner: HfTokenizer,
    eos_token_id: Option<u32>,
    bos_token_id: Option<u32>,
    source: TokenizerSource,
}

impl From<HfTokenizer> for Tokenizer {
    fn from(inner: HfTokenizer) -> Self {
        let eos_token_id = special_token_id(&inner, &["</s>", "<|endoftext|>", "<eos>"]);
        let bos_token_id = special_token_id(&inner, &["<s>", "<|startoftext|>", "<bos>"]);
        Self { inner, eos_token_id, bos_token_id, source: TokenizerSource::File }
    }
}

impl Tokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let inner =
            HfTokenizer::from_file(path).map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        let tokenizer = Self::from(inner);

        debug!(
            path = %path.display(),
            eos_token_id = tokenizer.eos_token_id,
            bos_token_id = tokenizer.bos_token_id,
            vocab_size = tokenizer.vocab_size(),
            "Tokenizer loaded from file"
        );
        Ok(tokenizer)
    }

    /// Rebuild a LLaMA SentencePiece tokenizer from the `tokenizer.ggml.*`
    /// metadata embedded in a GGUF file.
    pub fn from_gguf_metadata(metadata: &HashMap<String, gguf_file::Value>) -> CoreResult<Self> {
        let tokens = gguf_string_array(metadata, "tokenizer.ggml.tokens").ok_or_else(|| {
            CoreError::Config {
                field: "tokenizer".to_string(),
                reason: "GGUF file has no tokenizer.ggml.tokens and no tokenizer.json was given"
                    .to_string(),
            }
        })?;

        match metadata.get("tokenizer.ggml.model") {
            Some(gguf_file::Value::String(m)) if m == "llama" => {}
            Some(gguf_file::Value::String(other)) => {
                return Err(CoreError::Config {
                    field: "tokenizer.ggml.model".to_string(),
                    reason: format!("embedded {other:?} vocabulary is not supported, supply a tokenizer.json"),
                });
            }
            _ => {}
        }

        let scores = gguf_f32_array(metadata, "tokenizer.ggml.scores")
            .unwrap_or_else(|| vec![0.0f32; tokens.len()]);
        let vocab: Vec<(String, f64)> = tokens
            .iter()
            .zip(scores.iter().chain(std::iter::repeat(&0.0f32)))
            .map(|(t, &s)| (t.clone(), f64::from(s)))
            .collect();
        let unk_id = gguf_u32(metadata, "tokenizer.ggml.unknown_token_id").map(|id| id as usize);

        let unigram = tokenizers::models::unigram::Unigram::from(vocab, unk_id, true)
            .map_err(|e| CoreError::Tokenizer(format!("Unigram build error: {e}")))?;
        let mut inner = HfTokenizer::new(unigram);

        {
            use tokenizers::decoders::byte_fallback::ByteFallback;
            use tokenizers::decoders::metaspace::Metaspace as MetaspaceDec;
            use tokenizers::decoders::sequence::Sequence as SeqDec;
            use tokenizers::pre_tokenizers::metaspace::{Metaspace as MetaspacePre, PrependScheme};

            inner.with_pre_tokenizer(Some(MetaspacePre::new('▁', PrependScheme::First, false)));
            inner.with_decoder(Some(SeqDec::new(vec![
                tokenizers::DecoderWrapper::ByteFallback(ByteFallback::new()),
                tokenizers::DecoderWrapper::Metaspace(MetaspaceDec::new(
                    '▁',
                    PrependScheme::First,
                    false,
                )),
            ])));
        }

        let eos_token_id = gguf_u32(metadata, "tokenizer.ggml.eos_token_id");
        let bos_token_id = gguf_u32(metadata, "tokenizer.ggml.bos_token_id");

        // Control tokens must be registered as special so `<s>`/`</s>` in
        // text encode to single ids instead of byte fragments.
        let mut special_ids: std::collections::BTreeSet<usize> =
            [eos_token_id, bos_token_id].into_iter().flatten().map(|id| id as usize).collect();
        if let Some(gguf_file::Value::Array(types)) = metadata.get("tokenizer.ggml.token_type") {
            for (i, typ) in types.iter().enumerate() {
                let is_control = match typ {
                    gguf_file::Value::I32(t) => *t == 3,
                    gguf_file::Value::U32(t) => *t == 3,
                    gguf_file::Value::U8(t) => *t == 3,
                    _ => false,
                };
                if is_control {
                    special_ids.insert(i);
                }
            }
        }
        let special: Vec<AddedToken> = special_ids
            .into_iter()
            .filter_map(|i| tokens.get(i))
            .map(|tok| AddedToken::from(tok.clone(), true))
            .collect();
        if !special.is_empty() {
            inner.add_special_tokens(&special);
        }

        info!(
            vocab_size = tokens.len(),
            special = special.len(),
            eos_token_id,
            bos_token_id,
            "Tokenizer built from GGUF metadata"
        );

        Ok(Self { inner, eos_token_id, bos_token_id, source: TokenizerSource::GgufSentencePiece })
    }

    /// Encode a text string to a sequence of token ids.
    ///
    /// With `add_special_tokens` the sequence starts with BOS when the
    /// vocabulary has one.
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> CoreResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        let mut ids = encoding.get_ids().to_vec();

        if add_special_tokens && self.source == TokenizerSource::GgufSentencePiece {
            if let Some(bos) = self.bos_token_id {
                if ids.first() != Some(&bos) {
                    ids.insert(0, bos);
                }
            }
        }
        Ok(ids)
    }

    /// Decode a sequence of token ids back to a string.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> CoreResult<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))
    }

    /// The end-of-sequence token id, if known.
    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    /// The beginning-of-sequence token id, if known.
    pub fn bos_token_id(&self) -> Option<u32> {
        self.bos_token_id
    }

    /// The size of the model vocabulary.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Look up the token id for an exact token string (e.g. `"</s>"`).
    pub fn token_id(&self, text: &str) -> Option<u32> {
        self.inner.token_to_id(text)
    }
}

fn special_token_id(tokenizer: &HfTokenizer, candidates: &[&str]) -> Option<u32> {
    candidates.iter().find_map(|c| tokenizer.token_to_id(c))
}

// ─── GGUF metadata helpers ────────────────────────────────────────────────────

fn gguf_string_array(metadata: &HashMap<String, gguf_file::Value>, key: &str) -> Option<Vec<String>> {
    let Some(gguf_file::Value::Array(arr)) = metadata.get(key) else {
        return None;
    };
    let strings: Vec<String> = arr
        .iter()
        .filter_map(|v| match v {
            gguf_file::Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    (!strings.is_empty()).then_some(strings)
}

fn gguf_f32_array(metadata: &HashMap<String, gguf_file::Value>, key: &str) -> Option<Vec<f32>> {
    let Some(gguf_file::Value::Array(arr)) = metadata.get(key) else {
        return None;
    };
    let floats: Vec<f32> = arr
        .iter()
        .filter_map(|v| match v {
            gguf_file::Value::F32(f) => Some(*f),
            _ => None,
        })
        .collect();
    (!floats.is_empty()).then_some(floats)
}

/// Extract a u32 value from GGUF metadata, tolerating different integer widths.
pub fn gguf_u32(metadata: &HashMap<String, gguf_file::Value>, key: &str) -> Option<u32> {
    match metadata.get(key) {
        Some(gguf_file::Value::U32(v)) => Some(*v),
        Some(gguf_file::Value::U64(v)) => u32::try_from(*v).ok(),
        Some(gguf_file::Value::I32(v)) => u32::try_from(*v).ok(),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokenizers::models::wordlevel::WordLevel;
    use tokenizers::pre_tokenizers::whitespace::Whitespace;

    /// A tiny word-level tokenizer with LLaMA-style `<s>`/`</s>` ids.
    pub(crate) fn word_tokenizer(words: &[&str]) -> Tokenizer {
        let mut vocab: HashMap<String, u32> = HashMap::new();
        for (i, w) in ["<unk>", "<s>", "</s>"].iter().chain(words).enumerate() {
            vocab.insert((*w).to_string(), i as u32);
        }
        let model = WordLevel::builder()
            .vocab(vocab.into_iter().collect())
            .unk_token("<unk>".to_string())
            .build()
            .unwrap();
        let mut inner = HfTokenizer::new(model);
        inner.with_pre_tokenizer(Some(Whitespace::default()));
        Tokenizer::from(inner)
    }

    fn gguf_meta() -> HashMap<String, gguf_file::Value> {
        let tokens = ["<unk>", "<s>", "</s>", "▁hi", "▁there", "h", "i", "▁"];
        let mut m = HashMap::new();
        m.insert("tokenizer.ggml.model".to_string(), gguf_file::Value::String("llama".to_string()));
        m.insert(
            "tokenizer.ggml.tokens".to_string(),
            gguf_file::Value::Array(
                tokens.iter().map(|t| gguf_file::Value::String((*t).to_string())).collect(),
            ),
        );
        m.insert(
            "tokenizer.ggml.scores".to_string(),
            gguf_file::Value::Array(
                [0.0f32, 0.0, 0.0, -1.0, -1.0, -5.0, -5.0, -5.0]
                    .into_iter()
                    .map(gguf_file::Value::F32)
                    .collect(),
            ),
        );
        m.insert("tokenizer.ggml.unknown_token_id".to_string(), gguf_file::Value::U32(0));
        m.insert("tokenizer.ggml.bos_token_id".to_string(), gguf_file::Value::U32(1));
        m.insert("tokenizer.ggml.eos_token_id".to_string(), gguf_file::Value::U32(2));
        m
    }

    #[test]
    fn test_special_ids_detected_from_vocab() {
        let tok = word_tokenizer(&["hello"]);
        assert_eq!(tok.bos_token_id(), Some(1));
        assert_eq!(tok.eos_token_id(), Some(2));
        assert_eq!(tok.token_id("hello"), Some(3));
        assert_eq!(tok.token_id("missing"), None);
    }

    #[test]
    fn test_word_tokenizer_encode_decode() {
        let tok = word_tokenizer(&["hello", "world"]);
        let ids = tok.encode("hello world", false).unwrap();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(tok.decode(&ids, false).unwrap(), "hello world");
    }

    #[test]
    fn test_gguf_tokenizer_prepends_bos() {
        let tok = Tokenizer::from_gguf_metadata(&gguf_meta()).unwrap();
        let ids = tok.encode("hi there", true).unwrap();
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(&ids[1..], &[3, 4]);
        assert_eq!(tok.decode(&ids[1..], false).unwrap(), "hi there");
    }

    #[test]
    fn test_gguf_tokenizer_without_special_tokens_has_no_bos() {
        let tok = Tokenizer::from_gguf_metadata(&gguf_meta()).unwrap();
        let ids = tok.encode("hi", false).unwrap();
        assert_ne!(ids.first(), Some(&1));
    }

    #[test]
    fn test_gguf_without_tokens_is_config_error() {
        let err = Tokenizer::from_gguf_metadata(&HashMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn test_gguf_non_llama_vocab_rejected() {
        let mut meta = gguf_meta();
        meta.insert("tokenizer.ggml.model".to_string(), gguf_file::Value::String("gpt2".to_string()));
        assert!(Tokenizer::from_gguf_metadata(&meta).is_err());
    }

    #[test]
    fn test_gguf_u32_width_tolerance() {
        let mut m = HashMap::new();
        m.insert("a".to_string(), gguf_file::Value::U64(7));
        m.insert("b".to_string(), gguf_file::Value::I32(-1));
        assert_eq!(gguf_u32(&m, "a"), Some(7));
        assert_eq!(gguf_u32(&m, "b"), None);
        assert_eq!(gguf_u32(&m, "missing"), None);
    }
}
