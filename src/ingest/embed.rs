//! # Embedders
//!
//! An [`Embedder`] maps texts to vectors, one vector per text, in input order.
//!
//! - [`OpenAiEmbedder`] calls the `/embeddings` endpoint of the configured API.
//! - [`LocalEmbedder`] runs `all-MiniLM-L6-v2` (or another BERT sentence model) on the
//!   CPU with Candle. Weights are fetched from the Hugging Face Hub on first use and
//!   cached by `hf-hub`.
//!
//! [`create_embedder`] picks one from [`EmbeddingConfig`].

use async_openai::{Client, config::OpenAIConfig, types::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use std::error::Error;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::config::{DocChatConfig, EmbeddingConfig, EmbeddingProvider};
use crate::error::EmbedError;
use crate::responder::create_client;

type ModelResult<T> = Result<T, Box<dyn Error>>;

/// Converts texts into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// Embed `texts`, returning exactly one vector per text in the same order.
    ///
    /// # Errors
    /// The backend failed or returned the wrong number of vectors.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Build the embedder described by `config.embedding`.
///
/// # Errors
/// Loading the local model fails (download, tokenizer or weights).
pub fn create_embedder(
    config: &DocChatConfig,
    api_key: &str,
) -> Result<Box<dyn Embedder>, Box<dyn Error>> {
    let embedding: &EmbeddingConfig = &config.embedding;
    match embedding.provider {
        EmbeddingProvider::OpenAi => Ok(Box::new(OpenAiEmbedder::new(
            create_client(config, api_key),
            embedding.model_name(),
        ))),
        EmbeddingProvider::Local => Ok(Box::new(LocalEmbedder::load(embedding.model_name())?)),
    }
}

/// Embeddings from an OpenAI compatible API.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(texts.to_vec())
            .build()?;

        debug!("Requesting {} embeddings from {}", texts.len(), self.model);
        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                got: data.len(),
            });
        }
        data.sort_by_key(|embedding| embedding.index);
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }
}

/// Sentence embeddings computed in-process.
pub struct LocalEmbedder {
    name: String,
    model: SentenceEmbeddingsModel,
}

impl LocalEmbedder {
    /// Download (or reuse the cached copy of) `model_id` and load it.
    ///
    /// # Errors
    /// [`EmbedError::Model`] when any model file cannot be fetched or parsed.
    pub fn load(model_id: &str) -> Result<Self, EmbedError> {
        info!("Loading local embedding model {}", model_id);
        let model =
            SentenceEmbeddingsModel::load(model_id).map_err(|e| EmbedError::Model(e.to_string()))?;
        Ok(Self {
            name: model_id.to_string(),
            model,
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts
            .iter()
            .map(|text| {
                self.model
                    .encode(text)
                    .map_err(|e| EmbedError::Model(e.to_string()))
            })
            .collect()
    }
}

/// A BERT encoder with mean pooling and L2 normalisation.
struct SentenceEmbeddingsModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl SentenceEmbeddingsModel {
    fn load(model_id: &str) -> ModelResult<Self> {
        let device = Device::Cpu;

        let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
        let api_repo = Api::new()?.repo(repo);

        let config_filename = api_repo.get("config.json")?;
        let tokenizer_filename = api_repo.get("tokenizer.json")?;
        let weights_filename = api_repo.get("model.safetensors")?;

        let config = std::fs::read_to_string(config_filename)?;
        let config: Config = serde_json::from_str(&config)?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| format!("Failed to load tokenizer: {}", e))?;
        limit_to_model(&mut tokenizer, config.max_position_embeddings)?;

        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn encode(&self, text: &str) -> ModelResult<Vec<f32>> {
        let tokens = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| format!("Tokenization error: {}", e))?;

        let token_ids = Tensor::new(tokens.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(tokens.get_type_ids(), &self.device)?.unsqueeze(0)?;

        let output = self.model.forward(&token_ids, &token_type_ids, None)?;
        let embedding = self.mean_pooling(&output, tokens.get_attention_mask())?;
        let embedding = normalize(&embedding)?;

        Ok(embedding.to_vec1::<f32>()?)
    }

    /// Average the token embeddings of `[1, seq_len, hidden]`, ignoring padding.
    fn mean_pooling(&self, embeddings: &Tensor, attention_mask: &[u32]) -> ModelResult<Tensor> {
        let mask = Tensor::new(attention_mask, &self.device)?
            .to_dtype(DType::F32)?
            .unsqueeze(0)?
            .unsqueeze(2)?;

        let sum = embeddings.broadcast_mul(&mask)?.sum(1)?;
        let count = mask.sum(1)?.clamp(1f32, f32::INFINITY)?;
        Ok(sum.broadcast_div(&count)?.squeeze(0)?)
    }
}

/// Longer inputs are cut so every token has a position embedding.
fn limit_to_model(tokenizer: &mut Tokenizer, max_positions: usize) -> ModelResult<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_positions,
            ..Default::default()
        }))
        .map_err(|e| format!("Failed to configure truncation: {}", e))?;
    Ok(())
}

fn normalize(tensor: &Tensor) -> ModelResult<Tensor> {
    let norm = tensor.sqr()?.sum_all()?.sqrt()?;
    Ok(tensor.broadcast_div(&norm)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD_TOKENIZER: &str = r#"{
        "version": "1.0",
        "pre_tokenizer": { "type": "WhitespaceSplit" },
        "model": { "type": "WordLevel", "vocab": { "[UNK]": 0, "word": 1 }, "unk_token": "[UNK]" }
    }"#;

    #[test]
    fn test_long_inputs_are_cut_to_the_position_limit() {
        let mut tokenizer: Tokenizer = WORD_TOKENIZER.parse().unwrap();
        let text = vec!["word"; 600].join(" ");
        assert_eq!(tokenizer.encode(text.as_str(), true).unwrap().get_ids().len(), 600);

        limit_to_model(&mut tokenizer, 512).unwrap();

        let encoding = tokenizer.encode(text.as_str(), true).unwrap();
        assert_eq!(encoding.get_ids().len(), 512);
        assert_eq!(encoding.get_type_ids().len(), 512);
        assert_eq!(encoding.get_attention_mask().len(), 512);
    }

    #[test]
    fn test_create_embedder_defaults_to_api() {
        let config = DocChatConfig::default();
        let embedder = create_embedder(&config, "sk-test").unwrap();
        assert_eq!(embedder.model_name(), "text-embedding-004");
    }

    #[tokio::test]
    async fn test_openai_embedder_skips_empty_batches() {
        let config = DocChatConfig::default();
        let embedder = OpenAiEmbedder::new(create_client(&config, "sk-test"), "unused");
        let vectors = embedder.embed(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
