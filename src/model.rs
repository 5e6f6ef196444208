//! Transformer sentiment backend served through candle.
//!
//! Wraps a HuggingFace BERT sequence-classification checkpoint (by default a
//! five-star multilingual sentiment model). The checkpoint is downloaded on
//! first use into the standard HF cache, loaded once, and then owned by a
//! single worker thread for the rest of the process: candle models are not
//! documented as safe to share across threads, so every inference request is
//! serialized through the worker's job channel.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::async_trait;
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::Api;
use tokenizers::{Tokenizer, TruncationParams};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::classifier::{RawPrediction, SentimentBackend};

/// Longest token sequence per input, matching the BERT position-embedding limit.
const MAX_TOKENS: usize = 512;

/// Pending inference requests the worker will hold before senders back off.
const JOB_QUEUE_DEPTH: usize = 32;

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

fn download_model(repo_id: &str) -> Result<ModelFiles> {
    info!(repo = repo_id, "fetching model files from the HuggingFace hub");
    let api = Api::new().context("failed to initialize HuggingFace hub client")?;
    let repo = api.model(repo_id.to_string());

    Ok(ModelFiles {
        config: repo
            .get("config.json")
            .with_context(|| format!("failed to fetch config.json for {repo_id}"))?,
        tokenizer: repo
            .get("tokenizer.json")
            .with_context(|| format!("failed to fetch tokenizer.json for {repo_id}"))?,
        weights: repo
            .get("model.safetensors")
            .with_context(|| format!("failed to fetch model.safetensors for {repo_id}"))?,
    })
}

/// Ordered label list from the checkpoint's `id2label` table, indexed by
/// logit position.
fn parse_labels(config_json: &str) -> Result<Vec<String>> {
    let raw: serde_json::Value =
        serde_json::from_str(config_json).context("config.json is not valid JSON")?;
    let map = raw
        .get("id2label")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("config.json carries no id2label mapping"))?;

    let mut labels = vec![String::new(); map.len()];
    for (key, value) in map {
        let idx: usize = key
            .parse()
            .with_context(|| format!("non-numeric id2label key '{key}'"))?;
        let label = value
            .as_str()
            .ok_or_else(|| anyhow!("non-string id2label value for key '{key}'"))?;
        if idx >= labels.len() {
            bail!("id2label key {idx} outside the contiguous 0..{} range", labels.len());
        }
        labels[idx] = label.to_string();
    }
    Ok(labels)
}

fn argmax(probs: &[f32]) -> Option<(usize, f32)> {
    probs
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// The fully materialized model. Lives on the worker thread only.
struct LoadedModel {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    labels: Vec<String>,
    device: Device,
}

impl LoadedModel {
    fn load(repo_id: &str) -> Result<Self> {
        let files = download_model(repo_id)?;
        let device = Device::Cpu;

        let config_json = std::fs::read_to_string(&files.config)
            .context("failed to read downloaded config.json")?;
        let config: Config =
            serde_json::from_str(&config_json).context("failed to parse BERT config")?;
        let labels = parse_labels(&config_json)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("failed to configure tokenizer truncation: {e}"))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)
                .context("failed to map model weights")?
        };

        // Sequence-classification checkpoints keep the encoder under a
        // `bert.` prefix; plain encoder exports use the root.
        let (model, root) = match BertModel::load(vb.pp("bert"), &config) {
            Ok(model) => (model, vb.pp("bert")),
            Err(_) => (
                BertModel::load(vb.clone(), &config).context("failed to construct BERT model")?,
                vb.clone(),
            ),
        };

        // candle's BertModel stops at the encoder output; the checkpoint's
        // classification head expects tanh(pooler(CLS)) as its input.
        let pooler = candle_nn::linear(
            config.hidden_size,
            config.hidden_size,
            root.pp("pooler").pp("dense"),
        )
        .context("failed to load pooler weights")?;
        let classifier = candle_nn::linear(config.hidden_size, labels.len(), vb.pp("classifier"))
            .context("failed to load classification head")?;

        info!(
            repo = repo_id,
            labels = ?labels,
            hidden_size = config.hidden_size,
            "sentiment model loaded"
        );

        Ok(LoadedModel {
            model,
            pooler,
            classifier,
            tokenizer,
            labels,
            device,
        })
    }

    fn predict(&self, text: &str) -> Result<RawPrediction> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenization failed: {e}"))?;

        let ids = encoding.get_ids().to_vec();
        let type_ids = encoding.get_type_ids().to_vec();
        let mask = encoding.get_attention_mask().to_vec();
        let len = ids.len();

        let input_ids = Tensor::from_vec(ids, (1, len), &self.device)?;
        let token_type_ids = Tensor::from_vec(type_ids, (1, len), &self.device)?;
        let attention_mask = Tensor::from_vec(mask, (1, len), &self.device)?;

        // [1, len, hidden] -> pooled CLS -> [1, num_labels]
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;

        let probs = candle_nn::ops::softmax(&logits, 1)?
            .squeeze(0)?
            .to_vec1::<f32>()?;
        let (best, score) =
            argmax(&probs).ok_or_else(|| anyhow!("model produced no label probabilities"))?;
        let label = self
            .labels
            .get(best)
            .ok_or_else(|| anyhow!("label index {best} outside id2label"))?
            .clone();

        debug!(%label, score, tokens = len, "model inference complete");
        Ok(RawPrediction { label, score })
    }
}

struct InferenceJob {
    text: String,
    reply: oneshot::Sender<Result<RawPrediction>>,
}

/// Async handle to the inference worker. Cheap to clone through `Arc` via the
/// classifier; dropping the last handle closes the job channel and ends the
/// worker thread.
pub struct ModelBackend {
    jobs: mpsc::Sender<InferenceJob>,
    timeout: Duration,
}

impl ModelBackend {
    /// Spawns the worker thread, loads the checkpoint on it, and returns once
    /// the model is ready to serve. Load failures are reported here, before
    /// the backend is ever handed out.
    pub async fn load(repo_id: &str, timeout: Duration) -> Result<Self> {
        let (jobs, mut queue) = mpsc::channel::<InferenceJob>(JOB_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let repo = repo_id.to_string();

        thread::Builder::new()
            .name("sentiment-model".to_string())
            .spawn(move || {
                let loaded = match LoadedModel::load(&repo) {
                    Ok(model) => {
                        let _ = ready_tx.send(Ok(()));
                        model
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                while let Some(job) = queue.blocking_recv() {
                    let _ = job.reply.send(loaded.predict(&job.text));
                }
            })
            .context("failed to spawn model worker thread")?;

        ready_rx
            .await
            .context("model worker exited before reporting readiness")??;
        Ok(ModelBackend { jobs, timeout })
    }
}

#[async_trait]
impl SentimentBackend for ModelBackend {
    async fn predict(&self, text: &str) -> Result<RawPrediction> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(InferenceJob {
                text: text.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow!("inference worker is no longer running"))?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(anyhow!("inference worker dropped the request")),
            Err(_) => Err(anyhow!("inference timed out after {:?}", self.timeout)),
        }
    }

    fn name(&self) -> &'static str {
        "model"
    }
}
