//! The graph attention network architecture and forward pass (spec §4.2,
//! §6.3).
//!
//! No tensor runtime is pulled in for this: the reference material for this
//! crate carries no ML framework dependency (no `candle`, `tch`, `ort`, ...),
//! so rather than fabricate one, the forward pass is hand-rolled over plain
//! `Vec<f32>` — see DESIGN.md Decision D2. Training (backprop, the BCE loss)
//! is out of scope (spec §1 Non-goals); only inference is implemented.

use super::features::{build_node_features, NODE_TEXT_DIM, SPARSE_DIM};
use crate::encoder::SentenceEncoder;
use crate::schema::canonical::CanonicalSchema;
use crate::schema::graph::GraphView;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HEADS: usize = 4;
const LAYERS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum RankerError {
    #[error("weights file not found or unreadable: {0}")]
    WeightsUnavailable(String),
    #[error("weights shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("question embedding failed")]
    EmbeddingFailed,
    #[error("GAT forward pass exceeded its advisory timeout")]
    TimedOut,
}

/// A dense linear layer: `y = W x + b`, `weight` laid out as `[out_dim][in_dim]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl Linear {
    fn out_dim(&self) -> usize {
        self.weight.len()
    }

    fn in_dim(&self) -> usize {
        self.weight.first().map_or(0, |row| row.len())
    }

    fn forward(&self, x: &[f32]) -> Vec<f32> {
        self.weight
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| dot(row, x) + b)
            .collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// A single attention head within a [`GatLayer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatHead {
    /// `H -> H` projection applied to every node before attention.
    pub proj: Linear,
    pub attn_src: Vec<f32>,
    pub attn_dst: Vec<f32>,
}

impl GatHead {
    fn forward(&self, features: &[Vec<f32>], adjacency: &[std::collections::BTreeSet<usize>]) -> Vec<Vec<f32>> {
        let projected: Vec<Vec<f32>> = features.iter().map(|f| self.proj.forward(f)).collect();

        (0..features.len())
            .map(|i| {
                let mut neighbors: Vec<usize> = adjacency[i].iter().copied().collect();
                neighbors.push(i); // self-loop, standard in GAT
                let logits: Vec<f32> = neighbors
                    .iter()
                    .map(|&j| {
                        let e = dot(&self.attn_src, &projected[i]) + dot(&self.attn_dst, &projected[j]);
                        leaky_relu(e, 0.2)
                    })
                    .collect();
                let weights = softmax(&logits);
                let dim = projected[i].len();
                let mut out = vec![0.0f32; dim];
                for (&j, &w) in neighbors.iter().zip(&weights) {
                    for (o, p) in out.iter_mut().zip(&projected[j]) {
                        *o += w * p;
                    }
                }
                out
            })
            .collect()
    }
}

fn leaky_relu(x: f32, slope: f32) -> f32 {
    if x > 0.0 {
        x
    } else {
        slope * x
    }
}

fn softmax(xs: &[f32]) -> Vec<f32> {
    let max = xs.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = xs.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum.max(f32::EPSILON)).collect()
}

fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// One GAT layer: `HEADS` attention heads, averaged (not concatenated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatLayer {
    pub heads: Vec<GatHead>,
    /// Carried for documentation/parity with the trained architecture;
    /// dropout is always disabled at inference (spec §4.2).
    pub dropout: f32,
}

impl GatLayer {
    fn forward(&self, features: &[Vec<f32>], adjacency: &[std::collections::BTreeSet<usize>]) -> Vec<Vec<f32>> {
        let head_outputs: Vec<Vec<Vec<f32>>> = self
            .heads
            .iter()
            .map(|h| h.forward(features, adjacency))
            .collect();

        let n = features.len();
        let dim = head_outputs[0][0].len();
        (0..n)
            .map(|i| {
                let mut avg = vec![0.0f32; dim];
                for head in &head_outputs {
                    for (a, v) in avg.iter_mut().zip(&head[i]) {
                        *a += v;
                    }
                }
                for a in avg.iter_mut() {
                    *a /= self.heads.len() as f32;
                }
                avg
            })
            .collect()
    }
}

/// The full trained GAT weight set (spec §6.3). Deserializable from a JSON
/// state-dict export, with dimensions validated against the architecture on
/// load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatWeights {
    pub input_proj: Linear,
    pub conv1: GatLayer,
    pub conv2: GatLayer,
    pub conv3: GatLayer,
    pub classifier: Linear,
}

impl GatWeights {
    /// The question embedding dimension `Q` this weight set was trained
    /// with, recovered from `input_proj`'s input shape
    /// (`5 + Q + 384`, spec §6.3) — the mechanism the spec's Open Question
    /// (§9) tells implementers to use instead of guessing 384 vs 768.
    pub fn question_dim(&self) -> Option<usize> {
        self.input_proj
            .in_dim()
            .checked_sub(SPARSE_DIM + NODE_TEXT_DIM)
    }

    pub fn hidden_dim(&self) -> usize {
        self.input_proj.out_dim()
    }

    /// Loads and shape-validates a weight set from a JSON file.
    pub fn load(path: &std::path::Path) -> Result<Self, RankerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RankerError::WeightsUnavailable(e.to_string()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, RankerError> {
        let weights: GatWeights =
            serde_json::from_str(text).map_err(|e| RankerError::ShapeMismatch(e.to_string()))?;
        weights.validate()?;
        Ok(weights)
    }

    fn validate(&self) -> Result<(), RankerError> {
        if self.question_dim().is_none() {
            return Err(RankerError::ShapeMismatch(format!(
                "input_proj in_dim {} is smaller than the fixed {}+{} (sparse+text) components",
                self.input_proj.in_dim(),
                SPARSE_DIM,
                NODE_TEXT_DIM
            )));
        }
        let h = self.hidden_dim();
        for (name, layer) in [("conv1", &self.conv1), ("conv2", &self.conv2), ("conv3", &self.conv3)] {
            if layer.heads.len() != HEADS {
                return Err(RankerError::ShapeMismatch(format!(
                    "{name} has {} heads, expected {HEADS}",
                    layer.heads.len()
                )));
            }
            for head in &layer.heads {
                if head.proj.in_dim() != h || head.proj.out_dim() != h {
                    return Err(RankerError::ShapeMismatch(format!(
                        "{name} head projection is {}x{}, expected {h}x{h}",
                        head.proj.out_dim(),
                        head.proj.in_dim()
                    )));
                }
            }
        }
        if self.classifier.in_dim() != h || self.classifier.out_dim() != 1 {
            return Err(RankerError::ShapeMismatch(format!(
                "classifier is {}x{}, expected 1x{h}",
                self.classifier.out_dim(),
                self.classifier.in_dim()
            )));
        }
        Ok(())
    }
}

/// A scored schema node, before the Intelligent Fallback augments the set
/// (spec §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNode {
    pub node_id: String,
    pub score: f32,
}

/// The GAT-backed schema ranker.
pub struct SchemaRanker<'a> {
    weights: &'a GatWeights,
    question_encoder: &'a dyn SentenceEncoder,
    node_text_encoder: &'a dyn SentenceEncoder,
}

impl<'a> SchemaRanker<'a> {
    pub fn new(
        weights: &'a GatWeights,
        question_encoder: &'a dyn SentenceEncoder,
        node_text_encoder: &'a dyn SentenceEncoder,
    ) -> Self {
        Self {
            weights,
            question_encoder,
            node_text_encoder,
        }
    }

    /// `score_nodes(question, schema, top_k) -> ranked list` (spec §4.2).
    ///
    /// Every score returned is in `[0, 1]`. Ties are broken by node index
    /// (i.e. insertion order into the graph), not by score stability of the
    /// sort alone, since a stable sort on an all-equal slice already
    /// preserves index order — made explicit here for documentation.
    pub fn score_nodes(
        &self,
        question: &str,
        schema: &CanonicalSchema,
        top_k: usize,
    ) -> Result<Vec<ScoredNode>, RankerError> {
        let q = self
            .question_encoder
            .encode(question)
            .ok_or(RankerError::EmbeddingFailed)?;

        let graph = GraphView::build(schema);
        let mut features = build_node_features(&graph, schema, self.node_text_encoder)
            .ok_or(RankerError::EmbeddingFailed)?;

        for f in features.iter_mut() {
            f.extend_from_slice(&q);
        }

        let adjacency = graph.adjacency();

        let mut h: Vec<Vec<f32>> = features
            .iter()
            .map(|f| self.weights.input_proj.forward(f))
            .collect();

        h = self.weights.conv1.forward(&h, &adjacency);
        h = h.into_iter().map(|v| v.into_iter().map(relu).collect()).collect();
        h = self.weights.conv2.forward(&h, &adjacency);
        h = h.into_iter().map(|v| v.into_iter().map(relu).collect()).collect();
        h = self.weights.conv3.forward(&h, &adjacency);

        let mut scored: Vec<ScoredNode> = graph
            .nodes
            .iter()
            .zip(&h)
            .map(|(node, hidden)| {
                let logit = self.weights.classifier.forward(hidden)[0];
                ScoredNode {
                    node_id: node.node_id.clone(),
                    score: sigmoid(logit),
                }
            })
            .collect();

        // Descending score, ties broken by original node index (stable sort
        // over the original node order achieves this).
        let mut indexed: Vec<(usize, ScoredNode)> = scored.drain(..).enumerate().collect();
        indexed.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(indexed.into_iter().map(|(_, n)| n).take(top_k).collect())
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Runs [`SchemaRanker::score_nodes`] on a blocking thread with an advisory
/// timeout (spec §5: "GAT forward pass: advisory 5s; on timeout the
/// orchestrator falls back to no pruning"). This is the orchestrator's sole
/// entry point into the ranker so every caller gets the same fallback
/// behavior.
pub async fn score_nodes_with_timeout(
    weights: GatWeights,
    question_encoder_dim: usize,
    node_text_encoder_dim: usize,
    question: String,
    schema: CanonicalSchema,
    top_k: usize,
    timeout: Duration,
) -> Result<Vec<ScoredNode>, RankerError> {
    use crate::encoder::HashSentenceEncoder;

    let task = tokio::task::spawn_blocking(move || {
        let q_enc = HashSentenceEncoder::new(question_encoder_dim);
        let t_enc = HashSentenceEncoder::new(node_text_encoder_dim);
        let ranker = SchemaRanker::new(&weights, &q_enc, &t_enc);
        ranker.score_nodes(&question, &schema, top_k)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(_join_error)) => Err(RankerError::EmbeddingFailed),
        Err(_elapsed) => Err(RankerError::TimedOut),
    }
}
