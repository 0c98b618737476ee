//! Fakes shared by the unit tests: a scripted responder, a deterministic
//! embedder and a surface that records everything it is shown.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{EmbedError, ExtractError, ResponderError};
use crate::ingest::{Document, Embedder, Extractor};
use crate::responder::{Conversation, FragmentStream, Responder};
use crate::surface::Surface;
use crate::transcript::Turn;

pub fn setup() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Shared call counter that survives moving its owner into a session.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

enum Step {
    Reply(Vec<String>),
    FailOnSend(ResponderError),
    FailMidStream(Vec<String>, ResponderError),
}

fn owned(fragments: &[&str]) -> Vec<String> {
    fragments.iter().map(|f| f.to_string()).collect()
}

/// Answers each send with the next scripted step, or `"ok"` once the script runs out.
#[derive(Default)]
pub struct ScriptedResponder {
    script: Arc<Mutex<VecDeque<Step>>>,
    rejection: Option<ResponderError>,
    created: Counter,
}

impl ScriptedResponder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
        self
    }

    pub fn reply(self, fragments: &[&str]) -> Self {
        self.push(Step::Reply(owned(fragments)))
    }

    pub fn fail_on_send(self, err: ResponderError) -> Self {
        self.push(Step::FailOnSend(err))
    }

    pub fn fail_mid_stream(self, fragments: &[&str], err: ResponderError) -> Self {
        self.push(Step::FailMidStream(owned(fragments), err))
    }

    pub fn reject_creation(mut self, err: ResponderError) -> Self {
        self.rejection = Some(err);
        self
    }

    /// Counts `create_conversation` calls, accepted or not.
    pub fn created_counter(&self) -> Counter {
        self.created.clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn create_conversation(
        &self,
        _model: &str,
    ) -> Result<Box<dyn Conversation>, ResponderError> {
        self.created.bump();
        if let Some(err) = &self.rejection {
            return Err(err.clone());
        }
        Ok(Box::new(ScriptedConversation {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedConversation {
    script: Arc<Mutex<VecDeque<Step>>>,
}

#[async_trait]
impl Conversation for ScriptedConversation {
    async fn send_streaming<'a>(
        &'a mut self,
        _text: &str,
    ) -> Result<FragmentStream<'a>, ResponderError> {
        let step = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Step::Reply(vec!["ok".to_string()]));

        match step {
            Step::Reply(fragments) => Ok(stream::iter(fragments.into_iter().map(Ok)).boxed()),
            Step::FailOnSend(err) => Err(err),
            Step::FailMidStream(fragments, err) => Ok(stream::iter(
                fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(err))),
            )
            .boxed()),
        }
    }
}

pub const FIXED_DIMENSION: usize = 16;

/// Bag-of-characters vectors: identical texts map to identical vectors.
#[derive(Default)]
pub struct FixedEmbedder {
    fail: bool,
    drop_one: bool,
    batches: Arc<Mutex<Vec<usize>>>,
}

impl FixedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails like an unreachable service.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every call returns one vector too few.
    pub fn dropping_one() -> Self {
        Self {
            drop_one: true,
            ..Self::default()
        }
    }

    /// Sizes of the batches received so far.
    pub fn batches(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.batches)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; FIXED_DIMENSION];
        for c in text.chars() {
            vector[c as usize % FIXED_DIMENSION] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(texts.len());
        }
        if self.fail {
            return Err(EmbedError::Request("embedding service unavailable".into()));
        }
        let take = if self.drop_one {
            texts.len().saturating_sub(1)
        } else {
            texts.len()
        };
        Ok(texts
            .iter()
            .take(take)
            .map(|text| Self::vector_for(text))
            .collect())
    }
}

/// Per-document units keyed by document name; unknown names are unreadable.
#[derive(Default)]
pub struct ScriptedExtractor {
    units: HashMap<String, Vec<String>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pages(mut self, name: &str, pages: &[&str]) -> Self {
        let pages = pages.iter().map(|page| page.to_string()).collect();
        self.units.insert(name.to_string(), pages);
        self
    }
}

impl Extractor for ScriptedExtractor {
    fn extract_units(&self, document: &Document) -> Result<Vec<String>, ExtractError> {
        self.units
            .get(document.name())
            .cloned()
            .ok_or_else(|| ExtractError::Pdf(format!("{} is corrupt", document.name())))
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    pub turns: Vec<Turn>,
    pub fragments: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub statuses: Vec<String>,
    pub replies_started: usize,
    pub replies_ended: usize,
    pub progress: Vec<(String, usize, usize)>,
}

impl Surface for RecordingSurface {
    fn show_turn(&mut self, turn: &Turn) {
        self.turns.push(turn.clone());
    }

    fn begin_reply(&mut self) {
        self.replies_started += 1;
    }

    fn reply_fragment(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    fn end_reply(&mut self) {
        self.replies_ended += 1;
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    fn status(&mut self, message: &str) {
        self.statuses.push(message.to_string());
    }

    fn progress(&mut self, label: &str, done: usize, total: usize) {
        self.progress.push((label.to_string(), done, total));
    }
}
