//! # Responder
//!
//! The seam between a [`ChatSession`](crate::chat::ChatSession) and the model service.
//!
//! A [`Responder`] opens conversations; a [`Conversation`] answers one user message at a
//! time with a [`FragmentStream`], a finite stream of text fragments that ends when the
//! reply is complete. The consumer concatenates the fragments to obtain the reply.
//!
//! [`OpenAiResponder`] is the shipped implementation. It talks to any OpenAI compatible
//! endpoint and keeps the conversation history on the client side, so each request
//! carries the whole exchange so far. Request and chunk types come from `async-openai`;
//! the event stream itself is read with `reqwest-eventsource` so that an error status
//! still yields the service's error body.
//!
//! ## Example
//! ```no_run
//! use docchat::config::DocChatConfig;
//! use docchat::responder::{OpenAiResponder, Responder};
//! use futures::StreamExt;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DocChatConfig::default();
//! let responder = OpenAiResponder::new(&config, "sk-...");
//! let mut conversation = responder.create_conversation(&config.model).await?;
//! let mut fragments = conversation.send_streaming("Hello!").await?;
//! while let Some(fragment) = fragments.next().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::{Config, OpenAIConfig},
    error::WrappedError,
    types::{
        ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionStreamResponse,
    },
};
use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource, RequestBuilderExt};
use tracing::{debug, error, info};

use crate::{config::DocChatConfig, error::ResponderError};

/// Incrementally delivered reply text.
pub type FragmentStream<'a> = BoxStream<'a, Result<String, ResponderError>>;

/// Opens conversations bound to a model.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Create a conversation for `model`.
    ///
    /// # Errors
    /// Whatever the service reports when it refuses the conversation.
    async fn create_conversation(&self, model: &str)
    -> Result<Box<dyn Conversation>, ResponderError>;
}

/// A multi-turn exchange with the model service.
#[async_trait]
pub trait Conversation: Send {
    /// Send `text` and stream the reply.
    ///
    /// The stream borrows the conversation: the exchange is only recorded in the
    /// conversation's context once the stream has been drained without error.
    async fn send_streaming<'a>(
        &'a mut self,
        text: &str,
    ) -> Result<FragmentStream<'a>, ResponderError>;
}

/// Creates a new OpenAI API client from configuration.
pub(crate) fn create_client(config: &DocChatConfig, api_key: &str) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.api_base.clone());
    debug!("Client created for {}", config.api_base);
    Client::with_config(openai_config)
}

/// [`Responder`] for OpenAI compatible chat completion endpoints.
#[derive(Clone)]
pub struct OpenAiResponder {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    system_prompt: Option<String>,
    verify_model: bool,
}

impl OpenAiResponder {
    pub fn new(config: &DocChatConfig, api_key: &str) -> Self {
        Self {
            client: create_client(config, api_key),
            http: reqwest::Client::new(),
            system_prompt: config.system_prompt.clone(),
            verify_model: config.verify_model,
        }
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn create_conversation(
        &self,
        model: &str,
    ) -> Result<Box<dyn Conversation>, ResponderError> {
        if model.trim().is_empty() {
            return Err(ResponderError::Other("no model identifier configured".into()));
        }

        if self.verify_model {
            let found = self.client.models().retrieve(model).await.map_err(|e| {
                error!("Model {} was rejected: {}", model, e);
                ResponderError::from(e)
            })?;
            info!("Model {} is available (owned by {})", found.id, found.owned_by);
        }

        let mut history = Vec::new();
        if let Some(prompt) = &self.system_prompt {
            history.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage::from(prompt.as_str()),
            ));
        }

        Ok(Box::new(OpenAiConversation {
            config: self.client.config().clone(),
            http: self.http.clone(),
            model: model.to_string(),
            history,
        }))
    }
}

/// Client-side conversation context: every request replays `history`.
pub struct OpenAiConversation {
    config: OpenAIConfig,
    http: reqwest::Client,
    model: String,
    history: Vec<ChatCompletionRequestMessage>,
}

impl OpenAiConversation {
    fn open_stream(
        &self,
        request: &CreateChatCompletionRequest,
    ) -> Result<EventSource, ResponderError> {
        let mut events = self
            .http
            .post(self.config.url("/chat/completions"))
            .query(&self.config.query())
            .headers(self.config.headers())
            .json(request)
            .eventsource()
            .map_err(|e| ResponderError::Other(e.to_string()))?;
        events.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));
        Ok(events)
    }
}

#[async_trait]
impl Conversation for OpenAiConversation {
    async fn send_streaming<'a>(
        &'a mut self,
        text: &str,
    ) -> Result<FragmentStream<'a>, ResponderError> {
        let checkpoint = self.history.len();
        self.history
            .push(ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(text)));

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(self.history.clone())
            .stream(true)
            .build();

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                self.history.truncate(checkpoint);
                return Err(e.into());
            }
        };

        debug!("Sending request with {} messages", self.history.len());

        let events = match self.open_stream(&request) {
            Ok(events) => events,
            Err(e) => {
                self.history.truncate(checkpoint);
                return Err(e);
            }
        };

        let state = ReplyState {
            events,
            history: &mut self.history,
            checkpoint,
            reply: String::new(),
            finished: false,
        };

        Ok(futures::stream::unfold(state, next_fragment).boxed())
    }
}

struct ReplyState<'a> {
    events: EventSource,
    history: &'a mut Vec<ChatCompletionRequestMessage>,
    checkpoint: usize,
    reply: String,
    finished: bool,
}

impl ReplyState<'_> {
    fn complete(&mut self) {
        self.events.close();
        self.history.push(ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessage::from(self.reply.as_str()),
        ));
    }

    fn fail(&mut self, err: &ResponderError) {
        error!("Received error: {}", err);
        self.events.close();
        self.history.truncate(self.checkpoint);
        self.finished = true;
    }
}

/// Pull the next non-empty fragment. On a clean end of stream the reply is
/// recorded as an assistant message; on error the user message is rolled back.
async fn next_fragment<'a>(
    mut state: ReplyState<'a>,
) -> Option<(Result<String, ResponderError>, ReplyState<'a>)> {
    if state.finished {
        return None;
    }

    loop {
        let err = match state.events.next().await {
            Some(Ok(Event::Open)) => continue,
            Some(Ok(Event::Message(message))) if message.data == "[DONE]" => {
                state.complete();
                return None;
            }
            Some(Ok(Event::Message(message))) => {
                match serde_json::from_str::<CreateChatCompletionStreamResponse>(&message.data) {
                    Ok(response) => {
                        let fragment: String = response
                            .choices
                            .iter()
                            .filter_map(|choice| choice.delta.content.as_deref())
                            .collect();
                        if fragment.is_empty() {
                            continue;
                        }
                        state.reply.push_str(&fragment);
                        return Some((Ok(fragment), state));
                    }
                    Err(e) => match serde_json::from_str::<WrappedError>(&message.data) {
                        Ok(wrapped) => ResponderError::Api(wrapped.error.to_string()),
                        Err(_) => ResponderError::Other(format!("malformed stream chunk: {e}")),
                    },
                }
            }
            Some(Err(EventSourceError::StreamEnded)) | None => {
                state.complete();
                return None;
            }
            Some(Err(e)) => stream_error(e).await,
        };
        state.fail(&err);
        return Some((Err(err), state));
    }
}

/// An error status is an API error; its `{"error": ...}` body is kept when present.
async fn stream_error(err: EventSourceError) -> ResponderError {
    match err {
        EventSourceError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<WrappedError>(&body) {
                Ok(wrapped) => ResponderError::Api(wrapped.error.to_string()),
                Err(_) if body.trim().is_empty() => ResponderError::Api(status.to_string()),
                Err(_) => ResponderError::Api(format!("{status}: {}", body.trim())),
            }
        }
        other => ResponderError::Other(other.to_string()),
    }
}
