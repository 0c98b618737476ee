//! # Chat Session
//!
//! [`ChatSession`] owns one conversation handle and the transcript the user sees.
//!
//! ## Lifecycle
//!
//! ```text
//!   Pending ──ensure_session()──▶ Ready ──send()──▶ Ready ...
//!      │
//!      └── service rejects ──▶ Unusable (every later call fails, no retry)
//! ```
//!
//! The handle is created lazily: the first [`ChatSession::send`] calls
//! [`ChatSession::ensure_session`] if nobody did before.
//!
//! ## Failure policy
//!
//! Errors from the model service never escape [`ChatSession::send`]. They are rendered
//! as text, shown on the surface and appended as the assistant turn, and the session
//! stays usable. Only a failure to create the session is returned to the caller.

use futures::StreamExt;
use tracing::{debug, error, info};

use crate::{
    error::{ResponderError, SessionError},
    responder::{Conversation, Responder},
    surface::Surface,
    transcript::{Transcript, Turn},
};

enum Handle {
    Pending,
    Ready(Box<dyn Conversation>),
    Unusable(String),
}

/// Outcome of one [`ChatSession::send`]. Both variants were appended to the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The full streamed answer.
    Complete(String),
    /// The model service failed; this is the error text recorded in its place.
    Failed(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Complete(text) | Reply::Failed(text) => text,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Reply::Complete(_))
    }
}

/// One chat conversation and its transcript.
pub struct ChatSession {
    responder: Box<dyn Responder>,
    model: String,
    handle: Handle,
    transcript: Transcript,
}

impl ChatSession {
    /// A session bound to `model` whose transcript starts with `greeting`.
    ///
    /// Nothing is sent to the service until the session is first used.
    pub fn new(
        responder: Box<dyn Responder>,
        model: impl Into<String>,
        greeting: impl Into<String>,
    ) -> Self {
        Self {
            responder,
            model: model.into(),
            handle: Handle::Pending,
            transcript: Transcript::seeded(greeting),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `true` once a conversation handle exists.
    pub fn is_ready(&self) -> bool {
        matches!(self.handle, Handle::Ready(_))
    }

    /// `false` after a failed creation attempt.
    pub fn is_usable(&self) -> bool {
        !matches!(self.handle, Handle::Unusable(_))
    }

    /// Create the conversation handle if it does not exist yet.
    ///
    /// Calling this on a ready session does nothing.
    ///
    /// # Errors
    /// - [`SessionError::Creation`] when the service rejects the conversation. The
    ///   session is marked unusable.
    /// - [`SessionError::Unusable`] on every call after that.
    pub async fn ensure_session(&mut self) -> Result<(), SessionError> {
        match &self.handle {
            Handle::Ready(_) => return Ok(()),
            Handle::Unusable(reason) => return Err(SessionError::Unusable(reason.clone())),
            Handle::Pending => {}
        }

        debug!("Creating conversation for model {}", self.model);
        match self.responder.create_conversation(&self.model).await {
            Ok(conversation) => {
                info!("Conversation created for model {}", self.model);
                self.handle = Handle::Ready(conversation);
                Ok(())
            }
            Err(e) => {
                error!("Could not create conversation: {}", e);
                let reason = e.to_string();
                self.handle = Handle::Unusable(reason.clone());
                Err(SessionError::Creation(reason))
            }
        }
    }

    /// Send one user message and record the streamed answer.
    ///
    /// Appends the user turn, streams the reply onto `surface` fragment by fragment,
    /// then appends the assistant turn. When the service fails, the assistant turn
    /// holds the error text instead and [`Reply::Failed`] is returned.
    ///
    /// # Errors
    /// Only session creation errors (see [`ChatSession::ensure_session`]). Nothing is
    /// appended to the transcript in that case.
    pub async fn send(
        &mut self,
        text: &str,
        surface: &mut dyn Surface,
    ) -> Result<Reply, SessionError> {
        self.ensure_session().await?;
        let Handle::Ready(conversation) = &mut self.handle else {
            return Err(SessionError::Unusable("no conversation handle".into()));
        };

        let user_turn = Turn::user(text);
        surface.show_turn(&user_turn);
        self.transcript.push(user_turn);

        surface.begin_reply();
        let outcome = stream_reply(conversation.as_mut(), text, surface).await;
        surface.end_reply();

        let reply = match outcome {
            Ok(answer) => Reply::Complete(answer),
            Err(e) => {
                error!("Responder failed: {}", e);
                let message = e.to_string();
                surface.error(&message);
                Reply::Failed(message)
            }
        };

        self.transcript.push(Turn::assistant(reply.text()));
        Ok(reply)
    }
}

async fn stream_reply(
    conversation: &mut dyn Conversation,
    text: &str,
    surface: &mut dyn Surface,
) -> Result<String, ResponderError> {
    let mut fragments = conversation.send_streaming(text).await?;
    let mut answer = String::new();

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        surface.reply_fragment(&fragment);
        answer.push_str(&fragment);
    }

    debug!("Reply complete ({} bytes)", answer.len());
    Ok(answer)
}
