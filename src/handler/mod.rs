//! Route handlers.
//!
//! # Data Flow
//! ```text
//! Action route:
//!     ActionCall (request parts, body, session, sink)
//!     → action.rs (user code)
//!     → self-answered: sink response as written
//!     → otherwise: envelope.rs (OK / KO in the produced format)
//!
//! Stream route:
//!     DataStream (fetch if possible)
//!     → codec decode (consumes) → KeyFilter → codec encode (produces)
//!     → or verbatim bytes when a format has no codec
//! ```

pub mod action;
pub mod envelope;
pub mod stream;

use std::fmt;
use std::sync::Arc;

pub use action::{Action, ActionCall, ActionError, ResponseSink, SinkResponse};
pub use stream::{BufferedStream, DataStream, KeyFilter, StreamError};

/// What runs behind a route: exactly one action or one stream.
#[derive(Clone)]
pub enum Handler {
    Action {
        action: Arc<dyn Action>,
        /// The action writes its own response through the sink.
        self_answered: bool,
    },
    Stream {
        stream: Arc<dyn DataStream>,
        filter: Option<KeyFilter>,
    },
}

impl Handler {
    pub fn action(action: impl Action, self_answered: bool) -> Self {
        Self::Action {
            action: Arc::new(action),
            self_answered,
        }
    }

    pub fn stream(stream: impl DataStream) -> Self {
        Self::Stream {
            stream: Arc::new(stream),
            filter: None,
        }
    }

    /// Attach a key filter. No effect on action handlers.
    pub fn with_filter(self, filter: KeyFilter) -> Self {
        match self {
            Self::Stream { stream, .. } => Self::Stream {
                stream,
                filter: Some(filter),
            },
            action => action,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Action { .. } => "action",
            Self::Stream { .. } => "stream",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action { self_answered, .. } => f
                .debug_struct("Action")
                .field("self_answered", self_answered)
                .finish(),
            Self::Stream { filter, .. } => f.debug_struct("Stream").field("filter", filter).finish(),
        }
    }
}
