//! Client-side logic for FereeLAB chat.
//!
//! - [`api`]: typed HTTP client for every server endpoint.
//! - [`stream`]: turns a streamed completion body into text deltas.
//! - [`chat`]: conversation state and the send flow.
//! - [`panels`], [`resize`], [`scroll`]: layout state machines, driven by
//!   whatever front end hosts them.
//! - [`storage`]: key-value persistence for UI preferences.

pub mod api;
pub mod chat;
pub mod error;
pub mod panels;
pub mod resize;
pub mod scroll;
pub mod storage;
pub mod stream;

pub use api::{ApiClient, Completion, CompletionStream, ListParams};
pub use chat::{ChatManager, ChatState, Conversation, SendOutcome, SEND_ERROR_TEXT};
pub use error::{ClientError, StorageError};
pub use panels::{Overlay, PanelState};
pub use resize::{ResizablePanel, ResizeConfig};
pub use scroll::{ScrollAction, ScrollTracker, Viewport};
pub use storage::{FileStorage, KeyValueStore, MemoryStorage};
pub use stream::consume_stream;
