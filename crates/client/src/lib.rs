//! Parlance client runtime
//!
//! Keeps one conversation's state consistent while an assistant reply
//! streams in. The pieces:
//!
//! - `store`: pure reducer over messages and transient UI flags
//! - `controller`: streams a reply, drives the Store and observer callbacks
//! - `tools`: tool-call activity flag for the reply in flight
//! - `branches`: create, list and activate alternate continuations
//! - `sync`: "sessions changed" broadcast and the live session list
//! - `sessions`: session management intents and reactions
//!
//! All server traffic goes through the `ChatApi` trait; `HttpApi` is the
//! production transport.

pub mod api;
pub mod auth;
pub mod branches;
pub mod config;
pub mod controller;
pub mod error;
pub mod frame;
mod history;
pub mod http;
pub mod runtime;
pub mod sessions;
pub mod sse;
pub mod store;
pub mod sync;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ByteStream, ChatApi};
pub use auth::{StaticToken, TokenProvider};
pub use branches::{BranchActivation, BranchManager};
pub use config::ClientConfig;
pub use controller::{
    Completion, Silent, StreamController, StreamObserver, StreamOptions, StreamPhase,
};
pub use error::{ClientError, ErrorKind};
pub use frame::StreamEvent;
pub use http::HttpApi;
pub use runtime::Runtime;
pub use sessions::SessionDirectory;
pub use store::{reduce, Action, Store, StoreState};
pub use sync::{NoopNotifier, SessionListWatch, SessionNotifier, SessionSync, SessionsChanged};
pub use tools::{ToolCallAssembler, ToolCallDelta, ToolTracker};
