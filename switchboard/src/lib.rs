//! switchboard: a pluggable, event-driven HTTP request-processing
//! framework.
//!
//! Applications declare routes (method + path pattern) and event
//! listeners; a transport adapter (`switchboard-actix`, `switchboard-fetch`,
//! or a hand-rolled one) receives a request, walks it through a
//! three-phase lifecycle (request -> route dispatch -> response), runs
//! zero or more prioritised listener tasks, and serialises an outbound
//! response.
//!
//! This crate is the routing-and-dispatch engine: [`pattern::PatternEmitter`],
//! [`queue::PriorityQueue`], [`router::Router`], [`loader`]'s plugin
//! bootstrap, [`lifecycle::RouteLifecycle`], and [`server::Server`].
//! Concrete transports, body decoders, and cookie serialisation are left
//! to adapter crates.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod pattern;
pub mod queue;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod status;
pub mod task;

pub use config::{CookieOptions, CookiePriority, DiskFs, Fs, FsIf, Gateway, HandlerOverride, SameSite, ServerConfig};
pub use error::{Error, StackFrame};
pub use lifecycle::RouteLifecycle;
pub use loader::{ConfigLoader, PluginEntry, PluginLoader};
pub use pattern::{canonical_regex, parse_canonical, EventKey, MatchData, PatternEmitter};
pub use queue::PriorityQueue;
pub use request::{Body, BodyLoader, Headers, LoadedBody, Request, RouteMatch};
pub use response::{Dispatcher, Response, SessionRevision};
pub use router::{Route, Router};
pub use server::{abort, CallResult, Plugin, Server};
pub use status::{status_reason_phrase, Status};
pub use task::{task_fn, Task, TaskHandle, TaskOutcome, TaskResult};
