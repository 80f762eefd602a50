//! Server-wide configuration: the pluggable filesystem abstraction, the
//! loader's resolution parameters, and the cookie-serialisation options
//! threaded to an adapter.
//!

use crate::request::Request;
use crate::response::Response;
use crate::server::Server;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The file-system operations the [`Loader`](crate::loader) needs.
///
/// Kept as a trait, rather than calling `std::fs` directly, so tests can
/// swap in an in-memory implementation -- the same role a pluggable
/// connection handle plays for swapping out a real database connection.
///
pub trait Fs: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> std::io::Result<String>;
    fn realpath(&self, path: &Path) -> std::io::Result<PathBuf>;
    fn write(&self, path: &Path, contents: &str) -> std::io::Result<()>;
}

/// A real, disk-backed [`Fs`].
///
pub struct DiskFs;

impl Fs for DiskFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn realpath(&self, path: &Path) -> std::io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn write(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        std::fs::write(path, contents)
    }
}

/// A shared, interchangeable [`Fs`] backend.
///
#[derive(Clone)]
pub struct FsIf(Arc<dyn Fs>);

impl FsIf {
    pub fn new(fs: Arc<dyn Fs>) -> Self {
        Self(fs)
    }

    pub fn disk() -> Self {
        Self(Arc::new(DiskFs))
    }
}

impl std::ops::Deref for FsIf {
    type Target = dyn Fs;
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// `cookie.priority`.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CookiePriority {
    Low,
    Medium,
    High,
}

/// `cookie.sameSite`.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SameSite {
    True,
    False,
    Lax,
    Strict,
    None,
}

/// Options threaded to the `Set-Cookie` serialiser (implemented by each
/// adapter, not by the core).
///
#[derive(Clone, Debug)]
pub struct CookieOptions {
    pub domain: Option<String>,
    pub expires: Option<i64>,
    pub http_only: bool,
    pub max_age: Option<i64>,
    pub path: Option<String>,
    pub priority: Option<CookiePriority>,
    pub same_site: Option<SameSite>,
    pub secure: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            domain: None,
            expires: None,
            http_only: true,
            max_age: None,
            path: Some("/".to_string()),
            priority: None,
            same_site: None,
            secure: false,
        }
    }
}

/// Overrides [`Server::dispatch`](crate::server::Server::dispatch)'s
/// default request->lifecycle translation. Installed by an adapter (or a
/// test) that wants to skip the ordinary `request -> route -> response`
/// phases entirely.
///
pub type HandlerOverride = Arc<
    dyn for<'a> Fn(
            &'a Server,
            &'a mut Request,
            &'a mut Response,
        ) -> BoxFuture<'a, ()>
        + Send
        + Sync,
>;

/// A factory that produces a listening server bound to a specific
/// adapter; `config.gateway` threads this through to whichever adapter
/// ends up calling [`Server::serve`](crate::server::Server::serve).
///
pub type Gateway =
    Arc<dyn Fn(Arc<Server>) -> BoxFuture<'static, std::io::Result<()>> + Send + Sync>;

/// Configuration recognised by the core, per the adapter contract.
///
pub struct ServerConfig {
    /// Base path for relative resolution.
    pub cwd: PathBuf,
    /// File-system abstraction used by the [`Loader`](crate::loader).
    pub fs: FsIf,
    /// Field name to unwrap from object-shaped descriptors.
    pub key: String,
    /// Ordered list of suffixes tried when resolving.
    pub extnames: Vec<String>,
    /// Explicit list of plugin path strings (overrides discovery).
    pub plugins: Option<Vec<String>>,
    /// Root directory whose prefix is stripped when computing plugin
    /// names.
    pub modules: Option<PathBuf>,
    pub cookie: CookieOptions,
    /// Override for `Server::dispatch`'s transport-native entry point.
    pub handler: Option<HandlerOverride>,
    /// Factory that produces a listening server bound to an adapter.
    pub gateway: Option<Gateway>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            fs: FsIf::disk(),
            key: "plugins".to_string(),
            extnames: vec![
                "plugins.js".to_string(),
                "plugins.json".to_string(),
                "package.json".to_string(),
                "plugins.ts".to_string(),
                ".js".to_string(),
                ".json".to_string(),
                ".ts".to_string(),
            ],
            plugins: None,
            modules: None,
            cookie: CookieOptions::default(),
            handler: None,
            gateway: None,
        }
    }
}
