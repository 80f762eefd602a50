//! Resolves file paths (with extension search) and imports plugin
//! descriptors; [`PluginLoader`] recursively bootstraps plugins.
//!

use crate::config::{FsIf, ServerConfig};
use crate::Error;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Resolves a pathname against a search list of extensions and reads
/// the descriptor at the resolved path.
///
pub struct ConfigLoader {
    pub cwd: PathBuf,
    pub fs: FsIf,
    pub key: String,
    pub extnames: Vec<String>,
}

impl ConfigLoader {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            cwd: config.cwd.clone(),
            fs: config.fs.clone(),
            key: config.key.clone(),
            extnames: config.extnames.clone(),
        }
    }

    /// Resolve `pathname`, relative to `cwd`, trying it verbatim and
    /// then every configured extension in order. Directory-style
    /// entries (`plugins.js`, `package.json`, ...) are looked up inside
    /// `pathname` as a directory; suffix-style entries (`.js`, `.json`,
    /// ...) are appended to `pathname` itself.
    ///
    pub fn resolve(&self, pathname: &str) -> Option<PathBuf> {
        let base = self.cwd.join(pathname);
        if self.fs.exists(&base) && !self.fs.is_dir(&base) {
            return Some(base);
        }
        for ext in &self.extnames {
            let candidate = if ext.starts_with('.') {
                let mut with_ext = base.clone().into_os_string();
                with_ext.push(ext);
                PathBuf::from(with_ext)
            } else {
                base.join(ext)
            };
            if self.fs.exists(&candidate) && !self.fs.is_dir(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Resolve and read `pathname`, applying one level of `default`
    /// unwrapping and, failing that, the configured key unwrapping.
    ///
    /// If resolution fails, `default_value` (supplied by the caller, not
    /// to be confused with the descriptor's own `default` field) is
    /// returned instead of raising [`Error::ResolveFailure`].
    ///
    pub fn load(
        &self,
        pathname: &str,
        default_value: Option<Value>,
    ) -> Result<Value, Error> {
        let path = match self.resolve(pathname) {
            Some(path) => path,
            None => {
                return default_value
                    .ok_or_else(|| Error::resolve_failure(pathname))
            }
        };
        let text = self
            .fs
            .read(&path)
            .map_err(|e| Error::other(format!("{}: {}", path.display(), e)))?;
        let mut value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::other(format!("{}: {}", path.display(), e)))?;
        if let Value::Object(map) = &value {
            if let Some(default_field) = map.get("default") {
                value = default_field.clone();
            } else if let Some(keyed) = map.get(&self.key) {
                value = keyed.clone();
            }
        }
        Ok(value)
    }
}

const KNOWN_SUFFIXES: &[&str] = &[".js", ".json", ".ts"];

fn canonical_name(root: &Path, resolved: &Path) -> String {
    let rel = resolved.strip_prefix(root).unwrap_or(resolved);
    let mut name = rel.to_string_lossy().replace('\\', "/");
    name = name.trim_start_matches('/').to_string();
    for suffix in KNOWN_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
            break;
        }
    }
    name.trim_end_matches('/').to_string()
}

/// A plugin entry, as declared in `config.plugins` or discovered under
/// `config.modules`.
///
pub type PluginEntry = (String, Value);

/// Recursively bootstraps a declared plugin list.
///
/// Each declared entry is loaded; if the loaded value is an array, it is
/// a nested plugin list and a child `PluginLoader` rooted at the
/// enclosing directory recurses into it. Otherwise the callback is
/// invoked once with the plugin's canonical name (the resolved path,
/// stripped of the search root and file extension) and its loaded
/// value.
///
pub struct PluginLoader {
    root: PathBuf,
    config_loader: ConfigLoader,
    declared: Vec<String>,
    bootstrapped: bool,
}

impl PluginLoader {
    pub fn new(config: &ServerConfig) -> Self {
        let config_loader = ConfigLoader::from_config(config);
        let declared = config.plugins.clone().unwrap_or_else(|| {
            config
                .modules
                .as_ref()
                .map(|m| vec![m.to_string_lossy().to_string()])
                .unwrap_or_default()
        });
        Self {
            root: config.cwd.clone(),
            config_loader,
            declared,
            bootstrapped: false,
        }
    }

    fn child(&self, root: PathBuf, declared: Vec<String>) -> Self {
        let mut config_loader = ConfigLoader {
            cwd: root.clone(),
            fs: self.config_loader.fs.clone(),
            key: self.config_loader.key.clone(),
            extnames: self.config_loader.extnames.clone(),
        };
        if config_loader.cwd.as_os_str().is_empty() {
            config_loader.cwd = self.root.clone();
        }
        Self {
            root,
            config_loader,
            declared,
            bootstrapped: false,
        }
    }

    /// Idempotent: a second call is a no-op and does not re-invoke
    /// `callback`.
    ///
    pub fn bootstrap(
        &mut self,
        callback: &mut dyn FnMut(String, Value),
    ) -> Result<(), Error> {
        if self.bootstrapped {
            return Ok(());
        }
        for entry in self.declared.clone() {
            self.bootstrap_entry(&entry, callback)?;
        }
        self.bootstrapped = true;
        Ok(())
    }

    fn bootstrap_entry(
        &self,
        entry: &str,
        callback: &mut dyn FnMut(String, Value),
    ) -> Result<(), Error> {
        let resolved = self
            .config_loader
            .resolve(entry)
            .ok_or_else(|| Error::resolve_failure(entry))?;
        let loaded = self.config_loader.load(entry, None)?;
        match loaded {
            Value::Array(items) => {
                let enclosing_dir = if self.config_loader.fs.is_dir(&resolved) {
                    resolved.clone()
                } else {
                    resolved
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone())
                };
                let nested: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                let mut child = self.child(enclosing_dir, nested);
                child.bootstrap(callback)?;
            }
            other => {
                let name = canonical_name(&self.root, &resolved);
                callback(name, other);
            }
        }
        Ok(())
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Fs;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MemFs {
        files: Mutex<HashMap<PathBuf, String>>,
    }

    impl MemFs {
        fn with(files: &[(&str, &str)]) -> Arc<Self> {
            let mut map = HashMap::new();
            for (path, content) in files {
                map.insert(PathBuf::from(path), content.to_string());
            }
            Arc::new(Self {
                files: Mutex::new(map),
            })
        }
    }

    impl Fs for MemFs {
        fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }
        fn is_dir(&self, _path: &Path) -> bool {
            false
        }
        fn read(&self, path: &Path) -> std::io::Result<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
        fn realpath(&self, path: &Path) -> std::io::Result<PathBuf> {
            Ok(path.to_path_buf())
        }
        fn write(&self, path: &Path, contents: &str) -> std::io::Result<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), contents.to_string());
            Ok(())
        }
    }

    fn config_with(fs: Arc<MemFs>, plugins: Vec<&str>) -> ServerConfig {
        let mut config = ServerConfig::new();
        config.cwd = PathBuf::from("/");
        config.fs = FsIf::new(fs);
        config.plugins = Some(plugins.into_iter().map(str::to_string).collect());
        config
    }

    #[test]
    fn resolve_failure_with_no_default_is_an_error() {
        let fs = MemFs::with(&[]);
        let config = config_with(fs, vec!["a.js"]);
        let loader = ConfigLoader::from_config(&config);
        assert!(matches!(
            loader.load("a.js", None),
            Err(Error::ResolveFailure(_))
        ));
    }

    #[test]
    fn resolve_failure_with_a_default_returns_it() {
        let fs = MemFs::with(&[]);
        let config = config_with(fs, vec!["a.js"]);
        let loader = ConfigLoader::from_config(&config);
        let value = loader
            .load("a.js", Some(Value::String("fallback".to_string())))
            .unwrap();
        assert_eq!(value, Value::String("fallback".to_string()));
    }

    #[test]
    fn bootstrap_recurses_through_nested_plugin_lists() {
        let fs = MemFs::with(&[
            ("/a.js", r#"["b.js"]"#),
            ("/b.js", r#"{"hello": "world"}"#),
        ]);
        let config = config_with(fs, vec!["a.js"]);
        let mut loader = PluginLoader::new(&config);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        loader
            .bootstrap(&mut |name, value| {
                seen2.lock().unwrap().push((name, value));
            })
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "b");
    }

    #[test]
    fn bootstrap_twice_does_not_reinvoke_the_callback() {
        let fs = MemFs::with(&[("/a.js", r#"{"k": 1}"#)]);
        let config = config_with(fs, vec!["a.js"]);
        let mut loader = PluginLoader::new(&config);
        let calls = Arc::new(Mutex::new(0));
        let calls2 = calls.clone();
        loader
            .bootstrap(&mut |_name, _value| {
                *calls2.lock().unwrap() += 1;
            })
            .unwrap();
        loader
            .bootstrap(&mut |_name, _value| {
                *calls.lock().unwrap() += 1;
            })
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
