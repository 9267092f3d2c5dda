//! The flag set and launch options the [`crate::process`] supervisor turns
//! into a browser command line (spec §3 "Flag set", §4.6, §6).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// The value a single command-line flag carries.
///
/// `Bool(true)` emits `--key`, `Value(v)` emits `--key=v`, `Bool(false)`
/// omits the flag entirely (spec §3: "Keys map to: a boolean (emit `--key`),
/// a string (emit `--key=value`), or absence (omit)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Bool(bool),
    Value(String),
}

/// An ordered set of `(key -> value)` command-line flags.
///
/// Order is preserved because some Chromium flags are sensitive to the
/// order other flags appear in; insertion order is what ends up on the
/// spawned process's argv.
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    order: Vec<String>,
    values: HashMap<String, FlagValue>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default flag set every session starts from (spec §6).
    pub fn defaults() -> Self {
        let mut flags = Self::new();
        flags.set_bool("headless", true);
        #[cfg(target_os = "linux")]
        flags.set_bool("disable-gpu", true);
        flags.set_bool("no-first-run", true);
        flags.set_bool("no-default-browser-check", true);
        flags.set_bool("disable-background-networking", true);
        flags.set_bool("disable-extensions", true);
        flags.set_bool("disable-sync", true);
        flags.set_bool("disable-client-side-phishing-detection", true);
        flags.set_bool("mute-audio", true);
        flags.set_bool("remote-debugging-pipe", true);
        flags
    }

    /// Insert or overwrite a boolean flag (`--key` when `true`, omitted when
    /// `false`).
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) -> &mut Self {
        self.insert(key.into(), FlagValue::Bool(value))
    }

    /// Insert or overwrite a valued flag (`--key=value`).
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.insert(key.into(), FlagValue::Value(value.into()))
    }

    /// Remove a flag entirely, as though it had never been set.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        if self.values.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
        self
    }

    fn insert(&mut self, key: String, value: FlagValue) -> &mut Self {
        if !self.values.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.values.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FlagValue> {
        self.values.get(key)
    }

    /// Render the flag set into a `--flag`/`--flag=value` argument vector,
    /// in insertion order.
    pub fn to_args(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|key| match self.values.get(key) {
                Some(FlagValue::Bool(true)) => Some(format!("--{key}")),
                Some(FlagValue::Bool(false)) | None => None,
                Some(FlagValue::Value(v)) => Some(format!("--{key}={v}")),
            })
            .collect()
    }
}

/// How the caller wants the browser launched (spec §4.6).
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Absolute path to the executable, overriding discovery.
    pub executable: Option<PathBuf>,
    /// Use an existing directory instead of a fresh one under the output
    /// root.
    pub user_data_dir: Option<PathBuf>,
    /// The command-line flag set, seeded from [`FlagSet::defaults`].
    pub flags: FlagSet,
    /// Process-wide override for where per-session output directories are
    /// rooted; defaults to `CDP_OUTPUT_ROOT` or the OS temp directory.
    pub output_root: Option<PathBuf>,
    /// Environment variables passed through to the child process.
    pub env: HashMap<String, String>,
    /// How long to wait for the startup handshake (`Browser.getVersion`)
    /// before failing with [`crate::error::SessionInitError::HandshakeFailed`].
    pub startup_timeout: Duration,
    /// If no frame of any kind arrives within this window, the session
    /// cancels itself as though the caller had cancelled the root scope.
    pub idle_timeout: Duration,
    /// How long `Scope::close` waits for a graceful `Browser.close` exit
    /// before falling through to `Scope::cancel` (spec §4.1 Teardown).
    pub close_grace_period: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            executable: None,
            user_data_dir: None,
            flags: FlagSet::defaults(),
            output_root: None,
            env: HashMap::new(),
            startup_timeout: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(30),
            close_grace_period: Duration::from_secs(5),
        }
    }
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn user_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_data_dir = Some(path.into());
        self
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.flags.set_bool("headless", headless);
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.set_value(key, value);
        self
    }

    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.flags.set_bool(key, true);
        self
    }

    pub fn remove_arg(mut self, key: &str) -> Self {
        self.flags.remove(key);
        self
    }

    pub fn output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}
