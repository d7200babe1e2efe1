use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque value a script hands back to the host when it starts.
pub type Exports = serde_json::Value;

/// The two kinds of installable script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    #[default]
    Plugin,
    Library,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Plugin => write!(f, "plugin"),
            ScriptKind::Library => write!(f, "library"),
        }
    }
}

/// Runtime state of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Errored,
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptState::Stopped => "stopped",
            ScriptState::Starting => "starting",
            ScriptState::Running => "running",
            ScriptState::Stopping => "stopping",
            ScriptState::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// A named reference to another script, optionally with a place to fetch it from.
///
/// `kind` is the kind implied by the header list the reference was declared in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub kind: ScriptKind,
}

impl DependencyRef {
    pub fn library(name: impl Into<String>, url: Option<&str>) -> Self {
        Self {
            name: name.into(),
            url: url.map(str::to_string),
            kind: ScriptKind::Library,
        }
    }

    pub fn plugin(name: impl Into<String>, url: Option<&str>) -> Self {
        Self {
            name: name.into(),
            url: url.map(str::to_string),
            kind: ScriptKind::Plugin,
        }
    }
}

/// Structured metadata parsed out of a script's source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Headers {
    pub name: String,
    pub kind: ScriptKind,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_lib: Vec<DependencyRef>,
    #[serde(default)]
    pub optional_lib: Vec<DependencyRef>,
    /// Only honoured when the declaring script is a Plugin.
    #[serde(default)]
    pub required_plugin: Vec<DependencyRef>,
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Anything that declares a name, a kind and dependency lists.
pub trait ScriptDeclaration {
    fn name(&self) -> &str;
    fn kind(&self) -> ScriptKind;
    fn headers(&self) -> &Headers;

    /// Required edges: libraries always, plugins only when the declarer is itself a Plugin.
    fn required_dependencies(&self) -> Vec<&DependencyRef> {
        let headers = self.headers();
        let mut deps: Vec<&DependencyRef> = headers.required_lib.iter().collect();
        if self.kind() == ScriptKind::Plugin {
            deps.extend(headers.required_plugin.iter());
        }
        deps
    }

    fn optional_dependencies(&self) -> Vec<&DependencyRef> {
        self.headers().optional_lib.iter().collect()
    }

    fn requires(&self, name: &str) -> bool {
        self.required_dependencies().iter().any(|d| d.name == name)
    }
}

impl ScriptDeclaration for Headers {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScriptKind {
        self.kind
    }

    fn headers(&self) -> &Headers {
        self
    }
}

/// Zero-argument cleanup callback registered by a running script.
#[derive(Clone)]
pub struct StopHook(Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>);

impl StopHook {
    pub fn new(f: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for StopHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StopHook")
    }
}

/// Kind-specific part of a script record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptVariant {
    Plugin { enabled: bool },
    Library,
}

impl ScriptVariant {
    pub fn kind(&self) -> ScriptKind {
        match self {
            ScriptVariant::Plugin { .. } => ScriptKind::Plugin,
            ScriptVariant::Library => ScriptKind::Library,
        }
    }
}

/// A registered script. The store owns the only copy.
#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub variant: ScriptVariant,
    pub source: String,
    pub headers: Headers,
    pub state: ScriptState,
    pub exports: Option<Exports>,
    pub stop_hooks: Vec<StopHook>,
}

impl Script {
    /// Build a stopped script of the kind its headers declare. Plugins start out disabled.
    pub fn from_headers(source: impl Into<String>, headers: Headers) -> Self {
        let variant = match headers.kind {
            ScriptKind::Plugin => ScriptVariant::Plugin { enabled: false },
            ScriptKind::Library => ScriptVariant::Library,
        };
        Self {
            name: headers.name.clone(),
            variant,
            source: source.into(),
            headers,
            state: ScriptState::Stopped,
            exports: None,
            stop_hooks: Vec::new(),
        }
    }

    pub fn is_plugin(&self) -> bool {
        matches!(self.variant, ScriptVariant::Plugin { .. })
    }

    pub fn is_library(&self) -> bool {
        matches!(self.variant, ScriptVariant::Library)
    }

    /// Libraries have no flag of their own and report `false`.
    pub fn is_enabled(&self) -> bool {
        matches!(self.variant, ScriptVariant::Plugin { enabled: true })
    }

    /// Set the enabled flag. Returns `false` for libraries, which have none.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        match &mut self.variant {
            ScriptVariant::Plugin { enabled: flag } => {
                *flag = enabled;
                true
            }
            ScriptVariant::Library => false,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ScriptState::Running | ScriptState::Errored)
    }

    pub fn record(&self) -> ScriptRecord {
        ScriptRecord {
            name: self.name.clone(),
            kind: self.kind(),
            source: self.source.clone(),
            enabled: self.is_enabled(),
        }
    }
}

impl ScriptDeclaration for Script {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ScriptKind {
        self.variant.kind()
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }
}

/// What gets persisted for each script; headers are re-parsed on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub name: String,
    pub kind: ScriptKind,
    pub source: String,
    #[serde(default)]
    pub enabled: bool,
}
