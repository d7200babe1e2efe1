//! `plugdeck-core`: data model, error taxonomy and collaborator traits shared by the engine.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ScriptError, ScriptResult};
pub use traits::{Execution, Executor, Fetcher, HeaderParser, Persistence};
pub use types::{
    DependencyRef, Exports, Headers, Script, ScriptDeclaration, ScriptKind, ScriptRecord,
    ScriptState, ScriptVariant, StopHook,
};
