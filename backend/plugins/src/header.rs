/// Metadata header parser. Reads the comment block at the top of a script.
///
/// ```text
/// // ==PlugDeck==
/// // @name Clock
/// // @kind plugin
/// // @version 1.2.0
/// // @requires-lib Time https://cdn.example.com/time.js
/// // @optional-lib Tz
/// // @requires-plugin Theme
/// // @download-url https://cdn.example.com/clock.js
/// // ==/PlugDeck==
/// ```
///
/// Parsing stops at the closing marker or the first line of code. Unknown keys
/// and malformed lines are skipped, so parsing never fails.
use plugdeck_core::{DependencyRef, HeaderParser, Headers, ScriptKind};
use tracing::trace;

const BLOCK_END: &str = "==/PlugDeck==";

#[derive(Debug, Default, Clone, Copy)]
pub struct MetaHeaderParser;

impl MetaHeaderParser {
    pub fn new() -> Self {
        Self
    }
}

impl HeaderParser for MetaHeaderParser {
    fn parse(&self, source: &str) -> Headers {
        let mut headers = Headers::default();

        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(comment) = line.strip_prefix("//") else {
                break;
            };
            let comment = comment.trim();
            if comment == BLOCK_END {
                break;
            }
            let Some(entry) = comment.strip_prefix('@') else {
                continue;
            };

            let mut parts = entry.split_whitespace();
            let Some(key) = parts.next() else { continue };
            let value = parts.next();
            let extra = parts.next();

            match (key, value) {
                ("name", Some(v)) => headers.name = v.to_string(),
                ("kind", Some(v)) => {
                    headers.kind = match v.to_ascii_lowercase().as_str() {
                        "library" | "lib" => ScriptKind::Library,
                        _ => ScriptKind::Plugin,
                    }
                }
                ("version", Some(v)) => headers.version = Some(v.to_string()),
                ("description", Some(_)) => {
                    let text = entry.trim_start().strip_prefix(key).unwrap_or_default().trim();
                    headers.description = Some(text.to_string());
                }
                ("requires-lib", Some(v)) => headers.required_lib.push(DependencyRef::library(v, extra)),
                ("optional-lib", Some(v)) => headers.optional_lib.push(DependencyRef::library(v, extra)),
                ("requires-plugin", Some(v)) => {
                    headers.required_plugin.push(DependencyRef::plugin(v, extra))
                }
                ("download-url", Some(v)) => headers.download_url = Some(v.to_string()),
                _ => trace!(key, "Ignoring header entry"),
            }
        }

        headers
    }
}
