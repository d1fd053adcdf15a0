//! The prompt-template collaborator (spec §6). Rendering itself is out of scope;
//! this trait is the seam `PhaseExecutor` calls through. Grounded on
//! `original_source/src/templates/manager.py`'s `Render(name, ctx)` shape.

use std::collections::HashMap;

pub trait TemplateRenderer: Send + Sync {
    /// Render `name` (conventionally `phase_<n>/<task_tag>`) with the given
    /// context. Implementations MAY fail hard on a missing template; the
    /// default renderer below instead degrades to a verbatim dump of the
    /// context, per spec §6.
    fn render(&self, name: &str, ctx: &HashMap<String, String>) -> String;
}

/// Degenerate renderer used when no real template backend is wired in: renders
/// the context verbatim, sorted by key for determinism.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerbatimTemplateRenderer;

impl TemplateRenderer for VerbatimTemplateRenderer {
    fn render(&self, name: &str, ctx: &HashMap<String, String>) -> String {
        let mut keys: Vec<&String> = ctx.keys().collect();
        keys.sort();
        let body = keys
            .into_iter()
            .map(|k| format!("{k}={}", ctx[k]))
            .collect::<Vec<_>>()
            .join("\n");
        format!("[{name}]\n{body}")
    }
}
