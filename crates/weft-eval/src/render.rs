//! Final source rendering.
//!
//! Turns a compiled artifact into the text handed to the host execute
//! primitive: async wrapper, dynamic-module helper variables, and the
//! source-map annotation, each per configuration.

use weft_registry::CompileData;

/// Configuration for one render.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Wrap the body for awaitable top-level execution.
    pub async_wrap: bool,
    /// Inject the dynamic-module helper variables.
    pub helper_vars: bool,
    /// Name of the runtime binding visible to the module body.
    pub runtime_name: String,
    /// Append the source-map annotation.
    pub source_map: bool,
}

/// Collaborator that renders final runnable source.
pub trait SourceRenderer {
    fn render(&self, data: &CompileData, options: &RenderOptions) -> String;
}

/// Plain-text renderer used when no host-specific rendering is plugged in.
#[derive(Debug, Default)]
pub struct DefaultRenderer;

impl SourceRenderer for DefaultRenderer {
    fn render(&self, data: &CompileData, options: &RenderOptions) -> String {
        let code = data.code.as_deref().unwrap_or("");
        let mut out = String::new();
        if options.helper_vars {
            out.push_str(&format!(
                "var exports={0}.exports,module={0};\n",
                options.runtime_name
            ));
        }
        if options.async_wrap {
            out.push_str("(async function(){\n");
            out.push_str(code);
            out.push_str("\n})();");
        } else {
            out.push_str(code);
        }
        if options.source_map {
            out.push_str(&format!("\n//# sourceMappingURL={}.map", options.runtime_name));
        }
        out
    }
}
