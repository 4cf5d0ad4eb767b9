//! nbdkit plugins, filters and per-plugin source rendering.

use std::collections::HashMap;

use url::Url;

/// nbdkit access plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NbdkitPlugin {
    /// Fetches the image over HTTP(S).
    Curl,
    /// Any other plugin, passed to nbdkit by name.
    Other(String),
}

impl NbdkitPlugin {
    pub fn name(&self) -> &str {
        match self {
            Self::Curl => "curl",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for NbdkitPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for NbdkitPlugin {
    fn from(name: &str) -> Self {
        match name {
            "curl" => Self::Curl,
            other => Self::Other(other.to_string()),
        }
    }
}

/// nbdkit content filter.
///
/// nbdkit layers filters right to left: the last one listed sits closest to
/// the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NbdkitFilter {
    Xz,
    Tar,
    Gzip,
}

impl NbdkitFilter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Xz => "xz",
            Self::Tar => "tar",
            Self::Gzip => "gzip",
        }
    }
}

impl std::fmt::Display for NbdkitFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for NbdkitFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "xz" => Ok(Self::Xz),
            "tar" => Ok(Self::Tar),
            "gzip" => Ok(Self::Gzip),
            _ => Err(format!("unknown nbdkit filter: '{}' (supported: xz, tar, gzip)", s)),
        }
    }
}

/// Renders a source locator into the plugin's `key=value` argument.
pub type RenderSource = fn(&Url) -> String;

fn render_curl(url: &Url) -> String {
    format!("url={}", url)
}

/// Lookup from plugin kind to its source renderer.
///
/// Plugins without a renderer get an empty source token.
#[derive(Clone)]
pub struct SourceRenderers {
    renderers: HashMap<NbdkitPlugin, RenderSource>,
}

impl std::fmt::Debug for SourceRenderers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.renderers.keys()).finish()
    }
}

impl SourceRenderers {
    /// A lookup with no renderers at all.
    pub fn empty() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }

    /// Register (or replace) the renderer for a plugin.
    pub fn register(&mut self, plugin: NbdkitPlugin, render: RenderSource) {
        self.renderers.insert(plugin, render);
    }

    pub fn supports(&self, plugin: &NbdkitPlugin) -> bool {
        self.renderers.contains_key(plugin)
    }

    pub fn render(&self, plugin: &NbdkitPlugin, source: &Url) -> String {
        self.renderers
            .get(plugin)
            .map(|render| render(source))
            .unwrap_or_default()
    }
}

impl Default for SourceRenderers {
    fn default() -> Self {
        let mut renderers = Self::empty();
        renderers.register(NbdkitPlugin::Curl, render_curl);
        renderers
    }
}
