//! Label rendering
//!
//! Every counter label carries a value template such as `{Host}` or
//! `{Method} {Path}`. For each matching event the templates are rendered from
//! the event properties; a label whose property is missing falls back to a
//! process-wide default or, failing that, causes the observation to be
//! skipped.

use crate::event::LogEvent;
use crate::filter::{QUOTE_CHARS, is_level_key};
use regex::Regex;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("valid placeholder regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error(
        "Label template '{0}' must reference exactly one property when no label name is given"
    )]
    CannotDeriveName(String),
}

/// Maps physical property names to canonical label names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelAliases {
    by_property: BTreeMap<String, String>,
}

impl Default for LabelAliases {
    fn default() -> Self {
        Self::empty()
            .with_alias("Host", "host")
            .with_alias("AssemblyName", "assembly")
    }
}

impl LabelAliases {
    pub fn empty() -> Self {
        Self {
            by_property: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, property: impl Into<String>, label: impl Into<String>) -> Self {
        self.by_property.insert(property.into(), label.into());
        self
    }

    /// Canonical label name for a property: its alias, or the lower-cased name
    pub fn label_for_property(&self, property: &str) -> String {
        self.by_property
            .get(property)
            .cloned()
            .unwrap_or_else(|| property.to_lowercase())
    }
}

/// Fallback label values used when an event lacks the property a label is
/// rendered from. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultLabelValues {
    values: BTreeMap<String, String>,
}

impl DefaultLabelValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults describing the running process: `host` and `assembly`
    pub fn from_environment() -> Self {
        let host = ["HOSTNAME", "COMPUTERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| "localhost".to_string());

        let assembly = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

        Self::new().with("host", host).with("assembly", assembly)
    }

    pub fn with(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(label.into(), value.into());
        self
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.values.get(label).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Property(String),
}

/// A label value template compiled into literal and placeholder segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl LabelTemplate {
    pub fn compile(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER_RE.captures_iter(source) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            segments.push(Segment::Property(name.as_str().trim().to_string()));
            last = whole.end();
        }

        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }

        Self {
            source: source.to_string(),
            segments,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Property names referenced by the template, in order
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Property(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render against an event. Returns `None` when a referenced property is
    /// absent or the rendered value is empty.
    pub fn render(&self, event: &LogEvent) -> Option<String> {
        with_render_buffer(|buf| {
            for segment in &self.segments {
                match segment {
                    Segment::Literal(text) => buf.push_str(text),
                    Segment::Property(name) if is_level_key(name) => {
                        buf.push_str(event.level.as_str())
                    }
                    Segment::Property(name) => buf.push_str(&event.property_text(name)?),
                }
            }

            let value = buf.trim_matches(QUOTE_CHARS);
            (!value.is_empty()).then(|| value.to_string())
        })
    }
}

thread_local! {
    static RENDER_BUFFER: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Run `f` with a cleared per-thread scratch buffer.
///
/// The buffer is taken out of the slot for the duration of the call, so a
/// nested call allocates its own instead of sharing.
fn with_render_buffer<T>(f: impl FnOnce(&mut String) -> T) -> T {
    let mut buf = RENDER_BUFFER
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_default();
    buf.clear();

    let result = f(&mut buf);

    buf.clear();
    RENDER_BUFFER.with(|slot| *slot.borrow_mut() = Some(buf));
    result
}

/// One declared label of a metric: its name and value template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    pub template: LabelTemplate,
}

impl LabelSpec {
    pub fn new(name: impl Into<String>, template: &str) -> Self {
        Self {
            name: name.into(),
            template: LabelTemplate::compile(template),
        }
    }

    /// Build a label, deriving the name through `aliases` when none is given
    pub fn resolve(
        name: Option<&str>,
        template: &str,
        aliases: &LabelAliases,
    ) -> Result<Self, LabelError> {
        let template = LabelTemplate::compile(template);

        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                let mut props = template.properties();
                match (props.next(), props.next()) {
                    (Some(prop), None) => aliases.label_for_property(prop),
                    _ => return Err(LabelError::CannotDeriveName(template.source.clone())),
                }
            }
        };

        Ok(Self { name, template })
    }
}

/// Outcome of rendering a metric's labels for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    /// Every label resolved
    Ready(BTreeMap<String, String>),
    /// A label could not be resolved and has no default
    Skip { label: String },
}

/// Renders the labels of one metric
#[derive(Debug, Clone)]
pub struct LabelRenderer {
    labels: Vec<LabelSpec>,
    defaults: Arc<DefaultLabelValues>,
}

impl LabelRenderer {
    pub fn new(labels: Vec<LabelSpec>, defaults: Arc<DefaultLabelValues>) -> Self {
        Self { labels, defaults }
    }

    pub fn render(&self, event: &LogEvent) -> LabelOutcome {
        let mut values = BTreeMap::new();

        for label in &self.labels {
            let value = match label.template.render(event) {
                Some(value) => value,
                None => match self.defaults.get(&label.name) {
                    Some(fallback) => fallback.to_string(),
                    None => {
                        return LabelOutcome::Skip {
                            label: label.name.clone(),
                        };
                    }
                },
            };
            values.insert(label.name.clone(), value);
        }

        LabelOutcome::Ready(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;

    fn defaults() -> Arc<DefaultLabelValues> {
        Arc::new(DefaultLabelValues::new().with("host", "localhost"))
    }

    #[test]
    fn test_template_segments() {
        let template = LabelTemplate::compile("{Method} {Path}!");
        assert_eq!(template.properties().collect::<Vec<_>>(), vec!["Method", "Path"]);

        let event = LogEvent::new(Level::Information, "x")
            .with_property("Method", "GET")
            .with_property("Path", "/api");
        assert_eq!(template.render(&event).as_deref(), Some("GET /api!"));
    }

    #[test]
    fn test_template_without_placeholders_is_constant() {
        let template = LabelTemplate::compile("static");
        assert_eq!(
            template.render(&LogEvent::default()).as_deref(),
            Some("static")
        );
    }

    #[test]
    fn test_template_renders_level() {
        let template = LabelTemplate::compile("{@Level}");
        let event = LogEvent::new(Level::Warning, "x");
        assert_eq!(template.render(&event).as_deref(), Some("Warning"));
    }

    #[test]
    fn test_template_missing_property_is_unresolved() {
        let template = LabelTemplate::compile("{Method} {Path}");
        let event = LogEvent::default().with_property("Method", "GET");
        assert_eq!(template.render(&event), None);
    }

    #[test]
    fn test_template_empty_value_is_unresolved() {
        let template = LabelTemplate::compile("{Name}");
        let event = LogEvent::default().with_property("Name", "\"\"");
        assert_eq!(template.render(&event), None);
    }

    #[test]
    fn test_render_buffer_does_not_leak_between_calls() {
        let long = LabelTemplate::compile("{Name}");
        let short = LabelTemplate::compile("x");
        let event = LogEvent::default().with_property("Name", "a-long-value");
        assert_eq!(long.render(&event).as_deref(), Some("a-long-value"));
        assert_eq!(short.render(&event).as_deref(), Some("x"));
    }

    #[test]
    fn test_missing_label_without_default_skips() {
        let renderer = LabelRenderer::new(vec![LabelSpec::new("env", "{Environment}")], defaults());
        let outcome = renderer.render(&LogEvent::default());
        assert_eq!(
            outcome,
            LabelOutcome::Skip {
                label: "env".to_string()
            }
        );
    }

    #[test]
    fn test_missing_label_uses_default() {
        let renderer = LabelRenderer::new(vec![LabelSpec::new("host", "{Host}")], defaults());
        let LabelOutcome::Ready(values) = renderer.render(&LogEvent::default()) else {
            panic!("expected ready labels");
        };
        assert_eq!(values.get("host").map(String::as_str), Some("localhost"));
    }

    #[test]
    fn test_skip_stops_at_first_unresolved_label() {
        let renderer = LabelRenderer::new(
            vec![
                LabelSpec::new("name", "{Name}"),
                LabelSpec::new("env", "{Environment}"),
                LabelSpec::new("host", "{Host}"),
            ],
            defaults(),
        );
        let event = LogEvent::default().with_property("Name", "svc");
        assert_eq!(
            renderer.render(&event),
            LabelOutcome::Skip {
                label: "env".to_string()
            }
        );
    }

    #[test]
    fn test_label_name_derived_through_aliases() {
        let aliases = LabelAliases::default();
        let host = LabelSpec::resolve(None, "{Host}", &aliases).unwrap();
        assert_eq!(host.name, "host");

        let assembly = LabelSpec::resolve(None, "{AssemblyName}", &aliases).unwrap();
        assert_eq!(assembly.name, "assembly");

        let other = LabelSpec::resolve(None, "{EndPointName}", &aliases).unwrap();
        assert_eq!(other.name, "endpointname");

        let explicit = LabelSpec::resolve(Some("endpoint"), "{EndPointName}", &aliases).unwrap();
        assert_eq!(explicit.name, "endpoint");
    }

    #[test]
    fn test_label_name_cannot_be_derived_from_composite_template() {
        let result = LabelSpec::resolve(None, "{A}-{B}", &LabelAliases::default());
        assert!(matches!(result, Err(LabelError::CannotDeriveName(_))));
    }

    #[test]
    fn test_custom_alias_table() {
        let aliases = LabelAliases::empty().with_alias("Svc", "service");
        assert_eq!(aliases.label_for_property("Svc"), "service");
        assert_eq!(aliases.label_for_property("Host"), "host");
    }
}
