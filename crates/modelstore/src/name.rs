//! Model names: `[[host/]namespace/]model[:tag]` resolved to a full 4-tuple.
//!
//! Resolution is pure. Missing parts are filled from [`NameDefaults`] and
//! every part is validated so it is always safe to use as a single path
//! segment under the manifest root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Defaults applied to parts a name leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameDefaults {
    /// Default: registry.ollama.ai
    #[serde(default = "NameDefaults::default_host")]
    pub host: String,

    /// Default: library
    #[serde(default = "NameDefaults::default_namespace")]
    pub namespace: String,

    /// Default: latest
    #[serde(default = "NameDefaults::default_tag")]
    pub tag: String,
}

impl NameDefaults {
    fn default_host() -> String {
        "registry.ollama.ai".to_string()
    }

    fn default_namespace() -> String {
        "library".to_string()
    }

    fn default_tag() -> String {
        "latest".to_string()
    }
}

impl Default for NameDefaults {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            namespace: Self::default_namespace(),
            tag: Self::default_tag(),
        }
    }
}

/// Which part of a name a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Host,
    Namespace,
    Model,
    Tag,
}

impl Part {
    fn max_len(self) -> usize {
        match self {
            Part::Host => 350,
            Part::Namespace | Part::Model | Part::Tag => 80,
        }
    }

    fn allows(self, c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(c, '_' | '-' | '.')
            || (self == Part::Host && c == ':')
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Part::Host => "host",
            Part::Namespace => "namespace",
            Part::Model => "model",
            Part::Tag => "tag",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("model name is empty")]
    Empty,

    #[error("too many path components in {0:?}, expected [[host/]namespace/]model[:tag]")]
    TooManyParts(String),

    #[error("{0} is empty")]
    EmptyPart(Part),

    #[error("{part} is longer than {max} characters")]
    TooLong { part: Part, max: usize },

    #[error("{part} {value:?} contains invalid characters")]
    InvalidPart { part: Part, value: String },
}

/// A fully resolved model name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelName {
    host: String,
    namespace: String,
    model: String,
    tag: String,
}

impl ModelName {
    /// Resolve a possibly partial name against `defaults`.
    pub fn parse_with(s: &str, defaults: &NameDefaults) -> Result<Self, NameError> {
        if s.is_empty() {
            return Err(NameError::Empty);
        }

        // The tag colon must come after the last slash; earlier colons are a host port.
        let (path, tag) = match s.rfind(':') {
            Some(i) if !s[i..].contains('/') => (&s[..i], Some(&s[i + 1..])),
            _ => (s, None),
        };

        let parts: Vec<&str> = path.split('/').collect();
        let (host, namespace, model) = match parts.as_slice() {
            [model] => (None, None, *model),
            [namespace, model] => (None, Some(*namespace), *model),
            [host, namespace, model] => (Some(*host), Some(*namespace), *model),
            _ => return Err(NameError::TooManyParts(s.to_string())),
        };

        Self::from_parts(
            host.unwrap_or(&defaults.host),
            namespace.unwrap_or(&defaults.namespace),
            model,
            tag.unwrap_or(&defaults.tag),
        )
    }

    /// Build a name from explicit parts, validating each.
    pub fn from_parts(
        host: &str,
        namespace: &str,
        model: &str,
        tag: &str,
    ) -> Result<Self, NameError> {
        validate(Part::Host, host)?;
        validate(Part::Namespace, namespace)?;
        validate(Part::Model, model)?;
        validate(Part::Tag, tag)?;

        Ok(Self {
            host: host.to_string(),
            namespace: namespace.to_string(),
            model: model.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Rebuild a name from the four path segments of a manifest file.
    pub fn from_path_segments(segments: &[&str]) -> Result<Self, NameError> {
        match segments {
            [host, namespace, model, tag] => Self::from_parts(host, namespace, model, tag),
            _ => Err(NameError::TooManyParts(segments.join("/"))),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `[host, namespace, model, tag]`, in directory order.
    pub fn path_segments(&self) -> [&str; 4] {
        [&self.host, &self.namespace, &self.model, &self.tag]
    }

    /// Path of the manifest relative to the manifest root.
    pub fn relative_path(&self) -> PathBuf {
        self.path_segments().iter().collect()
    }

    /// Shortest form that resolves back to this name under `defaults`.
    pub fn display_shortest(&self, defaults: &NameDefaults) -> String {
        let mut out = String::new();
        if self.host != defaults.host {
            out.push_str(&self.host);
            out.push('/');
            out.push_str(&self.namespace);
            out.push('/');
        } else if self.namespace != defaults.namespace {
            out.push_str(&self.namespace);
            out.push('/');
        }
        out.push_str(&self.model);
        out.push(':');
        out.push_str(&self.tag);
        out
    }
}

fn validate(part: Part, value: &str) -> Result<(), NameError> {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(NameError::EmptyPart(part));
    };
    if value.len() > part.max_len() {
        return Err(NameError::TooLong {
            part,
            max: part.max_len(),
        });
    }
    if !(first.is_ascii_alphanumeric() || first == '_') || !chars.all(|c| part.allows(c)) {
        return Err(NameError::InvalidPart {
            part,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}:{}", self.host, self.namespace, self.model, self.tag)
    }
}

impl FromStr for ModelName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with(s, &NameDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(s: &str) -> ModelName {
        s.parse().unwrap()
    }

    #[test]
    fn test_bare_model_gets_all_defaults() {
        let name = parse("test");
        assert_eq!(name.path_segments(), ["registry.ollama.ai", "library", "test", "latest"]);
        assert_eq!(name.to_string(), "registry.ollama.ai/library/test:latest");
    }

    #[test]
    fn test_partial_names() {
        assert_eq!(
            parse("llama3:8b").path_segments(),
            ["registry.ollama.ai", "library", "llama3", "8b"]
        );
        assert_eq!(
            parse("me/mymodel").path_segments(),
            ["registry.ollama.ai", "me", "mymodel", "latest"]
        );
        assert_eq!(
            parse("example.com/me/mymodel:v1.2").path_segments(),
            ["example.com", "me", "mymodel", "v1.2"]
        );
    }

    #[test]
    fn test_host_port_is_not_a_tag() {
        let name = parse("localhost:5000/me/mymodel");
        assert_eq!(name.host(), "localhost:5000");
        assert_eq!(name.tag(), "latest");

        let tagged = parse("localhost:5000/me/mymodel:q4");
        assert_eq!(tagged.host(), "localhost:5000");
        assert_eq!(tagged.tag(), "q4");
    }

    #[test]
    fn test_equality_is_on_resolved_tuple() {
        assert_eq!(parse("test"), parse("registry.ollama.ai/library/test:latest"));
        assert_ne!(parse("test"), parse("test:other"));
    }

    #[test]
    fn test_configured_defaults() {
        let defaults = NameDefaults {
            host: "models.internal".to_string(),
            namespace: "team".to_string(),
            tag: "stable".to_string(),
        };
        let name = ModelName::parse_with("embed", &defaults).unwrap();
        assert_eq!(name.path_segments(), ["models.internal", "team", "embed", "stable"]);
    }

    #[test]
    fn test_rejects_malformed_names() {
        assert_eq!("".parse::<ModelName>(), Err(NameError::Empty));
        assert!(matches!("a/b/c/d".parse::<ModelName>(), Err(NameError::TooManyParts(_))));
        assert_eq!("model:".parse::<ModelName>(), Err(NameError::EmptyPart(Part::Tag)));
        assert_eq!("/model".parse::<ModelName>(), Err(NameError::EmptyPart(Part::Namespace)));
        assert!(matches!("../model".parse::<ModelName>(), Err(NameError::InvalidPart { .. })));
        assert!(matches!("ns/mo del".parse::<ModelName>(), Err(NameError::InvalidPart { .. })));
        assert!(matches!(
            "x".repeat(81).parse::<ModelName>(),
            Err(NameError::TooLong { part: Part::Model, max: 80 })
        ));
    }

    #[test]
    fn test_relative_path() {
        let name = parse("library/test:latest");
        assert_eq!(
            name.relative_path(),
            Path::new("registry.ollama.ai").join("library").join("test").join("latest")
        );
    }

    #[test]
    fn test_from_path_segments_validates() {
        let name =
            ModelName::from_path_segments(&["registry.ollama.ai", "library", "test", "latest"])
                .unwrap();
        assert_eq!(name, parse("test"));
        assert!(ModelName::from_path_segments(&["a", "b", "c"]).is_err());
        assert!(ModelName::from_path_segments(&["a", "b", "c", ".tmp123"]).is_err());
    }

    #[test]
    fn test_display_shortest() {
        let defaults = NameDefaults::default();
        assert_eq!(parse("test").display_shortest(&defaults), "test:latest");
        assert_eq!(parse("me/test").display_shortest(&defaults), "me/test:latest");
        assert_eq!(
            parse("example.com/library/test:v1").display_shortest(&defaults),
            "example.com/library/test:v1"
        );
    }
}
