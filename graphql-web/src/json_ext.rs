//! JSON helpers: the object alias used across the crate and response paths.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// A path element inside a GraphQL response: a field name or a list index.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index into a list.
    Index(usize),

    /// A field key.
    Key(String),
}

/// A path into a GraphQL response, as found in the `path` of an error.
///
/// Displays as `/project/releases/0`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element)
    }

    pub fn join(&self, other: impl AsRef<Self>) -> Self {
        let mut elements = self.0.clone();
        elements.extend(other.as_ref().0.iter().cloned());
        Path(elements)
    }

    /// Whether `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn last_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|element| match element {
            PathElement::Key(key) => Some(key.as_str()),
            PathElement::Index(_) => None,
        })
    }

    /// The path of a field being resolved by the engine.
    pub(crate) fn from_query_path(node: &async_graphql::QueryPathNode<'_>) -> Path {
        let mut elements = Vec::new();
        let mut current = Some(node);
        while let Some(node) = current {
            elements.push(match node.segment {
                async_graphql::QueryPathSegment::Index(index) => PathElement::Index(index),
                async_graphql::QueryPathSegment::Name(name) => PathElement::Key(name.to_string()),
            });
            current = node.parent;
        }
        elements.into_iter().rev().collect()
    }

    /// Renders the path as a JSON path relative to the response data,
    /// e.g. `$.project.releases[0]`.
    pub fn json_path(&self) -> String {
        let mut rendered = String::from("$");
        for element in &self.0 {
            match element {
                PathElement::Key(key) => {
                    rendered.push('.');
                    rendered.push_str(key);
                }
                PathElement::Index(index) => {
                    rendered.push('[');
                    rendered.push_str(&index.to_string());
                    rendered.push(']');
                }
            }
        }
        rendered
    }
}

impl AsRef<Path> for Path {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl<T> From<T> for Path
where
    T: AsRef<str>,
{
    fn from(s: T) -> Self {
        Self(
            s.as_ref()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(segment.to_string()),
                })
                .collect(),
        )
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<I: IntoIterator<Item = PathElement>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl From<&async_graphql::PathSegment> for PathElement {
    fn from(segment: &async_graphql::PathSegment) -> Self {
        match segment {
            async_graphql::PathSegment::Field(name) => PathElement::Key(name.clone()),
            async_graphql::PathSegment::Index(index) => PathElement::Index(*index),
        }
    }
}

impl From<&PathElement> for async_graphql::PathSegment {
    fn from(element: &PathElement) -> Self {
        match element {
            PathElement::Key(key) => async_graphql::PathSegment::Field(key.clone()),
            PathElement::Index(index) => async_graphql::PathSegment::Index(*index),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/")?;
            match element {
                PathElement::Index(index) => write!(f, "{index}")?,
                PathElement::Key(key) => write!(f, "{key}")?,
            }
        }
        Ok(())
    }
}

/// Extension trait for [`Value`].
pub(crate) trait ValueExt {
    /// Converts the value into the engine's value type.
    fn to_engine_value(&self) -> async_graphql::Value;
}

impl ValueExt for Value {
    fn to_engine_value(&self) -> async_graphql::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|json| async_graphql::Value::from_json(json).ok())
            .unwrap_or(async_graphql::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn path_from_query_path_node() {
        let root = async_graphql::QueryPathNode {
            parent: None,
            segment: async_graphql::QueryPathSegment::Name("releases"),
        };
        let index = async_graphql::QueryPathNode {
            parent: Some(&root),
            segment: async_graphql::QueryPathSegment::Index(1),
        };
        let leaf = async_graphql::QueryPathNode {
            parent: Some(&index),
            segment: async_graphql::QueryPathSegment::Name("version"),
        };
        assert_eq!(
            Path::from_query_path(&leaf),
            Path::from("releases/1/version")
        );
    }

    #[test]
    fn path_from_str_and_display() {
        let path = Path::from("project/releases/1/version");
        assert_eq!(
            path,
            Path(vec![
                PathElement::Key("project".to_string()),
                PathElement::Key("releases".to_string()),
                PathElement::Index(1),
                PathElement::Key("version".to_string()),
            ])
        );
        assert_eq!(path.to_string(), "/project/releases/1/version");
        assert_eq!(path.last_key(), Some("version"));
    }

    #[test]
    fn path_prefixes() {
        let path = Path::from("project/releases/1/version");
        assert!(path.starts_with(&Path::from("project/releases")));
        assert!(path.starts_with(&path));
        assert!(path.starts_with(&Path::empty()));
        assert!(!path.starts_with(&Path::from("project/releases/0")));
        assert!(!Path::from("project").starts_with(&path));
    }

    #[test]
    fn path_renders_as_json_path() {
        assert_eq!(Path::from("project").json_path(), "$.project");
        assert_eq!(
            Path::from("project/releases/0").json_path(),
            "$.project.releases[0]"
        );
        assert_eq!(Path::empty().json_path(), "$");
    }

    #[test]
    fn path_serializes_as_array() {
        let path = Path::from("project/releases/0");
        assert_eq!(
            serde_json_bytes::to_value(&path).unwrap(),
            json!(["project", "releases", 0])
        );
        let parsed: Path = serde_json_bytes::from_value(json!(["greetings", 2])).unwrap();
        assert_eq!(parsed.to_string(), "/greetings/2");
    }

    #[test]
    fn value_converts_to_engine_value() {
        let value = json!({ "slug": "spring-framework", "first": 2 });
        let converted = value.to_engine_value();
        assert_eq!(
            converted.into_json().unwrap(),
            serde_json::json!({ "slug": "spring-framework", "first": 2 })
        );
    }
}
