use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

use crate::Document;

/// One step of a concrete address: a mapping key or a sequence index.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

impl Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A concrete address of a node within a [`Document`].
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<PathKey>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.0
    }

    /// Returns a new path with `key` appended.
    pub fn child(&self, key: PathKey) -> Self {
        let mut keys = self.0.clone();
        keys.push(key);
        Self(keys)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for key in &self.0 {
            write!(f, "/{key}")?;
        }
        Ok(())
    }
}

impl FromIterator<PathKey> for Path {
    fn from_iter<T: IntoIterator<Item = PathKey>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything a [`Selector`] may inspect when deciding whether to descend
/// into a child node.
///
/// All references point into the snapshot taken at the start of the batch,
/// never into a partially transformed working copy.
pub struct SelectorContext<'a> {
    /// Root of the document as it was before the batch started.
    pub snapshot: &'a Document,
    /// Address of the node whose children are being selected.
    pub parent: &'a Path,
    /// Key or index of the candidate child.
    pub key: &'a PathKey,
    /// The candidate child itself.
    pub value: &'a Document,
}

type Predicate = dyn Fn(&SelectorContext<'_>) -> bool + Send + Sync;

/// A named predicate that matches a subset of a node's children.
#[derive(Clone)]
pub struct Selector {
    name: String,
    predicate: Arc<Predicate>,
}

impl Selector {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SelectorContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Matches children which are mappings whose `field` equals `expected`,
    /// e.g. every resource whose `kind` is `Deployment`.
    pub fn field_equals(field: impl Into<String>, expected: impl Into<String>) -> Self {
        let field = field.into();
        let expected = expected.into();
        Self::new(format!("{field}=={expected}"), move |context| {
            context.value.get(&field).and_then(Document::as_str) == Some(expected.as_str())
        })
    }

    /// Matches children which are mappings containing a non-null `field`.
    pub fn has_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(format!("has {field}"), move |context| {
            context.value.get(&field).is_some_and(|value| !value.is_null())
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, context: &SelectorContext<'_>) -> bool {
        (self.predicate)(context)
    }
}

impl Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.name).finish()
    }
}

/// A single segment of a [`PathPattern`].
#[derive(Clone, Debug)]
pub enum Segment {
    /// A literal mapping key.
    Key(String),
    /// A literal sequence index.
    Index(usize),
    /// Every child of the current node.
    Any,
    /// Every child of the current node accepted by the selector.
    Select(Selector),
}

/// Matches every child of the current node.
pub const ANY: Segment = Segment::Any;

impl Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
            Self::Any => f.write_str("*"),
            Self::Select(selector) => write!(f, "[{}]", selector.name()),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Selector> for Segment {
    fn from(selector: Selector) -> Self {
        Self::Select(selector)
    }
}

/// An ordered sequence of [`Segment`]s which resolves to zero or more
/// concrete [`Path`]s within a document.
///
/// Use the [`pattern!`](crate::pattern) macro to build patterns inline.
#[derive(Clone, Debug, Default)]
pub struct PathPattern(Vec<Segment>);

impl PathPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Returns a new pattern with `segment` appended.
    pub fn then(mut self, segment: impl Into<Segment>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// Returns a new pattern consisting of `self` followed by `other`.
    pub fn join(mut self, other: &Self) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }
}

impl Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromIterator<Segment> for PathPattern {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Builds a [`PathPattern`] from a list of segments.
///
/// String literals become keys, integer literals become indices, and
/// [`ANY`] or a [`Selector`] expand to multiple children.
///
/// ```
/// use s4_transform::{ANY, pattern};
///
/// let pattern = pattern!["spec", "template", "spec", "containers", ANY, "image"];
/// assert_eq!(pattern.to_string(), "/spec/template/spec/containers/*/image");
/// ```
#[macro_export]
macro_rules! pattern {
    ($($segment:expr),* $(,)?) => {
        <$crate::PathPattern as ::std::iter::FromIterator<$crate::Segment>>::from_iter([
            $($crate::Segment::from($segment)),*
        ])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern;

    #[test]
    fn pattern_display() {
        let pattern = pattern![
            Selector::field_equals("kind", "Deployment"),
            "spec",
            "containers",
            0,
            ANY
        ];
        assert_eq!(
            pattern.to_string(),
            "/[kind==Deployment]/spec/containers/0/*"
        );
    }

    #[test]
    fn path_display() {
        let path: Path = [PathKey::Key("spec".to_owned()), PathKey::Index(1)]
            .into_iter()
            .collect();
        assert_eq!(path.to_string(), "/spec/1");
        assert_eq!(Path::root().to_string(), "/");
    }
}
