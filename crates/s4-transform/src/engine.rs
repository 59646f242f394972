use std::{fmt, sync::Arc};

use im::{OrdMap, Vector};
use snafu::{ResultExt, Snafu};

use crate::{
    Document,
    path::{Path, PathKey, PathPattern, Segment, SelectorContext},
};

/// Boxed error returned by fallible replacement functions.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors which abort a whole [`apply`] call. No partial document is ever
/// returned.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "cannot resolve segment {segment:?} at {path}: expected {expected}, found {found}"
    ))]
    ShapeMismatch {
        path: Path,
        segment: String,
        expected: &'static str,
        found: &'static str,
    },

    #[snafu(display("index {index} at {path} is out of bounds for a sequence of length {len}"))]
    IndexOutOfBounds {
        path: Path,
        index: usize,
        len: usize,
    },

    #[snafu(display("replacement at {path} failed"))]
    Replace { source: BoxedError, path: Path },
}

type ReplaceFn = dyn Fn(&Document) -> Result<Document, BoxedError> + Send + Sync;

/// What to put at every address a [`PathPattern`] resolves to.
#[derive(Clone)]
pub enum Replacement {
    /// Replace the node with a fixed value.
    Value(Document),
    /// Compute the new node from the old one. Missing nodes are passed as
    /// [`Document::Null`].
    Function(Arc<ReplaceFn>),
}

impl Replacement {
    pub fn value(value: impl Into<Document>) -> Self {
        Self::Value(value.into())
    }

    /// Wraps an infallible function.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(&Document) -> Document + Send + Sync + 'static,
    {
        Self::Function(Arc::new(move |old: &Document| Ok(f(old))))
    }

    /// Wraps a fallible function. An error aborts the whole batch.
    pub fn try_map<F, E>(f: F) -> Self
    where
        F: Fn(&Document) -> Result<Document, E> + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Function(Arc::new(move |old: &Document| {
            f(old).map_err(|err| Box::new(err) as BoxedError)
        }))
    }

    fn replace(&self, old: &Document) -> Result<Document, BoxedError> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Function(f) => f(old),
        }
    }
}

impl fmt::Debug for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<Document> for Replacement {
    fn from(value: Document) -> Self {
        Self::Value(value)
    }
}

/// A single (pattern, replacement) pair.
#[derive(Clone, Debug)]
pub struct Transform {
    pub pattern: PathPattern,
    pub replacement: Replacement,
}

impl Transform {
    pub fn new(pattern: PathPattern, replacement: impl Into<Replacement>) -> Self {
        Self {
            pattern,
            replacement: replacement.into(),
        }
    }
}

/// An ordered list of [`Transform`]s applied as one unit.
///
/// ```
/// use s4_transform::{Document, TransformBatch, pattern};
///
/// let document = Document::mapping([("metadata", Document::empty_mapping())]);
/// let document = TransformBatch::new()
///     .set(pattern!["metadata", "name"], "customer-config-aaaa")
///     .set(pattern!["metadata", "namespace"], "testing")
///     .apply(&document)
///     .unwrap();
///
/// assert_eq!(
///     document.pointer("/metadata/name").and_then(Document::as_str),
///     Some("customer-config-aaaa"),
/// );
/// ```
#[derive(Clone, Debug, Default)]
pub struct TransformBatch(Vec<Transform>);

impl TransformBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, pattern: PathPattern, value: impl Into<Document>) -> Self {
        self.0
            .push(Transform::new(pattern, Replacement::value(value)));
        self
    }

    pub fn update<F>(mut self, pattern: PathPattern, f: F) -> Self
    where
        F: Fn(&Document) -> Document + Send + Sync + 'static,
    {
        self.0.push(Transform::new(pattern, Replacement::map(f)));
        self
    }

    pub fn try_update<F, E>(mut self, pattern: PathPattern, f: F) -> Self
    where
        F: Fn(&Document) -> Result<Document, E> + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.0.push(Transform::new(pattern, Replacement::try_map(f)));
        self
    }

    pub fn push(mut self, transform: Transform) -> Self {
        self.0.push(transform);
        self
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.0
    }

    pub fn apply(&self, document: &Document) -> Result<Document> {
        apply(document, &self.0)
    }
}

impl Extend<Transform> for TransformBatch {
    fn extend<T: IntoIterator<Item = Transform>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<Transform> for TransformBatch {
    fn from_iter<T: IntoIterator<Item = Transform>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Applies `transforms` to `document` in order and returns the result.
///
/// Every pattern is resolved against `document` as it was when the call
/// started, so selectors never observe the edits made by earlier transforms
/// in the same batch. Replacements are applied to the working copy, which
/// means later transforms do see earlier edits in the values they replace.
pub fn apply(document: &Document, transforms: &[Transform]) -> Result<Document> {
    apply_with_snapshot(document, document.clone(), transforms)
}

/// Applies `transforms` to `working`, resolving every pattern against
/// `snapshot`.
pub fn apply_with_snapshot(
    snapshot: &Document,
    mut working: Document,
    transforms: &[Transform],
) -> Result<Document> {
    for transform in transforms {
        for path in resolve(snapshot, &transform.pattern)? {
            working = replace_at(&working, &path, 0, &transform.replacement)?;
        }
    }
    Ok(working)
}

/// Resolves `pattern` to the concrete addresses it denotes within
/// `snapshot`.
///
/// Literal segments may point at nodes which do not exist yet; wildcards and
/// selectors only expand over children which do.
pub fn resolve(snapshot: &Document, pattern: &PathPattern) -> Result<Vec<Path>> {
    let mut frontier: Vec<(Path, Option<&Document>)> = vec![(Path::root(), Some(snapshot))];

    for segment in pattern.segments() {
        let mut next = Vec::with_capacity(frontier.len());

        for (path, node) in frontier {
            // Null behaves like an absent node so that `env: ~` and friends
            // can be filled in.
            let node = node.filter(|node| !node.is_null());

            match segment {
                Segment::Key(key) => {
                    let child = match node {
                        None => None,
                        Some(Document::Mapping(entries)) => entries.get(key.as_str()),
                        Some(other) => return shape_mismatch(&path, segment, "mapping", other),
                    };
                    next.push((path.child(PathKey::Key(key.clone())), child));
                }
                Segment::Index(index) => {
                    let child = match node {
                        None => None,
                        Some(Document::Sequence(items)) => items.get(*index),
                        Some(other) => return shape_mismatch(&path, segment, "sequence", other),
                    };
                    next.push((path.child(PathKey::Index(*index)), child));
                }
                Segment::Any | Segment::Select(_) => {
                    let children: Vec<(PathKey, &Document)> = match node {
                        None => Vec::new(),
                        Some(Document::Mapping(entries)) => entries
                            .iter()
                            .map(|(key, value)| (PathKey::Key(key.clone()), value))
                            .collect(),
                        Some(Document::Sequence(items)) => items
                            .iter()
                            .enumerate()
                            .map(|(index, value)| (PathKey::Index(index), value))
                            .collect(),
                        Some(other) => {
                            return shape_mismatch(&path, segment, "mapping or sequence", other);
                        }
                    };

                    for (key, value) in children {
                        let selected = match segment {
                            Segment::Select(selector) => selector.matches(&SelectorContext {
                                snapshot,
                                parent: &path,
                                key: &key,
                                value,
                            }),
                            _ => true,
                        };
                        if selected {
                            next.push((path.child(key), Some(value)));
                        }
                    }
                }
            }
        }

        frontier = next;
    }

    Ok(frontier.into_iter().map(|(path, _)| path).collect())
}

fn shape_mismatch<T>(
    path: &Path,
    segment: &Segment,
    expected: &'static str,
    found: &Document,
) -> Result<T> {
    ShapeMismatchSnafu {
        path: path.clone(),
        segment: segment.to_string(),
        expected,
        found: found.kind(),
    }
    .fail()
}

/// Returns a copy of `node` with the replacement applied at `path[depth..]`,
/// creating missing intermediate mappings and sequences on the way.
fn replace_at(
    node: &Document,
    path: &Path,
    depth: usize,
    replacement: &Replacement,
) -> Result<Document> {
    let Some(key) = path.keys().get(depth) else {
        return replacement
            .replace(node)
            .context(ReplaceSnafu { path: path.clone() });
    };

    let here = || -> Path { path.keys()[..depth].iter().cloned().collect() };

    match key {
        PathKey::Key(key) => {
            let mut entries = match node {
                Document::Mapping(entries) => entries.clone(),
                Document::Null => OrdMap::new(),
                other => {
                    return ShapeMismatchSnafu {
                        path: here(),
                        segment: key.clone(),
                        expected: "mapping",
                        found: other.kind(),
                    }
                    .fail();
                }
            };
            let child = entries.get(key.as_str()).cloned().unwrap_or_default();
            let child = replace_at(&child, path, depth + 1, replacement)?;
            entries.insert(key.clone(), child);
            Ok(Document::Mapping(entries))
        }
        PathKey::Index(index) => {
            let mut items = match node {
                Document::Sequence(items) => items.clone(),
                Document::Null => Vector::new(),
                other => {
                    return ShapeMismatchSnafu {
                        path: here(),
                        segment: index.to_string(),
                        expected: "sequence",
                        found: other.kind(),
                    }
                    .fail();
                }
            };
            let len = items.len();
            if *index > len {
                return IndexOutOfBoundsSnafu {
                    path: here(),
                    index: *index,
                    len,
                }
                .fail();
            }

            let child = items.get(*index).cloned().unwrap_or_default();
            let child = replace_at(&child, path, depth + 1, replacement)?;
            if *index == len {
                items.push_back(child);
            } else {
                items.set(*index, child);
            }
            Ok(Document::Sequence(items))
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{ANY, Selector, pattern};

    fn manifests() -> Document {
        serde_yaml::from_str(indoc! {"
            - kind: Deployment
              metadata:
                name: web
              spec:
                containers:
                  - name: a
                    image: one
                  - name: b
                    image: two
            - kind: Service
              metadata:
                name: web
              spec:
                containers:
                  - name: c
                    image: three
        "})
        .expect("test YAML is valid")
    }

    #[test]
    fn empty_batch_is_identity() {
        let document = manifests();
        assert_eq!(apply(&document, &[]).unwrap(), document);
    }

    #[test]
    fn literal_paths_create_missing_mappings() {
        let document = Document::empty_mapping();
        let result = TransformBatch::new()
            .set(pattern!["metadata", "annotations", "email"], "alice@example.com")
            .apply(&document)
            .unwrap();

        assert_eq!(
            result,
            Document::from(json!({"metadata": {"annotations": {"email": "alice@example.com"}}}))
        );
    }

    #[test]
    fn wildcard_updates_every_child() {
        let result = TransformBatch::new()
            .update(pattern![ANY, "spec", "containers", ANY, "image"], |old| {
                Document::from(format!("{}:latest", old.as_str().unwrap_or_default()))
            })
            .apply(&manifests())
            .unwrap();

        assert_eq!(
            result.pointer("/0/spec/containers/1/image"),
            Some(&Document::from("two:latest"))
        );
        assert_eq!(
            result.pointer("/1/spec/containers/0/image"),
            Some(&Document::from("three:latest"))
        );
    }

    #[test]
    fn selector_filters_children() {
        let result = TransformBatch::new()
            .set(
                pattern![
                    Selector::field_equals("kind", "Deployment"),
                    "spec",
                    "containers",
                    ANY,
                    "image"
                ],
                "replaced",
            )
            .apply(&manifests())
            .unwrap();

        assert_eq!(
            result.pointer("/0/spec/containers/0/image"),
            Some(&Document::from("replaced"))
        );
        assert_eq!(
            result.pointer("/1/spec/containers/0/image"),
            Some(&Document::from("three"))
        );
    }

    #[test]
    fn has_field_never_creates_the_field() {
        let document = Document::from(json!({
            "env": [
                {"name": "A_IMAGE", "value": "a"},
                {"name": "B_IMAGE", "valueFrom": {"secretKeyRef": {"name": "b"}}},
                {"name": "C_IMAGE", "value": null},
            ],
        }));
        let result = TransformBatch::new()
            .set(pattern!["env", Selector::has_field("value"), "value"], "replaced")
            .apply(&document)
            .unwrap();

        assert_eq!(
            result.pointer("/env/0/value"),
            Some(&Document::from("replaced"))
        );
        assert_eq!(result.pointer("/env/1/value"), None);
        assert_eq!(result.pointer("/env/2/value"), Some(&Document::Null));
    }

    #[test]
    fn selectors_see_the_batch_snapshot() {
        // The first transform turns the Deployment into something else. The
        // second transform still selects it, because selectors are evaluated
        // against the document as it was before the batch.
        let result = TransformBatch::new()
            .set(pattern![0, "kind"], "StatefulSet")
            .set(
                pattern![
                    Selector::field_equals("kind", "Deployment"),
                    "metadata",
                    "name"
                ],
                "renamed",
            )
            .apply(&manifests())
            .unwrap();

        assert_eq!(result.pointer("/0/kind"), Some(&Document::from("StatefulSet")));
        assert_eq!(
            result.pointer("/0/metadata/name"),
            Some(&Document::from("renamed"))
        );
        assert_eq!(result.pointer("/1/metadata/name"), Some(&Document::from("web")));
    }

    #[test]
    fn selector_receives_snapshot_root() {
        let seen_roots = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = seen_roots.clone();
        let selector = Selector::new("record", move |context| {
            recorder
                .lock()
                .expect("lock is not poisoned")
                .push(context.snapshot.clone());
            true
        });

        let document = manifests();
        TransformBatch::new()
            .set(pattern![0, "kind"], "Changed")
            .set(pattern![selector, "seen"], true)
            .apply(&document)
            .unwrap();

        let seen_roots = seen_roots.lock().expect("lock is not poisoned");
        assert_eq!(seen_roots.len(), 2);
        assert!(seen_roots.iter().all(|root| *root == document));
    }

    #[test]
    fn later_transforms_replace_earlier_values() {
        let result = TransformBatch::new()
            .set(pattern!["a"], 1)
            .update(pattern!["a"], |old| {
                Document::from(old.as_i64().unwrap_or_default() + 1)
            })
            .apply(&Document::empty_mapping())
            .unwrap();

        assert_eq!(result, Document::from(json!({"a": 2})));
    }

    #[test]
    fn index_equal_to_length_appends() {
        let document = Document::from(json!({"ports": []}));
        let result = TransformBatch::new()
            .set(pattern!["ports", 0], Document::mapping([("name", "introducer")]))
            .apply(&document)
            .unwrap();

        assert_eq!(result, Document::from(json!({"ports": [{"name": "introducer"}]})));
    }

    #[test]
    fn wildcard_over_missing_node_matches_nothing() {
        let document = Document::from(json!({"spec": {}}));
        let result = TransformBatch::new()
            .set(pattern!["spec", "volumes", ANY, "name"], "x")
            .apply(&document)
            .unwrap();

        assert_eq!(result, document);
    }

    #[rstest]
    #[case(pattern!["name", "first"])]
    #[case(pattern!["name", 0])]
    #[case(pattern!["name", ANY])]
    #[case(pattern!["list", "key"])]
    #[case(pattern!["map", 0])]
    fn shape_mismatch_aborts(#[case] pattern: PathPattern) {
        let document = Document::from(json!({"name": "scalar", "list": [1], "map": {"a": 1}}));
        let err = TransformBatch::new()
            .set(pattern, "x")
            .apply(&document)
            .unwrap_err();

        assert!(matches!(err, Error::ShapeMismatch { .. }), "{err}");
    }

    #[test]
    fn index_past_end_aborts() {
        let document = Document::from(json!({"list": []}));
        let err = TransformBatch::new()
            .set(pattern!["list", 1], "x")
            .apply(&document)
            .unwrap_err();

        assert!(matches!(err, Error::IndexOutOfBounds { index: 1, len: 0, .. }));
    }

    #[test]
    fn failing_replacement_aborts_without_partial_result() {
        #[derive(Debug)]
        struct Nope;

        impl fmt::Display for Nope {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("nope")
            }
        }

        impl std::error::Error for Nope {}

        let document = Document::from(json!({"a": 1, "b": 2}));
        let result = TransformBatch::new()
            .set(pattern!["a"], 10)
            .try_update(pattern!["b"], |_| Err::<Document, _>(Nope))
            .apply(&document);

        assert!(matches!(result, Err(Error::Replace { .. })));
        // The input is untouched.
        assert_eq!(document, Document::from(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn shape_mismatch_in_working_copy_aborts() {
        // The pattern resolves against the snapshot, but an earlier transform
        // replaced the containing mapping with a scalar.
        let document = Document::from(json!({"a": {"b": 1}}));
        let err = TransformBatch::new()
            .set(pattern!["a"], "scalar")
            .set(pattern!["a", "b"], 2)
            .apply(&document)
            .unwrap_err();

        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
