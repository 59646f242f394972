//! Bulk edits of manifest streams used when rolling out a release.
//!
//! Manifests are handled as a [`Document::Sequence`] with one entry per
//! YAML document. Only entries whose `kind` is `Deployment` are touched.

use std::{fmt, process::Command, str::FromStr};

use s4_transform::{ANY, Document, PathPattern, Selector, TransformBatch, pattern};
use snafu::{ResultExt, Snafu, ensure};

/// Images published by this owner are the only ones ever retagged.
pub const IMAGE_OWNER: &str = "leastauthority";

/// Environment variables with this suffix carry an image reference.
const IMAGE_ENV_SUFFIX: &str = "_IMAGE";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to rewrite manifests"))]
    Transform { source: s4_transform::Error },

    #[snafu(display("failed to run git to resolve revision {rev:?}"))]
    RunGit { source: std::io::Error, rev: String },

    #[snafu(display("git could not resolve revision {rev:?}: {stderr}"))]
    GitRevParse { rev: String, stderr: String },
}

#[derive(Debug, PartialEq, Snafu)]
pub enum ImageReferenceParseError {
    #[snafu(display(
        "image {image:?} must have the form [registry/]owner/name[:tag], found {components} components"
    ))]
    InvalidComponentCount { image: String, components: usize },

    #[snafu(display("image {image:?} contains an empty component"))]
    EmptyComponent { image: String },
}

/// A container image reference of the form `[registry/]owner/name[:tag]`.
///
/// The tag is only looked for after the last `/`, a registry with a port
/// like `registry.example.com:5000/owner/name` therefore has no tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub owner: String,
    pub name: String,
    pub tag: Option<String>,
}

impl FromStr for ImageReference {
    type Err = ImageReferenceParseError;

    fn from_str(image: &str) -> Result<Self, Self::Err> {
        let components: Vec<_> = image.split('/').collect();
        let (registry, owner, name_and_tag) = match components.as_slice() {
            [owner, name] => (None, *owner, *name),
            [registry, owner, name] => (Some(*registry), *owner, *name),
            _ => {
                return InvalidComponentCountSnafu {
                    image,
                    components: components.len(),
                }
                .fail();
            }
        };

        let (name, tag) = match name_and_tag.split_once(':') {
            Some((name, tag)) => (name, Some(tag)),
            None => (name_and_tag, None),
        };

        ensure!(
            registry.is_none_or(|registry| !registry.is_empty())
                && !owner.is_empty()
                && !name.is_empty()
                && tag.is_none_or(|tag| !tag.is_empty()),
            EmptyComponentSnafu { image }
        );

        Ok(Self {
            registry: registry.map(ToOwned::to_owned),
            owner: owner.to_owned(),
            name: name.to_owned(),
            tag: tag.map(ToOwned::to_owned),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        write!(f, "{owner}/{name}", owner = self.owner, name = self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        Ok(())
    }
}

impl ImageReference {
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    pub fn with_tag(self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..self
        }
    }
}

/// Where the replacement image tag comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagSource {
    Literal(String),
    /// A git revision, abbreviated with `git rev-parse --short`.
    GitRevision(String),
}

impl TagSource {
    pub fn resolve(&self) -> Result<String> {
        match self {
            Self::Literal(tag) => Ok(tag.clone()),
            Self::GitRevision(rev) => {
                let output = Command::new("git")
                    .args(["rev-parse", "--short", rev])
                    .output()
                    .context(RunGitSnafu { rev })?;

                ensure!(
                    output.status.success(),
                    GitRevParseSnafu {
                        rev,
                        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                    }
                );

                let tag = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                tracing::debug!(rev, tag, "resolved git revision");
                Ok(tag)
            }
        }
    }
}

/// Selects the Deployments of a manifest stream.
pub fn deployments() -> Selector {
    Selector::field_equals("kind", "Deployment")
}

fn pod_spec() -> PathPattern {
    pattern![deployments(), "spec", "template", "spec"]
}

fn image_env_var() -> Selector {
    Selector::new(format!("name=*{IMAGE_ENV_SUFFIX}"), |context| {
        context
            .value
            .get("name")
            .and_then(Document::as_str)
            .is_some_and(|name| name.ends_with(IMAGE_ENV_SUFFIX))
            && context.value.get("value").and_then(Document::as_str).is_some()
    })
}

/// Replaces the tag of `image` if it is one of ours and already tagged.
fn retag(image: &Document, tag: &str) -> Result<Document, ImageReferenceParseError> {
    let Some(raw) = image.as_str() else {
        return Ok(image.clone());
    };
    let reference: ImageReference = raw.parse()?;

    if reference.is_owned_by(IMAGE_OWNER) && reference.tag.is_some() {
        Ok(reference.with_tag(tag).to_string().into())
    } else {
        Ok(image.clone())
    }
}

/// Sets the tag of every tagged `leastauthority` image used by the
/// Deployments in `manifests`, both in container images and in `*_IMAGE`
/// environment variables.
///
/// Untagged and third-party images are left alone. A single image which
/// cannot be parsed fails the whole rewrite.
pub fn rewrite_tags(manifests: &Document, tag: &str) -> Result<Document> {
    let containers = pod_spec().then("containers").then(ANY);
    let image_tag = tag.to_owned();
    let env_tag = tag.to_owned();

    TransformBatch::new()
        .try_update(
            pod_spec()
                .then("containers")
                .then(Selector::has_field("image"))
                .then("image"),
            move |image: &Document| retag(image, &image_tag),
        )
        .try_update(
            containers.then("env").then(image_env_var()).then("value"),
            move |image: &Document| retag(image, &env_tag),
        )
        .apply(manifests)
        .context(TransformSnafu)
}

/// Replaces every PersistentVolumeClaim volume of the Deployments in
/// `manifests` with an empty directory of the same name.
pub fn stub_all_volumes(manifests: &Document) -> Result<Document> {
    TransformBatch::new()
        .update(
            pod_spec()
                .then("volumes")
                .then(Selector::has_field("persistentVolumeClaim")),
            |volume: &Document| {
                Document::mapping([
                    ("name", volume.get("name").cloned().unwrap_or_default()),
                    ("emptyDir", Document::empty_mapping()),
                ])
            },
        )
        .apply(manifests)
        .context(TransformSnafu)
}
