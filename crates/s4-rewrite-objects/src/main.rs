//! Reads a stream of Kubernetes manifests from stdin, rewrites it and writes
//! the result to stdout.
//!
//! ```shell
//! kubectl kustomize k8s/ | s4-rewrite-objects --git-tag HEAD --no-volumes
//! ```

use std::io::{self, Read, Write};

use clap::Parser;
use s4_operator::rewrite::{self, TagSource};
use s4_telemetry::{Tracing, tracing::TelemetryOptions};
use s4_transform::Document;
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "s4-rewrite-objects";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing"))]
    InitTracing { source: s4_telemetry::tracing::Error },

    #[snafu(display("failed to read manifests"))]
    ReadManifests { source: s4_shared::yaml::Error },

    #[snafu(display("failed to resolve image tag"))]
    ResolveTag { source: rewrite::Error },

    #[snafu(display("failed to rewrite image tags"))]
    RewriteTags { source: rewrite::Error },

    #[snafu(display("failed to stub volumes"))]
    StubVolumes { source: rewrite::Error },

    #[snafu(display("failed to serialize manifests"))]
    SerializeManifests { source: s4_shared::yaml::Error },

    #[snafu(display("failed to write manifests"))]
    WriteManifests { source: io::Error },
}

/// Rewrite `leastauthority` image tags and volumes of a manifest stream.
#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about)]
struct Cli {
    /// Rewrite tagged `leastauthority` images to TAG.
    #[arg(long, value_name = "TAG", conflicts_with = "git_tag")]
    tag: Option<String>,

    /// Like `--tag`, but with the abbreviated commit of the git REVISION.
    #[arg(long, value_name = "REVISION")]
    git_tag: Option<String>,

    /// Replace PersistentVolumeClaim volumes with empty directories.
    #[arg(long)]
    no_volumes: bool,

    #[command(flatten)]
    telemetry: TelemetryOptions,
}

impl Cli {
    fn tag_source(&self) -> Option<TagSource> {
        match (&self.tag, &self.git_tag) {
            (Some(tag), _) => Some(TagSource::Literal(tag.clone())),
            (None, Some(rev)) => Some(TagSource::GitRevision(rev.clone())),
            (None, None) => None,
        }
    }
}

/// Applies every rewrite requested by `cli` to the manifests read from
/// `input`. Nothing is written to `output` unless all of them succeed.
fn run(cli: &Cli, input: impl Read, mut output: impl Write) -> Result<(), Error> {
    let documents: Vec<Document> =
        s4_shared::yaml::read_all(input).context(ReadManifestsSnafu)?;
    tracing::debug!(count = documents.len(), "read manifests");

    let mut manifests = Document::sequence(documents);

    if let Some(source) = cli.tag_source() {
        let tag = source.resolve().context(ResolveTagSnafu)?;
        tracing::info!(tag, "rewriting image tags");
        manifests = rewrite::rewrite_tags(&manifests, &tag).context(RewriteTagsSnafu)?;
    }

    if cli.no_volumes {
        tracing::info!("stubbing persistent volumes");
        manifests = rewrite::stub_all_volumes(&manifests).context(StubVolumesSnafu)?;
    }

    let mut buffer = Vec::new();
    let documents = manifests.as_sequence().into_iter().flatten();
    s4_shared::yaml::serialize_all(documents, &mut buffer).context(SerializeManifestsSnafu)?;

    output.write_all(&buffer).context(WriteManifestsSnafu)
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    // Console logs go to stderr, stdout only carries manifests.
    let _tracing_guard = Tracing::pre_configured(APP_NAME, cli.telemetry.clone())
        .init()
        .context(InitTracingSnafu)?;

    run(&cli, io::stdin().lock(), io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const MANIFESTS: &str = indoc! {"
        ---
        kind: Deployment
        spec:
          template:
            spec:
              containers:
              - image: leastauthority/web:abc123
                name: web
              volumes:
              - name: data
                persistentVolumeClaim:
                  claimName: web-data
        ---
        kind: Service
        metadata:
          name: web
    "};

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from([APP_NAME].iter().chain(args)).unwrap()
    }

    fn rewrite(args: &[&str], input: &str) -> Result<String, Error> {
        let mut output = Vec::new();
        run(&cli(args), input.as_bytes(), &mut output)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn tag_and_git_tag_conflict() {
        let result = Cli::try_parse_from([APP_NAME, "--tag", "a", "--git-tag", "HEAD"]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ArgumentConflict
        );
    }

    #[test]
    fn without_options_manifests_pass_through() {
        assert_eq!(rewrite(&[], MANIFESTS).unwrap(), MANIFESTS);
    }

    #[test]
    fn tag_and_volumes_are_rewritten() {
        let output = rewrite(&["--tag", "def456", "--no-volumes"], MANIFESTS).unwrap();

        assert_eq!(
            output,
            indoc! {"
                ---
                kind: Deployment
                spec:
                  template:
                    spec:
                      containers:
                      - image: leastauthority/web:def456
                        name: web
                      volumes:
                      - emptyDir: {}
                        name: data
                ---
                kind: Service
                metadata:
                  name: web
            "}
        );
    }

    #[test]
    fn invalid_input_writes_nothing() {
        let mut output = Vec::new();
        let result = run(
            &cli(&["--tag", "def456"]),
            "kind: Deployment\nspec: [unclosed".as_bytes(),
            &mut output,
        );

        assert!(matches!(result, Err(Error::ReadManifests { .. })));
        assert!(output.is_empty());
    }

    #[test]
    fn unparsable_image_writes_nothing() {
        let mut output = Vec::new();
        let result = run(
            &cli(&["--tag", "def456"]),
            indoc! {"
                kind: Deployment
                spec:
                  template:
                    spec:
                      containers:
                      - image: nginx:latest
            "}
            .as_bytes(),
            &mut output,
        );

        assert!(matches!(result, Err(Error::RewriteTags { .. })));
        assert!(output.is_empty());
    }
}
