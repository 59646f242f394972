//! Derivation and validation of per-subscription names and hostnames.
//!
//! Every name is derived from the lowercase, unpadded base-32 encoding of
//! the subscription id, see [`sanitize`].

// The RFC 1123 checks are adapted from Kubernetes.
// See apimachinery/pkg/util/validation/validation.go in the Kubernetes source

use std::sync::LazyLock;

use const_format::concatcp;
use data_encoding::BASE32;
use regex::Regex;
use snafu::{ResultExt, Snafu, ensure};

use crate::model::SubscriptionId;

/// Minimal length required by RFC 1123 is 63. Up to 255 allowed, unsupported by k8s.
const RFC_1123_LABEL_MAX_LENGTH: usize = 63;
const RFC_1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";

/// This is a subdomain's max length in DNS (RFC 1123)
const RFC_1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
const RFC_1123_SUBDOMAIN_FMT: &str =
    concatcp!(RFC_1123_LABEL_FMT, "(\\.", RFC_1123_LABEL_FMT, ")*");

static RFC_1123_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1123_LABEL_FMT}$")).expect("failed to compile RFC 1123 label regex")
});

static RFC_1123_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1123_SUBDOMAIN_FMT}$"))
        .expect("failed to compile RFC 1123 subdomain regex")
});

const CONFIGMAP_NAME_PREFIX: &str = "customer-config-";
const DEPLOYMENT_NAME_PREFIX: &str = "customer-deployment-";
const BUCKET_NAME_PREFIX: &str = "lae";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{input:?} is not a base-32 encoded subscription id"))]
    DecodeBase32 {
        source: data_encoding::DecodeError,
        input: String,
    },

    #[snafu(display("{name:?} is {length} bytes long but must be no more than {max_length}"))]
    TooLong {
        name: String,
        length: usize,
        max_length: usize,
    },

    #[snafu(display(
        "{name:?} is not a valid RFC 1123 {kind}, it must consist of lower case alphanumeric characters or '-' and start and end with an alphanumeric character"
    ))]
    InvalidName { name: String, kind: &'static str },
}

/// Encodes `id` as lowercase base-32 without padding.
///
/// ```
/// use s4_operator::naming::sanitize;
///
/// assert_eq!(sanitize(b"abc"), "mfrgg");
/// ```
pub fn sanitize(id: &[u8]) -> String {
    let mut encoded = BASE32.encode(id);
    encoded.truncate(encoded.trim_end_matches('=').len());
    encoded.make_ascii_lowercase();
    encoded
}

/// Restores the bytes [`sanitize`]d into `sanitized`.
pub fn decode(sanitized: &str) -> Result<Vec<u8>> {
    let mut padded = sanitized.to_ascii_uppercase();
    let remainder = padded.len() % 8;
    if remainder != 0 {
        padded.extend(std::iter::repeat_n('=', 8 - remainder));
    }

    BASE32.decode(padded.as_bytes()).context(DecodeBase32Snafu {
        input: sanitized.to_owned(),
    })
}

/// Name of the ConfigMap holding the node configuration of a subscription.
pub fn configmap_name(subscription_id: &SubscriptionId) -> Result<String> {
    object_name(CONFIGMAP_NAME_PREFIX, subscription_id)
}

/// Name of the Deployment running the grid of a subscription.
pub fn deployment_name(subscription_id: &SubscriptionId) -> Result<String> {
    object_name(DEPLOYMENT_NAME_PREFIX, subscription_id)
}

/// Object names are DNS subdomains. The sanitized id on its own also ends up
/// in label values and the public host, so it has to be a valid label.
fn object_name(prefix: &str, subscription_id: &SubscriptionId) -> Result<String> {
    let sanitized = subscription_id.sanitized();
    validate_rfc_1123_label(&sanitized)?;

    let name = format!("{prefix}{sanitized}");
    validate_rfc_1123_subdomain(&name)?;
    Ok(name)
}

/// The publicly resolvable host of a subscription's introducer, e.g.
/// `aaaaaaaa.introducer.s4.example.com`.
pub fn public_host(subscription_id: &SubscriptionId, domain: &str) -> Result<String> {
    let sanitized = subscription_id.sanitized();
    validate_rfc_1123_label(&sanitized)?;

    let host = format!("{sanitized}.introducer.{domain}");
    validate_rfc_1123_subdomain(&host)?;
    Ok(host)
}

/// The S3 bucket holding the shares of a subscription.
///
/// ```
/// use s4_operator::{model::SubscriptionId, naming::bucket_name};
///
/// assert_eq!(bucket_name("abc", &SubscriptionId::new("def")), "lae-mfrgg-mrswm");
/// ```
pub fn bucket_name(customer_id: &str, subscription_id: &SubscriptionId) -> String {
    format!(
        "{BUCKET_NAME_PREFIX}-{}-{}",
        sanitize(customer_id.as_bytes()),
        subscription_id.sanitized()
    )
}

/// Tests for a string that conforms to the definition of a label in DNS (RFC 1123).
pub fn validate_rfc_1123_label(name: &str) -> Result<()> {
    validate_length(name, RFC_1123_LABEL_MAX_LENGTH)?;
    ensure!(
        RFC_1123_LABEL_REGEX.is_match(name),
        InvalidNameSnafu {
            name,
            kind: "label"
        }
    );
    Ok(())
}

/// Tests for a string that conforms to the definition of a subdomain in DNS (RFC 1123).
pub fn validate_rfc_1123_subdomain(name: &str) -> Result<()> {
    validate_length(name, RFC_1123_SUBDOMAIN_MAX_LENGTH)?;
    ensure!(
        RFC_1123_SUBDOMAIN_REGEX.is_match(name),
        InvalidNameSnafu {
            name,
            kind: "subdomain"
        }
    );
    Ok(())
}

fn validate_length(name: &str, max_length: usize) -> Result<()> {
    ensure!(
        name.len() <= max_length,
        TooLongSnafu {
            name,
            length: name.len(),
            max_length,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(b"abc", "mfrgg")]
    #[case(b"def", "mrswm")]
    #[case(&[0; 16], "aaaaaaaaaaaaaaaaaaaaaaaaaa")]
    #[case(b"", "")]
    fn sanitize_encodes_lowercase_unpadded(#[case] id: &[u8], #[case] expected: &str) {
        assert_eq!(sanitize(id), expected);
    }

    #[rstest]
    #[case(b"a")]
    #[case(b"abcde")]
    #[case(b"sub_x14Characterx")]
    #[case(&[0; 16])]
    #[case(&[0xff, 0x00, 0x7f])]
    fn decode_restores_sanitized_ids(#[case] id: &[u8]) {
        assert_eq!(decode(&sanitize(id)).unwrap(), id);
    }

    #[test]
    fn sanitize_is_injective_on_similar_ids() {
        let ids: [&[u8]; 4] = [b"sub_1", b"sub_2", b"sub_10", b"sub_1\0"];
        let mut names: Vec<_> = ids.iter().map(|id| sanitize(id)).collect();
        names.sort();
        names.dedup();

        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode("not base32!"),
            Err(Error::DecodeBase32 { .. })
        ));
    }

    #[test]
    fn derived_names() {
        let id = SubscriptionId::new("sub_x14Characterx");

        assert_eq!(
            configmap_name(&id).unwrap(),
            "customer-config-on2wex3yge2eg2dbojqwg5dfoj4a"
        );
        assert_eq!(
            deployment_name(&id).unwrap(),
            "customer-deployment-on2wex3yge2eg2dbojqwg5dfoj4a"
        );
        assert_eq!(
            public_host(&id, "s4.example.com").unwrap(),
            "on2wex3yge2eg2dbojqwg5dfoj4a.introducer.s4.example.com"
        );
    }

    #[test]
    fn names_longer_than_a_label_are_accepted() {
        let id = SubscriptionId::new("sub_1AbCdEfGhIjKlMnOpQrStUvW");
        let sanitized = "on2wexzrifregzcfmzdwqslkjnwe23spobixeu3ukv3fo";

        assert_eq!(
            deployment_name(&id).unwrap(),
            format!("customer-deployment-{sanitized}")
        );
        assert_eq!(
            configmap_name(&id).unwrap(),
            format!("customer-config-{sanitized}")
        );
        assert!(deployment_name(&id).unwrap().len() > RFC_1123_LABEL_MAX_LENGTH);
    }

    #[test]
    fn overlong_names_are_rejected() {
        let id = SubscriptionId::new("x".repeat(40));
        assert!(matches!(
            deployment_name(&id),
            Err(Error::TooLong { max_length: 63, .. })
        ));
        assert!(matches!(
            configmap_name(&id),
            Err(Error::TooLong { max_length: 63, .. })
        ));
    }

    #[rstest]
    #[case("customer-config-aaaa", true)]
    #[case("a", true)]
    #[case("-leading", false)]
    #[case("trailing-", false)]
    #[case("Upper", false)]
    #[case("with.dot", false)]
    #[case("", false)]
    fn rfc_1123_labels(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_rfc_1123_label(name).is_ok(), valid);
    }

    #[test]
    fn invalid_domain_is_rejected() {
        let id = SubscriptionId::new("abc");
        assert!(public_host(&id, "Example.COM").is_err());
    }
}
