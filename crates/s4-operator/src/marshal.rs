//! Rendering of node key material into role-specific node configuration.

use s4_transform::Document;

/// Everything a [`ConfigurationMarshaler`] needs to configure both nodes of
/// a grid.
#[derive(Clone, Copy, Debug)]
pub struct MarshalInput<'a> {
    pub introducer_pem: &'a str,
    pub storage_pem: &'a str,
    pub storage_privkey: &'a str,
    pub introducer_port: u16,
    pub storage_port: u16,
    pub bucket_name: &'a str,
    pub public_host: &'a str,
    pub private_host: &'a str,
    pub introducer_furl: &'a str,
    pub s3_access_key_id: &'a str,
    pub s3_secret_key: &'a str,
    pub log_gatherer_furl: Option<&'a str>,
    pub stats_gatherer_furl: Option<&'a str>,
}

/// Role-specific configuration, stored verbatim in the subscription's
/// ConfigMap.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfiguration {
    pub introducer: Document,
    pub storage: Document,
}

/// Turns node certificates and deployment settings into node configuration.
pub trait ConfigurationMarshaler: Send + Sync {
    fn marshal(&self, input: &MarshalInput<'_>) -> NodeConfiguration;
}

/// Produces the configuration consumed by the Tahoe-LAFS node images.
#[derive(Clone, Copy, Debug, Default)]
pub struct TahoeConfigurationMarshaler;

impl ConfigurationMarshaler for TahoeConfigurationMarshaler {
    fn marshal(&self, input: &MarshalInput<'_>) -> NodeConfiguration {
        let gatherers = [
            ("log_gatherer_furl", input.log_gatherer_furl),
            ("stats_gatherer_furl", input.stats_gatherer_furl),
        ]
        .into_iter()
        .filter_map(|(key, furl)| furl.map(|furl| (key, Document::from(furl))));

        let introducer = Document::mapping(
            [
                ("node_pem", Document::from(input.introducer_pem)),
                ("port", Document::from(input.introducer_port)),
                (
                    "tub_location",
                    tub_location(input.public_host, input.private_host, input.introducer_port)
                        .into(),
                ),
            ]
            .into_iter()
            .chain(gatherers.clone()),
        );

        let storage = Document::mapping(
            [
                ("node_pem", Document::from(input.storage_pem)),
                ("node_privkey", Document::from(input.storage_privkey)),
                ("port", Document::from(input.storage_port)),
                (
                    "tub_location",
                    tub_location(input.public_host, input.private_host, input.storage_port)
                        .into(),
                ),
                ("nickname", Document::from(input.bucket_name)),
                ("introducer_furl", Document::from(input.introducer_furl)),
                (
                    "s3",
                    Document::mapping([
                        ("access_key_id", input.s3_access_key_id),
                        ("secret_key", input.s3_secret_key),
                        ("bucket", input.bucket_name),
                    ]),
                ),
            ]
            .into_iter()
            .chain(gatherers),
        );

        NodeConfiguration {
            introducer,
            storage,
        }
    }
}

fn tub_location(public_host: &str, private_host: &str, port: u16) -> String {
    format!("tcp:{public_host}:{port},tcp:{private_host}:{port}")
}
