//! Hands synthesized resources to the cluster.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    Api, Client, Resource, ResourceExt,
    api::{Patch, PatchParams},
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::resources::K8sResourceSet;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Field manager used for server-side apply unless configured otherwise.
pub const DEFAULT_FIELD_MANAGER: &str = "s4-provisioner";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("{kind} has no name"))]
    MissingName { kind: String },

    #[snafu(display("{kind} {name:?} has no namespace"))]
    MissingNamespace { kind: String, name: String },

    #[snafu(display("failed to apply {kind} {name:?}"))]
    Patch {
        source: kube::Error,
        kind: String,
        name: String,
    },
}

/// Makes the cluster match a [`K8sResourceSet`].
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    async fn apply(&self, resources: &K8sResourceSet) -> Result<()>;
}

/// Applies resources using server-side apply.
#[derive(Clone)]
pub struct KubeApplier {
    client: Client,
    field_manager: String,
}

impl KubeApplier {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    async fn apply_resource<K>(&self, resource: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        K::DynamicType: Default,
    {
        let kind = K::kind(&K::DynamicType::default()).into_owned();
        let name = resource
            .meta()
            .name
            .clone()
            .context(MissingNameSnafu { kind: kind.clone() })?;
        let namespace = resource.namespace().context(MissingNamespaceSnafu {
            kind: kind.clone(),
            name: name.clone(),
        })?;

        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        // Forced, so objects edited by hand converge back to the synthesized
        // state instead of reporting conflicts.
        let patch_params = PatchParams::apply(&self.field_manager).force();

        api.patch(&name, &patch_params, &Patch::Apply(resource))
            .await
            .with_context(|_| PatchSnafu {
                kind: kind.clone(),
                name: name.clone(),
            })?;

        tracing::info!(kind, name, namespace, "applied resource");
        Ok(())
    }
}

#[async_trait]
impl ResourceApplier for KubeApplier {
    #[tracing::instrument(skip_all)]
    async fn apply(&self, resources: &K8sResourceSet) -> Result<()> {
        // The Deployment mounts the ConfigMap, so the ConfigMap goes first.
        self.apply_resource(&resources.config_map).await?;
        self.apply_resource(&resources.deployment).await?;
        self.apply_resource(&resources.service).await
    }
}
