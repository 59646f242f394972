//! Synthesis of the Kubernetes objects serving one subscription.
//!
//! Every object is built as a [`Document`] from a fixed template using the
//! transform engine and only converted into its typed `k8s-openapi`
//! representation at the very end, see [`K8sResourceSet::synthesize`].

use std::ops::Index;

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Service},
};
use s4_transform::Document;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};

use crate::{
    config::DeploymentConfiguration, marshal::ConfigurationMarshaler, model::SubscriptionDetails,
    naming,
};

mod configmap;
mod deployment;
mod service;

pub use configmap::create_configuration;
pub use deployment::create_deployment;
pub use service::{
    CUSTOMER_GRID_SERVICE_NAME, IDLE_TIMEOUT_ANNOTATION, INTRODUCER_SERVICE_PORT,
    STORAGE_SERVICE_PORT, create_service,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to derive resource names"))]
    Naming { source: naming::Error },

    #[snafu(display("failed to transform {kind} template"))]
    Transform {
        source: s4_transform::Error,
        kind: &'static str,
    },

    #[snafu(display("failed to serialize {key} node configuration"))]
    SerializeConfiguration {
        source: serde_json::Error,
        key: &'static str,
    },

    #[snafu(display("synthesized {kind} is not a valid Kubernetes object"))]
    ConvertResource {
        source: serde_json::Error,
        kind: &'static str,
    },
}

/// The two server roles of a grid.
///
/// The Deployment addresses containers and volumes by position, the role
/// decides which slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Introducer,
    Storage,
}

impl Role {
    /// Position of the role's container and volume in the pod template.
    pub fn index(self) -> usize {
        match self {
            Self::Introducer => 0,
            Self::Storage => 1,
        }
    }

    pub fn container_name(self) -> &'static str {
        match self {
            Self::Introducer => "introducer",
            Self::Storage => "storageserver",
        }
    }

    /// Name of the container port, used by the grid router to find it.
    pub fn port_name(self) -> &'static str {
        match self {
            Self::Introducer => "introducer",
            Self::Storage => "storage",
        }
    }

    pub fn volume_name(self) -> &'static str {
        match self {
            Self::Introducer => "introducer-config-volume",
            Self::Storage => "storage-config-volume",
        }
    }

    /// ConfigMap key holding the role's node configuration.
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Introducer => "introducer.json",
            Self::Storage => "storage.json",
        }
    }
}

/// One value per [`Role`], in pod template order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PodSlots<T> {
    pub introducer: T,
    pub storage: T,
}

impl<T> PodSlots<T> {
    pub fn new(introducer: T, storage: T) -> Self {
        Self {
            introducer,
            storage,
        }
    }

    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Introducer => &self.introducer,
            Role::Storage => &self.storage,
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(Role, T) -> U) -> PodSlots<U> {
        PodSlots {
            introducer: f(Role::Introducer, self.introducer),
            storage: f(Role::Storage, self.storage),
        }
    }

    /// Iterates the slots in pod template order.
    pub fn iter(&self) -> impl Iterator<Item = (Role, &T)> {
        [
            (Role::Introducer, &self.introducer),
            (Role::Storage, &self.storage),
        ]
        .into_iter()
    }
}

impl<T> Index<Role> for PodSlots<T> {
    type Output = T;

    fn index(&self, role: Role) -> &Self::Output {
        self.get(role)
    }
}

/// The objects serving one subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct K8sResourceSet {
    pub config_map: ConfigMap,
    pub deployment: Deployment,
    pub service: Service,
}

impl K8sResourceSet {
    /// Synthesizes the ConfigMap, Deployment and Service for `details`.
    ///
    /// If `existing_service` is given, the shared Service is converged from
    /// it instead of being created from scratch.
    pub fn synthesize(
        config: &DeploymentConfiguration,
        details: &SubscriptionDetails,
        marshaler: &dyn ConfigurationMarshaler,
        existing_service: Option<&Document>,
    ) -> Result<Self> {
        let config_map = create_configuration(config, details, marshaler)?;
        let deployment = create_deployment(config, details)?;
        let service = create_service(&config.kubernetes_namespace, existing_service)?;

        Ok(Self {
            config_map: into_resource(&config_map, "ConfigMap")?,
            deployment: into_resource(&deployment, "Deployment")?,
            service: into_resource(&service, "Service")?,
        })
    }
}

fn into_resource<K>(document: &Document, kind: &'static str) -> Result<K>
where
    K: DeserializeOwned,
{
    serde_json::from_value(document.into()).context(ConvertResourceSnafu { kind })
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn roles_are_in_pod_template_order() {
        let indices: Vec<_> = Role::iter().map(Role::index).collect();
        assert_eq!(indices, [0, 1]);
    }

    #[test]
    fn pod_slots_map_and_index() {
        let ports = PodSlots::new(12345_u16, 12346);
        let names = ports.map(|role, port| format!("{role}:{port}"));

        assert_eq!(names[Role::Introducer], "introducer:12345");
        assert_eq!(names[Role::Storage], "storage:12346");
        assert_eq!(
            names.iter().map(|(role, _)| role).collect::<Vec<_>>(),
            [Role::Introducer, Role::Storage]
        );
    }
}
