//! 支持的k8s资源类型表
//!
//! 封闭枚举：未知kind是显式的`UnsupportedKind`错误，而不是默认分支。

use std::fmt;
use std::str::FromStr;

use convoy_domain::ports::GroupVersionResource;
use convoy_errors::ConvoyError;

/// 支持的资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Deployment,
    Service,
    Pod,
    PersistentVolume,
    PersistentVolumeClaim,
    Binding,
    Secret,
    ConfigMap,
    StatefulSet,
    Ingress,
    DaemonSet,
    Job,
    CronJob,
    Role,
    RoleBinding,
    NetworkPolicy,
}

/// 资源的静态元信息
#[derive(Debug, Clone, Copy)]
pub struct ResourceMetadata {
    pub gvr: GroupVersionResource,
    pub namespaced: bool,
}

const fn gvr(
    group: &'static str,
    version: &'static str,
    resource: &'static str,
) -> GroupVersionResource {
    GroupVersionResource {
        group,
        version,
        resource,
    }
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 16] = [
        ResourceKind::Deployment,
        ResourceKind::Service,
        ResourceKind::Pod,
        ResourceKind::PersistentVolume,
        ResourceKind::PersistentVolumeClaim,
        ResourceKind::Binding,
        ResourceKind::Secret,
        ResourceKind::ConfigMap,
        ResourceKind::StatefulSet,
        ResourceKind::Ingress,
        ResourceKind::DaemonSet,
        ResourceKind::Job,
        ResourceKind::CronJob,
        ResourceKind::Role,
        ResourceKind::RoleBinding,
        ResourceKind::NetworkPolicy,
    ];

    pub fn metadata(&self) -> ResourceMetadata {
        match self {
            ResourceKind::Deployment => ResourceMetadata {
                gvr: gvr("apps", "v1", "deployments"),
                namespaced: true,
            },
            ResourceKind::Service => ResourceMetadata {
                gvr: gvr("", "v1", "services"),
                namespaced: true,
            },
            ResourceKind::Pod => ResourceMetadata {
                gvr: gvr("", "v1", "pods"),
                namespaced: true,
            },
            ResourceKind::PersistentVolume => ResourceMetadata {
                gvr: gvr("", "v1", "persistentvolumes"),
                namespaced: false,
            },
            ResourceKind::PersistentVolumeClaim => ResourceMetadata {
                gvr: gvr("", "v1", "persistentvolumeclaims"),
                namespaced: true,
            },
            ResourceKind::Binding => ResourceMetadata {
                gvr: gvr("", "v1", "bindings"),
                namespaced: true,
            },
            ResourceKind::Secret => ResourceMetadata {
                gvr: gvr("", "v1", "secrets"),
                namespaced: true,
            },
            ResourceKind::ConfigMap => ResourceMetadata {
                gvr: gvr("", "v1", "configmaps"),
                namespaced: true,
            },
            ResourceKind::StatefulSet => ResourceMetadata {
                gvr: gvr("apps", "v1", "statefulsets"),
                namespaced: true,
            },
            ResourceKind::Ingress => ResourceMetadata {
                gvr: gvr("networking.k8s.io", "v1", "ingresses"),
                namespaced: true,
            },
            ResourceKind::DaemonSet => ResourceMetadata {
                gvr: gvr("apps", "v1", "daemonsets"),
                namespaced: true,
            },
            ResourceKind::Job => ResourceMetadata {
                gvr: gvr("batch", "v1", "jobs"),
                namespaced: true,
            },
            ResourceKind::CronJob => ResourceMetadata {
                gvr: gvr("batch", "v1", "cronjobs"),
                namespaced: true,
            },
            ResourceKind::Role => ResourceMetadata {
                gvr: gvr("rbac.authorization.k8s.io", "v1", "roles"),
                namespaced: true,
            },
            ResourceKind::RoleBinding => ResourceMetadata {
                gvr: gvr("rbac.authorization.k8s.io", "v1", "rolebindings"),
                namespaced: true,
            },
            ResourceKind::NetworkPolicy => ResourceMetadata {
                gvr: gvr("networking.k8s.io", "v1", "networkpolicies"),
                namespaced: true,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Pod => "Pod",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Binding => "Binding",
            ResourceKind::Secret => "Secret",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Job => "Job",
            ResourceKind::CronJob => "CronJob",
            ResourceKind::Role => "Role",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::NetworkPolicy => "NetworkPolicy",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = ConvoyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| ConvoyError::unsupported_kind(s))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
