//! Type resolution: mapping a concrete object to its group/version/kind.

use crate::error::{LookupError, Result};
use crate::object::{GroupVersionKind, Object, ObjectKey, ObjectReference};
use std::collections::BTreeSet;

/// Resolves the schema of a concrete object.
pub trait TypeResolver {
    fn resolve_type(&self, object: &Object) -> Result<GroupVersionKind>;

    fn object_reference(&self, object: &Object) -> Result<ObjectReference> {
        Ok(object.reference(&self.resolve_type(object)?))
    }

    fn object_key(&self, object: &Object) -> Result<ObjectKey> {
        Ok(object.key(&self.resolve_type(object)?))
    }
}

impl<T: TypeResolver + ?Sized> TypeResolver for &T {
    fn resolve_type(&self, object: &Object) -> Result<GroupVersionKind> {
        (**self).resolve_type(object)
    }
}

/// Reads `apiVersion` and `kind` straight from the object.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeMetaResolver;

impl TypeResolver for TypeMetaResolver {
    fn resolve_type(&self, object: &Object) -> Result<GroupVersionKind> {
        match (object.api_version(), object.kind()) {
            (Some(api_version), Some(kind)) if !kind.is_empty() => {
                GroupVersionKind::parse(api_version, kind)
            }
            _ => Err(LookupError::MissingTypeMeta(object.display_name())),
        }
    }
}

/// An immutable set of known types. Objects of any other type fail to resolve.
///
/// Built once with [`Scheme::register`] and then shared by reference, so
/// independent builds never observe each other's registrations.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    types: BTreeSet<GroupVersionKind>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, gvk: GroupVersionKind) -> Self {
        self.types.insert(gvk);
        self
    }

    /// Core workload kinds plus the cluster-level custom resources.
    pub fn builtin() -> Self {
        [
            ("", "v1", "Pod"),
            ("", "v1", "Service"),
            ("", "v1", "ConfigMap"),
            ("", "v1", "Secret"),
            ("", "v1", "PersistentVolumeClaim"),
            ("", "v1", "ServiceAccount"),
            ("apps", "v1", "StatefulSet"),
            ("apps", "v1", "Deployment"),
            ("batch", "v1", "Job"),
            ("rbac.authorization.k8s.io", "v1", "RoleBinding"),
            ("apps.kubeblocks.io", "v1", "Cluster"),
            ("apps.kubeblocks.io", "v1", "Component"),
            ("workloads.kubeblocks.io", "v1", "InstanceSet"),
            ("dataprotection.kubeblocks.io", "v1alpha1", "Backup"),
        ]
        .into_iter()
        .fold(Self::new(), |scheme, (group, version, kind)| {
            scheme.register(GroupVersionKind::new(group, version, kind))
        })
    }

    pub fn contains(&self, gvk: &GroupVersionKind) -> bool {
        self.types.contains(gvk)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.types.iter()
    }
}

impl FromIterator<GroupVersionKind> for Scheme {
    fn from_iter<I: IntoIterator<Item = GroupVersionKind>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}

impl TypeResolver for Scheme {
    fn resolve_type(&self, object: &Object) -> Result<GroupVersionKind> {
        let gvk = TypeMetaResolver.resolve_type(object)?;
        if self.contains(&gvk) {
            Ok(gvk)
        } else {
            Err(LookupError::UnregisteredType(gvk.to_string()))
        }
    }
}
