//! The read boundary: listing objects by type and label selector.
//!
//! Builders never talk to an API server directly. They issue blocking list
//! calls through [`ObjectQuery`], passing the caller's [`QueryContext`] along
//! untouched; cancellation and deadlines are honored by the implementation.

use crate::error::{LookupError, Result};
use crate::object::{GroupVersionKind, Object};
use crate::rules::{MatchingLabels, RuleSet};
use crate::scheme::{TypeMetaResolver, TypeResolver};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Caller-owned cancellation flag and deadline.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now. A timeout too large to represent as an
    /// instant leaves the context without a deadline.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail if the context was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(LookupError::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(LookupError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Lists objects of one type matching a label selector.
///
/// Implementations must return only objects of `object_type` and fail with
/// [`LookupError::UnexpectedShape`] if the backing store hands back anything else.
pub trait ObjectQuery {
    fn list(
        &self,
        ctx: &QueryContext,
        object_type: &GroupVersionKind,
        namespace: &str,
        selector: &MatchingLabels,
    ) -> Result<Vec<Object>>;
}

impl<T: ObjectQuery + ?Sized> ObjectQuery for &T {
    fn list(
        &self,
        ctx: &QueryContext,
        object_type: &GroupVersionKind,
        namespace: &str,
        selector: &MatchingLabels,
    ) -> Result<Vec<Object>> {
        (**self).list(ctx, object_type, namespace, selector)
    }
}

/// Whether every selector pair is present in `labels`.
pub fn selector_matches(selector: &MatchingLabels, labels: &MatchingLabels) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// An in-memory object cache, e.g. loaded from a snapshot file.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: Vec<Object>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: Object) {
        self.objects.push(object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter()
    }

    /// First object with the given type and namespaced name.
    pub fn get(
        &self,
        object_type: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Option<&Object> {
        self.objects.iter().find(|o| {
            o.name() == name
                && o.namespace() == namespace
                && TypeMetaResolver
                    .resolve_type(o)
                    .is_ok_and(|gvk| &gvk == object_type)
        })
    }

    /// First object of `kind` with the given namespaced name, any group/version.
    pub fn find(&self, kind: &str, namespace: &str, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| {
            o.kind() == Some(kind) && o.namespace() == namespace && o.name() == name
        })
    }
}

impl FromIterator<Object> for ObjectStore {
    fn from_iter<I: IntoIterator<Item = Object>>(iter: I) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}

impl Extend<Object> for ObjectStore {
    fn extend<I: IntoIterator<Item = Object>>(&mut self, iter: I) {
        self.objects.extend(iter);
    }
}

impl ObjectQuery for ObjectStore {
    fn list(
        &self,
        ctx: &QueryContext,
        object_type: &GroupVersionKind,
        namespace: &str,
        selector: &MatchingLabels,
    ) -> Result<Vec<Object>> {
        ctx.check()?;
        let mut matched = Vec::new();
        for object in &self.objects {
            if !object.as_value().is_object() {
                return Err(LookupError::UnexpectedShape {
                    object_type: object_type.to_string(),
                    reason: "cached entry is not an object".to_string(),
                });
            }
            let gvk = TypeMetaResolver.resolve_type(object)?;
            if &gvk != object_type {
                continue;
            }
            if !namespace.is_empty() && object.namespace() != namespace {
                continue;
            }
            if selector_matches(selector, &object.labels()) {
                matched.push(object.clone());
            }
        }
        Ok(matched)
    }
}

/// Every secondary owned by `primary` under `rules`, in rule order.
pub fn list_secondaries<Q: ObjectQuery + ?Sized>(
    ctx: &QueryContext,
    rules: &RuleSet,
    query: &Q,
    primary: &Object,
    gvk: &GroupVersionKind,
    namespaced: bool,
) -> Result<Vec<Object>> {
    let mut secondaries = Vec::new();
    for request in rules.secondary_queries(primary, gvk, namespaced)? {
        tracing::debug!(
            owner = %primary.display_name(),
            object_type = %request.object_type,
            namespace = %request.namespace,
            "listing owned objects"
        );
        secondaries.extend(query.list(
            ctx,
            &request.object_type,
            &request.namespace,
            &request.selector,
        )?);
    }
    Ok(secondaries)
}
