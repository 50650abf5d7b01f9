//! Flat reconstruction: every object transitively owned by a root.

use crate::error::Result;
use crate::object::{Object, ObjectKey};
use crate::query::{ObjectQuery, QueryContext, list_secondaries};
use crate::rules::RuleSet;
use crate::scheme::TypeResolver;
use kb_core::config::ViewConfig;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Deduplicated identities plus the object behind each one.
#[derive(Debug, Clone, Default)]
pub struct ReachableSet {
    pub keys: BTreeSet<ObjectKey>,
    pub objects: BTreeMap<ObjectKey, Object>,
}

impl ReachableSet {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.keys.contains(key)
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&Object> {
        self.objects.get(key)
    }

    /// Objects of one kind, ordered by key.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Object> + 'a {
        self.objects
            .iter()
            .filter(move |(key, _)| key.gvk.kind == kind)
            .map(|(_, object)| object)
    }

    fn insert(&mut self, key: ObjectKey, object: Object) {
        self.keys.insert(key.clone());
        self.objects.entry(key).or_insert(object);
    }
}

/// Breadth-first collector over the same rules and query boundary as
/// [`crate::tree::TreeBuilder`]. Each object is enqueued at most once, so
/// objects reachable by several paths, and rule cycles, terminate.
pub struct ReachabilitySetCollector<'a, Q: ?Sized, R: ?Sized> {
    rules: &'a RuleSet,
    query: &'a Q,
    resolver: &'a R,
    namespaced: bool,
}

impl<'a, Q, R> ReachabilitySetCollector<'a, Q, R>
where
    Q: ObjectQuery + ?Sized,
    R: TypeResolver + ?Sized,
{
    pub fn new(rules: &'a RuleSet, query: &'a Q, resolver: &'a R) -> Self {
        Self {
            rules,
            query,
            resolver,
            namespaced: ViewConfig::default().namespaced_queries,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &ViewConfig) -> Self {
        self.namespaced = config.namespaced_queries;
        self
    }

    pub fn collect(&self, ctx: &QueryContext, root: &Object) -> Result<ReachableSet> {
        let mut reachable = ReachableSet::default();
        let mut discovered: HashSet<ObjectKey> = HashSet::new();
        let mut queue: VecDeque<Object> = VecDeque::new();

        discovered.insert(self.resolver.object_key(root)?);
        queue.push_back(root.clone());

        while let Some(object) = queue.pop_front() {
            let gvk = self.resolver.resolve_type(&object)?;
            let key = object.key(&gvk);
            tracing::trace!(object = %key, "collecting");

            let secondaries = list_secondaries(
                ctx,
                self.rules,
                self.query,
                &object,
                &gvk,
                self.namespaced,
            )?;
            reachable.insert(key, object);

            for secondary in secondaries {
                if discovered.insert(self.resolver.object_key(&secondary)?) {
                    queue.push_back(secondary);
                }
            }
        }

        Ok(reachable)
    }
}
