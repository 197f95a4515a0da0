//! The provider dependency graph: node storage, scopes and edge bookkeeping.
//!
//! Nothing in here runs user code. Factories, listeners and dispose hooks are
//! invoked by [`Shared`](crate::shared::Shared) with no borrow of the graph held.

use crate::core::{ListenerId, OwnerId, ProviderId};
use crate::definition::{Meta, Recipe};
use crate::error::ProviderError;
use crate::observer::ProviderObserver;
use crate::overrides::Overrides;
use crate::runtime::TaskSpawner;

use generational_arena::{Arena, Index};
use indexmap::IndexSet;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

pub(crate) type NodeId = Index;
pub(crate) type Listener = Rc<dyn Fn(&dyn Any)>;
pub(crate) type DisposeHook = Box<dyn FnOnce()>;

/// Where a node is in its life. A disposed node is removed from the arena,
/// so its (generational) id simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
  Creating,
  Ready,
  Recomputing,
  /// The last rebuild failed, or one of its dependencies did. The previous
  /// value is kept but not served.
  Failed,
}

/// Staleness during a propagation wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Mark {
  Clean,
  /// Some transitive dependency changed; dependencies must be checked first.
  Check,
  /// A direct dependency changed; must rebuild.
  Dirty,
}

pub(crate) struct Node {
  pub(crate) meta: Meta,
  pub(crate) recipe: Rc<dyn Recipe>,
  pub(crate) home: OwnerId,
  pub(crate) lifecycle: Lifecycle,
  pub(crate) mark: Mark,
  pub(crate) value: Option<Rc<dyn Any>>,
  pub(crate) error: Option<ProviderError>,
  pub(crate) dependencies: IndexSet<NodeId>,
  pub(crate) dependents: IndexSet<NodeId>,
  pub(crate) listeners: Vec<(ListenerId, Listener)>,
  pub(crate) on_dispose: Vec<DisposeHook>,
  pub(crate) epoch: u64,
  pub(crate) builds: u64,
  pub(crate) spawner: Option<Rc<dyn TaskSpawner>>,
}

impl Node {
  pub(crate) fn new(meta: Meta, recipe: Rc<dyn Recipe>, home: OwnerId) -> Self {
    Self {
      meta,
      recipe,
      home,
      lifecycle: Lifecycle::Creating,
      mark: Mark::Clean,
      value: None,
      error: None,
      dependencies: IndexSet::new(),
      dependents: IndexSet::new(),
      listeners: Vec::new(),
      on_dispose: Vec::new(),
      epoch: 0,
      builds: 0,
      spawner: None,
    }
  }

  pub(crate) fn is_observed(&self) -> bool {
    !self.listeners.is_empty() || !self.dependents.is_empty()
  }
}

/// Per-owner bookkeeping stored inside the shared graph.
pub(crate) struct Scope {
  pub(crate) name: Option<Rc<str>>,
  pub(crate) parent: Option<OwnerId>,
  pub(crate) depth: usize,
  pub(crate) children: Vec<OwnerId>,
  pub(crate) overrides: Overrides,
  pub(crate) cache: HashMap<ProviderId, NodeId>,
  /// Nodes homed in this scope, in the order their first build completed.
  pub(crate) order: Vec<NodeId>,
  pub(crate) spawner: Option<Rc<dyn TaskSpawner>>,
  pub(crate) observers: Vec<Rc<dyn ProviderObserver>>,
  pub(crate) disposed: bool,
}

impl Scope {
  pub(crate) fn label(&self, id: OwnerId) -> String {
    owner_label(self.name.as_deref(), id)
  }
}

pub(crate) fn owner_label(name: Option<&str>, id: OwnerId) -> String {
  match name {
    Some(name) => format!("{} ({})", name, id),
    None => id.to_string(),
  }
}

/// Outcome of looking a definition up from a scope.
pub(crate) enum Lookup {
  Hit(NodeId),
  Create {
    recipe: Option<Rc<dyn Recipe>>,
    min_home: OwnerId,
  },
}

/// The graph shared by every owner of one owner tree.
#[derive(Default)]
pub(crate) struct Graph {
  pub(crate) nodes: Arena<Node>,
  pub(crate) scopes: HashMap<OwnerId, Scope>,
  /// Nodes whose factory is currently on the call stack, outermost first.
  pub(crate) building: Vec<NodeId>,
  /// Nodes marked during propagation, in breadth-first order.
  pub(crate) stale: VecDeque<NodeId>,
  /// Committed changes whose listeners have not been called yet.
  pub(crate) notify: VecDeque<(NodeId, Rc<dyn Any>)>,
  /// Auto-dispose nodes that may have lost their last observer.
  pub(crate) unobserved: VecDeque<NodeId>,
  pub(crate) draining: bool,
}

impl Graph {
  pub(crate) fn scope(&self, id: OwnerId) -> Option<&Scope> {
    self.scopes.get(&id)
  }

  pub(crate) fn label(&self, node: NodeId) -> String {
    self
      .nodes
      .get(node)
      .map(|n| n.meta.label())
      .unwrap_or_else(|| "<disposed>".to_string())
  }

  /// `scope` followed by its ancestors up to the root.
  pub(crate) fn chain(&self, scope: OwnerId) -> Vec<OwnerId> {
    let mut chain = Vec::new();
    let mut current = Some(scope);
    while let Some(id) = current {
      chain.push(id);
      current = self.scopes.get(&id).and_then(|s| s.parent);
    }
    chain
  }

  /// Resolves `meta` as seen from `scope`.
  ///
  /// A node cached by an ancestor is only shared when none of the scopes in
  /// between override something that node (transitively) depends on.
  pub(crate) fn lookup(&self, scope: OwnerId, meta: &Meta) -> Lookup {
    let chain = self.chain(scope);
    for (level, id) in chain.iter().enumerate() {
      let Some(current) = self.scopes.get(id) else {
        continue;
      };
      if let Some(&node) = current.cache.get(&meta.id) {
        if !self.shadowed(&chain[..level], node) {
          return Lookup::Hit(node);
        }
        break;
      }
      if current.overrides.covers(meta) {
        break;
      }
    }

    for id in &chain {
      if let Some(recipe) = self.scopes.get(id).and_then(|s| s.overrides.recipe_for(meta)) {
        return Lookup::Create {
          recipe: Some(recipe),
          min_home: *id,
        };
      }
    }
    let root = chain.last().copied().unwrap_or(scope);
    Lookup::Create {
      recipe: None,
      min_home: root,
    }
  }

  /// Whether any of `below` overrides a provider `node` transitively reads.
  fn shadowed(&self, below: &[OwnerId], node: NodeId) -> bool {
    let overriding: Vec<&Overrides> = below
      .iter()
      .filter_map(|id| self.scopes.get(id))
      .map(|s| &s.overrides)
      .filter(|o| !o.is_empty())
      .collect();
    if overriding.is_empty() {
      return false;
    }

    let mut seen = IndexSet::new();
    let mut pending = vec![node];
    while let Some(current) = pending.pop() {
      let Some(n) = self.nodes.get(current) else {
        continue;
      };
      for &dep in &n.dependencies {
        if !seen.insert(dep) {
          continue;
        }
        if let Some(d) = self.nodes.get(dep) {
          if overriding.iter().any(|o| o.covers(&d.meta)) {
            return true;
          }
        }
        pending.push(dep);
      }
    }
    false
  }

  /// Whether `from` transitively depends on `target`.
  pub(crate) fn depends_on(&self, from: NodeId, target: NodeId) -> bool {
    if from == target {
      return true;
    }
    let mut seen = IndexSet::new();
    let mut pending = vec![from];
    while let Some(current) = pending.pop() {
      let Some(n) = self.nodes.get(current) else {
        continue;
      };
      for &dep in &n.dependencies {
        if dep == target {
          return true;
        }
        if seen.insert(dep) {
          pending.push(dep);
        }
      }
    }
    false
  }

  /// The deepest scope among `min_home` and the homes of `node`'s dependencies.
  pub(crate) fn home_for(&self, node: NodeId, min_home: OwnerId) -> OwnerId {
    let depth = |id: &OwnerId| self.scopes.get(id).map(|s| s.depth).unwrap_or(0);
    let Some(n) = self.nodes.get(node) else {
      return min_home;
    };
    n.dependencies
      .iter()
      .filter_map(|dep| self.nodes.get(*dep).map(|d| d.home))
      .chain(std::iter::once(min_home))
      .max_by_key(depth)
      .unwrap_or(min_home)
  }

  /// Moves a freshly built node from the scope it was built in to `home`.
  pub(crate) fn rehome(&mut self, node: NodeId, home: OwnerId) {
    let Some(n) = self.nodes.get_mut(node) else {
      return;
    };
    let built_in = n.home;
    if built_in == home {
      return;
    }
    n.home = home;
    let provider = n.meta.id;
    if let Some(scope) = self.scopes.get_mut(&built_in) {
      scope.cache.remove(&provider);
    }
    if let Some(scope) = self.scopes.get_mut(&home) {
      scope.cache.insert(provider, node);
    }
  }

  pub(crate) fn add_edge(&mut self, dependent: NodeId, dependency: NodeId) {
    if let Some(n) = self.nodes.get_mut(dependent) {
      n.dependencies.insert(dependency);
    }
    if let Some(n) = self.nodes.get_mut(dependency) {
      n.dependents.insert(dependent);
    }
  }

  /// Drops every outgoing edge of `node` and returns the former dependencies.
  pub(crate) fn release_dependencies(&mut self, node: NodeId) -> Vec<NodeId> {
    let deps: Vec<NodeId> = match self.nodes.get_mut(node) {
      Some(n) => n.dependencies.drain(..).collect(),
      None => return Vec::new(),
    };
    for dep in &deps {
      if let Some(d) = self.nodes.get_mut(*dep) {
        d.dependents.shift_remove(&node);
      }
    }
    deps
  }

  /// Marks the dependents of a changed node dirty, and everything further
  /// downstream as needing a check, queueing them breadth-first.
  pub(crate) fn mark_dependents(&mut self, changed: NodeId) {
    let mut frontier: VecDeque<(NodeId, Mark)> = match self.nodes.get(changed) {
      Some(n) => n.dependents.iter().map(|d| (*d, Mark::Dirty)).collect(),
      None => return,
    };
    while let Some((id, mark)) = frontier.pop_front() {
      let Some(n) = self.nodes.get_mut(id) else {
        continue;
      };
      let was_clean = n.mark == Mark::Clean;
      if n.mark < mark {
        n.mark = mark;
      }
      if was_clean {
        frontier.extend(n.dependents.iter().map(|d| (*d, Mark::Check)));
      }
      self.enqueue(id);
    }
  }

  /// Queues a marked node unless it is already waiting.
  fn enqueue(&mut self, node: NodeId) {
    if !self.stale.contains(&node) {
      self.stale.push_back(node);
    }
  }

  /// Marks a single node for rebuild, e.g. after a manual invalidation.
  pub(crate) fn mark_dirty(&mut self, node: NodeId) {
    let Some(n) = self.nodes.get_mut(node) else {
      return;
    };
    let was_clean = n.mark == Mark::Clean;
    n.mark = Mark::Dirty;
    let dependents: Vec<NodeId> = n.dependents.iter().copied().collect();
    self.enqueue(node);
    if was_clean {
      for dep in dependents {
        self.mark_check(dep);
      }
    }
  }

  fn mark_check(&mut self, node: NodeId) {
    let mut frontier = VecDeque::from([node]);
    while let Some(id) = frontier.pop_front() {
      let Some(n) = self.nodes.get_mut(id) else {
        continue;
      };
      if n.mark == Mark::Clean {
        n.mark = Mark::Check;
        frontier.extend(n.dependents.iter().copied());
      }
      self.enqueue(id);
    }
  }

  /// Removes `node` from the arena and its home cache, detaching every edge
  /// symmetrically. Returns the node so its hooks can run outside the borrow,
  /// along with the dependencies that may have lost their last observer.
  pub(crate) fn remove(&mut self, node: NodeId) -> Option<(Node, Vec<NodeId>)> {
    let released = self.release_dependencies(node);
    let mut removed = self.nodes.remove(node)?;
    for dependent in removed.dependents.drain(..) {
      if let Some(d) = self.nodes.get_mut(dependent) {
        d.dependencies.shift_remove(&node);
      }
    }
    if let Some(scope) = self.scopes.get_mut(&removed.home) {
      if scope.cache.get(&removed.meta.id) == Some(&node) {
        scope.cache.remove(&removed.meta.id);
      }
      scope.order.retain(|id| *id != node);
    }
    self.stale.retain(|id| *id != node);
    self.notify.retain(|(id, _)| *id != node);
    removed.listeners.clear();
    Some((removed, released))
  }

  /// Observers that should hear about events in `scope`.
  pub(crate) fn observers(&self, scope: OwnerId) -> Vec<Rc<dyn ProviderObserver>> {
    self
      .scopes
      .get(&scope)
      .map(|s| s.observers.clone())
      .unwrap_or_default()
  }
}
