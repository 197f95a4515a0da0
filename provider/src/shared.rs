//! The engine behind every owner of one owner tree.
//!
//! All graph mutation goes through [`Shared`]. User code (factories,
//! listeners, dispose hooks, equality functions and observers) is always
//! invoked with no borrow of the graph held, so it may freely re-enter the
//! owner API.

use crate::core::{ListenerId, OwnerId};
use crate::definition::{sealed::Sealed, Meta, ProviderBase, Recipe};
use crate::error::{ProviderError, Result};
use crate::graph::{DisposeHook, Graph, Lifecycle, Listener, Lookup, Mark, Node, NodeId, Scope};
use crate::observer::{ProviderInfo, ProviderObserver};
use crate::reader::Reader;
use crate::runtime::TaskSpawner;

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

pub(crate) struct Shared {
  graph: RefCell<Graph>,
}

/// Pops a node off the build stack when its factory returns or unwinds.
struct BuildGuard<'a> {
  shared: &'a Shared,
  node: NodeId,
}

impl<'a> BuildGuard<'a> {
  fn enter(shared: &'a Shared, node: NodeId) -> Self {
    shared.graph.borrow_mut().building.push(node);
    Self { shared, node }
  }
}

impl Drop for BuildGuard<'_> {
  fn drop(&mut self) {
    if let Ok(mut graph) = self.shared.graph.try_borrow_mut() {
      if let Some(pos) = graph.building.iter().rposition(|id| *id == self.node) {
        graph.building.remove(pos);
      }
    }
  }
}

/// Clears the draining flag even if a listener or factory unwinds.
struct DrainGuard<'a>(&'a Shared);

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    if let Ok(mut graph) = self.0.graph.try_borrow_mut() {
      graph.draining = false;
    }
  }
}

enum Step {
  Notify(NodeId, Rc<dyn Any>),
  Refresh(NodeId),
  Collect(NodeId),
}

impl Shared {
  pub(crate) fn new() -> Rc<Self> {
    Rc::new(Self {
      graph: RefCell::new(Graph::default()),
    })
  }

  // --- Scopes ---

  pub(crate) fn add_scope(&self, id: OwnerId, scope: Scope) {
    let mut graph = self.graph.borrow_mut();
    if let Some(parent) = scope.parent.and_then(|p| graph.scopes.get_mut(&p)) {
      parent.children.push(id);
    }
    graph.scopes.insert(id, scope);
  }

  pub(crate) fn with_scope<R>(&self, id: OwnerId, f: impl FnOnce(&Scope) -> R) -> Option<R> {
    self.graph.borrow().scope(id).map(f)
  }

  pub(crate) fn scope_label(&self, id: OwnerId) -> String {
    self
      .with_scope(id, |s| s.label(id))
      .unwrap_or_else(|| id.to_string())
  }

  fn ensure_live(&self, scope: OwnerId) -> Result<()> {
    let graph = self.graph.borrow();
    match graph.scope(scope) {
      Some(s) if !s.disposed => Ok(()),
      Some(s) => Err(ProviderError::OwnerDisposed {
        owner: s.label(scope),
      }),
      None => Err(ProviderError::OwnerDisposed {
        owner: scope.to_string(),
      }),
    }
  }

  /// Tears down `scope`: child owners first, then every node homed in it in
  /// reverse creation order. A second call is a no-op.
  pub(crate) fn dispose_scope(self: &Rc<Self>, scope: OwnerId) {
    let (children, parent) = {
      let mut graph = self.graph.borrow_mut();
      let Some(s) = graph.scopes.get_mut(&scope) else {
        return;
      };
      if s.disposed {
        return;
      }
      s.disposed = true;
      (std::mem::take(&mut s.children), s.parent)
    };

    for child in children.into_iter().rev() {
      self.dispose_scope(child);
    }

    let order = self
      .with_scope(scope, |s| s.order.clone())
      .unwrap_or_default();
    tracing::debug!(owner = %self.scope_label(scope), states = order.len(), "disposing provider owner");
    for node in order.into_iter().rev() {
      self.dispose_node(node);
    }

    {
      let mut graph = self.graph.borrow_mut();
      if let Some(p) = parent.and_then(|p| graph.scopes.get_mut(&p)) {
        p.children.retain(|id| *id != scope);
      }
      graph.scopes.remove(&scope);
    }
    self.flush();
  }

  /// Owners of this tree that have not been disposed.
  pub(crate) fn live_scopes(&self) -> usize {
    self.graph.borrow().scopes.len()
  }

  pub(crate) fn is_disposed(&self, scope: OwnerId) -> bool {
    self.with_scope(scope, |s| s.disposed).unwrap_or(true)
  }

  // --- Resolution ---

  /// Resolves `provider` as seen from `scope`, creating its state if needed
  /// and bringing it up to date.
  pub(crate) fn resolve<P: ProviderBase>(self: &Rc<Self>, scope: OwnerId, provider: &P) -> Result<NodeId> {
    self.ensure_live(scope)?;
    let lookup = self.graph.borrow().lookup(scope, provider.meta());
    match lookup {
      Lookup::Hit(node) => {
        self.check_cycle(node)?;
        self.refresh(node)?;
        Ok(node)
      }
      Lookup::Create { recipe, min_home } => {
        let recipe = recipe.unwrap_or_else(|| provider.recipe());
        self.create(scope, provider.meta().clone(), recipe, min_home)
      }
    }
  }

  /// Looks `provider` up without creating or refreshing anything.
  pub(crate) fn find<P: ProviderBase>(&self, scope: OwnerId, provider: &P) -> Option<NodeId> {
    let graph = self.graph.borrow();
    match graph.scope(scope) {
      Some(s) if !s.disposed => {}
      _ => return None,
    }
    match graph.lookup(scope, provider.meta()) {
      Lookup::Hit(node) => Some(node),
      Lookup::Create { .. } => None,
    }
  }

  fn check_cycle(&self, node: NodeId) -> Result<()> {
    let graph = self.graph.borrow();
    let Some(pos) = graph.building.iter().position(|id| *id == node) else {
      return Ok(());
    };
    let mut chain: Vec<String> = graph.building[pos..].iter().map(|id| graph.label(*id)).collect();
    chain.push(graph.label(node));
    Err(ProviderError::CircularDependency { chain })
  }

  fn create(self: &Rc<Self>, scope: OwnerId, meta: Meta, recipe: Rc<dyn Recipe>, min_home: OwnerId) -> Result<NodeId> {
    let label = meta.label();
    let node = {
      let mut graph = self.graph.borrow_mut();
      let provider = meta.id;
      let node = graph.nodes.insert(Node::new(meta, recipe, scope));
      if let Some(s) = graph.scopes.get_mut(&scope) {
        s.cache.insert(provider, node);
      }
      node
    };
    tracing::trace!(provider = %label, owner = %scope, "creating provider state");

    match self.build(node, scope) {
      Ok(value) => {
        let home = {
          let mut graph = self.graph.borrow_mut();
          if let Some(n) = graph.nodes.get_mut(node) {
            n.value = Some(value.clone());
            n.lifecycle = Lifecycle::Ready;
          }
          let home = graph.home_for(node, min_home);
          graph.rehome(node, home);
          let live = matches!(graph.scopes.get(&home), Some(s) if !s.disposed);
          if live {
            if let Some(s) = graph.scopes.get_mut(&home) {
              s.order.push(node);
            }
          } else {
            // The owner was disposed while this factory ran.
            drop(graph);
            self.dispose_node(node);
            return Err(ProviderError::OwnerDisposed {
              owner: home.to_string(),
            });
          }
          home
        };
        if home != scope {
          tracing::trace!(provider = %label, owner = %home, "provider state shared with ancestor owner");
        }
        if let Some(info) = self.info(node) {
          for observer in self.observers_of(node) {
            observer.did_add_provider(&info, value.as_ref());
          }
        }
        Ok(node)
      }
      Err(error) => {
        tracing::trace!(provider = %label, %error, "provider factory failed; nothing cached");
        self.dispose_node(node);
        Err(error)
      }
    }
  }

  fn build(self: &Rc<Self>, node: NodeId, scope: OwnerId) -> Result<Rc<dyn Any>> {
    let (recipe, epoch, first_build) = {
      let mut graph = self.graph.borrow_mut();
      let n = graph.nodes.get_mut(node).ok_or_else(|| ProviderError::Unmounted {
        provider: "<disposed>".to_string(),
      })?;
      n.epoch += 1;
      n.builds += 1;
      (n.recipe.clone(), n.epoch, n.builds == 1)
    };
    let _guard = BuildGuard::enter(self, node);
    let reader = Reader::new(self.clone(), scope, node, epoch, first_build);
    recipe.build(&reader)
  }

  /// Brings `node` up to date: rebuilds it if it is dirty, or if one of its
  /// dependencies turns out to have changed.
  pub(crate) fn refresh(self: &Rc<Self>, node: NodeId) -> Result<()> {
    let (lifecycle, mark, error, draining) = {
      let graph = self.graph.borrow();
      let n = graph.nodes.get(node).ok_or_else(|| ProviderError::Unmounted {
        provider: graph.label(node),
      })?;
      (n.lifecycle, n.mark, n.error.clone(), graph.draining)
    };

    match lifecycle {
      Lifecycle::Creating | Lifecycle::Recomputing => return Ok(()),
      Lifecycle::Failed if draining && mark == Mark::Clean => {
        return match error {
          Some(error) => Err(error),
          None => Ok(()),
        };
      }
      Lifecycle::Failed => return self.recompute(node).map(drop),
      Lifecycle::Ready => {}
    }

    match mark {
      Mark::Clean => Ok(()),
      Mark::Dirty => self.recompute(node).map(drop),
      Mark::Check => {
        let dependencies: Vec<NodeId> = self
          .graph
          .borrow()
          .nodes
          .get(node)
          .map(|n| n.dependencies.iter().copied().collect())
          .unwrap_or_default();
        for dependency in dependencies {
          if matches!(self.lifecycle_of(dependency), Some(Lifecycle::Creating | Lifecycle::Recomputing)) {
            // Undecidable until that build commits; revisit on the next drain step.
            let mut graph = self.graph.borrow_mut();
            if !graph.stale.contains(&node) {
              graph.stale.push_back(node);
            }
            return Ok(());
          }
          if let Err(error) = self.refresh(dependency) {
            // Failed upstream: the next change of that dependency marks this
            // node again.
            if let Some(n) = self.graph.borrow_mut().nodes.get_mut(node) {
              n.mark = Mark::Clean;
              n.lifecycle = Lifecycle::Failed;
              n.error = Some(error.clone());
            }
            return Err(error);
          }
          if self.mark_of(node) == Some(Mark::Dirty) {
            break;
          }
        }
        if self.mark_of(node) == Some(Mark::Dirty) {
          self.recompute(node).map(drop)
        } else {
          if let Some(n) = self.graph.borrow_mut().nodes.get_mut(node) {
            n.mark = Mark::Clean;
          }
          Ok(())
        }
      }
    }
  }

  fn lifecycle_of(&self, node: NodeId) -> Option<Lifecycle> {
    self.graph.borrow().nodes.get(node).map(|n| n.lifecycle)
  }

  fn mark_of(&self, node: NodeId) -> Option<Mark> {
    self.graph.borrow().nodes.get(node).map(|n| n.mark)
  }

  /// Reruns the factory of a ready node. The previous run's edges and
  /// dispose hooks are released first. Returns whether the value changed.
  fn recompute(self: &Rc<Self>, node: NodeId) -> Result<bool> {
    let (hooks, released, home, label) = {
      let mut graph = self.graph.borrow_mut();
      if !graph.nodes.contains(node) {
        return Err(ProviderError::Unmounted {
          provider: graph.label(node),
        });
      }
      let released = graph.release_dependencies(node);
      let Some(n) = graph.nodes.get_mut(node) else {
        return Ok(false);
      };
      n.lifecycle = Lifecycle::Recomputing;
      n.mark = Mark::Clean;
      (std::mem::take(&mut n.on_dispose), released, n.home, n.meta.label())
    };

    for hook in hooks {
      hook();
    }
    tracing::trace!(provider = %label, "recomputing provider state");

    let result = self.build(node, home);
    self.graph.borrow_mut().unobserved.extend(released);

    match result {
      Ok(next) => Ok(self.commit(node, next, true)),
      Err(error) => {
        if let Some(n) = self.graph.borrow_mut().nodes.get_mut(node) {
          n.lifecycle = Lifecycle::Failed;
          n.error = Some(error.clone());
        }
        tracing::warn!(provider = %label, %error, "provider failed to rebuild");
        Err(error)
      }
    }
  }

  /// Commits `next` as the value of `node`. When it differs from the current
  /// value, dependents are marked and listeners queued. Returns whether the
  /// value changed.
  fn commit(&self, node: NodeId, next: Rc<dyn Any>, rebuilt: bool) -> bool {
    let (recipe, previous, recovered) = {
      let mut graph = self.graph.borrow_mut();
      let Some(n) = graph.nodes.get_mut(node) else {
        return false;
      };
      let recovered = n.lifecycle == Lifecycle::Failed;
      if rebuilt {
        n.lifecycle = Lifecycle::Ready;
        n.error = None;
      }
      (n.recipe.clone(), n.value.clone(), recovered && rebuilt)
    };

    if let Some(previous) = &previous {
      if recipe.same(previous.as_ref(), next.as_ref()) {
        if recovered {
          // Dependents may have failed along with this node.
          self.graph.borrow_mut().mark_dependents(node);
        }
        tracing::trace!(provider = %self.label(node), "value unchanged; propagation stops here");
        return false;
      }
    }

    {
      let mut graph = self.graph.borrow_mut();
      let Some(n) = graph.nodes.get_mut(node) else {
        return false;
      };
      n.value = Some(next.clone());
      graph.mark_dependents(node);
      graph.notify.push_back((node, next.clone()));
    }

    if let (Some(previous), Some(info)) = (previous, self.info(node)) {
      for observer in self.observers_of(node) {
        observer.did_update_provider(&info, previous.as_ref(), next.as_ref());
      }
    }
    true
  }

  // --- Edges & values ---

  /// Records that `dependent` reads `dependency`, refusing edges that would
  /// close a cycle.
  pub(crate) fn depend(&self, dependent: NodeId, dependency: NodeId) -> Result<()> {
    let mut graph = self.graph.borrow_mut();
    if graph.depends_on(dependency, dependent) {
      let chain = vec![graph.label(dependent), graph.label(dependency), graph.label(dependent)];
      return Err(ProviderError::CircularDependency { chain });
    }
    graph.add_edge(dependent, dependency);
    Ok(())
  }

  pub(crate) fn value_of(&self, node: NodeId) -> Result<Rc<dyn Any>> {
    let graph = self.graph.borrow();
    graph
      .nodes
      .get(node)
      .and_then(|n| n.value.clone())
      .ok_or_else(|| ProviderError::Unmounted {
        provider: graph.label(node),
      })
  }

  pub(crate) fn value_as<T: 'static>(&self, node: NodeId) -> Result<Rc<T>> {
    self
      .value_of(node)?
      .downcast::<T>()
      .map_err(|_| ProviderError::TypeMismatch {
        provider: self.label(node),
      })
  }

  pub(crate) fn label(&self, node: NodeId) -> String {
    self.graph.borrow().label(node)
  }

  pub(crate) fn contains(&self, node: NodeId) -> bool {
    self.graph.borrow().nodes.contains(node)
  }

  pub(crate) fn node_epoch(&self, node: NodeId) -> Option<u64> {
    self.graph.borrow().nodes.get(node).map(|n| n.epoch)
  }

  /// The spawner `node` runs its async work on. The first lookup pins the
  /// spawner of `scope`, so rebuilds after rehoming use the same one.
  pub(crate) fn spawner(&self, node: NodeId, scope: OwnerId) -> Option<Rc<dyn TaskSpawner>> {
    let mut graph = self.graph.borrow_mut();
    if let Some(pinned) = graph.nodes.get(node).and_then(|n| n.spawner.clone()) {
      return Some(pinned);
    }
    let spawner = graph.scope(scope).and_then(|s| s.spawner.clone())?;
    if let Some(n) = graph.nodes.get_mut(node) {
      n.spawner = Some(spawner.clone());
    }
    Some(spawner)
  }

  pub(crate) fn add_dispose_hook(&self, node: NodeId, hook: DisposeHook) {
    let rejected = {
      let mut graph = self.graph.borrow_mut();
      match graph.nodes.get_mut(node) {
        Some(n) => {
          n.on_dispose.push(hook);
          None
        }
        None => Some(hook),
      }
    };
    if let Some(hook) = rejected {
      hook();
    }
  }

  // --- Mutation from outside a build ---

  /// Replaces the value of `node` from outside its factory (a state
  /// controller, or an async completion) and propagates the change.
  pub(crate) fn set_value(self: &Rc<Self>, node: NodeId, value: Rc<dyn Any>) -> Result<bool> {
    if !self.contains(node) {
      return Err(ProviderError::Unmounted {
        provider: self.label(node),
      });
    }
    let changed = self.commit(node, value, false);
    self.flush();
    Ok(changed)
  }

  /// Applies the result of asynchronous work started by the build with the
  /// given epoch. Results of superseded builds are dropped.
  pub(crate) fn complete(self: &Rc<Self>, node: NodeId, epoch: u64, next: impl FnOnce(Option<Rc<dyn Any>>) -> Rc<dyn Any>) {
    let current = {
      let graph = self.graph.borrow();
      match graph.nodes.get(node) {
        Some(n) if n.epoch == epoch => n.value.clone(),
        Some(n) => {
          tracing::trace!(provider = %n.meta.label(), epoch, current = n.epoch, "discarding stale async result");
          return;
        }
        None => {
          tracing::trace!(epoch, "discarding async result of a disposed provider");
          return;
        }
      }
    };
    self.commit(node, next(current), false);
    self.flush();
  }

  pub(crate) fn invalidate(self: &Rc<Self>, node: NodeId) {
    self.graph.borrow_mut().mark_dirty(node);
    self.flush();
  }

  // --- Listeners ---

  pub(crate) fn add_listener(&self, node: NodeId, listener: Listener) -> Result<ListenerId> {
    let mut graph = self.graph.borrow_mut();
    let label = graph.label(node);
    let n = graph
      .nodes
      .get_mut(node)
      .ok_or(ProviderError::Unmounted { provider: label })?;
    let id = ListenerId::next();
    n.listeners.push((id, listener));
    Ok(id)
  }

  pub(crate) fn remove_listener(self: &Rc<Self>, node: NodeId, listener: ListenerId) -> bool {
    let removed = {
      let mut graph = self.graph.borrow_mut();
      let Some(n) = graph.nodes.get_mut(node) else {
        return false;
      };
      let before = n.listeners.len();
      n.listeners.retain(|(id, _)| *id != listener);
      let removed = n.listeners.len() != before;
      if removed {
        graph.unobserved.push_back(node);
      }
      removed
    };
    self.flush();
    removed
  }

  pub(crate) fn has_listener(&self, node: NodeId, listener: ListenerId) -> bool {
    self
      .graph
      .borrow()
      .nodes
      .get(node)
      .map(|n| n.listeners.iter().any(|(id, _)| *id == listener))
      .unwrap_or(false)
  }

  fn fire(&self, node: NodeId, value: Rc<dyn Any>) {
    let listeners: Vec<(ListenerId, Listener)> = match self.graph.borrow().nodes.get(node) {
      Some(n) => n.listeners.clone(),
      None => return,
    };
    for (id, listener) in listeners {
      if !self.has_listener(node, id) {
        continue;
      }
      let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(value.as_ref())));
      if let Err(payload) = outcome {
        let message = panic_message(payload.as_ref());
        let label = self.label(node);
        tracing::error!(provider = %label, %message, "provider listener panicked");
        if let Some(info) = self.info(node) {
          for observer in self.observers_of(node) {
            observer.listener_failed(&info, &message);
          }
        }
      }
    }
  }

  // --- Disposal ---

  /// Queues `node` for disposal if it is auto-dispose and unobserved.
  pub(crate) fn release_if_unobserved(&self, node: NodeId) {
    self.graph.borrow_mut().unobserved.push_back(node);
  }

  fn collect(&self, node: NodeId) {
    let unobserved = {
      let graph = self.graph.borrow();
      match graph.nodes.get(node) {
        Some(n) => {
          n.meta.auto_dispose
            && !n.is_observed()
            && matches!(n.lifecycle, Lifecycle::Ready | Lifecycle::Failed)
            && !graph.building.contains(&node)
        }
        None => false,
      }
    };
    if unobserved {
      tracing::trace!(provider = %self.label(node), "auto-disposing unobserved provider state");
      self.dispose_node(node);
    }
  }

  /// Runs the dispose hooks of `node` while it is still cached, then removes
  /// it from the graph.
  pub(crate) fn dispose_node(&self, node: NodeId) {
    let mounted = matches!(self.lifecycle_of(node), Some(l) if l != Lifecycle::Creating);
    let info = self.info(node).filter(|_| mounted);
    let observers = self.observers_of(node);
    let hooks = match self.graph.borrow_mut().nodes.get_mut(node) {
      Some(n) => std::mem::take(&mut n.on_dispose),
      None => return,
    };
    tracing::trace!(provider = %self.label(node), "disposing provider state");
    for hook in hooks {
      hook();
    }

    let removed = self.graph.borrow_mut().remove(node);
    let Some((removed, released)) = removed else {
      return;
    };
    self.graph.borrow_mut().unobserved.extend(released);
    // Hooks registered by the hooks above.
    for hook in removed.on_dispose {
      hook();
    }
    if let Some(info) = info {
      for observer in observers {
        observer.did_dispose_provider(&info);
      }
    }
  }

  // --- Draining ---

  /// Drains queued notifications, stale nodes and disposal candidates.
  ///
  /// Does nothing while a factory is running or a drain is already in
  /// progress; the outermost call picks up whatever was queued meanwhile.
  pub(crate) fn flush(self: &Rc<Self>) {
    {
      let mut graph = self.graph.borrow_mut();
      if graph.draining || !graph.building.is_empty() {
        return;
      }
      graph.draining = true;
    }
    let _guard = DrainGuard(self);
    loop {
      let step = {
        let mut graph = self.graph.borrow_mut();
        if let Some((node, value)) = graph.notify.pop_front() {
          Step::Notify(node, value)
        } else if let Some(node) = graph.stale.pop_front() {
          Step::Refresh(node)
        } else if let Some(node) = graph.unobserved.pop_front() {
          Step::Collect(node)
        } else {
          break;
        }
      };
      match step {
        Step::Notify(node, value) => self.fire(node, value),
        Step::Refresh(node) => {
          if let Err(error) = self.refresh(node) {
            tracing::warn!(provider = %self.label(node), %error, "provider left failed by propagation");
          }
        }
        Step::Collect(node) => self.collect(node),
      }
    }
  }

  // --- Observers ---

  fn info(&self, node: NodeId) -> Option<ProviderInfo> {
    self.graph.borrow().nodes.get(node).map(|n| ProviderInfo {
      id: n.meta.id,
      name: n.meta.name.clone(),
      owner: n.home,
    })
  }

  fn observers_of(&self, node: NodeId) -> Vec<Rc<dyn ProviderObserver>> {
    let graph = self.graph.borrow();
    match graph.nodes.get(node) {
      Some(n) => graph.observers(n.home),
      None => Vec::new(),
    }
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "listener panicked with a non-string payload".to_string()
  }
}
