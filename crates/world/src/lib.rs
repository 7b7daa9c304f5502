#![forbid(unsafe_code)]
//! Entity-component store backing the renderer.
//!
//! Components live in typed columns keyed by type name. Relations are kept in a
//! separate table keyed by `(source, target)` per relation kind, each carrying a
//! payload. Hooks registered per component type run synchronously inside the
//! mutating call.

use ahash::{AHashMap, AHashSet};
use std::any::Any;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct Time {
    pub delta_seconds: f32,
}

// Frame counter resource
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameNumber(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub u32);

pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

type Boxed = Box<dyn Any + Send + Sync>;
type Store = AHashMap<u32, Boxed>;
type SetHook = Arc<dyn Fn(&mut World, Entity) + Send + Sync>;
type RemoveHook = Arc<dyn Fn(&mut World, Entity, Boxed) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    on_set: AHashMap<&'static str, Vec<SetHook>>,
    on_remove: AHashMap<&'static str, RemoveHook>,
}

#[derive(Default)]
pub struct World {
    next_id: u32,
    alive: AHashSet<u32>,
    // Component columns, plus the order in which each column was first created.
    components: AHashMap<&'static str, Store>,
    column_order: Vec<&'static str>,
    relations: AHashMap<&'static str, AHashMap<(u32, u32), Boxed>>,
    resources: AHashMap<&'static str, Boxed>,
    hooks: Hooks,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> Entity {
        let id = self.next_id;
        self.next_id += 1;
        self.alive.insert(id);
        Entity(id)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.alive.contains(&entity.0)
    }

    /// Every live entity, in spawn order.
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.alive.iter().map(|id| Entity(*id)).collect();
        entities.sort();
        entities
    }

    /// Creates the column for `T` up front.
    ///
    /// Columns are torn down in reverse creation order on [`World::despawn`], so
    /// registering owners before the things that reference them fixes the
    /// release order.
    pub fn register_component<T: Component>(&mut self) {
        self.column_mut(std::any::type_name::<T>());
    }

    fn column_mut(&mut self, key: &'static str) -> &mut Store {
        if !self.components.contains_key(key) {
            self.column_order.push(key);
        }
        self.components.entry(key).or_default()
    }

    /// Inserts or replaces a component, then runs the `on_set` hooks for `T`.
    ///
    /// A replaced value goes through the `on_remove` hook first.
    pub fn insert_component<T: Component>(&mut self, entity: Entity, component: T) {
        let key = std::any::type_name::<T>();
        let previous = self.column_mut(key).insert(entity.0, Box::new(component));
        if let Some(previous) = previous {
            self.run_remove_hook(key, entity, previous);
        }
        self.run_set_hooks(key, entity);
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.components
            .get(std::any::type_name::<T>())
            .and_then(|store| store.get(&entity.0))
            .and_then(|b| b.downcast_ref::<T>())
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.components
            .get_mut(std::any::type_name::<T>())
            .and_then(|store| store.get_mut(&entity.0))
            .and_then(|b| b.downcast_mut::<T>())
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.components
            .get(std::any::type_name::<T>())
            .is_some_and(|store| store.contains_key(&entity.0))
    }

    /// Removes a component and hands it to the `on_remove` hook for `T`, if any.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        let key = std::any::type_name::<T>();
        let removed = self
            .components
            .get_mut(key)
            .and_then(|store| store.remove(&entity.0));
        if let Some(value) = removed {
            self.run_remove_hook(key, entity, value);
        }
    }

    /// Removes a component and returns it to the caller; no hook runs.
    pub fn take_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.components
            .get_mut(std::any::type_name::<T>())
            .and_then(|store| store.remove(&entity.0))
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Entities holding a `T`, in spawn order.
    pub fn entities_with<T: Component>(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .components
            .get(std::any::type_name::<T>())
            .map(|store| store.keys().map(|id| Entity(*id)).collect())
            .unwrap_or_default();
        entities.sort();
        entities
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.alive.remove(&entity.0);

        let mut removed = Vec::new();
        for key in self.column_order.iter().rev() {
            if let Some(value) = self
                .components
                .get_mut(key)
                .and_then(|store| store.remove(&entity.0))
            {
                removed.push((*key, value));
            }
        }
        for store in self.relations.values_mut() {
            store.retain(|(source, target), _| *source != entity.0 && *target != entity.0);
        }
        for (key, value) in removed {
            self.run_remove_hook(key, entity, value);
        }
    }

    pub fn insert_resource<R: 'static + Send + Sync>(&mut self, resource: R) {
        self.resources
            .insert(std::any::type_name::<R>(), Box::new(resource));
    }

    pub fn get_resource<R: 'static + Send + Sync>(&self) -> Option<&R> {
        self.resources
            .get(std::any::type_name::<R>())
            .and_then(|b| b.downcast_ref::<R>())
    }

    pub fn get_resource_mut<R: 'static + Send + Sync>(&mut self) -> Option<&mut R> {
        self.resources
            .get_mut(std::any::type_name::<R>())
            .and_then(|b| b.downcast_mut::<R>())
    }

    pub fn remove_resource<R: 'static + Send + Sync>(&mut self) -> Option<R> {
        self.resources
            .remove(std::any::type_name::<R>())
            .and_then(|b| b.downcast::<R>().ok())
            .map(|b| *b)
    }

    /// Temporarily remove a resource of type `R`, run a closure with `&mut R` and `&mut World`,
    /// then insert the resource back. Returns `None` if the resource does not exist.
    pub fn with_resource_mut<R: 'static + Send + Sync, T>(
        &mut self,
        f: impl FnOnce(&mut R, &mut World) -> T,
    ) -> Option<T> {
        let key = std::any::type_name::<R>();
        let boxed = self.resources.remove(key)?;
        let mut resource = match boxed.downcast::<R>() {
            Ok(b) => *b,
            Err(_) => return None,
        };
        let out = f(&mut resource, self);
        self.resources.insert(key, Box::new(resource));
        Some(out)
    }
}

// Hooks
impl World {
    /// Registers an observer that runs every time a `T` is inserted.
    pub fn on_set<T: Component>(&mut self, hook: impl Fn(&mut World, Entity) + Send + Sync + 'static) {
        self.hooks
            .on_set
            .entry(std::any::type_name::<T>())
            .or_default()
            .push(Arc::new(hook));
    }

    /// Sets the hook that receives a `T` when it leaves the world.
    ///
    /// There is one remove hook per type; a later registration replaces the earlier one.
    pub fn on_remove<T: Component>(
        &mut self,
        hook: impl Fn(&mut World, Entity, T) + Send + Sync + 'static,
    ) {
        let hook: RemoveHook = Arc::new(move |world, entity, boxed: Boxed| {
            if let Ok(value) = boxed.downcast::<T>() {
                hook(world, entity, *value);
            }
        });
        self.hooks
            .on_remove
            .insert(std::any::type_name::<T>(), hook);
    }

    fn run_set_hooks(&mut self, key: &'static str, entity: Entity) {
        let hooks = self.hooks.on_set.get(key).cloned().unwrap_or_default();
        for hook in hooks {
            hook(self, entity);
        }
    }

    fn run_remove_hook(&mut self, key: &'static str, entity: Entity, value: Boxed) {
        if let Some(hook) = self.hooks.on_remove.get(key).cloned() {
            hook(self, entity, value);
        }
    }
}

// Relations: (source, kind, target) -> payload
impl World {
    pub fn set_relation<R: Component>(&mut self, source: Entity, target: Entity, payload: R) {
        self.relations
            .entry(std::any::type_name::<R>())
            .or_default()
            .insert((source.0, target.0), Box::new(payload));
    }

    /// All `R` edges leaving `source`, ordered by target.
    pub fn targets<R: Component>(&self, source: Entity) -> Vec<(Entity, &R)> {
        let mut out: Vec<(Entity, &R)> = self
            .relations
            .get(std::any::type_name::<R>())
            .map(|store| {
                store
                    .iter()
                    .filter(|((s, _), _)| *s == source.0)
                    .filter_map(|((_, t), b)| b.downcast_ref::<R>().map(|r| (Entity(*t), r)))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|(target, _)| *target);
        out
    }

    /// First `R` target of `source`.
    pub fn target<R: Component>(&self, source: Entity) -> Option<Entity> {
        self.targets::<R>(source).first().map(|(t, _)| *t)
    }

    pub fn has_any_relation<R: Component>(&self, source: Entity) -> bool {
        self.relations
            .get(std::any::type_name::<R>())
            .is_some_and(|store| store.keys().any(|(s, _)| *s == source.0))
    }

    /// Every `R` edge as `(source, target, payload)`, ordered by source then target.
    pub fn query_relation<R: Component>(&self) -> Vec<(Entity, Entity, &R)> {
        let mut out: Vec<(Entity, Entity, &R)> = self
            .relations
            .get(std::any::type_name::<R>())
            .map(|store| {
                store
                    .iter()
                    .filter_map(|((s, t), b)| {
                        b.downcast_ref::<R>().map(|r| (Entity(*s), Entity(*t), r))
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|(s, t, _)| (*s, *t));
        out
    }
}

type SystemFn = Box<dyn Fn(&mut World) + Send + Sync>;

#[derive(Default)]
pub struct Schedule {
    systems: Vec<SystemFn>,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
        }
    }

    pub fn add_system(&mut self, f: impl Fn(&mut World) + Send + Sync + 'static) {
        self.systems.push(Box::new(f));
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn run(&self, world: &mut World) {
        for sys in &self.systems {
            (sys)(world);
        }
    }
}

// Events: type-indexed Vec<T>
impl World {
    pub fn send_event<T: 'static + Send + Sync>(&mut self, event: T) {
        let key = event_type_key::<T>();
        let entry = self
            .resources
            .entry(key)
            .or_insert_with(|| Box::new(Vec::<T>::new()));
        if let Some(vec) = entry.downcast_mut::<Vec<T>>() {
            vec.push(event);
        }
    }

    pub fn drain_events<T: 'static + Send + Sync>(&mut self) -> Vec<T> {
        let key = event_type_key::<T>();
        if let Some(entry) = self.resources.get_mut(key) {
            if let Some(vec) = entry.downcast_mut::<Vec<T>>() {
                return std::mem::take(vec);
            }
        }
        Vec::new()
    }
}

fn event_type_key<T: 'static>() -> &'static str {
    std::any::type_name::<Vec<T>>()
}

// Query API
impl World {
    pub fn query<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> {
        let maybe_store = self
            .components
            .get(std::any::type_name::<T>())
            .map(|store| store.iter());
        QueryIterRef::<T> {
            inner: maybe_store,
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn query_mut<T: Component>(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        let maybe_store = self
            .components
            .get_mut(std::any::type_name::<T>())
            .map(|store| store.iter_mut());
        QueryIterMut::<T> {
            inner: maybe_store,
            _phantom: std::marker::PhantomData,
        }
    }

}

struct QueryIterRef<'a, T: Component> {
    inner: Option<std::collections::hash_map::Iter<'a, u32, Boxed>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<'a, T: Component> Iterator for QueryIterRef<'a, T> {
    type Item = (Entity, &'a T);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (id, boxed) = self.inner.as_mut()?.next()?;
            if let Some(r) = boxed.downcast_ref::<T>() {
                return Some((Entity(*id), r));
            }
        }
    }
}

struct QueryIterMut<'a, T: Component> {
    inner: Option<std::collections::hash_map::IterMut<'a, u32, Boxed>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<'a, T: Component> Iterator for QueryIterMut<'a, T> {
    type Item = (Entity, &'a mut T);
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (id, boxed) = self.inner.as_mut()?.next()?;
            if let Some(r) = boxed.downcast_mut::<T>() {
                return Some((Entity(*id), r));
            }
        }
    }
}
