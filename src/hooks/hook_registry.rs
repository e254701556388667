//! Encapsulated closures to be executed on incoming packets
//! to produce an output using various program-scale services.
//!
//! It provides simple logic for a basic control flow between
//! [`Hook`].
//!
//! This module defines [`Hook`] that encapsulates the closures,
//! and a [`HookRegistry`] to store [`Hook`] and services.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex},
};

use itertools::Itertools;
use log::{debug, trace};
use uuid::Uuid;

use crate::core::{
    errors::HookError,
    packet::PacketType,
    packet_context::PacketContext,
    state::PacketState,
};

use super::{flags::HookFlag, typemap::TypeMap};

pub struct HookClosure<T: PacketType, U: PacketType>(
    pub Box<dyn Fn(Arc<Mutex<TypeMap>>, &mut PacketContext<T, U>) -> Result<isize, HookError> + Send + Sync>,
);

/// An encapsulated closure, to be executed on a [`PacketContext`]
/// to perform all types of actions. They make most of the
/// actual logic of the program.
///
/// They can be created from a given name and a given closure.
/// Names are only there for identification purposes for now.
///
/// They are uniquely identified all around the program
/// using a [`Uuid`] generated at creation time, and implement a
/// simple logic to link together: you can make a `Hook` execute
/// conditional on the success or failure of another `Hook`.
///
/// A `Hook` can also hold one or more [`HookFlag`] to control
/// its execution flow.
pub struct Hook<T: PacketType + Send, U: PacketType + Send> {
    id: Uuid,
    name: String,
    dependencies: HashMap<Uuid, bool>,
    flags: Vec<HookFlag>,
    exec: HookClosure<T, U>,
}

impl<T: PacketType + Send, U: PacketType + Send> Hook<T, U> {
    /// Creates a new `Hook` using the specified closure. A random
    /// [`Uuid`] is generated to represent the `Hook`.
    pub fn new(name: String, exec: HookClosure<T, U>, flags: Vec<HookFlag>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name,
            dependencies: HashMap::new(),
            exec,
            flags,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn add_flag(&mut self, new_flag: HookFlag) {
        self.flags.push(new_flag);
    }

    pub fn flags(&self) -> &Vec<HookFlag> {
        &self.flags
    }

    /// Adds a dependency on the success of another `Hook`, by id.
    pub fn must(&mut self, hook: Uuid) {
        self.dependencies.insert(hook, true);
    }

    /// Adds a dependency on the failure of another `Hook`, by id.
    pub fn must_not(&mut self, hook: Uuid) {
        self.dependencies.insert(hook, false);
    }
}

/// A register to store and manage the different [`Hook`]
/// to be executed on the packets. It also stores various services
/// instances which can then be called by the [`Hook`] to perform
/// logic at the program scale.
pub struct HookRegistry<T: PacketType + Send, U: PacketType + Send> {
    registry: HashMap<PacketState, HashMap<Uuid, Hook<T, U>>>,
    services: Arc<Mutex<TypeMap>>,
    exec_order: HashMap<PacketState, Vec<Uuid>>,
    need_update: bool,
}

impl<T: PacketType + Send, U: PacketType + Send> Default for HookRegistry<T, U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PacketType + Send, U: PacketType + Send> HookRegistry<T, U> {
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
            services: Arc::new(Mutex::new(TypeMap::new())),
            exec_order: HashMap::new(),
            need_update: false,
        }
    }

    /// Executes every registered [`Hook`] for the context's current
    /// state, in dependency order. If the state is
    /// [`PacketState::Failure`], only the failure chain runs.
    ///
    /// # Errors
    ///
    /// Returns [`HookError`] if a [`HookFlag::Fatal`] hook fails and no
    /// failure chain recovers the context, or if the dependency graph
    /// for this state has a cycle.
    pub fn run_hooks(&self, packet: &mut PacketContext<T, U>) -> Result<(), HookError> {
        if packet.state() == PacketState::Failure {
            return self.run_failure_chain(packet);
        }

        let exec_order = match self.exec_order.get(&packet.state()) {
            Some(order) => order,
            None => return Ok(()),
        };

        let mut exec_code: HashMap<Uuid, isize> = HashMap::new();

        for hook_id in exec_order.iter() {
            let hook = match self.registry.get(&packet.state()).and_then(|lst| lst.get(hook_id)) {
                Some(hook) => hook,
                None => continue,
            };

            if exec_code.contains_key(&hook.id) {
                continue;
            }

            if !self.can_execute(&exec_code, &hook.dependencies) {
                trace!("Skipped execution of hook {} because of unmet requirements", hook.name);
                continue;
            }

            match (hook.exec.0)(self.services.clone(), packet) {
                Ok(code) => {
                    exec_code.insert(hook.id, code);
                    trace!("Hook {} exited successfully (exit code {})", hook.name, code);
                }
                Err(err) => {
                    if hook.flags.contains(&HookFlag::Fatal) {
                        packet.set_state(PacketState::Failure);
                        return self.run_failure_chain(packet);
                    }
                    exec_code.insert(hook.id, -1);
                    debug!("Hook {} exited with failure: {}", hook.name, err);
                }
            }
        }
        Ok(())
    }

    /// Inserts a new [`Hook`] for a given [`PacketState`] and
    /// recomputes that state's execution order.
    pub fn register_hook(&mut self, state: PacketState, hook: Hook<T, U>) {
        self.need_update = true;
        match self.registry.entry(state) {
            Entry::Vacant(e) => {
                e.insert(HashMap::new()).insert(hook.id, hook);
            }
            Entry::Occupied(mut e) => {
                e.get_mut().insert(hook.id, hook);
            }
        }
        if let Ok(order) = self.generate_exec_order(&state) {
            self.exec_order.insert(state, order);
            self.need_update = false;
        }
    }

    /// Inserts a new service into the [`TypeMap`], retrievable by hooks
    /// through the `services` handle passed to every [`HookClosure`].
    pub fn register_service<V: Send + Sync + 'static>(&mut self, service: V) {
        self.services
            .lock()
            .expect("services mutex was poisoned")
            .insert(Arc::new(service));
    }

    fn run_failure_chain(&self, packet: &mut PacketContext<T, U>) -> Result<(), HookError> {
        let hooks = match self.registry.get(&PacketState::Failure) {
            Some(hooks) => hooks,
            None => return Err(HookError::new("no failure hooks defined")),
        };
        for hook in hooks.values() {
            if let Err(err) = (hook.exec.0)(self.services.clone(), packet) {
                debug!("Hook {} in failure chain exited with failure: {}", hook.name, err);
            }
        }
        Err(HookError::new("one or more fatal hooks was unsuccessful"))
    }

    fn can_execute(&self, exec_code: &HashMap<Uuid, isize>, dependencies: &HashMap<Uuid, bool>) -> bool {
        !dependencies.iter().any(|(id, need_success)| {
            exec_code
                .get(id)
                .map(|code| (*code < 0 && *need_success) || (*code >= 0 && !*need_success))
                .unwrap_or(false)
        })
    }

    fn generate_exec_order(&self, for_state: &PacketState) -> Result<Vec<Uuid>, HookError> {
        let mut deps_map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut resolved: Vec<Uuid> = Vec::new();

        let hooks = self
            .registry
            .get(for_state)
            .ok_or_else(|| HookError::new("no hooks associated with this state"))?;
        for (id, hook) in hooks.iter() {
            deps_map.insert(*id, hook.dependencies.keys().copied().collect_vec());
        }

        while !deps_map.is_empty() {
            let ready: Vec<Uuid> = deps_map
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(id, _)| *id)
                .collect();

            if ready.is_empty() {
                return Err(HookError::new("circular dependencies in hooks"));
            }

            for id in &ready {
                deps_map.remove(id);
                resolved.push(*id);
            }
            for deps in deps_map.values_mut() {
                deps.retain(|id| !ready.contains(id));
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{Packet, SocketLabel};

    fn context() -> PacketContext<Packet, Packet> {
        PacketContext::from(Packet::empty(SocketLabel::Auth))
    }

    #[test]
    fn hook_runs_against_the_received_state() {
        let mut registry: HookRegistry<Packet, Packet> = HookRegistry::new();
        registry.register_hook(
            PacketState::Received,
            Hook::new(
                String::from("mark_code"),
                HookClosure(Box::new(|_, packet| {
                    packet.get_mut_output().code = 2;
                    Ok(1)
                })),
                Vec::default(),
            ),
        );

        let mut packet = context();
        assert_eq!(packet.get_output().code, 0);
        registry.run_hooks(&mut packet).unwrap();
        assert_eq!(packet.get_output().code, 2);
    }

    #[test]
    fn dependency_on_failure_skips_when_the_dependency_succeeds() {
        let mut registry: HookRegistry<Packet, Packet> = HookRegistry::new();
        let hook1 = Hook::new(
            String::from("ok"),
            HookClosure(Box::new(|_, _| Ok(1))),
            Vec::default(),
        );
        let hook1_id = hook1.id;
        let mut hook2 = Hook::new(
            String::from("must_not_run"),
            HookClosure(Box::new(|_, _| {
                panic!("should not run: hook1 succeeded");
            })),
            Vec::default(),
        );
        hook2.must_not(hook1_id);

        registry.register_hook(PacketState::Received, hook1);
        registry.register_hook(PacketState::Received, hook2);

        let mut packet = context();
        registry.run_hooks(&mut packet).unwrap();
    }

    #[test]
    fn services_are_reachable_from_hook_closures() {
        struct Counter(Mutex<usize>);

        let mut registry: HookRegistry<Packet, Packet> = HookRegistry::new();
        registry.register_service(Counter(Mutex::new(0)));
        registry.register_hook(
            PacketState::Received,
            Hook::new(
                String::from("increment"),
                HookClosure(Box::new(|services, _| {
                    let services = services.lock().unwrap();
                    let counter = services.get::<Arc<Counter>>().unwrap();
                    *counter.0.lock().unwrap() += 1;
                    Ok(1)
                })),
                Vec::default(),
            ),
        );

        let mut packet = context();
        registry.run_hooks(&mut packet).unwrap();
        let services = registry.services.lock().unwrap();
        let counter = services.get::<Arc<Counter>>().unwrap();
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }

    #[test]
    fn fatal_hook_failure_jumps_to_the_failure_chain() {
        let mut registry: HookRegistry<Packet, Packet> = HookRegistry::new();
        registry.register_hook(
            PacketState::Received,
            Hook::new(
                String::from("fails"),
                HookClosure(Box::new(|_, _| Err(HookError::new("boom")))),
                vec![HookFlag::Fatal],
            ),
        );
        registry.register_hook(
            PacketState::Failure,
            Hook::new(
                String::from("failure_handler"),
                HookClosure(Box::new(|_, packet| {
                    packet.get_mut_output().code = 999;
                    Ok(0)
                })),
                Vec::default(),
            ),
        );

        let mut packet = context();
        let result = registry.run_hooks(&mut packet);
        assert!(result.is_err());
        assert_eq!(packet.get_output().code, 999);
    }

    #[test]
    fn dependency_graph_resolves_in_a_valid_topological_order() {
        let mut registry: HookRegistry<Packet, Packet> = HookRegistry::new();

        let mut hook1 = Hook::new(String::from("a"), HookClosure(Box::new(|_, _| Ok(1))), Vec::default());
        let mut hook2 = Hook::new(String::from("b"), HookClosure(Box::new(|_, _| Ok(1))), Vec::default());
        let hook3 = Hook::new(String::from("c"), HookClosure(Box::new(|_, _| Ok(1))), Vec::default());

        let (id1, id2, id3) = (hook1.id, hook2.id, hook3.id);
        hook2.must(id1);
        hook1.must(id3);
        hook2.must(id3);

        registry.register_hook(PacketState::Received, hook3);
        registry.register_hook(PacketState::Received, hook2);
        registry.register_hook(PacketState::Received, hook1);

        let order = registry.generate_exec_order(&PacketState::Received).unwrap();
        let pos = |id: Uuid| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(id3) < pos(id1));
        assert!(pos(id1) < pos(id2));
    }
}
