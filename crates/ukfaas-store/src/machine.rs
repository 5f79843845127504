//! In-memory machine store with a cached per-service active count.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;
use ukfaas_types::{LABEL_SERVICE, Machine, MachineId};

use crate::{Error, MachineStore, Result};

#[derive(Debug, Default)]
struct Inner {
    machines: HashMap<MachineId, Machine>,
    /// service → number of replicas in an active state. A row exists only
    /// while the count is non-zero.
    active: HashMap<String, u64>,
}

impl Inner {
    fn increment(&mut self, service: &str) {
        *self.active.entry(service.to_string()).or_insert(0) += 1;
    }

    fn decrement(&mut self, service: &str) {
        if let Some(count) = self.active.get_mut(service) {
            if *count <= 1 {
                self.active.remove(service);
            } else {
                *count -= 1;
            }
        }
    }
}

/// Replica store over a single lock, so pop (select + remove) is atomic with
/// respect to concurrent scale-downs.
#[derive(Debug, Default)]
pub struct MemoryMachineStore {
    inner: RwLock<Inner>,
}

impl MemoryMachineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MachineStore for MemoryMachineStore {
    fn put_machine(&self, service: &str, machine: Machine) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Error::LockPoisoned)?;

        let was_active = inner
            .machines
            .get(&machine.uid)
            .is_some_and(|prior| prior.state.is_active());
        let is_active = machine.state.is_active();

        match (was_active, is_active) {
            (false, true) => inner.increment(service),
            (true, false) => inner.decrement(service),
            _ => {}
        }

        inner.machines.insert(machine.uid, machine);
        Ok(())
    }

    fn get_machine(&self, uid: MachineId) -> Result<Machine> {
        let inner = self.inner.read().map_err(|_| Error::LockPoisoned)?;
        inner
            .machines
            .get(&uid)
            .cloned()
            .ok_or(Error::MachineNotFound(uid))
    }

    fn list_machines(&self, service: &str) -> Result<Vec<Machine>> {
        let inner = self.inner.read().map_err(|_| Error::LockPoisoned)?;
        Ok(inner
            .machines
            .values()
            .filter(|machine| machine.labels.get(LABEL_SERVICE).map(String::as_str) == Some(service))
            .cloned()
            .collect())
    }

    fn pop_machine(&self, service: &str) -> Result<Machine> {
        let mut inner = self.inner.write().map_err(|_| Error::LockPoisoned)?;

        let uid = inner
            .machines
            .values()
            .find(|machine| {
                machine.state.is_active()
                    && machine.labels.get(LABEL_SERVICE).map(String::as_str) == Some(service)
            })
            .map(|machine| machine.uid)
            .ok_or_else(|| Error::NoActiveMachine(service.to_string()))?;

        // Remove under the same lock as the scan: two concurrent pops can
        // never hand out the same victim.
        let machine = inner
            .machines
            .remove(&uid)
            .ok_or(Error::MachineNotFound(uid))?;
        inner.decrement(service);

        debug!(service, uid = %machine.uid, "popped machine");
        Ok(machine)
    }

    fn delete_machine(&self, service: &str, uid: MachineId) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Error::LockPoisoned)?;

        if let Some(machine) = inner.machines.remove(&uid) {
            if machine.state.is_active() {
                inner.decrement(service);
            }
        }
        Ok(())
    }

    fn active_replicas(&self, service: &str) -> Result<u64> {
        let inner = self.inner.read().map_err(|_| Error::LockPoisoned)?;
        inner
            .active
            .get(service)
            .copied()
            .ok_or_else(|| Error::ServiceNotFound(service.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use ukfaas_types::{MachineResources, MachineState, Platform, quantity};

    fn machine(service: &str, state: MachineState) -> Machine {
        let uid = MachineId::random();
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_SERVICE.to_string(), service.to_string());

        Machine {
            uid,
            name: format!("{service}-{}", uid.short()),
            service: service.to_string(),
            platform: Platform::Kvm,
            architecture: "x86_64".to_string(),
            kernel: PathBuf::from("/tmp/kernel"),
            initrd: None,
            command: Vec::new(),
            volumes: Vec::new(),
            resources: MachineResources {
                request: quantity::default_resources(),
                limit: quantity::default_resources(),
            },
            labels,
            annotations: BTreeMap::new(),
            state_dir: PathBuf::from("/tmp/state"),
            nic: None,
            state,
        }
    }

    #[test]
    fn test_count_follows_put_transitions() {
        let store = MemoryMachineStore::new();
        let mut replica = machine("echo", MachineState::Running);

        store.put_machine("echo", replica.clone()).unwrap();
        assert_eq!(store.active_replicas("echo").unwrap(), 1);

        // Same row again: no transition, no double count.
        store.put_machine("echo", replica.clone()).unwrap();
        assert_eq!(store.active_replicas("echo").unwrap(), 1);

        replica.state = MachineState::Exited;
        store.put_machine("echo", replica).unwrap();
        assert!(matches!(
            store.active_replicas("echo"),
            Err(Error::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_errored_put_never_counts() {
        let store = MemoryMachineStore::new();
        store
            .put_machine("echo", machine("echo", MachineState::Errored))
            .unwrap();

        assert!(matches!(
            store.active_replicas("echo"),
            Err(Error::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_pop_removes_and_decrements() {
        let store = MemoryMachineStore::new();
        store
            .put_machine("echo", machine("echo", MachineState::Running))
            .unwrap();
        store
            .put_machine("echo", machine("echo", MachineState::Running))
            .unwrap();

        let popped = store.pop_machine("echo").unwrap();
        assert!(popped.state.is_active());
        assert_eq!(store.active_replicas("echo").unwrap(), 1);
        assert!(store.get_machine(popped.uid).is_err());

        store.pop_machine("echo").unwrap();
        assert!(matches!(
            store.pop_machine("echo"),
            Err(Error::NoActiveMachine(_))
        ));
    }

    #[test]
    fn test_pop_skips_other_services_and_terminal_replicas() {
        let store = MemoryMachineStore::new();
        store
            .put_machine("other", machine("other", MachineState::Running))
            .unwrap();
        store
            .put_machine("echo", machine("echo", MachineState::Exited))
            .unwrap();

        assert!(matches!(
            store.pop_machine("echo"),
            Err(Error::NoActiveMachine(_))
        ));
        assert_eq!(store.active_replicas("other").unwrap(), 1);
    }

    #[test]
    fn test_list_filters_by_service_label() {
        let store = MemoryMachineStore::new();
        store
            .put_machine("echo", machine("echo", MachineState::Running))
            .unwrap();
        store
            .put_machine("echo", machine("echo", MachineState::Exited))
            .unwrap();
        store
            .put_machine("other", machine("other", MachineState::Running))
            .unwrap();

        let listed = store.list_machines("echo").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|m| m.service == "echo"));
    }

    #[test]
    fn test_delete_decrements_only_active_rows() {
        let store = MemoryMachineStore::new();
        let active = machine("echo", MachineState::Running);
        let terminal = machine("echo", MachineState::Exited);
        store.put_machine("echo", active.clone()).unwrap();
        store.put_machine("echo", terminal.clone()).unwrap();

        store.delete_machine("echo", terminal.uid).unwrap();
        assert_eq!(store.active_replicas("echo").unwrap(), 1);

        store.delete_machine("echo", active.uid).unwrap();
        assert!(store.active_replicas("echo").is_err());
    }

    #[test]
    fn test_concurrent_pops_never_double_select() {
        use std::sync::Arc;

        let store = Arc::new(MemoryMachineStore::new());
        for _ in 0..8 {
            store
                .put_machine("echo", machine("echo", MachineState::Running))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.pop_machine("echo").map(|m| m.uid)
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            let uid = handle.join().unwrap().unwrap();
            assert!(seen.insert(uid), "uid {uid} popped twice");
        }
        assert!(store.active_replicas("echo").is_err());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Put(usize, MachineState),
            Reput(MachineState),
            Pop,
            Delete,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            let state = prop_oneof![
                Just(MachineState::Created),
                Just(MachineState::Running),
                Just(MachineState::Exited),
                Just(MachineState::Errored),
            ];
            prop_oneof![
                (0usize..4, state.clone()).prop_map(|(s, st)| Op::Put(s, st)),
                state.prop_map(Op::Reput),
                Just(Op::Pop),
                Just(Op::Delete),
            ]
        }

        proptest! {
            /// After any operation sequence the cached count equals the
            /// number of stored active replicas, per service.
            #[test]
            fn active_count_matches_rows(ops in prop::collection::vec(op_strategy(), 1..60)) {
                let services = ["s0", "s1", "s2", "s3"];
                let store = MemoryMachineStore::new();
                let mut last_uid: Option<(String, MachineId)> = None;

                for op in ops {
                    match op {
                        Op::Put(service_idx, state) => {
                            let service = services[service_idx];
                            let replica = machine(service, state);
                            last_uid = Some((service.to_string(), replica.uid));
                            store.put_machine(service, replica).unwrap();
                        }
                        Op::Reput(state) => {
                            if let Some((service, uid)) = &last_uid {
                                if let Ok(mut replica) = store.get_machine(*uid) {
                                    replica.state = state;
                                    store.put_machine(service, replica).unwrap();
                                }
                            }
                        }
                        Op::Pop => {
                            let _ = store.pop_machine(services[0]);
                        }
                        Op::Delete => {
                            if let Some((service, uid)) = &last_uid {
                                store.delete_machine(service, *uid).unwrap();
                            }
                        }
                    }

                    for service in services {
                        let rows = store
                            .list_machines(service)
                            .unwrap()
                            .iter()
                            .filter(|m| m.state.is_active())
                            .count() as u64;
                        let counted = store.active_replicas(service).unwrap_or(0);
                        prop_assert_eq!(counted, rows, "service {}", service);
                    }
                }
            }
        }
    }
}
