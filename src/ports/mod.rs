//! TCP port allocation over project records.
//!
//! `allocate` is a pure read of the current state and gives no guarantee
//! between the check and the caller's write. `reserve` performs the check and
//! the write of the new project record under the store's state lock.

use std::collections::BTreeSet;

use crate::error::{EngineError, EngineResult};
use crate::model::Project;
use crate::store::{State, Store};

pub const PORT_MIN: u16 = 3000;
pub const PORT_MAX: u16 = 9000;

pub fn validate(port: u16) -> EngineResult<u16> {
    if (PORT_MIN..=PORT_MAX).contains(&port) {
        Ok(port)
    } else {
        Err(EngineError::InvalidPort(port))
    }
}

fn live_ports(state: &State) -> BTreeSet<u16> {
    state
        .projects
        .values()
        .filter(|p| p.status.is_live())
        .map(|p| p.port)
        .collect()
}

/// Ports held by live projects plus every registered project's own port.
fn reserved_ports(state: &State) -> BTreeSet<u16> {
    let mut ports = live_ports(state);
    ports.extend(state.projects.values().map(|p| p.port));
    ports
}

fn pick(taken: &BTreeSet<u16>, preferred: Option<u16>) -> EngineResult<u16> {
    if let Some(port) = preferred {
        validate(port)?;
        if !taken.contains(&port) {
            return Ok(port);
        }
    }

    (PORT_MIN..=PORT_MAX)
        .find(|p| !taken.contains(p))
        .ok_or(EngineError::PortExhaustion)
}

#[derive(Clone)]
pub struct PortAllocator {
    store: Store,
}

impl PortAllocator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn in_use_ports(&self) -> BTreeSet<u16> {
        self.store.read(live_ports)
    }

    pub fn is_in_use(&self, port: u16) -> EngineResult<bool> {
        validate(port)?;
        Ok(self.in_use_ports().contains(&port))
    }

    /// Preferred port if free, else the lowest free port in range.
    pub fn allocate(&self, preferred: Option<u16>) -> EngineResult<u16> {
        pick(&self.in_use_ports(), preferred)
    }

    pub fn suggest(&self, count: usize) -> Vec<u16> {
        let taken = self.in_use_ports();
        (PORT_MIN..=PORT_MAX)
            .filter(|p| !taken.contains(p))
            .take(count)
            .collect()
    }

    /// Pick a port for `project` and insert the record in one step.
    /// Fails if another project already derives the same service id.
    pub fn reserve(&self, mut project: Project, preferred: Option<u16>) -> EngineResult<Project> {
        self.store.mutate(|state| {
            if let Some(other) = state
                .projects
                .values()
                .find(|p| p.name != project.name && p.service_id == project.service_id)
            {
                return Err(EngineError::NameConflict {
                    name: project.name.clone(),
                    service_id: project.service_id.clone(),
                    existing: other.name.clone(),
                });
            }
            let port = pick(&reserved_ports(state), preferred)?;
            project.port = port;
            state.projects.insert(project.name.clone(), project.clone());
            Ok(project)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use proptest::prelude::*;
    use tokio::sync::Barrier;

    use super::*;
    use crate::model::ProjectStatus;
    use crate::store::testing::project;

    fn store_with(projects: &[(&str, u16, ProjectStatus)]) -> Store {
        let store = Store::in_memory();
        store
            .mutate(|s| {
                for (name, port, status) in projects {
                    s.projects
                        .insert(name.to_string(), project(name, *port, *status));
                }
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn preferred_port_is_returned_when_free() {
        let ports = PortAllocator::new(store_with(&[]));
        assert_eq!(ports.allocate(Some(4242)).unwrap(), 4242);
    }

    #[test]
    fn taken_preferred_port_falls_through_to_next_free() {
        let ports = PortAllocator::new(store_with(&[("x", 3000, ProjectStatus::Active)]));
        let port = ports.allocate(Some(3000)).unwrap();
        assert_ne!(port, 3000);
        assert_eq!(port, 3001);
    }

    #[test]
    fn inactive_and_failed_projects_do_not_hold_ports() {
        let ports = PortAllocator::new(store_with(&[
            ("a", 3000, ProjectStatus::Inactive),
            ("b", 3001, ProjectStatus::Error),
            ("c", 3002, ProjectStatus::Deploying),
        ]));
        assert_eq!(ports.in_use_ports(), BTreeSet::from([3002]));
        assert!(!ports.is_in_use(3000).unwrap());
        assert!(ports.is_in_use(3002).unwrap());
    }

    #[test]
    fn out_of_range_ports_are_rejected() {
        let ports = PortAllocator::new(store_with(&[]));
        assert!(matches!(ports.allocate(Some(80)), Err(EngineError::InvalidPort(80))));
        assert!(matches!(ports.is_in_use(9001), Err(EngineError::InvalidPort(9001))));
    }

    #[test]
    fn full_range_is_exhaustion() {
        let store = Store::in_memory();
        store
            .mutate(|s| {
                for port in PORT_MIN..=PORT_MAX {
                    let name = format!("p{}", port);
                    s.projects
                        .insert(name.clone(), project(&name, port, ProjectStatus::Active));
                }
                Ok(())
            })
            .unwrap();

        let ports = PortAllocator::new(store);
        assert!(matches!(ports.allocate(None), Err(EngineError::PortExhaustion)));
        assert!(ports.suggest(3).is_empty());
    }

    #[test]
    fn suggest_skips_live_ports() {
        let ports = PortAllocator::new(store_with(&[
            ("a", 3000, ProjectStatus::Active),
            ("b", 3002, ProjectStatus::Active),
        ]));
        assert_eq!(ports.suggest(3), vec![3001, 3003, 3004]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn naive_allocation_races_under_concurrency() {
        let store = store_with(&[]);
        let ports = PortAllocator::new(store.clone());
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ports = ports.clone();
                let store = store.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    let port = ports.allocate(None).unwrap();
                    // Everyone has checked; now everyone writes.
                    barrier.wait().await;
                    let name = format!("svc{}", i);
                    store
                        .mutate(|s| {
                            s.projects
                                .insert(name.clone(), project(&name, port, ProjectStatus::Active));
                            Ok(())
                        })
                        .unwrap();
                    port
                })
            })
            .collect();

        let mut ports_seen = Vec::new();
        for handle in handles {
            ports_seen.push(handle.await.unwrap());
        }
        let unique: HashSet<u16> = ports_seen.iter().copied().collect();
        assert!(unique.len() < ports_seen.len(), "expected colliding ports: {ports_seen:?}");

        let live: Vec<u16> = store.read(|s| s.projects.values().map(|p| p.port).collect());
        assert_eq!(live.len(), 16);
        assert!(live.iter().all(|p| *p == PORT_MIN));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_collide() {
        let ports = PortAllocator::new(store_with(&[]));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let ports = ports.clone();
                tokio::spawn(async move {
                    let p = project(&format!("svc{}", i), 0, ProjectStatus::Inactive);
                    ports.reserve(p, Some(3000)).unwrap().port
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()), "duplicate port reserved");
        }
        assert_eq!(seen.len(), 64);
    }

    proptest! {
        #[test]
        fn live_projects_never_share_a_port(ops in proptest::collection::vec((any::<bool>(), 0usize..8), 1..60)) {
            let store = Store::in_memory();
            let ports = PortAllocator::new(store.clone());

            for (i, (activate, slot)) in ops.into_iter().enumerate() {
                if activate {
                    let port = ports.allocate(None).unwrap();
                    let name = format!("p{}", i);
                    store.mutate(|s| {
                        s.projects.insert(name.clone(), project(&name, port, ProjectStatus::Active));
                        Ok(())
                    }).unwrap();
                } else {
                    let victim = store.read(|s| s.projects.keys().nth(slot).cloned());
                    if let Some(name) = victim {
                        store.update_project(&name, |p| p.status = ProjectStatus::Inactive).unwrap();
                    }
                }

                let live: Vec<u16> = store.read(|s| {
                    s.projects.values().filter(|p| p.status.is_live()).map(|p| p.port).collect()
                });
                let unique: HashSet<u16> = live.iter().copied().collect();
                prop_assert_eq!(unique.len(), live.len());
            }
        }
    }
}
