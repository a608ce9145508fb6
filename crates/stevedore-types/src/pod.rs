//! Pod records and the pod status-aggregation state machine.
//!
//! A pod's coarse-grained state is never stored on its own: it is
//! recomputed from the full container mapping by [`Pod::update_state`]
//! every time the mapping changes.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::state;

/// A pod: metadata, container spec, and the runtime status of each
/// container belonging to it.
///
/// The pod is exclusively owned by whichever component reconciles it;
/// callers that apply concurrent container-status updates must hold an
/// exclusive lock around the mutation plus [`Pod::update_state`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub meta: PodMeta,
    pub spec: PodSpec,
    /// Container runtime status keyed by container ID. Ordered so that
    /// state aggregation visits containers deterministically.
    pub containers: BTreeMap<String, Container>,
    /// Pod-scoped secrets keyed by name.
    pub secrets: HashMap<String, PodSecret>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodMeta {
    pub name: String,
    pub namespace: String,
    /// Stable identifier used to address this pod instance.
    pub self_link: String,
    /// Hostname of the node this pod is scheduled to.
    pub hostname: String,
    /// Aggregate state derived from the container mapping.
    pub state: PodState,
    pub created: u64,
    pub updated: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSpec {
    pub state: String,
    pub status: String,
    /// Ordered list of container specs.
    pub containers: Vec<ContainerSpec>,
    pub created: u64,
    pub updated: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
}

/// A pod-scoped secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodSecret {
    pub data: HashMap<String, String>,
}

/// Aggregate pod state derived from the container mapping.
///
/// `state` holds one of the [`state`] names (a container state, `warning`,
/// or empty before the first recomputation); `status` carries the status
/// string of the container that put the pod into `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodState {
    pub state: String,
    pub status: String,
    pub containers: PodContainersState,
}

/// Per-state container counts.
///
/// `total` is not guaranteed to equal the sum of the buckets: a container
/// in `error` is counted a second time when it is the one that flips an
/// already-stated pod into `error` (see [`Pod::update_state`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodContainersState {
    pub total: u32,
    pub running: u32,
    pub created: u32,
    pub stopped: u32,
    pub errored: u32,
}

/// Runtime state of one container belonging to a pod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    /// Self-link of the owning pod.
    pub pod: String,
    pub state: ContainerState,
    pub status: String,
    pub exit_code: i32,
    pub created: u64,
    pub started: u64,
}

/// The closed set of container runtime states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    #[default]
    Created,
    Running,
    Stopped,
    Exited,
    Error,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Created => state::CREATED,
            ContainerState::Running => state::RUNNING,
            ContainerState::Stopped => state::STOPPED,
            ContainerState::Exited => state::EXITED,
            ContainerState::Error => state::ERROR,
        }
    }
}

impl Pod {
    pub fn add_container(&mut self, c: Container) {
        self.containers.insert(c.id.clone(), c);
    }

    pub fn set_container(&mut self, c: Container) {
        self.containers.insert(c.id.clone(), c);
    }

    pub fn del_container(&mut self, id: &str) {
        self.containers.remove(id);
    }

    /// Recompute the aggregate pod state from the container mapping.
    ///
    /// The recomputation starts from a zeroed state (idempotent, never
    /// incremental) and folds over the containers in container-ID order.
    /// Per container, exactly one counter is bumped (`exited` lands in
    /// `stopped`), then the precedence rules below run, first match wins:
    ///
    /// 1. container state already equals the pod state — no change;
    /// 2. `exited` while the pod status is unset — pod becomes `stopped`;
    /// 3. pod state unset — pod takes the container's state;
    /// 4. pod already in `error` — sticks, no later container demotes it;
    /// 5. `exited` while the pod status is not `stopped` — `warning`;
    /// 6. `running` while the pod status is not `running` — `warning`;
    /// 7. `error` — pod takes `error` plus the container's status, and the
    ///    `errored` counter is bumped a second time.
    pub fn update_state(&mut self) {
        self.meta.state = PodState::default();
        let st = &mut self.meta.state;

        for c in self.containers.values() {
            st.containers.total += 1;

            match c.state {
                ContainerState::Created => st.containers.created += 1,
                ContainerState::Running => st.containers.running += 1,
                ContainerState::Stopped | ContainerState::Exited => st.containers.stopped += 1,
                ContainerState::Error => st.containers.errored += 1,
            }

            if c.state.as_str() == st.state {
                continue;
            }

            if c.state == ContainerState::Exited && st.status.is_empty() {
                st.state = state::STOPPED.to_string();
                continue;
            }

            if st.state.is_empty() {
                st.state = c.state.as_str().to_string();
                continue;
            }

            if st.state == state::ERROR {
                continue;
            }

            if c.state == ContainerState::Exited && st.status != state::STOPPED {
                st.state = state::WARNING.to_string();
                continue;
            }

            if c.state == ContainerState::Running && st.status != state::RUNNING {
                st.state = state::WARNING.to_string();
                continue;
            }

            if c.state == ContainerState::Error {
                st.containers.errored += 1;
                st.state = state::ERROR.to_string();
                st.status = c.status.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, cs: ContainerState) -> Container {
        Container {
            id: id.to_string(),
            pod: "pod-1".to_string(),
            state: cs,
            status: cs.as_str().to_string(),
            exit_code: 0,
            created: 1000,
            started: 1000,
        }
    }

    fn pod_with(states: &[(&str, ContainerState)]) -> Pod {
        let mut pod = Pod::default();
        for (id, cs) in states {
            pod.add_container(container(id, *cs));
        }
        pod
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut pod = pod_with(&[
            ("a", ContainerState::Running),
            ("b", ContainerState::Exited),
            ("c", ContainerState::Error),
        ]);
        pod.update_state();
        let first = pod.meta.state.clone();
        pod.update_state();
        assert_eq!(pod.meta.state, first);
    }

    #[test]
    fn error_dominates_when_visited_first() {
        // IDs sort the error container first.
        let mut pod = pod_with(&[
            ("a", ContainerState::Error),
            ("b", ContainerState::Running),
        ]);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::ERROR);
    }

    #[test]
    fn error_dominates_when_visited_last() {
        // IDs sort the running container first; the error rule then takes
        // over and copies the container's status.
        let mut pod = pod_with(&[
            ("a", ContainerState::Running),
            ("b", ContainerState::Error),
        ]);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::ERROR);
        assert_eq!(pod.meta.state.status, state::ERROR);
    }

    #[test]
    fn single_exited_container_means_stopped() {
        let mut pod = pod_with(&[("a", ContainerState::Exited)]);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::STOPPED);
        assert_eq!(pod.meta.state.containers.stopped, 1);
        assert_eq!(pod.meta.state.containers.total, 1);
    }

    #[test]
    fn all_running_means_running() {
        let mut pod = pod_with(&[
            ("a", ContainerState::Running),
            ("b", ContainerState::Running),
        ]);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::RUNNING);
        assert_eq!(pod.meta.state.containers.running, 2);
    }

    #[test]
    fn late_error_container_is_double_counted() {
        let mut pod = pod_with(&[
            ("a", ContainerState::Running),
            ("b", ContainerState::Error),
        ]);
        pod.update_state();
        // Counted once in the tally and once more by the error rule.
        assert_eq!(pod.meta.state.containers.errored, 2);
        assert_eq!(pod.meta.state.containers.total, 2);
    }

    #[test]
    fn error_status_comes_from_the_failing_container() {
        let mut pod = pod_with(&[("a", ContainerState::Running)]);
        let mut bad = container("b", ContainerState::Error);
        bad.status = "oom killed".to_string();
        pod.add_container(bad);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::ERROR);
        assert_eq!(pod.meta.state.status, "oom killed");
    }

    #[test]
    fn error_state_sticks_across_later_containers() {
        for extra in [
            ContainerState::Created,
            ContainerState::Stopped,
            ContainerState::Running,
        ] {
            let mut pod = pod_with(&[("a", ContainerState::Error), ("b", extra)]);
            pod.update_state();
            assert_eq!(pod.meta.state.state, state::ERROR, "extra = {extra:?}");
        }
    }

    #[test]
    fn exited_with_unset_status_still_wins_over_error() {
        // Rule 2 precedes the error-stickiness rule: with the pod status
        // unset, a later exited container moves the pod to stopped.
        let mut pod = pod_with(&[
            ("a", ContainerState::Error),
            ("b", ContainerState::Exited),
        ]);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::STOPPED);
    }

    #[test]
    fn mixed_running_and_created_is_warning() {
        let mut pod = pod_with(&[
            ("a", ContainerState::Created),
            ("b", ContainerState::Running),
        ]);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::WARNING);
    }

    #[test]
    fn empty_pod_has_empty_state() {
        let mut pod = Pod::default();
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::EMPTY);
        assert_eq!(pod.meta.state.containers, PodContainersState::default());
    }

    #[test]
    fn counters_reset_between_recomputations() {
        let mut pod = pod_with(&[("a", ContainerState::Running)]);
        pod.update_state();
        assert_eq!(pod.meta.state.containers.total, 1);

        pod.del_container("a");
        pod.add_container(container("b", ContainerState::Created));
        pod.update_state();
        assert_eq!(pod.meta.state.containers.total, 1);
        assert_eq!(pod.meta.state.containers.running, 0);
        assert_eq!(pod.meta.state.containers.created, 1);
        assert_eq!(pod.meta.state.state, state::CREATED);
    }

    #[test]
    fn stopped_and_exited_share_a_bucket() {
        let mut pod = pod_with(&[
            ("a", ContainerState::Stopped),
            ("b", ContainerState::Exited),
        ]);
        pod.update_state();
        assert_eq!(pod.meta.state.containers.stopped, 2);
    }

    #[test]
    fn set_container_overwrites_by_id() {
        let mut pod = pod_with(&[("a", ContainerState::Created)]);
        pod.set_container(container("a", ContainerState::Running));
        assert_eq!(pod.containers.len(), 1);
        pod.update_state();
        assert_eq!(pod.meta.state.state, state::RUNNING);
    }

    #[test]
    fn container_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ContainerState::Exited).unwrap(),
            "\"exited\""
        );
        let cs: ContainerState = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(cs, ContainerState::Error);
    }
}
