//! qtx-state
//!
//! Component registry & state-machine gatekeeper (C11).
//!
//! The original implementation keeps this as a process-wide singleton; per
//! SPEC_FULL.md §9 this crate drops the singleton and models it as a plain
//! struct a caller constructs once per run. Re-entrancy collapses to the
//! borrow checker: every mutating method takes `&mut self`, so there is
//! nothing left for a runtime lock to do within one thread, and tests build
//! a fresh `ComponentRegistry` per case instead of calling a `reset()` hook.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qtx_core::{EngineError, ErrorCode};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentType {
    Strategy,
    Portfolio,
    Execution,
    Risk,
    Optimizer,
    Backtest,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentState {
    Initialized,
    Running,
    Paused,
    Stopped,
    Error,
}

fn transition_allowed(from: ComponentState, to: ComponentState) -> bool {
    use ComponentState::*;
    matches!(
        (from, to),
        (Initialized, Running)
            | (Initialized, Error)
            | (Running, Paused)
            | (Running, Stopped)
            | (Running, Error)
            | (Paused, Running)
            | (Paused, Stopped)
            | (Paused, Error)
            | (Error, Initialized)
            | (Error, Stopped)
            | (Stopped, Initialized)
    )
}

#[derive(Clone, Debug)]
pub struct ComponentEntry {
    pub component_type: ComponentType,
    pub state: ComponentState,
    pub last_update: DateTime<Utc>,
    pub error_message: Option<String>,
    pub metrics: BTreeMap<String, f64>,
}

/// Registry of components participating in one run. Constructed fresh per
/// run; no global/static instance.
#[derive(Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, ComponentEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        component_type: ComponentType,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let id = id.into();
        if self.components.contains_key(&id) {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("component '{id}' already registered"),
                "qtx-state::ComponentRegistry::register",
            ));
        }
        self.components.insert(
            id,
            ComponentEntry {
                component_type,
                state: ComponentState::Initialized,
                last_update: now,
                error_message: None,
                metrics: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, id: &str) -> Result<(), EngineError> {
        self.components
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    pub fn update_state(
        &mut self,
        id: &str,
        new_state: ComponentState,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let entry = self.components.get_mut(id).ok_or_else(|| not_found(id))?;
        if !transition_allowed(entry.state, new_state) {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("invalid transition {:?} -> {:?}", entry.state, new_state),
                "qtx-state::ComponentRegistry::update_state",
            ));
        }
        entry.state = new_state;
        entry.last_update = now;
        entry.error_message = error_message;
        Ok(())
    }

    pub fn update_metrics(
        &mut self,
        id: &str,
        metrics: BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let entry = self.components.get_mut(id).ok_or_else(|| not_found(id))?;
        entry.metrics.extend(metrics);
        entry.last_update = now;
        Ok(())
    }

    pub fn get_state(&self, id: &str) -> Option<ComponentState> {
        self.components.get(id).map(|e| e.state)
    }

    pub fn get_all_components(&self) -> &BTreeMap<String, ComponentEntry> {
        &self.components
    }

    /// Healthy iff non-empty and every component is Initialized or Running.
    pub fn is_healthy(&self) -> bool {
        !self.components.is_empty()
            && self.components.values().all(|e| {
                matches!(
                    e.state,
                    ComponentState::Initialized | ComponentState::Running
                )
            })
    }
}

fn not_found(id: &str) -> EngineError {
    EngineError::new(
        ErrorCode::DataNotFound,
        format!("no such component '{id}'"),
        "qtx-state::ComponentRegistry",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn fresh_registry_is_unhealthy_when_empty() {
        let reg = ComponentRegistry::new();
        assert!(!reg.is_healthy());
    }

    #[test]
    fn register_then_running_is_healthy() {
        let mut reg = ComponentRegistry::new();
        reg.register("s1", ComponentType::Strategy, now()).unwrap();
        reg.update_state("s1", ComponentState::Running, None, now())
            .unwrap();
        assert!(reg.is_healthy());
    }

    #[test]
    fn duplicate_register_fails() {
        let mut reg = ComponentRegistry::new();
        reg.register("s1", ComponentType::Strategy, now()).unwrap();
        assert!(reg.register("s1", ComponentType::Strategy, now()).is_err());
    }

    #[test]
    fn invalid_transition_is_rejected_and_state_unchanged() {
        let mut reg = ComponentRegistry::new();
        reg.register("s1", ComponentType::Strategy, now()).unwrap();
        let err = reg.update_state("s1", ComponentState::Stopped, None, now());
        assert!(err.is_err());
        assert_eq!(reg.get_state("s1"), Some(ComponentState::Initialized));
    }

    #[test]
    fn full_s6_state_machine_sequence() {
        let mut reg = ComponentRegistry::new();
        reg.register("s1", ComponentType::Strategy, now()).unwrap();
        reg.update_state("s1", ComponentState::Running, None, now())
            .unwrap();
        reg.update_state("s1", ComponentState::Paused, None, now())
            .unwrap();
        reg.update_state("s1", ComponentState::Running, None, now())
            .unwrap();
        reg.update_state("s1", ComponentState::Stopped, None, now())
            .unwrap();
        assert_eq!(reg.get_state("s1"), Some(ComponentState::Stopped));

        let err = reg.update_state("s1", ComponentState::Running, None, now());
        assert!(err.is_err());
    }

    #[test]
    fn any_state_can_transition_to_error() {
        let mut reg = ComponentRegistry::new();
        reg.register("s1", ComponentType::Strategy, now()).unwrap();
        reg.update_state("s1", ComponentState::Running, None, now())
            .unwrap();
        reg.update_state(
            "s1",
            ComponentState::Error,
            Some("boom".to_string()),
            now(),
        )
        .unwrap();
        assert_eq!(reg.get_state("s1"), Some(ComponentState::Error));
    }
}
