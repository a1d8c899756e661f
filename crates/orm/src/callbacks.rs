//! Lifecycle callbacks
//!
//! Hooks are registered per event as ordered closure lists. Stoppable events
//! (the `Before*` family) short-circuit on [`CallbackOutcome::Halt`], which
//! aborts the surrounding operation the same way a validation failure does:
//! no exception, no database write. Post-event hooks cannot halt; their
//! outcome is ignored.

use std::collections::HashMap;
use std::sync::Arc;

use crate::collection::Collection;
use crate::entity::Entity;
use crate::model::QueryOptions;

/// Lifecycle events, in the order they fire across find/save/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackEvent {
    BeforeFind,
    AfterFind,
    BeforeValidate,
    AfterValidate,
    BeforeSave,
    BeforeCreate,
    BeforeUpdate,
    AfterCreate,
    AfterUpdate,
    AfterSave,
    BeforeDelete,
    AfterDelete,
    AfterCommit,
    AfterRollback,
    OnError,
}

impl CallbackEvent {
    /// Whether a `Halt` from this event aborts the operation.
    pub fn stoppable(self) -> bool {
        matches!(
            self,
            CallbackEvent::BeforeFind
                | CallbackEvent::BeforeValidate
                | CallbackEvent::BeforeSave
                | CallbackEvent::BeforeCreate
                | CallbackEvent::BeforeUpdate
                | CallbackEvent::BeforeDelete
        )
    }
}

/// Explicit short-circuit semantics instead of a boolean convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Continue,
    Halt,
}

pub type EntityHook = Arc<dyn Fn(&mut Entity) -> CallbackOutcome + Send + Sync>;
pub type QueryHook = Arc<dyn Fn(&mut QueryOptions) -> CallbackOutcome + Send + Sync>;
pub type CollectionHook = Arc<dyn Fn(&mut Collection) + Send + Sync>;

/// Per-model hook registrations, ordered within each event.
#[derive(Default, Clone)]
pub struct CallbackSet {
    entity_hooks: HashMap<CallbackEvent, Vec<EntityHook>>,
    before_find: Vec<QueryHook>,
    after_find: Vec<CollectionHook>,
}

impl CallbackSet {
    pub fn register(&mut self, event: CallbackEvent, hook: EntityHook) {
        self.entity_hooks.entry(event).or_default().push(hook);
    }

    pub fn register_before_find(&mut self, hook: QueryHook) {
        self.before_find.push(hook);
    }

    pub fn register_after_find(&mut self, hook: CollectionHook) {
        self.after_find.push(hook);
    }

    /// Run an event's hooks in registration order. Stoppable events return
    /// `Halt` at the first halting hook; other events always `Continue`.
    pub fn run(&self, event: CallbackEvent, entity: &mut Entity) -> CallbackOutcome {
        if let Some(hooks) = self.entity_hooks.get(&event) {
            for hook in hooks {
                let outcome = hook(entity);
                if event.stoppable() && outcome == CallbackOutcome::Halt {
                    return CallbackOutcome::Halt;
                }
            }
        }
        CallbackOutcome::Continue
    }

    pub fn run_before_find(&self, options: &mut QueryOptions) -> CallbackOutcome {
        for hook in &self.before_find {
            if hook(options) == CallbackOutcome::Halt {
                return CallbackOutcome::Halt;
            }
        }
        CallbackOutcome::Continue
    }

    pub fn run_after_find(&self, results: &mut Collection) {
        for hook in &self.after_find {
            hook(results);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entity_hooks.is_empty() && self.before_find.is_empty() && self.after_find.is_empty()
    }
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("entity_events", &self.entity_hooks.len())
            .field("before_find", &self.before_find.len())
            .field("after_find", &self.after_find.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hooks_run_in_registration_order() {
        let mut set = CallbackSet::default();
        set.register(
            CallbackEvent::BeforeSave,
            Arc::new(|e: &mut Entity| {
                e.set("step", json!(1));
                CallbackOutcome::Continue
            }),
        );
        set.register(
            CallbackEvent::BeforeSave,
            Arc::new(|e: &mut Entity| {
                let step = e.get("step").and_then(|v| v.as_i64()).unwrap_or(0);
                e.set("step", json!(step + 1));
                CallbackOutcome::Continue
            }),
        );

        let mut entity = Entity::new();
        let outcome = set.run(CallbackEvent::BeforeSave, &mut entity);
        assert_eq!(outcome, CallbackOutcome::Continue);
        assert_eq!(entity.get("step"), Some(&json!(2)));
    }

    #[test]
    fn stoppable_event_short_circuits() {
        let mut set = CallbackSet::default();
        set.register(
            CallbackEvent::BeforeSave,
            Arc::new(|_: &mut Entity| CallbackOutcome::Halt),
        );
        set.register(
            CallbackEvent::BeforeSave,
            Arc::new(|e: &mut Entity| {
                e.set("reached", json!(true));
                CallbackOutcome::Continue
            }),
        );

        let mut entity = Entity::new();
        assert_eq!(
            set.run(CallbackEvent::BeforeSave, &mut entity),
            CallbackOutcome::Halt
        );
        assert!(!entity.has("reached"));
    }

    #[test]
    fn halt_is_ignored_for_non_stoppable_events() {
        let mut set = CallbackSet::default();
        set.register(
            CallbackEvent::AfterSave,
            Arc::new(|_: &mut Entity| CallbackOutcome::Halt),
        );
        let mut entity = Entity::new();
        assert_eq!(
            set.run(CallbackEvent::AfterSave, &mut entity),
            CallbackOutcome::Continue
        );
    }
}
