use std::collections::BTreeMap;

use crate::types::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListenerKind {
    Pointer,
    Scroll,
    Visibility,
    Resize,
    Theme,
    ContextLoss,
    ContextRestore,
    Performance,
}

impl ListenerKind {
    pub const HOST: [ListenerKind; 7] = [
        ListenerKind::Pointer,
        ListenerKind::Scroll,
        ListenerKind::Visibility,
        ListenerKind::Resize,
        ListenerKind::Theme,
        ListenerKind::ContextLoss,
        ListenerKind::ContextRestore,
    ];

    pub fn for_event(event: &EngineEvent) -> Self {
        match event {
            EngineEvent::Pointer { .. } => ListenerKind::Pointer,
            EngineEvent::Scroll(_) => ListenerKind::Scroll,
            EngineEvent::Visibility(_) => ListenerKind::Visibility,
            EngineEvent::Resize(_) => ListenerKind::Resize,
            EngineEvent::Theme(_) => ListenerKind::Theme,
            EngineEvent::ContextLost => ListenerKind::ContextLoss,
            EngineEvent::ContextRestored => ListenerKind::ContextRestore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle {
    pub kind: ListenerKind,
    id: u64,
}

/// Explicit record of every subscription the engine holds on its host.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: u64,
    active: BTreeMap<u64, ListenerKind>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ListenerKind) -> ListenerHandle {
        self.next_id += 1;
        self.active.insert(self.next_id, kind);
        ListenerHandle {
            kind,
            id: self.next_id,
        }
    }

    pub fn unregister(&mut self, handle: ListenerHandle) -> bool {
        self.active.remove(&handle.id).is_some()
    }

    pub fn is_registered(&self, kind: ListenerKind) -> bool {
        self.active.values().any(|active| *active == kind)
    }

    pub fn accepts(&self, event: &EngineEvent) -> bool {
        self.is_registered(ListenerKind::for_event(event))
    }

    pub fn clear(&mut self) -> usize {
        let released = self.active.len();
        self.active.clear();
        released
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_without_listener_are_rejected() {
        let mut registry = ListenerRegistry::new();
        let handle = registry.register(ListenerKind::Scroll);
        assert!(registry.accepts(&EngineEvent::Scroll(0.5)));
        assert!(!registry.accepts(&EngineEvent::Visibility(false)));
        assert!(registry.unregister(handle));
        assert!(!registry.unregister(handle));
        assert!(!registry.accepts(&EngineEvent::Scroll(0.5)));
    }

    #[test]
    fn clear_releases_everything() {
        let mut registry = ListenerRegistry::new();
        for kind in ListenerKind::HOST {
            registry.register(kind);
        }
        assert_eq!(registry.clear(), 7);
        assert!(registry.is_empty());
    }
}
