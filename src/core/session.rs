// This module provides the compilation context that is threaded explicitly through
// method construction, allocation and emission instead of process-wide registries. The
// context borrows a bumpalo arena for per-compilation scratch data (frame layouts live
// there), owns the ABI registry that hands out shared read-only ABI instances, keeps the
// registered compilation observers and accumulates SessionStats. Observers are invoked
// synchronously on the compiling thread, in registration order, before compilation
// continues. Everything mutable sits behind RefCell so that allocator and emitter can
// work with a shared &CompilationContext while they hold &mut EirMethod.

//! Compilation context shared by the allocator and emitter.

use bumpalo::Bump;
use std::cell::RefCell;
use std::fmt;

use super::error::EirResult;
use super::kind::Kind;
use super::method::{EirEmitter, EirMethod};
use crate::abi::{AbiRegistry, CallingConvention, Target};

/// Points in a method's compilation that observers are told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilationEvent {
    BeforeAllocation,
    AfterAllocation,
    AfterGeneration,
    AfterEmission,
}

/// Receives compilation events, e.g. for tracing or inspection tools.
pub trait CompilationObserver {
    fn notify(&mut self, event: CompilationEvent, method: &EirMethod);
}

/// Per-compilation context.
pub struct CompilationContext<'arena> {
    /// Arena for per-compilation scratch data.
    arena: &'arena Bump,

    abis: AbiRegistry,

    observers: RefCell<Vec<Box<dyn CompilationObserver + 'arena>>>,

    stats: RefCell<SessionStats>,
}

impl<'arena> CompilationContext<'arena> {
    /// Context with every built-in ABI registered.
    pub fn new(arena: &'arena Bump) -> EirResult<Self> {
        Ok(Self::with_registry(arena, AbiRegistry::with_defaults()?))
    }

    pub fn with_registry(arena: &'arena Bump, abis: AbiRegistry) -> Self {
        Self {
            arena,
            abis,
            observers: RefCell::new(Vec::new()),
            stats: RefCell::new(SessionStats::default()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn abis(&self) -> &AbiRegistry {
        &self.abis
    }

    /// Create a method using the registered ABI for `target` and `convention`.
    pub fn new_method(
        &self,
        name: &str,
        target: Target,
        convention: CallingConvention,
        parameter_kinds: &[Kind],
        result_kind: Kind,
    ) -> EirResult<EirMethod> {
        let abi = self.abis.get(target, convention)?;
        EirMethod::new(name, abi, parameter_kinds, result_kind)
    }

    pub fn add_observer(&self, observer: Box<dyn CompilationObserver + 'arena>) {
        self.observers.borrow_mut().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    /// Tell every observer about `event`, in registration order.
    ///
    /// Observers are taken out of the context while they run, so they may
    /// register further observers; those hear from the next event on.
    pub fn notify(&self, event: CompilationEvent, method: &EirMethod) {
        log::trace!("{}: {:?}", method.name(), event);
        let mut running = self.observers.take();
        for observer in running.iter_mut() {
            observer.notify(event, method);
        }
        let mut observers = self.observers.borrow_mut();
        let added = std::mem::replace(&mut *observers, running);
        observers.extend(added);
    }

    /// Emit a generated method and release its instruction graph.
    pub fn emit_method(&self, method: &mut EirMethod, emitter: &mut dyn EirEmitter) -> EirResult<()> {
        method.emit(emitter)?;
        self.notify(CompilationEvent::AfterEmission, method);
        method.cleanup_after_emitting();
        self.stats.borrow_mut().methods_emitted += 1;
        Ok(())
    }

    pub fn record_method_compiled(&self, frame_size: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.methods_compiled += 1;
        stats.largest_frame = stats.largest_frame.max(frame_size);
    }

    pub fn record_register_assigned(&self) {
        self.stats.borrow_mut().registers_assigned += 1;
    }

    pub fn record_spill(&self) {
        self.stats.borrow_mut().spills += 1;
    }

    pub fn record_filler_inserted(&self) {
        self.stats.borrow_mut().fillers_inserted += 1;
    }

    pub fn record_literals(&self, count: usize) {
        self.stats.borrow_mut().literals += count;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Methods that went through allocation.
    pub methods_compiled: usize,

    pub methods_emitted: usize,

    /// Values placed in a register by the allocator.
    pub registers_assigned: usize,

    /// Values placed in a stack slot by the allocator.
    pub spills: usize,

    /// Moves replaced by fillers.
    pub fillers_inserted: usize,

    /// Literal pool entries across all methods.
    pub literals: usize,

    pub largest_frame: u32,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Statistics:")?;
        writeln!(f, "  Methods compiled: {}", self.methods_compiled)?;
        writeln!(f, "  Methods emitted: {}", self.methods_emitted)?;
        writeln!(f, "  Registers assigned: {}", self.registers_assigned)?;
        writeln!(f, "  Spills: {}", self.spills)?;
        writeln!(f, "  Fillers inserted: {}", self.fillers_inserted)?;
        writeln!(f, "  Literals: {}", self.literals)?;
        if self.methods_compiled > 0 {
            writeln!(f, "  Largest frame: {} bytes", self.largest_frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::{Rc, Weak};

    struct Recorder {
        tag: &'static str,
        log: Rc<RefCell<Vec<(&'static str, CompilationEvent)>>>,
    }

    impl CompilationObserver for Recorder {
        fn notify(&mut self, event: CompilationEvent, _method: &EirMethod) {
            self.log.borrow_mut().push((self.tag, event));
        }
    }

    #[test]
    fn test_observers_run_in_registration_order() {
        let arena = Bump::new();
        let context = CompilationContext::new(&arena).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            context.add_observer(Box::new(Recorder {
                tag,
                log: Rc::clone(&log),
            }));
        }
        assert_eq!(context.observer_count(), 2);
        let method = context
            .new_method("m", Target::Amd64, CallingConvention::Java, &[], Kind::Void)
            .unwrap();

        context.notify(CompilationEvent::BeforeAllocation, &method);
        context.notify(CompilationEvent::AfterAllocation, &method);
        assert_eq!(
            *log.borrow(),
            vec![
                ("first", CompilationEvent::BeforeAllocation),
                ("second", CompilationEvent::BeforeAllocation),
                ("first", CompilationEvent::AfterAllocation),
                ("second", CompilationEvent::AfterAllocation),
            ]
        );
    }

    struct Spawner<'arena> {
        context: Weak<CompilationContext<'arena>>,
        log: Rc<RefCell<Vec<(&'static str, CompilationEvent)>>>,
    }

    impl CompilationObserver for Spawner<'_> {
        fn notify(&mut self, event: CompilationEvent, _method: &EirMethod) {
            self.log.borrow_mut().push(("spawner", event));
            let Some(context) = self.context.upgrade() else { return };
            if event == CompilationEvent::BeforeAllocation {
                context.add_observer(Box::new(Recorder {
                    tag: "late",
                    log: Rc::clone(&self.log),
                }));
            }
        }
    }

    #[test]
    fn test_observer_may_register_observers() {
        let arena = Bump::new();
        let context = Rc::new(CompilationContext::new(&arena).unwrap());
        let log = Rc::new(RefCell::new(Vec::new()));
        context.add_observer(Box::new(Spawner {
            context: Rc::downgrade(&context),
            log: Rc::clone(&log),
        }));
        let method = context
            .new_method("m", Target::Amd64, CallingConvention::Java, &[], Kind::Void)
            .unwrap();

        context.notify(CompilationEvent::BeforeAllocation, &method);
        assert_eq!(context.observer_count(), 2);
        context.notify(CompilationEvent::AfterAllocation, &method);
        assert_eq!(
            *log.borrow(),
            vec![
                ("spawner", CompilationEvent::BeforeAllocation),
                ("spawner", CompilationEvent::AfterAllocation),
                ("late", CompilationEvent::AfterAllocation),
            ]
        );
    }

    #[test]
    fn test_missing_abi_is_a_program_error() {
        let arena = Bump::new();
        let context = CompilationContext::with_registry(&arena, AbiRegistry::new());
        let err = context
            .new_method("m", Target::Amd64, CallingConvention::Native, &[], Kind::Void)
            .unwrap_err();
        assert!(err.to_string().contains("native"));
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let context = CompilationContext::new(&arena).unwrap();
        context.record_method_compiled(48);
        context.record_register_assigned();
        context.record_register_assigned();
        context.record_spill();

        let stats = context.stats();
        assert_eq!(stats.registers_assigned, 2);
        let output = stats.to_string();
        assert!(output.contains("Methods compiled: 1"));
        assert!(output.contains("Spills: 1"));
        assert!(output.contains("Largest frame: 48 bytes"));
    }
}
