//! Invokable lifecycle manager.
//!
//! An [`InvocationHandle`] owns one instance produced by a factory symbol
//! and drives it through a fixed state machine:
//!
//! ```text
//! Created ──init──► Initialized ──poll──► Polling ──┐
//!                        │                   ▲  poll │
//!                        │                   └───────┘
//!                        └──────release──────┴──release──► Released
//! ```
//!
//! The thread mode decides which calls reach the instance: `PollOnly`
//! handles treat `init` as a no-op and `InitOnly` handles treat `poll` as
//! one. Out-of-order calls are rejected with `InvalidState`.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use opjit_core::{
    FactoryFn, HostContext, InvokableHeader, OpjitError, Result, Status, SymbolResolver,
    SymbolSignature, ThreadMode, MAX_INPUT_SLOTS, MAX_OUTPUT_SLOTS, NOTOK, OK,
};
use tracing::debug;

/// A live object created by a factory, destroyed when dropped.
pub struct InvokableInstance {
    header: NonNull<InvokableHeader>,
}

// SAFETY: an instance is owned by exactly one handle and compiled code keeps
// no thread affinity.
unsafe impl Send for InvokableInstance {}

impl InvokableInstance {
    /// Takes ownership of `ptr`; `None` when it is null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point at a valid header whose `destroy` frees it.
    pub unsafe fn from_raw(ptr: *mut InvokableHeader) -> Option<Self> {
        NonNull::new(ptr).map(|header| Self { header })
    }

    pub fn as_ptr(&self) -> *mut InvokableHeader {
        self.header.as_ptr()
    }

    fn table(&self) -> &InvokableHeader {
        // SAFETY: guaranteed valid by `from_raw` until drop.
        unsafe { self.header.as_ref() }
    }

    pub fn init(&self, context: HostContext, outputs: &mut [f64], inputs: &[f64]) -> Status {
        let init = self.table().init;
        unsafe { init(self.as_ptr(), context.as_ptr(), outputs.as_mut_ptr(), inputs.as_ptr()) }
    }

    pub fn poll(&self, context: HostContext, outputs: &mut [f64], inputs: &[f64]) -> Status {
        let poll = self.table().poll;
        unsafe { poll(self.as_ptr(), context.as_ptr(), outputs.as_mut_ptr(), inputs.as_ptr()) }
    }

    pub fn release(&self, context: HostContext) -> Status {
        let release = self.table().release;
        unsafe { release(self.as_ptr(), context.as_ptr()) }
    }
}

impl Drop for InvokableInstance {
    fn drop(&mut self) {
        let destroy = self.table().destroy;
        unsafe { destroy(self.as_ptr()) };
    }
}

impl fmt::Debug for InvokableInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvokableInstance({:p})", self.header)
    }
}

/// Lifecycle state of an [`InvocationHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Created,
    Initialized,
    Polling,
    Released,
}

/// Owns one invokable instance on behalf of one host opcode instance.
///
/// `Send` but not `Sync`.
#[derive(Debug)]
pub struct InvocationHandle {
    thread_mode: ThreadMode,
    instance: Option<InvokableInstance>,
    state: HandleState,
    _not_sync: PhantomData<Cell<()>>,
}

impl InvocationHandle {
    /// Validates `thread_mode`, resolves `factory_name` and calls it.
    ///
    /// An invalid mode fails before anything is resolved.
    pub fn create<R: SymbolResolver + ?Sized>(
        resolver: &R,
        factory_name: &str,
        thread_mode: i32,
    ) -> Result<Self> {
        let thread_mode = ThreadMode::try_from(thread_mode)?;

        let symbol = resolver.resolve(factory_name).map_err(|e| match e {
            OpjitError::Symbol(_) => {
                OpjitError::Symbol(format!("factory not found: \"{factory_name}\""))
            }
            other => other,
        })?;
        if let Some(signature) = &symbol.signature {
            let expected = SymbolSignature::factory();
            if *signature != expected {
                return Err(OpjitError::Symbol(format!(
                    "\"{factory_name}\" has signature {signature}, a factory needs {expected}"
                )));
            }
        }

        // SAFETY: the address comes from the resolver; the signature was
        // checked above when known.
        let factory: FactoryFn = unsafe { std::mem::transmute(symbol.as_ptr()) };
        let raw = unsafe { factory() };
        let instance =
            unsafe { InvokableInstance::from_raw(raw) }.ok_or(OpjitError::Runtime(NOTOK))?;
        debug!(event = "instance_created", factory = factory_name, ?instance, mode = %thread_mode);

        Ok(Self {
            thread_mode,
            instance: Some(instance),
            state: HandleState::Created,
            _not_sync: PhantomData,
        })
    }

    pub fn thread_mode(&self) -> ThreadMode {
        self.thread_mode
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// True while the handle owns an instance.
    pub fn is_live(&self) -> bool {
        self.instance.is_some()
    }

    /// Init-rate call. Forwards once unless the mode is `PollOnly`.
    pub fn init(
        &mut self,
        context: HostContext,
        outputs: &mut [f64],
        inputs: &[f64],
    ) -> Result<Status> {
        self.expect_state("init", &[HandleState::Created])?;
        check_slots(outputs, inputs)?;
        self.state = HandleState::Initialized;
        if !self.thread_mode.runs_init() {
            return Ok(OK);
        }
        let status = self.instance()?.init(context, outputs, inputs);
        debug!(event = "instance_init", status);
        Ok(status)
    }

    /// Control-rate call. Forwards unless the mode is `InitOnly`.
    pub fn poll(
        &mut self,
        context: HostContext,
        outputs: &mut [f64],
        inputs: &[f64],
    ) -> Result<Status> {
        self.expect_state("poll", &[HandleState::Initialized, HandleState::Polling])?;
        check_slots(outputs, inputs)?;
        self.state = HandleState::Polling;
        if !self.thread_mode.runs_poll() {
            return Ok(OK);
        }
        Ok(self.instance()?.poll(context, outputs, inputs))
    }

    /// Forwards `release` once, then destroys the instance.
    pub fn release(&mut self, context: HostContext) -> Result<Status> {
        self.expect_state("release", &[HandleState::Initialized, HandleState::Polling])?;
        let status = self.instance()?.release(context);
        self.instance = None;
        self.state = HandleState::Released;
        debug!(event = "instance_released", status);
        Ok(status)
    }

    fn instance(&self) -> Result<&InvokableInstance> {
        self.instance
            .as_ref()
            .ok_or_else(|| OpjitError::InvalidState("instance already destroyed".to_string()))
    }

    fn expect_state(&self, call: &str, allowed: &[HandleState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(OpjitError::InvalidState(format!(
                "{call} called in state {:?}",
                self.state
            )))
        }
    }
}

fn check_slots(outputs: &[f64], inputs: &[f64]) -> Result<()> {
    if outputs.len() > MAX_OUTPUT_SLOTS {
        return Err(OpjitError::Config(format!(
            "{} output slots given, at most {MAX_OUTPUT_SLOTS} are supported",
            outputs.len()
        )));
    }
    if inputs.len() > MAX_INPUT_SLOTS {
        return Err(OpjitError::Config(format!(
            "{} input slots given, at most {MAX_INPUT_SLOTS} are supported",
            inputs.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opjit_core::ErrorKind;
    use opjit_test::fake::{self, FAILING_INIT_FACTORY, FAKE_FACTORY, NULL_FACTORY};
    use opjit_test::FakeResolver;
    use proptest::prelude::*;

    fn ctx() -> HostContext {
        HostContext::null()
    }

    fn resolver() -> FakeResolver {
        FakeResolver::new().with_fake_invokables()
    }

    #[test]
    fn test_both_mode_full_lifecycle() {
        fake::reset();
        let mut handle = InvocationHandle::create(&resolver(), FAKE_FACTORY, 3).unwrap();
        let mut out = [0.0; 1];
        assert_eq!(handle.init(ctx(), &mut out, &[]).unwrap(), OK);
        assert_eq!(out[0], 1.0);
        for expected in [2.0, 3.0, 4.0] {
            handle.poll(ctx(), &mut out, &[]).unwrap();
            assert_eq!(out[0], expected);
        }
        handle.release(ctx()).unwrap();
        assert_eq!(handle.state(), HandleState::Released);
        assert!(!handle.is_live());

        let counts = fake::counters();
        assert_eq!(counts.factory, 1);
        assert_eq!(counts.init, 1);
        assert_eq!(counts.poll, 3);
        assert_eq!(counts.release, 1);
        assert_eq!(counts.destroy, 1);
    }

    #[test]
    fn test_poll_only_skips_init() {
        fake::reset();
        let mut handle = InvocationHandle::create(&resolver(), FAKE_FACTORY, 2).unwrap();
        let mut out = [0.0; 1];
        assert_eq!(handle.init(ctx(), &mut out, &[]).unwrap(), OK);
        handle.poll(ctx(), &mut out, &[]).unwrap();
        handle.release(ctx()).unwrap();
        let counts = fake::counters();
        assert_eq!((counts.init, counts.poll, counts.destroy), (0, 1, 1));
    }

    #[test]
    fn test_init_only_skips_poll() {
        fake::reset();
        let mut handle = InvocationHandle::create(&resolver(), FAKE_FACTORY, 1).unwrap();
        let mut out = [0.0; 1];
        handle.init(ctx(), &mut out, &[]).unwrap();
        handle.poll(ctx(), &mut out, &[]).unwrap();
        handle.poll(ctx(), &mut out, &[]).unwrap();
        handle.release(ctx()).unwrap();
        let counts = fake::counters();
        assert_eq!((counts.init, counts.poll, counts.destroy), (1, 0, 1));
    }

    #[test]
    fn test_invalid_modes_never_call_factory() {
        fake::reset();
        for mode in [0, 4, -1, 99] {
            let err = InvocationHandle::create(&resolver(), FAKE_FACTORY, mode).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
        }
        assert_eq!(fake::counters().factory, 0);
    }

    #[test]
    fn test_unknown_factory() {
        fake::reset();
        let err = InvocationHandle::create(&resolver(), "no_such_factory", 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Symbol);
        assert!(err.to_string().contains("factory not found"));
        assert_eq!(fake::counters().live(), 0);
    }

    #[test]
    fn test_null_instance_is_runtime_error() {
        fake::reset();
        let err = InvocationHandle::create(&resolver(), NULL_FACTORY, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert_eq!(fake::counters().factory, 1);
    }

    #[test]
    fn test_failed_init_still_releases() {
        fake::reset();
        let mut handle = InvocationHandle::create(&resolver(), FAILING_INIT_FACTORY, 3).unwrap();
        let mut out = [0.0; 1];
        assert_ne!(handle.init(ctx(), &mut out, &[]).unwrap(), OK);
        assert!(handle.is_live());
        handle.release(ctx()).unwrap();
        assert_eq!(fake::counters().release, 1);
        assert_eq!(fake::counters().destroy, 1);
    }

    #[test]
    fn test_drop_destroys_without_release() {
        fake::reset();
        {
            let mut handle = InvocationHandle::create(&resolver(), FAKE_FACTORY, 3).unwrap();
            let mut out = [0.0; 1];
            handle.init(ctx(), &mut out, &[]).unwrap();
        }
        let counts = fake::counters();
        assert_eq!((counts.release, counts.destroy), (0, 1));
        assert_eq!(counts.live(), 0);
    }

    #[test]
    fn test_out_of_order_calls() {
        fake::reset();
        let mut handle = InvocationHandle::create(&resolver(), FAKE_FACTORY, 3).unwrap();
        let mut out = [0.0; 1];
        let err = handle.poll(ctx(), &mut out, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(handle.release(ctx()).unwrap_err().kind(), ErrorKind::InvalidState);

        handle.init(ctx(), &mut out, &[]).unwrap();
        assert_eq!(
            handle.init(ctx(), &mut out, &[]).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        handle.release(ctx()).unwrap();
        assert_eq!(handle.release(ctx()).unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(
            handle.poll(ctx(), &mut out, &[]).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(fake::counters().release, 1);
    }

    #[test]
    fn test_slot_limits() {
        fake::reset();
        let mut handle = InvocationHandle::create(&resolver(), FAKE_FACTORY, 3).unwrap();
        let mut out = vec![0.0; MAX_OUTPUT_SLOTS + 1];
        let err = handle.init(ctx(), &mut out, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(handle.state(), HandleState::Created);

        let mut out = vec![0.0; MAX_OUTPUT_SLOTS];
        let inputs = vec![0.0; MAX_INPUT_SLOTS];
        handle.init(ctx(), &mut out, &inputs).unwrap();
    }

    #[test]
    fn test_factory_signature_checked() {
        let resolver = FakeResolver::new().with_symbol(
            "not_a_factory",
            fake::fake_factory as *const () as usize,
            Some(SymbolSignature::entry_point()),
        );
        let err = InvocationHandle::create(&resolver, "not_a_factory", 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Symbol);
    }

    proptest! {
        #[test]
        fn prop_invalid_mode_resolves_nothing(
            mode in any::<i32>().prop_filter("invalid mode", |m| !(1..=3).contains(m))
        ) {
            let resolver = resolver();
            let err = InvocationHandle::create(&resolver, FAKE_FACTORY, mode).unwrap_err();
            prop_assert_eq!(err.kind(), ErrorKind::Config);
            prop_assert_eq!(resolver.lookups(), 0);
        }
    }
}
