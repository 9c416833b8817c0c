//! Audio endpoint access — trait + PulseAudio backend for the default sink.

use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug)]
pub enum AudioError {
    InitFailed(String),
    OperationFailed(String),
    /// The daemon did not answer within the per-call timeout.
    Timeout(String),
    /// The connection to the daemon is no longer usable.
    Disconnected,
    /// The endpoint was closed by its owner.
    Closed,
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::InitFailed(e) => write!(f, "Audio init failed: {e}"),
            AudioError::OperationFailed(e) => write!(f, "Audio operation failed: {e}"),
            AudioError::Timeout(e) => write!(f, "Audio daemon timed out: {e}"),
            AudioError::Disconnected => write!(f, "Audio daemon connection lost"),
            AudioError::Closed => write!(f, "Audio endpoint is closed"),
        }
    }
}

impl std::error::Error for AudioError {}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Default per-call timeout for daemon round-trips.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Snapshot of an audio output (sink) as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub index: u32,
    pub name: String,
    pub description: Option<String>,
    pub mute: bool,
}

/// One connection to the audio daemon.
pub trait AudioEndpoint: Send {
    /// Query the current default output. Side-effect free.
    fn default_output(&mut self) -> Result<Output>;
    /// Set the mute flag on `output`.
    fn set_output_mute(&mut self, output: &Output, mute: bool) -> Result<()>;
    /// Release the connection.
    fn close(&mut self) -> Result<()>;
}

/// Block on a `(Mutex<Option<T>>, Condvar)` reply slot until a value arrives
/// or `timeout` elapses. Takes the value out of the slot.
fn wait_for_reply<T>(slot: &(Mutex<Option<T>>, Condvar), timeout: Duration) -> Option<T> {
    let (lock, cvar) = slot;
    let guard = match lock.lock() {
        Ok(g) => g,
        Err(e) => {
            log::warn!("reply mutex poisoned — recovering");
            e.into_inner()
        }
    };
    let mut guard = match cvar.wait_timeout_while(guard, timeout, |v| v.is_none()) {
        Ok((g, _)) => g,
        Err(e) => e.into_inner().0,
    };
    guard.take()
}

/// Store `value` in a reply slot (first writer wins) and wake the waiter.
fn deliver<T>(slot: &(Mutex<Option<T>>, Condvar), value: T) {
    if let Ok(mut reply) = slot.0.lock() {
        if reply.is_none() {
            *reply = Some(value);
        }
        slot.1.notify_all();
    }
}

// ── Serialized access ──

/// An [`AudioEndpoint`] behind a mutex, shared by the poll path and the
/// activation path.
///
/// Every daemon call takes the lock, so a read and a write issued from
/// different threads cannot interleave. [`toggle_mute`](Self::toggle_mute)
/// holds the lock across its read and its write. After [`close`](Self::close)
/// the endpoint is gone and every call fails with [`AudioError::Closed`].
pub struct SharedEndpoint<E> {
    inner: Mutex<Option<E>>,
}

impl<E: AudioEndpoint> SharedEndpoint<E> {
    pub fn new(endpoint: E) -> Self {
        Self {
            inner: Mutex::new(Some(endpoint)),
        }
    }

    /// Run `f` with exclusive access to the endpoint.
    ///
    /// Lock poisoning and a closed endpoint are reported through `X`'s
    /// `From<AudioError>` impl.
    pub fn with<T, X: From<AudioError>>(
        &self,
        f: impl FnOnce(&mut E) -> std::result::Result<T, X>,
    ) -> std::result::Result<T, X> {
        let mut guard = self.inner.lock().map_err(|e| {
            X::from(AudioError::OperationFailed(format!(
                "endpoint mutex poisoned: {e}"
            )))
        })?;
        match guard.as_mut() {
            Some(endpoint) => f(endpoint),
            None => Err(AudioError::Closed.into()),
        }
    }

    pub fn default_output(&self) -> Result<Output> {
        self.with(|ep: &mut E| ep.default_output())
    }

    /// Mute flag of the current default output.
    pub fn is_muted(&self) -> Result<bool> {
        self.default_output().map(|o| o.mute)
    }

    /// Read the default output's flag and command its negation.
    ///
    /// Returns the value that was commanded.
    pub fn toggle_mute(&self) -> Result<bool> {
        self.with(|ep| -> Result<bool> {
            let output = ep.default_output()?;
            let target = !output.mute;
            ep.set_output_mute(&output, target)?;
            Ok(target)
        })
    }

    /// Release the underlying connection. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        let taken = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => e.into_inner().take(),
        };
        match taken {
            Some(mut endpoint) => endpoint.close(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self.inner.lock() {
            Ok(guard) => guard.is_none(),
            Err(e) => e.into_inner().is_none(),
        }
    }
}

// ── Linux PulseAudio implementation ──

#[cfg(target_os = "linux")]
mod pulse {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use libpulse_binding::callbacks::ListResult;
    use libpulse_binding::context::{Context, FlagSet as ContextFlagSet, State as ContextState};
    use libpulse_binding::mainloop::threaded::Mainloop;
    use libpulse_binding::operation::Operation;

    const DEFAULT_SINK: &str = "@DEFAULT_SINK@";

    type Reply<T> = Arc<(Mutex<Option<T>>, Condvar)>;

    fn reply_slot<T>() -> Reply<T> {
        Arc::new((Mutex::new(None), Condvar::new()))
    }

    pub struct PulseEndpoint {
        mainloop: Mainloop,
        context: Context,
        timeout: Duration,
        closed: bool,
    }

    // The threaded mainloop lock guards every context access; `SharedEndpoint`
    // additionally serializes callers.
    unsafe impl Send for PulseEndpoint {}

    /// What a call should do given the context's current state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Readiness {
        Ready,
        /// The context is dead (daemon restarted or went away); build a new one.
        Rebuild,
        /// Still handshaking.
        Pending,
    }

    fn readiness(state: ContextState) -> Readiness {
        match state {
            ContextState::Ready => Readiness::Ready,
            ContextState::Failed | ContextState::Terminated => Readiness::Rebuild,
            _ => Readiness::Pending,
        }
    }

    /// Create a context on a running or not-yet-started `mainloop` and start
    /// its connection handshake.
    fn open_context(mainloop: &mut Mainloop) -> Result<Context> {
        mainloop.lock();
        let opened = match Context::new(&*mainloop, "deckmute") {
            Some(mut context) => match context.connect(None, ContextFlagSet::NOFLAGS, None) {
                Ok(()) => Ok(context),
                Err(e) => Err(AudioError::InitFailed(format!("PulseAudio connect: {e}"))),
            },
            None => Err(AudioError::InitFailed(
                "PulseAudio context creation failed".into(),
            )),
        };
        mainloop.unlock();
        opened
    }

    fn wait_ready(
        mainloop: &mut Mainloop,
        context: &mut Context,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            mainloop.lock();
            let state = context.get_state();
            mainloop.unlock();
            match readiness(state) {
                Readiness::Ready => return Ok(()),
                Readiness::Rebuild => {
                    return Err(AudioError::InitFailed(
                        "PulseAudio context connection failed".into(),
                    ));
                }
                Readiness::Pending if Instant::now() >= deadline => {
                    mainloop.lock();
                    context.disconnect();
                    mainloop.unlock();
                    return Err(AudioError::InitFailed(format!(
                        "PulseAudio context not ready after {timeout:?}"
                    )));
                }
                Readiness::Pending => std::thread::sleep(Duration::from_millis(10)),
            }
        }
    }

    impl PulseEndpoint {
        /// Connect to the PulseAudio/PipeWire daemon.
        ///
        /// `timeout` bounds both the connection handshake and every later
        /// query or command. If the daemon restarts, the next call builds a
        /// fresh context on the same mainloop.
        pub fn connect(timeout: Duration) -> Result<Self> {
            let mut mainloop = Mainloop::new().ok_or_else(|| {
                AudioError::InitFailed("PulseAudio mainloop creation failed".into())
            })?;

            let mut context = open_context(&mut mainloop)?;

            mainloop
                .start()
                .map_err(|e| AudioError::InitFailed(format!("PulseAudio mainloop start: {e}")))?;

            if let Err(e) = wait_ready(&mut mainloop, &mut context, timeout) {
                mainloop.stop();
                return Err(e);
            }

            log::info!("connected to PulseAudio");
            Ok(PulseEndpoint {
                mainloop,
                context,
                timeout,
                closed: false,
            })
        }

        fn ensure_ready(&mut self) -> Result<()> {
            if self.closed {
                return Err(AudioError::Closed);
            }
            self.mainloop.lock();
            let state = self.context.get_state();
            self.mainloop.unlock();
            match readiness(state) {
                Readiness::Ready => Ok(()),
                Readiness::Pending => Err(AudioError::Disconnected),
                Readiness::Rebuild => self.rebuild_context(),
            }
        }

        /// Replace a dead context. One attempt per call; failure leaves the
        /// old context in place so the next call tries again.
        fn rebuild_context(&mut self) -> Result<()> {
            log::debug!("PulseAudio context lost, reconnecting");
            let mut context = open_context(&mut self.mainloop).map_err(|e| {
                log::debug!("PulseAudio reconnect failed: {e}");
                AudioError::Disconnected
            })?;
            let ready = wait_ready(&mut self.mainloop, &mut context, self.timeout);

            self.mainloop.lock();
            let result = match ready {
                Ok(()) => {
                    drop(std::mem::replace(&mut self.context, context));
                    log::info!("reconnected to PulseAudio");
                    Ok(())
                }
                Err(e) => {
                    drop(context);
                    log::debug!("PulseAudio reconnect failed: {e}");
                    Err(AudioError::Disconnected)
                }
            };
            self.mainloop.unlock();
            result
        }

        /// Drop a finished operation under the mainloop lock, cancelling it
        /// first if no reply arrived in time.
        fn settle<G: ?Sized, T>(
            &mut self,
            mut op: Operation<G>,
            outcome: Option<T>,
            what: &str,
        ) -> Result<T> {
            self.mainloop.lock();
            if outcome.is_none() {
                op.cancel();
            }
            drop(op);
            self.mainloop.unlock();
            outcome.ok_or_else(|| AudioError::Timeout(format!("{what} after {:?}", self.timeout)))
        }
    }

    impl AudioEndpoint for PulseEndpoint {
        fn default_output(&mut self) -> Result<Output> {
            self.ensure_ready()?;
            let reply: Reply<std::result::Result<Output, String>> = reply_slot();
            let cb_reply = Arc::clone(&reply);

            self.mainloop.lock();
            let introspect = self.context.introspect();
            let op = introspect.get_sink_info_by_name(DEFAULT_SINK, move |result| match result {
                ListResult::Item(info) => deliver(
                    &cb_reply,
                    Ok(Output {
                        index: info.index,
                        name: info.name.as_deref().unwrap_or_default().to_string(),
                        description: info.description.as_ref().map(|d| d.to_string()),
                        mute: info.mute,
                    }),
                ),
                ListResult::End => deliver(&cb_reply, Err("no default sink".to_string())),
                ListResult::Error => {
                    deliver(&cb_reply, Err("sink introspection failed".to_string()))
                }
            });
            self.mainloop.unlock();

            let outcome = wait_for_reply(&reply, self.timeout);
            self.settle(op, outcome, "get default sink")?
                .map_err(AudioError::OperationFailed)
        }

        fn set_output_mute(&mut self, output: &Output, mute: bool) -> Result<()> {
            self.ensure_ready()?;
            let reply: Reply<bool> = reply_slot();
            let cb_reply = Arc::clone(&reply);

            self.mainloop.lock();
            let mut introspect = self.context.introspect();
            let op = introspect.set_sink_mute_by_index(
                output.index,
                mute,
                Some(Box::new(move |success| deliver(&cb_reply, success))),
            );
            self.mainloop.unlock();

            let outcome = wait_for_reply(&reply, self.timeout);
            if self.settle(op, outcome, "set sink mute")? {
                log::debug!("sink {} mute -> {mute}", output.name);
                Ok(())
            } else {
                Err(AudioError::OperationFailed(format!(
                    "set mute on sink {} rejected",
                    output.name
                )))
            }
        }

        fn close(&mut self) -> Result<()> {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            self.mainloop.lock();
            self.context.disconnect();
            self.mainloop.unlock();
            self.mainloop.stop();
            log::info!("disconnected from PulseAudio");
            Ok(())
        }
    }

    impl Drop for PulseEndpoint {
        fn drop(&mut self) {
            let _ = AudioEndpoint::close(self);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn dead_context_is_rebuilt() {
            assert_eq!(readiness(ContextState::Failed), Readiness::Rebuild);
            assert_eq!(readiness(ContextState::Terminated), Readiness::Rebuild);
        }

        #[test]
        fn handshake_states_are_pending() {
            for state in [
                ContextState::Unconnected,
                ContextState::Connecting,
                ContextState::Authorizing,
                ContextState::SettingName,
            ] {
                assert_eq!(readiness(state), Readiness::Pending);
            }
        }

        #[test]
        fn ready_context_is_used() {
            assert_eq!(readiness(ContextState::Ready), Readiness::Ready);
        }
    }
}

#[cfg(target_os = "linux")]
pub use pulse::PulseEndpoint;

// ── Test stub ──

/// Scriptable [`AudioEndpoint`] for unit and integration tests.
///
/// Clones share state, so a test can keep one handle to play the "other
/// application" changing the mute flag while the widget owns the other.
pub mod stub {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug)]
    struct StubState {
        output: Output,
        fail_queries: bool,
        fail_commands: bool,
        fail_close: bool,
        query_delay: Duration,
        queries: usize,
        commands: Vec<bool>,
        closed: bool,
    }

    #[derive(Debug, Clone)]
    pub struct StubEndpoint {
        state: Arc<Mutex<StubState>>,
    }

    impl StubEndpoint {
        /// Create a stub whose default output starts with the given mute flag.
        pub fn new(initial_muted: bool) -> Self {
            Self {
                state: Arc::new(Mutex::new(StubState {
                    output: Output {
                        index: 0,
                        name: "stub.sink".into(),
                        description: Some("Stub Output".into()),
                        mute: initial_muted,
                    },
                    fail_queries: false,
                    fail_commands: false,
                    fail_close: false,
                    query_delay: Duration::ZERO,
                    queries: 0,
                    commands: Vec::new(),
                    closed: false,
                })),
            }
        }

        fn state(&self) -> std::sync::MutexGuard<'_, StubState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Change the mute flag as another application would.
        pub fn set_external_mute(&self, muted: bool) {
            self.state().output.mute = muted;
        }

        pub fn muted(&self) -> bool {
            self.state().output.mute
        }

        /// Make every query fail (daemon unreachable).
        pub fn fail_queries(&self, fail: bool) {
            self.state().fail_queries = fail;
        }

        /// Make every mute command fail.
        pub fn fail_commands(&self, fail: bool) {
            self.state().fail_commands = fail;
        }

        pub fn fail_close(&self, fail: bool) {
            self.state().fail_close = fail;
        }

        /// Sleep this long inside each query.
        pub fn set_query_delay(&self, delay: Duration) {
            self.state().query_delay = delay;
        }

        /// Number of successful and failed queries issued so far.
        pub fn query_count(&self) -> usize {
            self.state().queries
        }

        /// Mute values commanded so far, in order.
        pub fn commands(&self) -> Vec<bool> {
            self.state().commands.clone()
        }

        pub fn is_closed(&self) -> bool {
            self.state().closed
        }
    }

    impl AudioEndpoint for StubEndpoint {
        fn default_output(&mut self) -> Result<Output> {
            let (delay, fail, closed) = {
                let mut s = self.state();
                s.queries += 1;
                (s.query_delay, s.fail_queries, s.closed)
            };
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            if closed {
                return Err(AudioError::Closed);
            }
            if fail {
                return Err(AudioError::Disconnected);
            }
            Ok(self.state().output.clone())
        }

        fn set_output_mute(&mut self, output: &Output, mute: bool) -> Result<()> {
            let mut s = self.state();
            if s.closed {
                return Err(AudioError::Closed);
            }
            if s.fail_commands {
                return Err(AudioError::OperationFailed(format!(
                    "set mute on sink {} rejected",
                    output.name
                )));
            }
            s.commands.push(mute);
            if s.output.index == output.index {
                s.output.mute = mute;
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            let mut s = self.state();
            s.closed = true;
            if s.fail_close {
                return Err(AudioError::OperationFailed("close failed".into()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::stub::StubEndpoint;
    use super::*;
    use std::sync::Arc;

    // ── wait_for_reply ──

    #[test]
    fn wait_for_reply_returns_delivered_value() {
        let slot = Arc::new((Mutex::new(None), Condvar::new()));
        let slot2 = Arc::clone(&slot);

        let handle = std::thread::spawn(move || wait_for_reply(&slot2, Duration::from_secs(5)));

        std::thread::sleep(Duration::from_millis(20));
        deliver(&slot, 42u32);

        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn wait_for_reply_times_out() {
        let slot: (Mutex<Option<u32>>, Condvar) = (Mutex::new(None), Condvar::new());
        assert_eq!(wait_for_reply(&slot, Duration::from_millis(10)), None);
    }

    #[test]
    fn deliver_keeps_first_value() {
        let slot = (Mutex::new(None), Condvar::new());
        deliver(&slot, "item");
        deliver(&slot, "end");
        assert_eq!(wait_for_reply(&slot, Duration::from_millis(10)), Some("item"));
    }

    // ── SharedEndpoint ──

    #[test]
    fn shared_is_muted_reads_default_output() {
        let stub = StubEndpoint::new(true);
        let shared = SharedEndpoint::new(stub.clone());
        assert!(shared.is_muted().unwrap());
        stub.set_external_mute(false);
        assert!(!shared.is_muted().unwrap());
    }

    #[test]
    fn shared_toggle_commands_negation() {
        let stub = StubEndpoint::new(false);
        let shared = SharedEndpoint::new(stub.clone());
        assert!(shared.toggle_mute().unwrap());
        assert_eq!(stub.commands(), vec![true]);
        assert!(stub.muted());
    }

    #[test]
    fn shared_toggle_query_failure_sends_no_command() {
        let stub = StubEndpoint::new(false);
        stub.fail_queries(true);
        let shared = SharedEndpoint::new(stub.clone());
        assert!(matches!(shared.toggle_mute(), Err(AudioError::Disconnected)));
        assert!(stub.commands().is_empty());
    }

    #[test]
    fn shared_close_then_calls_fail() {
        let stub = StubEndpoint::new(false);
        let shared = SharedEndpoint::new(stub.clone());
        shared.close().unwrap();
        assert!(stub.is_closed());
        assert!(shared.is_closed());
        assert!(matches!(shared.default_output(), Err(AudioError::Closed)));
        assert!(matches!(shared.toggle_mute(), Err(AudioError::Closed)));
    }

    #[test]
    fn shared_close_twice_is_ok() {
        let shared = SharedEndpoint::new(StubEndpoint::new(false));
        shared.close().unwrap();
        shared.close().unwrap();
    }

    #[test]
    fn shared_close_surfaces_endpoint_error() {
        let stub = StubEndpoint::new(false);
        stub.fail_close(true);
        let shared = SharedEndpoint::new(stub.clone());
        assert!(shared.close().is_err());
        assert!(shared.is_closed(), "closed regardless of the error");
    }

    #[test]
    fn concurrent_toggles_are_serialized() {
        let stub = StubEndpoint::new(false);
        // Widen the window between read and write
        stub.set_query_delay(Duration::from_millis(20));
        let shared = Arc::new(SharedEndpoint::new(stub.clone()));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.toggle_mute().unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stub.commands(), vec![true, false]);
        assert!(!stub.muted());
    }

    // ── StubEndpoint ──

    #[test]
    fn stub_counts_queries() {
        let mut stub = StubEndpoint::new(false);
        stub.default_output().unwrap();
        stub.fail_queries(true);
        assert!(stub.default_output().is_err());
        assert_eq!(stub.query_count(), 2);
    }

    #[test]
    fn stub_failed_command_keeps_state() {
        let mut stub = StubEndpoint::new(false);
        stub.fail_commands(true);
        let out = stub.default_output().unwrap();
        assert!(stub.set_output_mute(&out, true).is_err());
        assert!(!stub.muted());
        assert!(stub.commands().is_empty());
    }

    #[test]
    fn display_audio_errors() {
        assert_eq!(
            AudioError::Disconnected.to_string(),
            "Audio daemon connection lost"
        );
        assert_eq!(
            AudioError::Timeout("get default sink after 500ms".into()).to_string(),
            "Audio daemon timed out: get default sink after 500ms"
        );
    }
}
