//! Auxiliary render thread.
//!
//! When the backend's internal event-processing thread is disabled, synchronous bank
//! calls block until someone else pumps [`Backend::render_audio`]. The main thread
//! cannot do that while it is stuck inside the call, so this worker renders on its
//! behalf for exactly the duration of the call:
//!
//! ```text
//! main:   signal_start()  -> blocking bank call ->  signal_stop_and_wait()
//! worker: Wait            -> render, render, ...  -> Wait
//! ```

use crate::backend::Backend;
use crate::error::{BridgeError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxThreadState {
    /// Idle, blocked on the condition variable.
    Wait,
    /// Rendering in a loop.
    Start,
    /// Asked to go back to `Wait` after the current render step.
    Stop,
}

#[derive(Debug)]
struct Control {
    state: AuxThreadState,
    quit: bool,
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct AuxThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl AuxThread {
    pub fn spawn(backend: Arc<dyn Backend>) -> Result<Self> {
        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                state: AuxThreadState::Wait,
                quit: false,
            }),
            signal: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("petalsonic-aux".into())
            .spawn(move || run(&worker_shared, backend.as_ref()))
            .map_err(|e| BridgeError::Thread(format!("Failed to spawn aux thread: {}", e)))?;

        log::debug!("Aux thread started");

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> AuxThreadState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Starts rendering on the worker.
    pub fn signal_start(&self) {
        self.shared.lock().state = AuxThreadState::Start;
        self.shared.signal.notify_all();
    }

    /// Stops rendering and blocks until the worker is idle again. Once this returns
    /// no render step issued by the worker is still in progress.
    pub fn signal_stop_and_wait(&self) {
        let mut control = self.shared.lock();
        control.state = AuxThreadState::Stop;
        self.shared.signal.notify_all();

        let _control = self
            .shared
            .signal
            .wait_while(control, |control| control.state != AuxThreadState::Wait)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Asks the worker to quit and joins it. Calling this again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        {
            let mut control = self.shared.lock();
            control.quit = true;
            control.state = AuxThreadState::Start;
        }
        self.shared.signal.notify_all();

        handle
            .join()
            .map_err(|_| BridgeError::Thread("Aux thread panicked".to_string()))?;

        log::debug!("Aux thread stopped");
        Ok(())
    }
}

impl Drop for AuxThread {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            log::error!("{}", error);
        }
    }
}

fn run(shared: &Shared, backend: &dyn Backend) {
    loop {
        {
            let control = shared.lock();
            let mut control = shared
                .signal
                .wait_while(control, |control| {
                    control.state == AuxThreadState::Wait && !control.quit
                })
                .unwrap_or_else(PoisonError::into_inner);

            if control.quit {
                break;
            }

            if control.state == AuxThreadState::Stop {
                control.state = AuxThreadState::Wait;
                shared.signal.notify_all();
                continue;
            }
        }

        backend.render_audio();
    }
}
