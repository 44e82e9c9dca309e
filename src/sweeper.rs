/*!
 * TTL Sweeper
 *
 * A dedicated background thread that wakes at a fixed cadence, takes the
 * shared engine lock, and runs one expiry pass. Shutdown rides the same
 * channel the thread sleeps on: a send (or dropping the handle) wakes it
 * immediately and it exits.
 */

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use log::debug;

use crate::store::StorageEngine;

/// Handle to the running sweeper thread. Dropping it stops the thread.
pub struct Sweeper {
    tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Spawn the sweeper over a shared engine, sweeping once per `interval`.
pub fn spawn_sweeper(engine: Arc<Mutex<StorageEngine>>, interval: Duration) -> Result<Sweeper> {
    let (tx, rx) = bounded::<()>(1);

    let handle = std::thread::Builder::new()
        .name("ttl-sweeper".into())
        .spawn(move || loop {
            match rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    // A poisoned lock means the owning thread died; stop
                    let Ok(mut engine) = engine.lock() else {
                        break;
                    };
                    let dropped = engine.evict_expired();
                    if dropped > 0 {
                        debug!("ttl sweep dropped {} expired keys", dropped);
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })?;

    Ok(Sweeper {
        tx: Some(tx),
        handle: Some(handle),
    })
}

impl Sweeper {
    /// Wake the thread and wait for it to exit.
    pub fn stop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
