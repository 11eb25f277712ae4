/*============================================================
  Synavera Project: UCW
  Module: ucw_core::bridge::coalesce
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Merge bursts of native CMP events into one downstream
    recheck signal.

  Security / Safety Notes:
    Holds no consent data; only a pending-timer flag.

  Dependencies:
    tokio::time for the window, spawn_local for the timer task.

  Operational Scope:
    Armed by bridge listeners; must run inside a `LocalSet`.

  Revision History:
    2025-11-12 COD  Added event coalescer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - One recheck per user action
============================================================*/

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tokio::time::sleep;

/// Arms a timer on the first trigger; triggers that arrive before it
/// fires are absorbed into the same callback.
#[derive(Clone)]
pub struct Coalescer {
    inner: Rc<Inner>,
}

struct Inner {
    window: Duration,
    armed: Cell<bool>,
    fired: Cell<u64>,
    callback: Rc<dyn Fn()>,
}

impl Coalescer {
    pub fn new(window: Duration, callback: Rc<dyn Fn()>) -> Self {
        Self {
            inner: Rc::new(Inner {
                window,
                armed: Cell::new(false),
                fired: Cell::new(0),
                callback,
            }),
        }
    }

    pub fn trigger(&self) {
        if self.inner.armed.replace(true) {
            return;
        }
        let inner = Rc::clone(&self.inner);
        tokio::task::spawn_local(async move {
            sleep(inner.window).await;
            // Disarm first so events raised by the callback schedule a new pass.
            inner.armed.set(false);
            inner.fired.set(inner.fired.get() + 1);
            (inner.callback)();
        });
    }

    /// Number of coalesced callbacks delivered so far.
    pub fn fired(&self) -> u64 {
        self.inner.fired.get()
    }
}
