//! Screen navigation stack.
//!
//! Navigation is split in two halves:
//!
//! - [`NavLink`] is the request side. It is a `static`-friendly handle that
//!   screens, timers and event routers use to ask for push / pop / menu
//!   changes. Requests are queued and return immediately; the caller never
//!   waits on the screen it navigates to.
//! - [`Navigator`] owns every screen and the stack. Its `run` future applies
//!   queued requests one at a time, drives the current screen's activity and
//!   isolates screen failures.
//!
//! ## Masking
//!
//! While masked (an incoming call, a confirmation dialog...) every
//! push / pop / menu request is rejected with [`NavError::Masked`]. Shutdown
//! and quit are never masked.

mod navigator;


pub use navigator::{Navigator, ScreenId};

use crate::config::{
    CRASH_ALERT_MS, MAX_SCREENS, MAX_STACK_DEPTH, NAV_QUEUE_DEPTH, SCREEN_STOP_TIMEOUT_MS,
};
use crate::device::QuitReason;
use crate::error::NavError;
use crate::screen::Phase;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_time::Duration;
use heapless::Vec;

/// A queued navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request<P> {
    Push { name: &'static str, payload: Option<P> },
    Pop { payload: Option<P> },
    ToMenu { name: &'static str, payload: Option<P> },
    PopToMenu { name: &'static str, payload: Option<P> },
    ToStart,
    Quit(QuitReason),
    Shutdown,
}

impl<P> Request<P> {
    /// Requests refused while navigation is masked.
    pub const fn is_maskable(&self) -> bool {
        !matches!(self, Request::Quit(_) | Request::Shutdown)
    }

    /// Target screen name, for requests that have one.
    pub fn target(&self) -> Option<&'static str> {
        match self {
            Request::Push { name, .. }
            | Request::ToMenu { name, .. }
            | Request::PopToMenu { name, .. } => Some(*name),
            _ => None,
        }
    }
}

/// How the navigator ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Exit {
    /// The application asked to quit; the quit hook has been called.
    Quit(QuitReason),
    /// Orderly shutdown: every screen and timer stopped.
    Shutdown,
}

/// Timing budget of the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavTiming {
    /// How long `pause` / `stop` may take before the screen is reported
    /// stuck and navigation moves on.
    pub stop_timeout: Duration,
    /// How long the crash alert stays up.
    pub crash_alert: Duration,
}

impl Default for NavTiming {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_millis(SCREEN_STOP_TIMEOUT_MS),
            crash_alert: Duration::from_millis(CRASH_ALERT_MS),
        }
    }
}

/// Published view of the stack, refreshed after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Stack from root to top.
    pub stack: Vec<&'static str, MAX_STACK_DEPTH>,
    /// Screen whose activity is being driven, if any.
    pub current: Option<&'static str>,
    /// Phase of every registered screen.
    pub phases: Vec<(&'static str, Phase), MAX_SCREENS>,
}

impl Snapshot {
    pub const fn new() -> Self {
        Self {
            stack: Vec::new(),
            current: None,
            phases: Vec::new(),
        }
    }

    pub fn top(&self) -> Option<&'static str> {
        self.stack.last().copied()
    }

    pub fn phase(&self, name: &str) -> Option<Phase> {
        self.phases
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, phase)| *phase)
    }

    /// Number of screens in `Phase::Running`.
    pub fn running(&self) -> usize {
        self.phases.iter().filter(|(_, p)| p.is_running()).count()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Request side of the navigator.
pub struct NavLink<P> {
    requests: Channel<CriticalSectionRawMutex, Request<P>, NAV_QUEUE_DEPTH>,
    masked: AtomicBool,
    closed: AtomicBool,
    snapshot: BlockingMutex<CriticalSectionRawMutex, RefCell<Snapshot>>,
}

impl<P> NavLink<P> {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            masked: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            snapshot: BlockingMutex::new(RefCell::new(Snapshot::new())),
        }
    }

    /// Pause the current screen and push `name` on top of it.
    pub fn push(&self, name: &'static str) -> Result<(), NavError> {
        self.submit(Request::Push { name, payload: None })
    }

    pub fn push_with(&self, name: &'static str, payload: P) -> Result<(), NavError> {
        self.submit(Request::Push {
            name,
            payload: Some(payload),
        })
    }

    /// Stop the current screen and resume the one below.
    pub fn pop(&self) -> Result<(), NavError> {
        self.submit(Request::Pop { payload: None })
    }

    /// Like `pop`, configuring the screen below with `payload`.
    pub fn pop_with(&self, payload: P) -> Result<(), NavError> {
        self.submit(Request::Pop {
            payload: Some(payload),
        })
    }

    /// Replace the top screen with `name`, keeping the stack depth.
    pub fn to_menu(&self, name: &'static str) -> Result<(), NavError> {
        self.submit(Request::ToMenu { name, payload: None })
    }

    pub fn to_menu_with(&self, name: &'static str, payload: P) -> Result<(), NavError> {
        self.submit(Request::ToMenu {
            name,
            payload: Some(payload),
        })
    }

    /// Remove the top screen, then push `name`.
    pub fn pop_to_menu(&self, name: &'static str) -> Result<(), NavError> {
        self.submit(Request::PopToMenu { name, payload: None })
    }

    pub fn pop_to_menu_with(&self, name: &'static str, payload: P) -> Result<(), NavError> {
        self.submit(Request::PopToMenu {
            name,
            payload: Some(payload),
        })
    }

    /// Unwind to the root screen.
    pub fn to_start(&self) -> Result<(), NavError> {
        self.submit(Request::ToStart)
    }

    /// Stop every screen and timer and end the navigator.
    pub fn shutdown(&self) -> Result<(), NavError> {
        self.submit(Request::Shutdown)
    }

    /// Stop every screen and quit the application with `reason`.
    pub fn quit(&self, reason: QuitReason) -> Result<(), NavError> {
        self.submit(Request::Quit(reason))
    }

    pub fn mask(&self) {
        if !self.masked.swap(true, Ordering::AcqRel) {
            debug!("navigation masked");
        }
    }

    pub fn unmask(&self) {
        if self.masked.swap(false, Ordering::AcqRel) {
            debug!("navigation unmasked");
        }
    }

    pub fn is_masked(&self) -> bool {
        self.masked.load(Ordering::Acquire)
    }

    /// `true` once the navigator has quit or shut down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Latest published stack state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.lock(|s| s.borrow().clone())
    }

    fn submit(&self, request: Request<P>) -> Result<(), NavError> {
        if self.is_closed() {
            warn!("navigation request after shutdown ignored");
            return Err(NavError::Closed);
        }
        if request.is_maskable() && self.is_masked() {
            warn!("navigation masked, request ignored");
            return Err(NavError::Masked);
        }
        self.requests.try_send(request).map_err(|_| {
            error!("navigation queue full, request dropped");
            NavError::QueueFull
        })
    }

    /// Take the oldest queued request without running a navigator.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> Option<Request<P>> {
        self.requests.try_receive().ok()
    }

    fn publish(&self, snapshot: Snapshot) {
        self.snapshot.lock(|s| *s.borrow_mut() = snapshot);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.requests.clear();
    }
}

impl<P> Default for NavLink<P> {
    fn default() -> Self {
        Self::new()
    }
}
