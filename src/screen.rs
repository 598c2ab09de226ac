//! Screen lifecycle contract.
//!
//! A screen is one interactive view (home, dialer, settings, an alert...).
//! The navigator owns every screen and drives it through this lifecycle:
//!
//! ```text
//!  Unconfigured ──configure──▶ Configured ──run──▶ Running
//!                                  ▲   ▲              │ │
//!                                  │   └────run─── Paused◀┘ pause
//!                                  │                  │
//!                                  └──configure── Stopped ◀── stop
//! ```
//!
//! `run` is the screen's activity. It is driven inside the navigator's
//! future, so pausing or stopping a screen first drops its `run` future -
//! every input loop, animation or modem wait nested inside it is cancelled
//! at the same time - and then calls `pause` / `stop` for cleanup.

use crate::error::ScreenError;

/// Lifecycle phase of a registered screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Registered, never configured (or the last configure failed).
    #[default]
    Unconfigured,
    /// Fresh state prepared, not yet running.
    Configured,
    /// Activity in progress.
    Running,
    /// Activity suspended, state kept.
    Paused,
    /// Activity suspended, state discarded.
    Stopped,
}

impl Phase {
    /// `run` is only legal from these phases.
    pub const fn can_run(self) -> bool {
        matches!(self, Phase::Configured | Phase::Paused)
    }

    pub const fn is_running(self) -> bool {
        matches!(self, Phase::Running)
    }
}

/// A navigable screen.
///
/// `Payload` is the typed argument other screens may pass when navigating
/// here (a picked contact, a dialled number...). `Context` is the
/// dependency bundle handed to every call; see [`crate::context::Context`].
#[allow(async_fn_in_trait)]
pub trait Screen {
    type Payload;
    type Context;

    /// Prepare fresh per-activation state. Called before every activation
    /// that is not a resume.
    fn configure(&mut self) -> Result<(), ScreenError>;

    /// Like `configure`, with an argument from the navigating screen.
    ///
    /// Screens that take no arguments keep the default, which rejects any
    /// payload.
    fn configure_with(&mut self, payload: Self::Payload) -> Result<(), ScreenError> {
        let _ = payload;
        Err(ScreenError::UnexpectedPayload)
    }

    /// The screen's activity. Returning `Ok` ends the activity but leaves
    /// the screen current; returning `Err` sends the navigator through
    /// crash recovery.
    async fn run(&mut self, ctx: &Self::Context) -> Result<(), ScreenError>;

    /// Suspend, keeping state for a later `run`.
    async fn pause(&mut self, ctx: &Self::Context) {
        let _ = ctx;
    }

    /// Suspend and discard state.
    async fn stop(&mut self, ctx: &Self::Context);
}
