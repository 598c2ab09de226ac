//! Modem event routing.
//!
//! Call events arrive asynchronously from the modem driver. Each one is
//! turned into a navigation request plus an idle-timer action: an incoming
//! call must keep the display lit and take over the screen whatever the
//! user was doing.
//!
//! The ring screen goes on top of whatever is showing, the call screen
//! replaces it once the call is up, and the end of the call unwinds to the
//! root. A ring screen masks navigation, so the end of a call releases the
//! mask before unwinding.

use crate::config::{MODEM_QUEUE_DEPTH, SCREEN_CALL, SCREEN_RING};
use crate::device::ModemEvent;
use crate::error::NavError;
use crate::nav::NavLink;
use crate::power::TimerAction;
use crate::timer::IdleTimers;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;

/// Navigation side of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NavAction {
    None,
    Push(&'static str),
    ToMenu(&'static str),
    /// Lift any mask and unwind to the root screen.
    ToStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Route {
    pub nav: NavAction,
    pub timers: TimerAction,
}

/// Decide what a modem event does to navigation and the idle timers.
pub const fn route(event: ModemEvent) -> Route {
    match event {
        ModemEvent::Ringing => Route {
            nav: NavAction::Push(SCREEN_RING),
            timers: TimerAction::Stop,
        },
        ModemEvent::CallStarted => Route {
            nav: NavAction::ToMenu(SCREEN_CALL),
            timers: TimerAction::Restart,
        },
        ModemEvent::CallEnded => Route {
            nav: NavAction::ToStart,
            timers: TimerAction::Restart,
        },
        ModemEvent::CallError => Route {
            nav: NavAction::None,
            timers: TimerAction::Restart,
        },
    }
}

/// Apply `route` for `event`. Timers are updated even when navigation is
/// refused.
pub fn dispatch<P>(
    event: ModemEvent,
    nav: &NavLink<P>,
    idle: &IdleTimers<'_>,
) -> Result<(), NavError> {
    let route = route(event);
    route.timers.apply(idle);

    match route.nav {
        NavAction::None => {
            warn!("Modem: call error reported");
            Ok(())
        }
        NavAction::Push(name) => nav.push(name),
        NavAction::ToMenu(name) => nav.to_menu(name),
        NavAction::ToStart => {
            nav.unmask();
            nav.to_start()
        }
    }
}

/// Route every modem event, forever.
pub async fn route_modem_events<P>(
    events: Receiver<'_, CriticalSectionRawMutex, ModemEvent, MODEM_QUEUE_DEPTH>,
    nav: &NavLink<P>,
    idle: IdleTimers<'_>,
) -> ! {
    loop {
        let event = events.receive().await;
        debug!("Modem: {:?}", event);
        if let Err(e) = dispatch(event, nav, &idle) {
            warn!("Modem: {:?} not routed: {:?}", event, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::Request;
    use crate::timer::ResettableTimer;
    use embassy_time::Duration;

    fn timers() -> (ResettableTimer, ResettableTimer) {
        (
            ResettableTimer::new(Duration::from_secs(10), false),
            ResettableTimer::new(Duration::from_secs(5), false),
        )
    }

    #[test]
    fn ringing_takes_over_screen_and_holds_display() {
        assert_eq!(
            route(ModemEvent::Ringing),
            Route {
                nav: NavAction::Push(SCREEN_RING),
                timers: TimerAction::Stop,
            }
        );
    }

    #[test]
    fn call_lifecycle_routes() {
        assert_eq!(route(ModemEvent::CallStarted).nav, NavAction::ToMenu(SCREEN_CALL));
        assert_eq!(route(ModemEvent::CallEnded).nav, NavAction::ToStart);
        assert_eq!(route(ModemEvent::CallError).nav, NavAction::None);
        assert_eq!(route(ModemEvent::CallEnded).timers, TimerAction::Restart);
        assert_eq!(route(ModemEvent::CallError).timers, TimerAction::Restart);
    }

    #[test]
    fn dispatch_queues_navigation_and_touches_timers() {
        let (display, keylight) = timers();
        let idle = IdleTimers::new(&display, &keylight);
        let link = NavLink::<()>::new();

        dispatch(ModemEvent::Ringing, &link, &idle).unwrap();
        assert!(display.is_stopped() && keylight.is_stopped());
        assert_eq!(
            link.pending(),
            Some(Request::Push {
                name: SCREEN_RING,
                payload: None
            })
        );

        dispatch(ModemEvent::CallEnded, &link, &idle).unwrap();
        assert!(!display.is_stopped());
        assert_eq!(link.pending(), Some(Request::ToStart));
    }

    #[test]
    fn call_error_navigates_nowhere() {
        let (display, keylight) = timers();
        let idle = IdleTimers::new(&display, &keylight);
        let link = NavLink::<()>::new();

        idle.stop_all();
        dispatch(ModemEvent::CallError, &link, &idle).unwrap();
        assert!(!display.is_stopped());
        assert_eq!(link.pending(), None);
    }

    #[test]
    fn masked_navigation_still_updates_timers() {
        let (display, keylight) = timers();
        let idle = IdleTimers::new(&display, &keylight);
        let link = NavLink::<()>::new();

        link.mask();
        assert_eq!(
            dispatch(ModemEvent::Ringing, &link, &idle),
            Err(NavError::Masked)
        );
        assert!(display.is_stopped());
        assert_eq!(link.pending(), None);
    }

    #[test]
    fn call_end_releases_ring_mask() {
        let (display, keylight) = timers();
        let idle = IdleTimers::new(&display, &keylight);
        let link = NavLink::<()>::new();

        link.mask();
        dispatch(ModemEvent::CallEnded, &link, &idle).unwrap();
        assert!(!link.is_masked());
        assert_eq!(link.pending(), Some(Request::ToStart));
    }
}
