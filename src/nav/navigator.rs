//! The navigator task: owns the screens, applies queued requests and drives
//! the current screen.

use super::{Exit, NavLink, NavTiming, Request, Snapshot};
use crate::config::{MAX_SCREENS, MAX_STACK_DEPTH, MAX_TIMERS};
use crate::device::{QuitReason, Supervisor};
use crate::error::{NavError, ScreenError};
use crate::screen::{Phase, Screen};
use crate::timer::ResettableTimer;
use core::pin::pin;
use embassy_futures::select::{select, Either};
use embassy_time::{with_timeout, Timer};
use heapless::Vec;

/// Handle of a registered screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScreenId(u8);

impl ScreenId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

struct Slot<S> {
    screen: S,
    phase: Phase,
    /// Error from the last `configure`, raised when the screen is run.
    fault: Option<ScreenError>,
}

/// How an activation ended.
enum Activation<P> {
    /// `run` returned `Ok`; the screen stays current but idle.
    Finished,
    Crashed(ScreenError),
    /// A request arrived and the activity was dropped.
    Request(Request<P>),
}

/// Screen registry, navigation stack and the task that runs them.
pub struct Navigator<'a, S: Screen> {
    link: &'a NavLink<S::Payload>,
    names: Vec<&'static str, MAX_SCREENS>,
    slots: Vec<Slot<S>, MAX_SCREENS>,
    stack: Vec<ScreenId, MAX_STACK_DEPTH>,
    current: Option<ScreenId>,
    /// The current screen is not to be (re)started until the next request.
    parked: bool,
    timers: Vec<&'a ResettableTimer, MAX_TIMERS>,
    timing: NavTiming,
}

impl<'a, S: Screen> Navigator<'a, S> {
    pub fn new(link: &'a NavLink<S::Payload>) -> Self {
        Self {
            link,
            names: Vec::new(),
            slots: Vec::new(),
            stack: Vec::new(),
            current: None,
            parked: false,
            timers: Vec::new(),
            timing: NavTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: NavTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Bind `name` to `screen`. Registering a name again replaces the
    /// screen.
    pub fn register(&mut self, name: &'static str, screen: S) -> Result<ScreenId, NavError> {
        let slot = Slot {
            screen,
            phase: Phase::Unconfigured,
            fault: None,
        };

        if let Some(id) = self.lookup(name) {
            warn!("screen {} registered twice, replacing", name);
            self.slots[id.index()] = slot;
            return Ok(id);
        }

        self.slots.push(slot).map_err(|_| NavError::RegistryFull)?;
        let _ = self.names.push(name);
        Ok(ScreenId((self.slots.len() - 1) as u8))
    }

    /// Timer to stop when the navigator shuts down.
    pub fn add_timer(&mut self, timer: &'a ResettableTimer) -> Result<(), NavError> {
        self.timers.push(timer).map_err(|_| NavError::RegistryFull)
    }

    pub fn lookup(&self, name: &str) -> Option<ScreenId> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| ScreenId(i as u8))
    }

    pub fn name(&self, id: ScreenId) -> &'static str {
        self.names[id.index()]
    }

    pub fn phase(&self, id: ScreenId) -> Phase {
        self.slots[id.index()].phase
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Apply requests and drive screens until the application quits or
    /// shuts down.
    pub async fn run(&mut self, ctx: &S::Context) -> Exit
    where
        S::Context: Supervisor,
    {
        info!("navigator started with {} screens", self.slots.len());
        self.publish();

        loop {
            let request = match self.current.filter(|_| !self.parked) {
                Some(id) => match self.activate(id, ctx).await {
                    Activation::Request(request) => request,
                    Activation::Finished => {
                        self.parked = true;
                        continue;
                    }
                    Activation::Crashed(error) => {
                        self.recover(id, error, ctx).await;
                        self.publish();
                        continue;
                    }
                },
                None => self.link.requests.receive().await,
            };

            let exit = self.apply(request, ctx).await;
            self.publish();
            if let Some(exit) = exit {
                self.link.close();
                info!("navigator finished: {:?}", exit);
                return exit;
            }
        }
    }

    /// Run screen `id` until it finishes, fails, or a request arrives that
    /// changes something.
    async fn activate(&mut self, id: ScreenId, ctx: &S::Context) -> Activation<S::Payload> {
        {
            let slot = &mut self.slots[id.index()];
            if let Some(error) = slot.fault.take() {
                return Activation::Crashed(error);
            }
            if !slot.phase.can_run() {
                return Activation::Crashed(ScreenError::NotConfigured);
            }
            slot.phase = Phase::Running;
        }
        self.publish();
        debug!("running {}", self.names[id.index()]);

        let link = self.link;
        let names = &self.names;
        let stack_full = self.stack.is_full();
        let mut activity = pin!(self.slots[id.index()].screen.run(ctx));

        loop {
            match select(activity.as_mut(), link.requests.receive()).await {
                Either::First(Ok(())) => {
                    debug!("{} finished", names[id.index()]);
                    return Activation::Finished;
                }
                Either::First(Err(error)) => return Activation::Crashed(error),
                Either::Second(request) => {
                    if let Some(name) = request.target() {
                        if !names.contains(&name) {
                            error!("unknown screen {}, request ignored", name);
                            continue;
                        }
                    }
                    if let (true, Request::Push { name, .. }) = (stack_full, &request) {
                        error!("navigation stack full, push {} ignored", name);
                        continue;
                    }
                    return Activation::Request(request);
                }
            }
        }
    }

    async fn apply(&mut self, request: Request<S::Payload>, ctx: &S::Context) -> Option<Exit>
    where
        S::Context: Supervisor,
    {
        match request {
            Request::Push { name, payload } => self.push(name, payload, ctx).await,
            Request::Pop { payload } => return self.pop(payload, ctx).await,
            Request::ToMenu { name, payload } => self.to_menu(name, payload, ctx).await,
            Request::PopToMenu { name, payload } => self.pop_to_menu(name, payload, ctx).await,
            Request::ToStart => self.to_start(ctx).await,
            Request::Quit(reason) => {
                info!("quit requested: {:?}", reason);
                self.teardown(ctx).await;
                ctx.quit(reason);
                return Some(Exit::Quit(reason));
            }
            Request::Shutdown => {
                info!("shutting down navigation");
                self.teardown(ctx).await;
                return Some(Exit::Shutdown);
            }
        }
        None
    }

    async fn push(&mut self, name: &'static str, payload: Option<S::Payload>, ctx: &S::Context) {
        let Some(target) = self.resolve(name) else {
            return;
        };
        if self.stack.is_full() {
            error!("navigation stack full, cannot push {}", name);
            // The top may have been interrupted mid-run; leave it resumable.
            if let Some(top) = self.stack.last().copied() {
                let slot = &mut self.slots[top.index()];
                if slot.phase == Phase::Running {
                    slot.phase = Phase::Paused;
                }
            }
            return;
        }

        if let Some(top) = self.stack.last().copied() {
            self.pause_screen(top, ctx).await;
        }
        self.configure(target, payload);
        let _ = self.stack.push(target);
        self.make_current(target);
        info!("push {} (depth {})", name, self.stack.len());
    }

    async fn pop(&mut self, payload: Option<S::Payload>, ctx: &S::Context) -> Option<Exit>
    where
        S::Context: Supervisor,
    {
        let Some(top) = self.stack.last().copied() else {
            warn!("pop on empty stack ignored");
            return None;
        };
        let below = self
            .stack
            .len()
            .checked_sub(2)
            .map(|i| self.stack[i]);

        match below {
            Some(below) if below != top => {
                self.configure(below, payload);
                self.stop_screen(top, ctx).await;
            }
            // Same screen twice in a row: stopping it would undo the configure.
            Some(below) => {
                self.stop_screen(top, ctx).await;
                self.configure(below, payload);
            }
            None => {
                if payload.is_some() {
                    warn!("pop payload dropped, nothing below {}", self.name(top));
                }
                self.stop_screen(top, ctx).await;
            }
        }
        self.stack.pop();

        match self.stack.last().copied() {
            Some(next) => {
                self.make_current(next);
                info!("pop, back to {} (depth {})", self.name(next), self.stack.len());
                None
            }
            None => {
                self.current = None;
                self.link.unmask();
                error!("navigation stack emptied, requesting soft restart");
                ctx.quit(QuitReason::SoftRestart);
                Some(Exit::Quit(QuitReason::SoftRestart))
            }
        }
    }

    async fn to_menu(&mut self, name: &'static str, payload: Option<S::Payload>, ctx: &S::Context) {
        let Some(target) = self.resolve(name) else {
            return;
        };

        match self.stack.last().copied() {
            Some(top) if top != target => {
                self.configure(target, payload);
                self.stop_screen(top, ctx).await;
                self.stack.pop();
            }
            Some(top) => {
                self.stop_screen(top, ctx).await;
                self.configure(target, payload);
                self.stack.pop();
            }
            None => self.configure(target, payload),
        }

        let _ = self.stack.push(target);
        self.make_current(target);
        info!("menu {} (depth {})", name, self.stack.len());
    }

    async fn pop_to_menu(
        &mut self,
        name: &'static str,
        payload: Option<S::Payload>,
        ctx: &S::Context,
    ) {
        let Some(target) = self.resolve(name) else {
            return;
        };

        if let Some(top) = self.stack.pop() {
            self.stop_screen(top, ctx).await;
        }
        self.configure(target, payload);
        let _ = self.stack.push(target);
        self.make_current(target);
        info!("pop to menu {} (depth {})", name, self.stack.len());
    }

    async fn to_start(&mut self, ctx: &S::Context) {
        let Some(root) = self.stack.first().copied() else {
            warn!("to_start on empty stack ignored");
            return;
        };

        self.configure(root, None);
        while self.stack.len() > 1 {
            if let Some(top) = self.stack.pop() {
                if top != root {
                    self.stop_screen(top, ctx).await;
                }
            }
        }
        self.make_current(root);
        info!("back to start ({})", self.name(root));
    }

    /// Show the crash alert, then unwind to the root screen.
    async fn recover(&mut self, id: ScreenId, error: ScreenError, ctx: &S::Context)
    where
        S::Context: Supervisor,
    {
        error!("screen {} crashed: {:?}", self.name(id), error);
        self.slots[id.index()].phase = Phase::Stopped;
        self.parked = true;
        self.publish();

        ctx.show_crash(error).await;
        Timer::after(self.timing.crash_alert).await;

        if self.link.is_masked() {
            warn!("navigation masked, staying on crashed screen");
            return;
        }
        self.to_start(ctx).await;
    }

    /// Stop every stacked screen and every timer.
    async fn teardown(&mut self, ctx: &S::Context) {
        while let Some(id) = self.stack.pop() {
            if !self.stack.contains(&id) {
                self.stop_screen(id, ctx).await;
            }
        }
        self.current = None;
        for timer in &self.timers {
            timer.stop();
        }
    }

    fn configure(&mut self, id: ScreenId, payload: Option<S::Payload>) {
        let slot = &mut self.slots[id.index()];
        let result = match payload {
            Some(payload) => slot.screen.configure_with(payload),
            None => slot.screen.configure(),
        };

        match result {
            Ok(()) => {
                slot.phase = Phase::Configured;
                slot.fault = None;
            }
            Err(error) => {
                error!("configuring {} failed: {:?}", self.names[id.index()], error);
                slot.phase = Phase::Unconfigured;
                slot.fault = Some(error);
            }
        }
    }

    async fn pause_screen(&mut self, id: ScreenId, ctx: &S::Context) {
        let name = self.names[id.index()];
        let budget = self.timing.stop_timeout;
        let slot = &mut self.slots[id.index()];
        if !matches!(slot.phase, Phase::Running | Phase::Configured) {
            return;
        }

        if with_timeout(budget, slot.screen.pause(ctx)).await.is_err() {
            warn!("{} did not pause within {} ms, moving on", name, budget.as_millis());
        }
        slot.phase = Phase::Paused;
    }

    async fn stop_screen(&mut self, id: ScreenId, ctx: &S::Context) {
        let name = self.names[id.index()];
        let budget = self.timing.stop_timeout;
        let slot = &mut self.slots[id.index()];

        if with_timeout(budget, slot.screen.stop(ctx)).await.is_err() {
            warn!("{} did not stop within {} ms, moving on", name, budget.as_millis());
        }
        slot.phase = Phase::Stopped;
        slot.fault = None;
    }

    fn resolve(&self, name: &'static str) -> Option<ScreenId> {
        let id = self.lookup(name);
        if id.is_none() {
            error!("unknown screen {}, request ignored", name);
        }
        id
    }

    fn make_current(&mut self, id: ScreenId) {
        self.current = Some(id);
        self.parked = false;
    }

    fn publish(&self) {
        let mut snapshot = Snapshot::new();
        for id in &self.stack {
            let _ = snapshot.stack.push(self.names[id.index()]);
        }
        snapshot.current = self.current.map(|id| self.names[id.index()]);
        for (name, slot) in self.names.iter().zip(&self.slots) {
            let _ = snapshot.phases.push((*name, slot.phase));
        }
        self.link.publish(snapshot);
    }
}
