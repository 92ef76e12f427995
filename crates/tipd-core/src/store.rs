use crate::bus::{Subscription, SubscriptionBus};
use crate::config::TimingConfig;
use crate::machine::{self, Effect, MachineEvent, MachineState, Mode, Trigger};
use crate::timer::DelayTimer;
use std::time::Instant;
use tracing::debug;

/// The single state slot shared by every tooltip of one interface.
///
/// Construct one per running interface and hand it by reference to each
/// trigger. State changes only through [`TooltipStore::send`].
pub struct TooltipStore {
    state: MachineState,
    rest_timer: DelayTimer,
    leaving_timer: DelayTimer,
    bus: SubscriptionBus,
    enabled: bool,
}

impl TooltipStore {
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            state: MachineState::idle(),
            rest_timer: DelayTimer::new(timing.rest_delay()),
            leaving_timer: DelayTimer::new(timing.leave_delay()),
            bus: SubscriptionBus::new(),
            enabled: true,
        }
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    /// While disabled, triggers stop starting new sessions. A session in
    /// flight still runs to completion.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&MachineState) + Send + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.len()
    }

    pub fn send(&mut self, event: MachineEvent) -> bool {
        self.send_at(event, Instant::now())
    }

    /// Apply `event` as of `now`. Returns false (and notifies nobody) when the
    /// current mode has no transition for the event's trigger.
    pub fn send_at(&mut self, event: MachineEvent, now: Instant) -> bool {
        let Some(step) = machine::transition(&self.state, &event) else {
            return false;
        };

        debug!(
            from = ?self.state.mode,
            to = ?step.mode,
            trigger = ?event.trigger,
            id = ?step.context.active_id,
            "tooltip transition"
        );

        for effect in &step.effects {
            self.run_effect(*effect, now);
        }

        self.state = MachineState {
            mode: step.mode,
            context: step.context,
        };
        self.bus.notify(&self.state);
        true
    }

    fn run_effect(&mut self, effect: Effect, now: Instant) {
        match effect {
            Effect::StartRestTimer => self.rest_timer.start(now),
            Effect::CancelRestTimer => self.rest_timer.cancel(),
            Effect::StartLeavingTimer => self.leaving_timer.start(now),
            Effect::CancelLeavingTimer => self.leaving_timer.cancel(),
        }
    }

    /// Earliest instant at which [`check_timers`](Self::check_timers) has work,
    /// or `None` when no timer is pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.rest_timer.deadline(), self.leaving_timer.deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fire every timer due at `now`. Returns true if any transition was taken.
    pub fn check_timers(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.rest_timer.fire_if_due(now) {
            debug!("rest delay elapsed");
            changed |= self.send_at(MachineEvent::new(Trigger::Rest), now);
        }
        if self.leaving_timer.fire_if_due(now) {
            debug!("leave delay elapsed");
            changed |= self.send_at(MachineEvent::new(Trigger::TimeComplete), now);
        }
        changed
    }
}

impl Default for TooltipStore {
    fn default() -> Self {
        Self::new(&TimingConfig::default())
    }
}
