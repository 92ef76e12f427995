use crate::ids::TooltipId;
use serde::{Deserialize, Serialize};

/// Visibility machine modes. One mode is shared by every tooltip instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Nothing shown, nobody attentive.
    Idle,
    /// Pointer is resting on a trigger; waiting for the rest delay.
    Focused,
    /// Tooltip shown.
    Visible,
    /// Pointer or focus left a shown tooltip; hiding after the leave delay
    /// unless rescued.
    LeavingVisible,
    /// Shown tooltip dismissed by click or keyboard; stays hidden until the
    /// user leaves the trigger.
    Dismissed,
}

/// Named input signals understood by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    MouseEnter,
    Focus,
    MouseMove,
    MouseLeave,
    MouseDown,
    Blur,
    Rest,
    TimeComplete,
    SelectWithKeyboard,
    GlobalMouseMove,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Instance currently owning attention.
    pub active_id: Option<TooltipId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineState {
    pub mode: Mode,
    pub context: Context,
}

impl MachineState {
    pub fn idle() -> Self {
        Self {
            mode: Mode::Idle,
            context: Context::default(),
        }
    }

    pub fn is_active(&self, id: &TooltipId) -> bool {
        self.context.active_id.as_ref() == Some(id)
    }
}

impl Default for MachineState {
    fn default() -> Self {
        Self::idle()
    }
}

/// A trigger plus its payload. The payload id, when present, is merged into
/// the context on transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineEvent {
    pub trigger: Trigger,
    pub id: Option<TooltipId>,
}

impl MachineEvent {
    pub fn new(trigger: Trigger) -> Self {
        Self { trigger, id: None }
    }

    pub fn with_id(trigger: Trigger, id: TooltipId) -> Self {
        Self {
            trigger,
            id: Some(id),
        }
    }
}

/// Timer side effects requested by a transition, interpreted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    StartRestTimer,
    CancelRestTimer,
    StartLeavingTimer,
    CancelLeavingTimer,
}

/// Outcome of a taken transition: the state to commit and the effects to run
/// first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub mode: Mode,
    pub context: Context,
    pub effects: Vec<Effect>,
}

/// Target mode for `trigger` while in `mode`, or `None` when the pair is
/// unmapped.
pub fn target(mode: Mode, trigger: Trigger) -> Option<Mode> {
    use Mode::*;
    use Trigger::*;

    match (mode, trigger) {
        (Idle, MouseEnter) => Some(Focused),
        (Idle, Focus) => Some(Visible),
        (Idle, _) => None,

        (Focused, MouseMove) => Some(Focused),
        (Focused, MouseLeave) => Some(Idle),
        (Focused, MouseDown) => Some(Dismissed),
        (Focused, Blur) => Some(Idle),
        (Focused, Rest) => Some(Visible),
        (Focused, _) => None,

        (Visible, MouseEnter) => Some(Focused),
        (Visible, Focus) => Some(Focused),
        (Visible, MouseLeave) => Some(LeavingVisible),
        (Visible, MouseDown) => Some(Dismissed),
        (Visible, Blur) => Some(LeavingVisible),
        (Visible, SelectWithKeyboard) => Some(Dismissed),
        (Visible, GlobalMouseMove) => Some(LeavingVisible),
        (Visible, _) => None,

        (LeavingVisible, MouseEnter) => Some(Visible),
        (LeavingVisible, Focus) => Some(Visible),
        (LeavingVisible, TimeComplete) => Some(Idle),
        (LeavingVisible, _) => None,

        (Dismissed, MouseLeave) => Some(Idle),
        (Dismissed, Blur) => Some(Idle),
        (Dismissed, _) => None,
    }
}

struct Hooks {
    effects: &'static [Effect],
    clears_id: bool,
}

const NO_HOOKS: Hooks = Hooks {
    effects: &[],
    clears_id: false,
};

fn on_leave(mode: Mode) -> Hooks {
    match mode {
        Mode::Focused => Hooks {
            effects: &[Effect::CancelRestTimer],
            clears_id: false,
        },
        Mode::LeavingVisible => Hooks {
            effects: &[Effect::CancelLeavingTimer],
            clears_id: true,
        },
        Mode::Dismissed => Hooks {
            effects: &[],
            clears_id: true,
        },
        Mode::Idle | Mode::Visible => NO_HOOKS,
    }
}

fn on_enter(mode: Mode) -> Hooks {
    match mode {
        Mode::Idle => Hooks {
            effects: &[],
            clears_id: true,
        },
        Mode::Focused => Hooks {
            effects: &[Effect::StartRestTimer],
            clears_id: false,
        },
        Mode::LeavingVisible => Hooks {
            effects: &[Effect::StartLeavingTimer],
            clears_id: false,
        },
        Mode::Visible | Mode::Dismissed => NO_HOOKS,
    }
}

/// Compute the transition for `event` without touching any state.
///
/// Order: leave hooks see the old context, then the payload is merged, then
/// the target's enter hooks run. A leave-clear happens before the merge so a
/// payload id can claim the slot in the same step; an enter-clear applies to
/// the committed context.
pub fn transition(state: &MachineState, event: &MachineEvent) -> Option<Step> {
    let next = target(state.mode, event.trigger)?;

    let mut effects = Vec::new();
    let mut context = state.context.clone();

    let leave = on_leave(state.mode);
    effects.extend_from_slice(leave.effects);
    if leave.clears_id {
        context.active_id = None;
    }

    if let Some(id) = &event.id {
        context.active_id = Some(id.clone());
    }

    let enter = on_enter(next);
    effects.extend_from_slice(enter.effects);
    if enter.clears_id {
        context.active_id = None;
    }

    Some(Step {
        mode: next,
        context,
        effects,
    })
}
