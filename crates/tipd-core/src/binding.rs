//! Per-trigger input binding.
//!
//! A [`TooltipTrigger`] turns raw host input on one trigger element into
//! machine events, guarding dismiss-class events so one instance cannot end
//! another's session, and keeps a [`TriggerView`] projected from the shared
//! state.

use crate::bus::{lock, Subscription};
use crate::config::InputConfig;
use crate::ids::TooltipId;
use crate::machine::{MachineEvent, MachineState, Mode, Trigger};
use crate::store::TooltipStore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    Mouse,
    Pen,
    Touch,
}

/// Which host event family delivered a hover input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", content = "pointer_type", rename_all = "snake_case")]
pub enum InputSource {
    Pointer(PointerKind),
    Mouse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoverAction {
    Enter,
    Move,
    Leave,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Enter,
    Space,
    Escape,
    Other,
}

impl Key {
    /// Map a DOM-style `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Enter" => Key::Enter,
            " " | "Spacebar" => Key::Space,
            "Escape" | "Esc" => Key::Escape,
            _ => Key::Other,
        }
    }
}

/// Raw input delivered on the trigger element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerInput {
    Hover {
        source: InputSource,
        action: HoverAction,
    },
    Focus,
    Blur,
    KeyDown {
        key: Key,
    },
}

/// Raw input delivered at document level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentEvent {
    KeyDown {
        key: Key,
    },
    /// `over` is the trigger under the pointer, if any.
    MouseMove {
        #[serde(default)]
        over: Option<TooltipId>,
    },
}

#[derive(Debug, Clone)]
pub struct TriggerOptions {
    pub id: TooltipId,
    /// The trigger is a disabled control.
    pub disabled: bool,
    pub capabilities: InputConfig,
}

impl TriggerOptions {
    pub fn new(id: TooltipId) -> Self {
        Self {
            id,
            disabled: false,
            capabilities: InputConfig::default(),
        }
    }
}

/// Per-instance projection of the shared state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerView {
    pub visible: bool,
    /// Document Escape dismisses this instance's tooltip.
    pub escape_armed: bool,
    /// Document mouse moves stand in for the missing pointer-leave.
    pub global_move_armed: bool,
}

/// True while `id` owns the slot and its tooltip is shown or leaving.
pub fn is_visible(state: &MachineState, id: &TooltipId) -> bool {
    state.is_active(id) && matches!(state.mode, Mode::Visible | Mode::LeavingVisible)
}

/// Visibility used to seed a freshly mounted instance. Ignores a
/// LeavingVisible left over from an earlier holder of the same id.
pub fn is_initially_visible(state: &MachineState, id: &TooltipId) -> bool {
    state.is_active(id) && state.mode == Mode::Visible
}

fn project(state: &MachineState, visible: bool, disabled: bool, capabilities: &InputConfig) -> TriggerView {
    TriggerView {
        visible,
        escape_armed: visible && state.mode == Mode::Visible,
        global_move_armed: visible && disabled && capabilities.disabled_trigger_workaround,
    }
}

pub struct TooltipTrigger {
    id: TooltipId,
    disabled: bool,
    capabilities: InputConfig,
    view: Arc<Mutex<TriggerView>>,
    _subscription: Subscription,
}

impl TooltipTrigger {
    pub fn mount(store: &TooltipStore, options: TriggerOptions) -> Self {
        Self::mount_with(store, options, |_, _| {})
    }

    /// Mount and call `on_change` whenever this instance's view changes.
    pub fn mount_with<F>(store: &TooltipStore, options: TriggerOptions, mut on_change: F) -> Self
    where
        F: FnMut(&TooltipId, TriggerView) + Send + 'static,
    {
        let TriggerOptions {
            id,
            disabled,
            capabilities,
        } = options;

        let initial = project(
            store.state(),
            is_initially_visible(store.state(), &id),
            disabled,
            &capabilities,
        );
        let view = Arc::new(Mutex::new(initial));

        let sub_view = Arc::clone(&view);
        let sub_id = id.clone();
        let subscription = store.subscribe(move |state| {
            let next = project(state, is_visible(state, &sub_id), disabled, &capabilities);
            let changed = {
                let mut current = lock(&sub_view);
                let changed = *current != next;
                *current = next;
                changed
            };
            if changed {
                on_change(&sub_id, next);
            }
        });

        debug!(id = %id, disabled, "trigger mounted");
        Self {
            id,
            disabled,
            capabilities,
            view,
            _subscription: subscription,
        }
    }

    pub fn id(&self) -> &TooltipId {
        &self.id
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn view(&self) -> TriggerView {
        *lock(&self.view)
    }

    pub fn is_visible(&self) -> bool {
        self.view().visible
    }

    /// Unregisters the subscriber, which also disarms the document listeners.
    pub fn unmount(self) {
        debug!(id = %self.id, "trigger unmounted");
    }

    fn accepts(&self, source: InputSource) -> bool {
        match source {
            InputSource::Pointer(kind) => self.capabilities.pointer_events && kind == PointerKind::Mouse,
            InputSource::Mouse => !self.capabilities.pointer_events,
        }
    }

    /// Machine event for `input` on this trigger, or `None` if it must not
    /// reach the store.
    pub fn translate(&self, state: &MachineState, enabled: bool, input: TriggerInput) -> Option<MachineEvent> {
        let own = |trigger| MachineEvent::with_id(trigger, self.id.clone());
        let is_active = state.is_active(&self.id);

        match input {
            TriggerInput::Hover { source, .. } if !self.accepts(source) => None,
            TriggerInput::Hover { action, .. } => match action {
                HoverAction::Enter if enabled => Some(own(Trigger::MouseEnter)),
                HoverAction::Enter => None,
                HoverAction::Move => Some(own(Trigger::MouseMove)),
                HoverAction::Leave => Some(MachineEvent::new(Trigger::MouseLeave)),
                HoverAction::Down if is_active => Some(MachineEvent::new(Trigger::MouseDown)),
                HoverAction::Down => None,
            },
            TriggerInput::Focus if enabled => Some(own(Trigger::Focus)),
            TriggerInput::Focus => None,
            TriggerInput::Blur if is_active => Some(MachineEvent::new(Trigger::Blur)),
            TriggerInput::Blur => None,
            TriggerInput::KeyDown {
                key: Key::Enter | Key::Space,
            } => Some(MachineEvent::new(Trigger::SelectWithKeyboard)),
            TriggerInput::KeyDown { .. } => None,
        }
    }

    /// Feed input from the trigger element. Returns true if the store changed.
    pub fn handle_input(&self, store: &mut TooltipStore, input: TriggerInput, now: Instant) -> bool {
        match self.translate(store.state(), store.is_enabled(), input) {
            Some(event) => store.send_at(event, now),
            None => false,
        }
    }

    /// Feed a document-level event. Only acts while the matching listener is
    /// armed for this instance.
    pub fn handle_document(&self, store: &mut TooltipStore, event: &DocumentEvent, now: Instant) -> bool {
        let view = self.view();
        match event {
            DocumentEvent::KeyDown { key: Key::Escape } if view.escape_armed => {
                store.send_at(MachineEvent::new(Trigger::SelectWithKeyboard), now)
            }
            DocumentEvent::MouseMove { over } if view.global_move_armed => {
                let over_visible_trigger = over
                    .as_ref()
                    .is_some_and(|target| is_visible(store.state(), target));
                if over_visible_trigger {
                    return false;
                }
                store.send_at(MachineEvent::new(Trigger::GlobalMouseMove), now)
            }
            _ => false,
        }
    }
}

/// Offer a document-level event to every mounted trigger in turn.
pub fn dispatch_document<'a, I>(triggers: I, store: &mut TooltipStore, event: &DocumentEvent, now: Instant) -> bool
where
    I: IntoIterator<Item = &'a TooltipTrigger>,
{
    let mut changed = false;
    for trigger in triggers {
        changed |= trigger.handle_document(store, event, now);
    }
    changed
}
