use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tipd_core::binding::{self, TooltipTrigger, TriggerOptions};
use tipd_core::bus::Subscription;
use tipd_core::config::Config;
use tipd_core::ids::{IdGenerator, TooltipId};
use tipd_core::ipc::{self, ClientMsg, DaemonMsg};
use tipd_core::machine::{MachineEvent, Trigger};
use tipd_core::placement::{self, PopupStyle};
use tipd_core::store::TooltipStore;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Line sink for one connected client.
pub type Outbox = mpsc::UnboundedSender<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

struct Instance {
    trigger: TooltipTrigger,
    owner: ClientId,
}

/// Everything the daemon serializes behind one lock: the store for this
/// interface and the triggers mounted on it.
pub struct Host {
    config: Config,
    store: TooltipStore,
    ids: IdGenerator,
    instances: HashMap<TooltipId, Instance>,
    watchers: Arc<Mutex<Vec<Outbox>>>,
    _watch: Subscription,
}

fn send_line(outbox: &Outbox, msg: &DaemonMsg) {
    // A closed outbox means the client is going away; disconnect cleans up.
    let _ = outbox.send(ipc::encode(msg));
}

fn ack(ok: bool, message: impl Into<String>) -> DaemonMsg {
    DaemonMsg::Ack {
        ok,
        message: message.into(),
    }
}

impl Host {
    pub fn new(config: Config) -> Self {
        let mut store = TooltipStore::new(&config.timing);
        store.set_enabled(config.general.enabled);

        let watchers: Arc<Mutex<Vec<Outbox>>> = Arc::new(Mutex::new(Vec::new()));
        let sinks = Arc::clone(&watchers);
        let watch = store.subscribe(move |state| {
            let line = ipc::encode(&DaemonMsg::Transition {
                mode: state.mode,
                active_id: state.context.active_id.clone(),
            });
            sinks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|tx| tx.send(line.clone()).is_ok());
        });

        Self {
            config,
            store,
            ids: IdGenerator::new(),
            instances: HashMap::new(),
            watchers,
            _watch: watch,
        }
    }

    pub fn store(&self) -> &TooltipStore {
        &self.store
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.store.next_deadline()
    }

    pub fn check_timers(&mut self, now: Instant) -> bool {
        self.store.check_timers(now)
    }

    /// Apply one client message. Returns the direct reply, if any; visibility
    /// changes are pushed to instance owners as they happen.
    pub fn handle(&mut self, client: ClientId, outbox: &Outbox, msg: ClientMsg, now: Instant) -> Option<DaemonMsg> {
        match msg {
            ClientMsg::Mount { id, disabled } => Some(self.mount(client, outbox, id.as_deref(), disabled)),
            ClientMsg::Unmount { id } => {
                if self.owned_by(&id, client) {
                    if let Some(instance) = self.instances.remove(&id) {
                        instance.trigger.unmount();
                    }
                    info!(id = %id, "instance unmounted");
                    Some(ack(true, format!("unmounted {}", id)))
                } else {
                    Some(ack(false, format!("unknown instance '{}'", id)))
                }
            }
            ClientMsg::Input { id, input } => {
                if !self.owned_by(&id, client) {
                    return Some(ack(false, format!("unknown instance '{}'", id)));
                }
                if let Some(instance) = self.instances.get(&id) {
                    instance.trigger.handle_input(&mut self.store, input, now);
                }
                None
            }
            ClientMsg::Document { event } => {
                let triggers = self.instances.values().map(|i| &i.trigger);
                binding::dispatch_document(triggers, &mut self.store, &event, now);
                None
            }
            ClientMsg::Measure {
                id,
                trigger,
                popup,
                viewport,
            } => {
                let instance = self.instances.get(&id)?;
                if !instance.trigger.is_visible() {
                    return None;
                }
                let style = placement::popup_style(
                    trigger.as_ref(),
                    popup.as_ref(),
                    &viewport,
                    self.config.placement.offset,
                );
                Some(DaemonMsg::Placement { id, style })
            }
            ClientMsg::Dismiss => {
                let dismissed = self
                    .store
                    .send_at(MachineEvent::new(Trigger::SelectWithKeyboard), now);
                Some(ack(true, if dismissed { "dismissed" } else { "nothing to dismiss" }))
            }
            ClientMsg::Watch => {
                self.watchers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(outbox.clone());
                Some(ack(true, "watching"))
            }
            ClientMsg::Toggle => {
                let enabled = !self.store.is_enabled();
                self.store.set_enabled(enabled);
                info!(enabled, "toggled");
                Some(ack(true, format!("enabled: {}", enabled)))
            }
            ClientMsg::Enable => {
                self.store.set_enabled(true);
                Some(ack(true, "enabled"))
            }
            ClientMsg::Disable => {
                self.store.set_enabled(false);
                Some(ack(true, "disabled"))
            }
            ClientMsg::GetStatus => Some(DaemonMsg::Status {
                enabled: self.store.is_enabled(),
                mode: self.store.mode(),
                active_id: self.store.state().context.active_id.clone(),
                instances: self.instance_count(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            }),
        }
    }

    fn owned_by(&self, id: &TooltipId, client: ClientId) -> bool {
        self.instances.get(id).is_some_and(|i| i.owner == client)
    }

    fn mount(&mut self, client: ClientId, outbox: &Outbox, requested: Option<&str>, disabled: bool) -> DaemonMsg {
        let id = self.ids.resolve(requested);
        if self.instances.contains_key(&id) {
            return ack(false, format!("instance '{}' already mounted", id));
        }

        let options = TriggerOptions {
            id: id.clone(),
            disabled,
            capabilities: self.config.input,
        };

        let sink = outbox.clone();
        let mut shown = binding::is_initially_visible(self.store.state(), &id);
        let trigger = TooltipTrigger::mount_with(&self.store, options, move |id, view| {
            if view.visible == shown {
                return;
            }
            shown = view.visible;
            debug!(id = %id, visible = shown, "visibility changed");
            send_line(&sink, &DaemonMsg::Visibility {
                id: id.clone(),
                visible: shown,
            });
            if shown {
                send_line(&sink, &DaemonMsg::Placement {
                    id: id.clone(),
                    style: PopupStyle::Hidden,
                });
            }
        });

        if trigger.is_visible() {
            send_line(outbox, &DaemonMsg::Visibility {
                id: id.clone(),
                visible: true,
            });
            send_line(outbox, &DaemonMsg::Placement {
                id: id.clone(),
                style: PopupStyle::Hidden,
            });
        }

        info!(id = %id, disabled, "instance mounted");
        self.instances.insert(id.clone(), Instance { trigger, owner: client });
        DaemonMsg::Mounted { id }
    }

    /// Drop everything a disconnected client owned.
    pub fn disconnect(&mut self, client: ClientId) {
        let before = self.instances.len();
        self.instances.retain(|_, instance| instance.owner != client);
        let removed = before - self.instances.len();
        if removed > 0 {
            info!(client = client.0, removed, "client instances unmounted");
        }
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| !tx.is_closed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tipd_core::binding::{DocumentEvent, HoverAction, InputSource, Key, PointerKind, TriggerInput};
    use tipd_core::geometry::{Position, Rect, Viewport};
    use tipd_core::machine::Mode;

    const HOST: ClientId = ClientId(1);
    const OTHER: ClientId = ClientId(2);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn channel() -> (Outbox, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<DaemonMsg> {
        let mut out = Vec::new();
        while let Ok(line) = rx.try_recv() {
            out.extend(ipc::decode_daemon(&line));
        }
        out
    }

    fn mount(host: &mut Host, tx: &Outbox, id: &str) -> TooltipId {
        let msg = ClientMsg::Mount {
            id: Some(id.into()),
            disabled: false,
        };
        match host.handle(HOST, tx, msg, Instant::now()) {
            Some(DaemonMsg::Mounted { id }) => id,
            other => panic!("expected Mounted, got {:?}", other),
        }
    }

    fn hover(id: &TooltipId, action: HoverAction) -> ClientMsg {
        ClientMsg::Input {
            id: id.clone(),
            input: TriggerInput::Hover {
                source: InputSource::Pointer(PointerKind::Mouse),
                action,
            },
        }
    }

    fn visibility(msgs: &[DaemonMsg]) -> Vec<(String, bool)> {
        msgs.iter()
            .filter_map(|m| match m {
                DaemonMsg::Visibility { id, visible } => Some((id.to_string(), *visible)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn mount_generates_id_when_missing() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let reply = host.handle(HOST, &tx, ClientMsg::Mount { id: None, disabled: false }, Instant::now());
        assert!(matches!(reply, Some(DaemonMsg::Mounted { ref id }) if id.as_str() == "tooltip-1"));
        assert_eq!(host.instance_count(), 1);
    }

    #[test]
    fn duplicate_mount_is_rejected() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        mount(&mut host, &tx, "a");
        let reply = host.handle(HOST, &tx, ClientMsg::Mount { id: Some("a".into()), disabled: false }, Instant::now());
        assert!(matches!(reply, Some(DaemonMsg::Ack { ok: false, .. })));
    }

    #[test]
    fn hover_then_rest_pushes_visibility_and_hidden_placement() {
        let t0 = Instant::now();
        let mut host = Host::new(Config::default());
        let (tx, mut rx) = channel();
        let a = mount(&mut host, &tx, "a");

        assert!(host.handle(HOST, &tx, hover(&a, HoverAction::Enter), t0).is_none());
        assert!(drain(&mut rx).is_empty());

        host.check_timers(t0 + ms(100));
        let msgs = drain(&mut rx);
        assert_eq!(visibility(&msgs), vec![("a".to_string(), true)]);
        assert!(msgs
            .iter()
            .any(|m| matches!(m, DaemonMsg::Placement { style: PopupStyle::Hidden, .. })));
    }

    #[test]
    fn measure_of_visible_popup_yields_position() {
        let t0 = Instant::now();
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let a = mount(&mut host, &tx, "a");
        host.handle(HOST, &tx, ClientMsg::Input { id: a.clone(), input: TriggerInput::Focus }, t0);

        let measure = ClientMsg::Measure {
            id: a.clone(),
            trigger: Some(Rect::new(100.0, 100.0, 80.0, 20.0)),
            popup: Some(Rect::new(0.0, 0.0, 120.0, 30.0)),
            viewport: Viewport::new(1000.0, 800.0),
        };
        match host.handle(HOST, &tx, measure, t0) {
            Some(DaemonMsg::Placement { style, .. }) => {
                assert_eq!(style, PopupStyle::At(Position { left: 100.0, top: 128.0 }));
            }
            other => panic!("expected Placement, got {:?}", other),
        }
    }

    #[test]
    fn measure_of_hidden_instance_is_ignored() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let a = mount(&mut host, &tx, "a");
        let measure = ClientMsg::Measure {
            id: a,
            trigger: Some(Rect::new(0.0, 0.0, 10.0, 10.0)),
            popup: None,
            viewport: Viewport::new(100.0, 100.0),
        };
        assert!(host.handle(HOST, &tx, measure, Instant::now()).is_none());
    }

    #[test]
    fn handoff_hides_first_and_shows_second() {
        let t0 = Instant::now();
        let mut host = Host::new(Config::default());
        let (tx, mut rx) = channel();
        let first = mount(&mut host, &tx, "first");
        let second = mount(&mut host, &tx, "second");

        host.handle(HOST, &tx, hover(&first, HoverAction::Enter), t0);
        host.check_timers(t0 + ms(100));
        drain(&mut rx);

        let t1 = t0 + ms(150);
        host.handle(HOST, &tx, hover(&first, HoverAction::Leave), t1);
        host.handle(HOST, &tx, hover(&second, HoverAction::Enter), t1);

        let msgs = drain(&mut rx);
        assert_eq!(
            visibility(&msgs),
            vec![("first".to_string(), false), ("second".to_string(), true)]
        );
        assert_eq!(host.store().mode(), Mode::Visible);
    }

    #[test]
    fn document_escape_dismisses() {
        let t0 = Instant::now();
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let a = mount(&mut host, &tx, "a");
        host.handle(HOST, &tx, ClientMsg::Input { id: a, input: TriggerInput::Focus }, t0);

        let escape = ClientMsg::Document {
            event: DocumentEvent::KeyDown { key: Key::Escape },
        };
        host.handle(HOST, &tx, escape, t0);
        assert_eq!(host.store().mode(), Mode::Dismissed);
    }

    #[test]
    fn input_for_foreign_instance_is_rejected() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let a = mount(&mut host, &tx, "a");
        let reply = host.handle(OTHER, &tx, ClientMsg::Input { id: a, input: TriggerInput::Focus }, Instant::now());
        assert!(matches!(reply, Some(DaemonMsg::Ack { ok: false, .. })));
        assert_eq!(host.store().mode(), Mode::Idle);
    }

    #[test]
    fn dismiss_command_only_acts_while_visible() {
        let t0 = Instant::now();
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let reply = host.handle(HOST, &tx, ClientMsg::Dismiss, t0);
        assert!(matches!(reply, Some(DaemonMsg::Ack { ref message, .. }) if message == "nothing to dismiss"));

        let a = mount(&mut host, &tx, "a");
        host.handle(HOST, &tx, ClientMsg::Input { id: a, input: TriggerInput::Focus }, t0);
        let reply = host.handle(HOST, &tx, ClientMsg::Dismiss, t0);
        assert!(matches!(reply, Some(DaemonMsg::Ack { ref message, .. }) if message == "dismissed"));
        assert_eq!(host.store().mode(), Mode::Dismissed);
    }

    #[test]
    fn watchers_receive_transitions() {
        let t0 = Instant::now();
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let (watch_tx, mut watch_rx) = channel();
        host.handle(OTHER, &watch_tx, ClientMsg::Watch, t0);

        let a = mount(&mut host, &tx, "a");
        host.handle(HOST, &tx, hover(&a, HoverAction::Enter), t0);

        let msgs = drain(&mut watch_rx);
        assert!(msgs.iter().any(|m| matches!(
            m,
            DaemonMsg::Transition { mode: Mode::Focused, active_id: Some(id) } if id.as_str() == "a"
        )));
    }

    #[test]
    fn toggle_flips_enabled_and_blocks_new_sessions() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        host.handle(HOST, &tx, ClientMsg::Toggle, Instant::now());
        assert!(!host.store().is_enabled());

        let a = mount(&mut host, &tx, "a");
        host.handle(HOST, &tx, ClientMsg::Input { id: a, input: TriggerInput::Focus }, Instant::now());
        assert_eq!(host.store().mode(), Mode::Idle);
    }

    #[test]
    fn status_reports_instances_and_mode() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        mount(&mut host, &tx, "a");
        match host.handle(HOST, &tx, ClientMsg::GetStatus, Instant::now()) {
            Some(DaemonMsg::Status {
                enabled,
                mode,
                instances,
                ..
            }) => {
                assert!(enabled);
                assert_eq!(mode, Mode::Idle);
                assert_eq!(instances, 1);
            }
            other => panic!("expected Status, got {:?}", other),
        }
    }

    #[test]
    fn disconnect_unmounts_owned_instances() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        mount(&mut host, &tx, "a");
        host.handle(OTHER, &tx, ClientMsg::Mount { id: Some("b".into()), disabled: false }, Instant::now());
        assert_eq!(host.store().subscriber_count(), 3); // watcher + two triggers

        host.disconnect(HOST);
        assert_eq!(host.instance_count(), 1);
        assert_eq!(host.store().subscriber_count(), 2);
    }

    #[test]
    fn unmount_by_owner() {
        let mut host = Host::new(Config::default());
        let (tx, _rx) = channel();
        let a = mount(&mut host, &tx, "a");
        let reply = host.handle(OTHER, &tx, ClientMsg::Unmount { id: a.clone() }, Instant::now());
        assert!(matches!(reply, Some(DaemonMsg::Ack { ok: false, .. })));
        let reply = host.handle(HOST, &tx, ClientMsg::Unmount { id: a }, Instant::now());
        assert!(matches!(reply, Some(DaemonMsg::Ack { ok: true, .. })));
        assert_eq!(host.instance_count(), 0);
    }
}
