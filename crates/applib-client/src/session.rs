//! One client session: connection, protocol, UI model and preferences.
//!
//! The session reacts to one event at a time. Connection events and host
//! messages come in; UI declarations, callbacks and host posts go out.

use crate::connection::{ConnectionEvent, ConnectionHandle, ConnectionManager, Connector};
use crate::host::HostBridge;
use crate::poller::Poller;
use crate::props::ClientProps;
use crate::protocol::{MessageProtocol, RequestError};
use crate::ui::UiEngine;
use applib_core::{ConnectionState, Instruction, TabSide};
use std::future;
use tokio::sync::mpsc;
use tokio::time::Interval;

/// Receives host-to-view messages.
pub type HostHook = Box<dyn FnMut(&str) + Send>;

pub struct ClientSession {
    connection: ConnectionHandle,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    protocol: MessageProtocol,
    ui: UiEngine,
    props: ClientProps,
    host: Option<HostBridge>,
    host_hook: Option<HostHook>,
    poller: Option<Poller>,
}

impl ClientSession {
    /// Spawn the connection task and build a session around it.
    pub fn start<C: Connector>(connector: C, props: ClientProps) -> Self {
        let (connection, events) = ConnectionManager::spawn(connector);
        Self {
            protocol: MessageProtocol::new(connection.clone()),
            connection,
            events,
            ui: UiEngine::new(),
            props,
            host: None,
            host_hook: None,
            poller: None,
        }
    }

    pub fn with_ui(mut self, ui: UiEngine) -> Self {
        self.ui = ui;
        self
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn with_host(mut self, host: HostBridge) -> Self {
        self.host = Some(host);
        self
    }

    /// Install the hook that host-to-view messages are delivered to.
    pub fn on_host_message(&mut self, hook: HostHook) {
        self.host_hook = Some(hook);
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    pub fn protocol(&self) -> &MessageProtocol {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut MessageProtocol {
        &mut self.protocol
    }

    pub fn ui(&self) -> &UiEngine {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut UiEngine {
        &mut self.ui
    }

    pub fn props(&self) -> &ClientProps {
        &self.props
    }

    pub fn props_mut(&mut self) -> &mut ClientProps {
        &mut self.props
    }

    /// Send a view-to-host message. Returns false without a live host.
    pub fn post_to_host(&self, message: impl Into<String>) -> bool {
        match &self.host {
            Some(host) => host.post(message),
            None => false,
        }
    }

    /// Issue the poller's request, if one is configured.
    pub fn poll_now(&self) -> Result<(), RequestError> {
        match &self.poller {
            Some(poller) => self.protocol.send(poller.request()),
            None => Ok(()),
        }
    }

    /// Focus a tab and hand its action to the host.
    pub fn click_tab(&mut self, side: TabSide, index: usize) -> Option<String> {
        let action = self.ui.click_tab(side, index)?;
        self.post_action(&action);
        Some(action)
    }

    /// Hand a menu item's action to the host.
    pub fn activate_menu_item<S: AsRef<str>>(&self, path: &[S]) -> Option<String> {
        let action = self.ui.menu().node(path)?.action()?.to_string();
        self.post_action(&action);
        Some(action)
    }

    fn post_action(&self, action: &str) {
        if !action.is_empty() && !self.post_to_host(action) {
            tracing::debug!("No host to receive action {}", action);
        }
    }

    /// Wait for the next connection event and react to it.
    ///
    /// Returns false once the connection task has shut down.
    pub async fn step(&mut self) -> bool {
        match self.events.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                if let Err(e) = self.poll_now() {
                    tracing::warn!("Poll after open failed: {}", e);
                }
            }
            ConnectionEvent::Message(raw) => {
                if let Some(instruction) = self.protocol.on_message(&raw) {
                    self.apply(instruction);
                }
            }
            ConnectionEvent::Closed => tracing::debug!("Session lost its connection"),
        }
    }

    /// Apply one server instruction to the session.
    pub fn apply(&mut self, instruction: Instruction) {
        match instruction {
            Instruction::Callback { .. } => {
                self.protocol.dispatch(instruction);
            }
            Instruction::AddMenuItem { path, weight, action } => {
                if let Err(e) = self.ui.declare_menu_item(path.as_slice(), weight, &action) {
                    tracing::warn!("Ignoring menu item: {}", e);
                }
            }
            Instruction::AddTab {
                side,
                label,
                weight,
                action,
                focused,
            } => self.ui.declare_tab(side, &label, weight, &action, focused),
            Instruction::Navigate { side, url } => self.ui.navigate(side, &url),
            Instruction::SessionToken { token } => self.connection.set_session_token(token),
            Instruction::SetClientProp { key, value } => {
                if let Err(e) = self.props.set(&key, value) {
                    tracing::warn!("Failed to store client prop {}: {}", key, e);
                }
            }
        }
    }

    /// React to connection events, poll ticks and host messages until the
    /// connection task shuts down.
    pub async fn run(&mut self) {
        let mut ticker = self.poller.as_ref().map(Poller::ticker);
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                () = next_tick(&mut ticker) => {
                    // Polls while disconnected are skipped; the next open polls anyway.
                    if self.connection.state() == ConnectionState::Open {
                        if let Err(e) = self.poll_now() {
                            tracing::warn!("Poll failed: {}", e);
                        }
                    }
                }
                message = host_message(&mut self.host) => match message {
                    Some(message) => self.deliver_host_message(&message),
                    None => {
                        tracing::info!("Host channel closed");
                        self.host = None;
                    }
                },
            }
        }
        tracing::info!("Session stopped");
    }

    fn deliver_host_message(&mut self, message: &str) {
        match self.host_hook.as_mut() {
            Some(hook) => hook(message),
            None => tracing::debug!("No hook for host message {}", message),
        }
    }

    pub fn shutdown(&self) {
        self.connection.shutdown();
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

async fn host_message(host: &mut Option<HostBridge>) -> Option<String> {
    match host {
        Some(host) => host.recv().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::host_channel;
    use crate::posrep::{MapLayer, POSREP_CALLBACK, Placemark, PlacemarkWindow, posrep_request};
    use crate::testing::MockConnector;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn frame(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn server_instructions_build_the_ui() {
        let (connector, mut peers) = MockConnector::new();
        let mut session = ClientSession::start(connector, ClientProps::in_memory());

        let peer = peers.recv().await.unwrap();
        assert!(session.step().await);
        peer.push(r#"{"type":"add-menu-item","path":["File","Quit"],"weight":100,"action":"quit"}"#);
        peer.push(r#"{"type":"add-tab","side":"left","label":"SMS","weight":110,"action":"sms","focused":true}"#);
        peer.push(r#"{"type":"navigate","side":"right","url":"/map"}"#);
        peer.push(r#"{"type":"set-client-prop","key":"theme","value":"dark"}"#);
        peer.push("alert(document.cookie)");
        for _ in 0..5 {
            assert!(session.step().await);
        }

        let quit = session.ui().menu().node(&["File", "Quit"]).unwrap();
        assert_eq!(quit.action(), Some("quit"));
        assert_eq!(session.ui().tabs(TabSide::Left).focused().unwrap().label, "SMS");
        assert_eq!(session.ui().tabs(TabSide::Right).active_url(), Some("/map"));
        assert_eq!(session.props().get("theme"), "dark");
    }

    #[tokio::test(start_paused = true)]
    async fn open_triggers_a_poll() {
        let (connector, mut peers) = MockConnector::new();
        let mut session = ClientSession::start(connector, ClientProps::in_memory())
            .with_poller(Poller::new(posrep_request(), Duration::from_secs(5)));

        let mut peer = peers.recv().await.unwrap();
        assert!(session.step().await);
        let sent = frame(&peer.recv().await.unwrap());
        assert_eq!(sent, posrep_request().to_value());
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_on_open_and_every_interval() {
        let (connector, mut peers) = MockConnector::new();
        let mut session = ClientSession::start(connector, ClientProps::in_memory())
            .with_poller(Poller::new(posrep_request(), Duration::from_secs(5)));

        let _ = tokio::time::timeout(Duration::from_secs(12), session.run()).await;

        let mut peer = peers.recv().await.unwrap();
        for _ in 0..3 {
            assert_eq!(frame(&peer.recv().await.unwrap()), posrep_request().to_value());
        }
        let extra = tokio::time::timeout(Duration::from_millis(10), peer.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_callback_reply_reaches_the_map() {
        #[derive(Clone, Default)]
        struct Layer(Arc<Mutex<Vec<Placemark>>>);
        impl MapLayer for Layer {
            fn add_placemark(&mut self, _handle: u64, placemark: &Placemark) {
                self.0.lock().unwrap().push(placemark.clone());
            }
            fn remove_placemark(&mut self, _handle: u64) {}
        }

        let (connector, mut peers) = MockConnector::new();
        let mut session = ClientSession::start(connector, ClientProps::in_memory());
        let layer = Layer::default();
        session
            .protocol_mut()
            .register_callback(POSREP_CALLBACK, PlacemarkWindow::new(layer.clone()).into_handler());

        let peer = peers.recv().await.unwrap();
        assert!(session.step().await);
        peer.push(r#"show_posrep([{"id":"truck-1","lat":"38.9","lon":"-77.0"}]);"#);
        assert!(session.step().await);

        let placed = layer.0.lock().unwrap().clone();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].id, "truck-1");
    }

    #[tokio::test(start_paused = true)]
    async fn session_token_is_resumed_after_reconnect() {
        let (connector, mut peers) = MockConnector::new();
        let mut session = ClientSession::start(connector, ClientProps::in_memory());

        let peer = peers.recv().await.unwrap();
        assert!(session.step().await);
        peer.push(r#"{"type":"session-token","token":"abc123"}"#);
        assert!(session.step().await);

        drop(peer);
        assert!(session.step().await);
        assert_eq!(session.connection().state(), ConnectionState::Disconnected);

        let mut peer = peers.recv().await.unwrap();
        assert_eq!(
            frame(&peer.recv().await.unwrap()),
            json!({"type": "resume-session", "token": "abc123"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn actions_and_messages_cross_the_host_bridge() {
        let (connector, _peers) = MockConnector::new();
        let (bridge, mut host) = host_channel();
        let mut session = ClientSession::start(connector, ClientProps::in_memory()).with_host(bridge);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        session.on_host_message(Box::new(move |m: &str| sink.lock().unwrap().push(m.to_string())));

        session.apply(Instruction::AddTab {
            side: TabSide::Right,
            label: "Map".into(),
            weight: 300,
            action: "open-map".into(),
            focused: false,
        });
        session.apply(Instruction::AddMenuItem {
            path: vec!["File".into(), "Quit".into()],
            weight: 100,
            action: "quit".into(),
        });

        assert_eq!(session.click_tab(TabSide::Right, 0).as_deref(), Some("open-map"));
        assert_eq!(session.activate_menu_item(&["File", "Quit"]).as_deref(), Some("quit"));
        assert_eq!(session.activate_menu_item(&["File"]), None);
        assert_eq!(host.try_recv().as_deref(), Some("open-map"));
        assert_eq!(host.try_recv().as_deref(), Some("quit"));
        assert_eq!(host.try_recv(), None);

        host.post("theme-changed");
        let _ = tokio::time::timeout(Duration::from_secs(1), session.run()).await;
        assert_eq!(*received.lock().unwrap(), vec!["theme-changed".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_after_shutdown() {
        let (connector, _peers) = MockConnector::new();
        let mut session = ClientSession::start(connector, ClientProps::in_memory());
        session.shutdown();
        session.run().await;
        assert_eq!(session.connection().state(), ConnectionState::Disconnected);
    }
}
