//! String channels between the session and the native window host.

use tokio::sync::mpsc;

/// Create a connected pair: the session keeps the bridge, the host keeps the end.
pub fn host_channel() -> (HostBridge, HostEnd) {
    let (to_host, from_view) = mpsc::unbounded_channel();
    let (to_view, from_host) = mpsc::unbounded_channel();
    (
        HostBridge { to_host, from_host },
        HostEnd { to_view, from_view },
    )
}

/// Session side.
#[derive(Debug)]
pub struct HostBridge {
    to_host: mpsc::UnboundedSender<String>,
    from_host: mpsc::UnboundedReceiver<String>,
}

impl HostBridge {
    /// Returns false once the host has gone away.
    pub fn post(&self, message: impl Into<String>) -> bool {
        self.to_host.send(message.into()).is_ok()
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.from_host.recv().await
    }
}

/// Native host side.
#[derive(Debug)]
pub struct HostEnd {
    to_view: mpsc::UnboundedSender<String>,
    from_view: mpsc::UnboundedReceiver<String>,
}

impl HostEnd {
    pub fn post(&self, message: impl Into<String>) -> bool {
        self.to_view.send(message.into()).is_ok()
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.from_view.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.from_view.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_cross_in_both_directions() {
        let (mut bridge, mut host) = host_channel();
        assert!(bridge.post("ready"));
        assert!(host.post("resize 800x600"));

        assert_eq!(host.recv().await.as_deref(), Some("ready"));
        assert_eq!(bridge.recv().await.as_deref(), Some("resize 800x600"));
    }

    #[tokio::test]
    async fn post_fails_after_host_drops() {
        let (bridge, host) = host_channel();
        drop(host);
        assert!(!bridge.post("anyone?"));
    }
}
