use tokio::sync::watch;

/// Network reachability as seen by the device
///
/// The platform layer reports changes through [`set_online`]; the spend
/// queue replays whenever the state becomes online.
///
/// [`set_online`]: ConnectivityMonitor::set_online
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    pub fn set_online(&self, online: bool) {
        self.sender.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
