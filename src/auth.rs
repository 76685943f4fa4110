use std::future::Future;
use std::sync::Arc;

use log::*;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedIn,
    LoggedOut,
}

/// Read side of the user's session, handed to everything that must not push while logged out.
pub trait SessionState: Send + Sync {
    fn current_state(&self) -> AuthState;

    fn observe(&self) -> watch::Receiver<AuthState>;

    fn is_logged_in(&self) -> bool {
        self.current_state() == AuthState::LoggedIn
    }
}

/// The one place the session changes. Create once per process, drop on shutdown.
pub struct SessionProvider {
    state: watch::Sender<AuthState>,
}

impl SessionProvider {
    pub fn new(initial: AuthState) -> SessionProvider {
        let (state, _) = watch::channel(initial);
        SessionProvider { state }
    }

    pub fn login(&self) {
        self.set(AuthState::LoggedIn);
    }

    pub fn logout(&self) {
        self.set(AuthState::LoggedOut);
    }

    fn set(&self, new_state: AuthState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            *state = new_state;
            true
        });

        if changed {
            info!("Auth state is now {:?}", new_state);
        }
    }
}

impl SessionState for SessionProvider {
    fn current_state(&self) -> AuthState {
        *self.state.borrow()
    }

    fn observe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }
}

/// Runs a callback once for every LoggedOut -> LoggedIn transition.
pub struct AuthWatcher;

impl AuthWatcher {
    /// The state at spawn time is the baseline; being logged in already is not a transition.
    pub fn spawn<F, Fut>(session: Arc<dyn SessionState>, on_login: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut changes = session.observe();
        // read before spawning so a login racing the task's first poll still counts
        let mut last = *changes.borrow_and_update();

        tokio::spawn(async move {

            while changes.changed().await.is_ok() {
                let state = *changes.borrow_and_update();
                if last == AuthState::LoggedOut && state == AuthState::LoggedIn {
                    debug!("Logged in, triggering refresh");
                    on_login().await;
                }
                last = state;
            }

            debug!("Session closed, auth watcher exiting");
        })
    }
}
