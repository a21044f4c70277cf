//! Session state shared between the connection and the front end.
//!
//! The connection never owns this state; it reads and writes it through
//! [`SessionStore`] so a front end can plug in its own store. [`Session`] is
//! the in-memory implementation, observable through a `watch` channel.

use pawnhub_shared::{BoardPosition, PlayState};
use tokio::sync::watch;

/// Everything the connection tracks about the current match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub client_id: String,
    /// Present only while a resumable match exists.
    pub reconnect_code: Option<String>,
    pub play_state: PlayState,
    pub current_player_white: bool,
    /// A move was sent and the server has not accepted it yet.
    pub pending_move: bool,
    pub board_fen: String,
    /// The opponent moved since the front end last looked.
    pub unread_move: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            reconnect_code: None,
            play_state: PlayState::Idle,
            current_player_white: true,
            pending_move: false,
            board_fen: String::new(),
            unread_move: false,
        }
    }
}

/// Read/write access to session state.
pub trait SessionStore: Send + Sync {
    fn client_id(&self) -> String;
    fn set_client_id(&self, id: String);

    fn reconnect_code(&self) -> Option<String>;
    fn set_reconnect_code(&self, code: Option<String>);

    fn play_state(&self) -> PlayState;
    fn set_play_state(&self, state: PlayState);

    fn current_player_white(&self) -> bool;
    fn set_current_player_white(&self, white: bool);

    fn pending_move(&self) -> bool;
    fn set_pending_move(&self, pending: bool);

    fn board_fen(&self) -> String;
    fn set_board_fen(&self, fen: String);

    fn unread_move(&self) -> bool;
    fn set_unread_move(&self, unread: bool);

    /// Store a parsed position.
    fn apply_position(&self, position: BoardPosition) {
        self.set_board_fen(position.fen);
        self.set_current_player_white(position.white_to_move);
    }

    /// Reset everything an explicit close clears.
    fn reset_after_close(&self) {
        self.set_reconnect_code(None);
        self.set_client_id(String::new());
        self.set_play_state(PlayState::Closed);
        self.set_current_player_white(true);
        self.set_pending_move(false);
    }
}

/// In-memory session store.
pub struct Session {
    state: watch::Sender<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { state }
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut SessionState) -> bool) {
        self.state.send_if_modified(f);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Session").field(&*self.state.borrow()).finish()
    }
}

/// Assign `$value` to `$state.$field`, reporting whether it changed.
macro_rules! replace_field {
    ($state:ident . $field:ident, $value:expr) => {{
        let value = $value;
        if $state.$field == value {
            false
        } else {
            $state.$field = value;
            true
        }
    }};
}

impl SessionStore for Session {
    fn client_id(&self) -> String {
        self.state.borrow().client_id.clone()
    }

    fn set_client_id(&self, id: String) {
        self.update(|s| replace_field!(s.client_id, id));
    }

    fn reconnect_code(&self) -> Option<String> {
        self.state.borrow().reconnect_code.clone()
    }

    fn set_reconnect_code(&self, code: Option<String>) {
        self.update(|s| replace_field!(s.reconnect_code, code));
    }

    fn play_state(&self) -> PlayState {
        self.state.borrow().play_state
    }

    fn set_play_state(&self, state: PlayState) {
        self.update(|s| replace_field!(s.play_state, state));
    }

    fn current_player_white(&self) -> bool {
        self.state.borrow().current_player_white
    }

    fn set_current_player_white(&self, white: bool) {
        self.update(|s| replace_field!(s.current_player_white, white));
    }

    fn pending_move(&self) -> bool {
        self.state.borrow().pending_move
    }

    fn set_pending_move(&self, pending: bool) {
        self.update(|s| replace_field!(s.pending_move, pending));
    }

    fn board_fen(&self) -> String {
        self.state.borrow().board_fen.clone()
    }

    fn set_board_fen(&self, fen: String) {
        self.update(|s| replace_field!(s.board_fen, fen));
    }

    fn unread_move(&self) -> bool {
        self.state.borrow().unread_move
    }

    fn set_unread_move(&self, unread: bool) {
        self.update(|s| replace_field!(s.unread_move, unread));
    }

    // One notification for the whole position.
    fn apply_position(&self, position: BoardPosition) {
        self.update(|s| {
            let fen = replace_field!(s.board_fen, position.fen);
            let white = replace_field!(s.current_player_white, position.white_to_move);
            fen || white
        });
    }
}
