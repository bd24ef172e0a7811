use redial::client::ClientState;
use redial::ConnectionState;

#[test]
fn state_starts_created() {
    let state = ClientState::new();

    assert_eq!(state.state(), ConnectionState::Created);
    assert_eq!(state.attempts(), 0);
    assert_eq!(state.connections(), 0);
}

#[test]
fn connect_resets_attempts() {
    let state = ClientState::new();
    state.transition(ConnectionState::Connecting);
    state.increment_attempts();
    state.increment_attempts();
    assert_eq!(state.attempts(), 2);

    let previous = state.mark_connected();
    assert_eq!(previous, ConnectionState::Connecting);
    assert_eq!(state.state(), ConnectionState::Connected);
    assert_eq!(state.attempts(), 0);
    assert_eq!(state.connections(), 1);
}

#[test]
fn terminated_is_final() {
    let state = ClientState::new();
    state.transition(ConnectionState::Terminated);

    assert_eq!(
        state.transition(ConnectionState::Connecting),
        ConnectionState::Terminated
    );
    assert_eq!(state.state(), ConnectionState::Terminated);
}

#[test]
fn state_is_shared_between_clones() {
    let state1 = ClientState::new();
    let state2 = state1.clone();

    state1.transition(ConnectionState::Disconnected);
    state1.increment_attempts();

    assert_eq!(state2.state(), ConnectionState::Disconnected);
    assert_eq!(state2.attempts(), 1);
}
