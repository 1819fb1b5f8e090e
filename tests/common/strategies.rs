use proptest::prelude::*;

/// Installed/active flags for one item; active implies installed
pub fn item_flags_strategy() -> impl Strategy<Value = (bool, bool)> {
    prop_oneof![
        Just((false, false)),
        Just((true, false)),
        Just((true, true)),
    ]
}

/// Initial flags for `count` required items
pub fn initial_flags_strategy(count: usize) -> impl Strategy<Value = Vec<(bool, bool)>> {
    prop::collection::vec(item_flags_strategy(), count)
}

/// One change made by the remote side between two ticks
#[derive(Debug, Clone)]
pub enum RemoteChange {
    /// Nothing observable changed
    Nothing,
    /// The item at this index became installed
    Install(usize),
    /// The item at this index became installed and active
    Activate(usize),
    /// The item at this index lost its active flag
    Deactivate(usize),
}

pub fn remote_change_strategy(count: usize) -> impl Strategy<Value = RemoteChange> {
    prop_oneof![
        3 => Just(RemoteChange::Nothing),
        2 => (0..count).prop_map(RemoteChange::Install),
        2 => (0..count).prop_map(RemoteChange::Activate),
        1 => (0..count).prop_map(RemoteChange::Deactivate),
    ]
}

pub fn remote_changes_strategy(count: usize) -> impl Strategy<Value = Vec<RemoteChange>> {
    prop::collection::vec(remote_change_strategy(count), 1..60)
}
