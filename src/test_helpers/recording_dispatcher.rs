use parking_lot::Mutex;

use crate::observer::{CommandDispatcher, SequencerCommand};

/// Dispatcher that keeps every command it receives, in order
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    commands: Mutex<Vec<SequencerCommand>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<SequencerCommand> {
        self.commands.lock().clone()
    }

    /// Number of recorded commands of `command_type` (see [`SequencerCommand::command_type`])
    pub fn count_of(&self, command_type: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|command| command.command_type() == command_type)
            .count()
    }

    pub fn last(&self) -> Option<SequencerCommand> {
        self.commands.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    /// Remove and return everything recorded so far
    pub fn drain(&self) -> Vec<SequencerCommand> {
        std::mem::take(&mut *self.commands.lock())
    }
}

impl CommandDispatcher for RecordingDispatcher {
    fn dispatch(&self, command: SequencerCommand) {
        self.commands.lock().push(command);
    }
}
