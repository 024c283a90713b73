use serde::Serialize;
use std::fmt;

/// Lifecycle of one response.
///
/// `Initial -> Started -> {Done | Error}`; a response may also fail straight
/// from `Initial`. `Done` and `Error` are terminal and mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum ResponseState {
    #[default]
    Initial,
    Started,
    Error,
    Done,
}

impl ResponseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseState::Error | ResponseState::Done)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseState::Initial => "initial",
            ResponseState::Started => "started",
            ResponseState::Error => "error",
            ResponseState::Done => "done",
        }
    }
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
