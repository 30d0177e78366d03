use async_trait::async_trait;

use crate::TeamsError;
use crate::graph::TeamGraph;
use crate::message::Message;

/// Anything a supervisor can dispatch to: a tool-using worker or a whole team.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Roster name; also the label of the message this agent reports.
    fn name(&self) -> &str;

    /// Consume the history so far and report exactly one message.
    async fn run(&self, history: &[Message]) -> Result<Message, TeamsError>;

    /// The graph behind this agent when it is a nested team.
    fn as_team(&self) -> Option<&TeamGraph> {
        None
    }
}
