use std::fmt;

// ---------------------------------------------------------------------------
// Reserved service names
// ---------------------------------------------------------------------------

/// Command services sent to the broker.
pub mod service {
    pub const LOGIN: &str = "login";
    pub const USERS: &str = "users";
    pub const CHANNELS: &str = "channels";
    pub const CHANNEL: &str = "channel";
    pub const PUBLISH: &str = "publish";
    pub const MESSAGE: &str = "message";

    /// Broadcast services delivered through the fan-out proxy.
    pub const PUBLICATION: &str = "publication";
    pub const PRIVATE_MESSAGE: &str = "private_message";

    /// Service tag the broker uses when it cannot dispatch a request at all.
    pub const ERROR: &str = "error";
}

// ---------------------------------------------------------------------------
// Payload keys
// ---------------------------------------------------------------------------

/// Reserved `data` key carrying the sender's logical clock.
pub const CLOCK_KEY: &str = "clock";
pub const STATUS_KEY: &str = "status";
pub const TIMESTAMP_KEY: &str = "timestamp";

/// `status` value the broker uses to report an application-level failure.
pub const FAILURE_STATUS: &str = "erro";

/// `status` values the broker sends on success. Anything other than
/// [`FAILURE_STATUS`] counts as success; these are only what the broker emits.
pub const SUCCESS_STATUS: &str = "sucesso";
pub const PUBLISH_OK_STATUS: &str = "OK";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// A high-level session operation. Used to label protocol and rejection
/// errors, and to select the key the broker puts its failure text under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    ListUsers,
    ListChannels,
    CreateChannel,
    Publish,
    PrivateMessage,
}

impl Operation {
    /// Service name sent on the command channel.
    pub fn service(self) -> &'static str {
        match self {
            Operation::Login => service::LOGIN,
            Operation::ListUsers => service::USERS,
            Operation::ListChannels => service::CHANNELS,
            Operation::CreateChannel => service::CHANNEL,
            Operation::Publish => service::PUBLISH,
            Operation::PrivateMessage => service::MESSAGE,
        }
    }

    /// Key holding the human-readable failure text in a rejected response.
    ///
    /// Login and channel creation use `description`; publish and private
    /// messages use `message`. The broker contract is asymmetric here and
    /// the client has to follow it.
    pub fn failure_key(self) -> &'static str {
        match self {
            Operation::Publish | Operation::PrivateMessage => "message",
            Operation::Login
            | Operation::ListUsers
            | Operation::ListChannels
            | Operation::CreateChannel => "description",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Login => "login",
            Operation::ListUsers => "list users",
            Operation::ListChannels => "list channels",
            Operation::CreateChannel => "create channel",
            Operation::Publish => "publish",
            Operation::PrivateMessage => "send private message",
        };
        f.write_str(name)
    }
}
