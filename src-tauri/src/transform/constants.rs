use log::warn;
use serde::Deserialize;
use serde_json::Value;

/// Message-type discriminants defined by the remote client's own runtime.
///
/// The values are not fixed constants of ours: the page resolves the
/// client's configuration table after bootstrap and registers it over the
/// bridge, and the table may change between remote releases. Discriminants
/// are kept as raw JSON values (the client has shipped both integers and
/// strings) and compared by equality.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteConstants {
    #[serde(rename = "MSGTYPE_EMOTICON")]
    pub emoticon: Value,
    #[serde(rename = "MSGTYPE_RECALLED")]
    pub recalled: Value,
    #[serde(rename = "MSGTYPE_SYS")]
    pub sys: Value,
}

impl RemoteConstants {
    /// Parses the table the page registered. A table missing any required
    /// discriminant does not satisfy the contract; classification is then
    /// skipped entirely rather than half-applied.
    pub fn from_value(value: Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(constants) => Some(constants),
            Err(err) => {
                warn!("remote constants table rejected, classification disabled: {err}");
                None
            }
        }
    }
}
