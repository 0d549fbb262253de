use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(NodeId, "Stable identifier of a logical peer node.");
string_id!(ClientId, "Identifier of the client application behind a node.");
string_id!(UserId, "Identifier of the user behind a node. Informational, not authoritative.");
string_id!(DomainId, "Identifier of a domain, the top level of the hierarchy.");
string_id!(ClusterId, "Identifier of a cluster, the middle level of the hierarchy.");
string_id!(ChannelId, "Identifier of a channel, the bottom level of the hierarchy.");
string_id!(BatchId, "Client-chosen identifier of one activity batch relay unit.");

/// Correlates one broker-issued command with its eventual reply. Freshly
/// generated per command, never reused while the command is pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn to_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
