//! Opaque string identifiers (§3).
//!
//! All four are thin newtypes over `String` rather than bare `String`s so
//! the compiler catches a `ChatId` passed where a `MsgId` was expected; none
//! of them carry protocol-specific structure beyond `ProfileId`'s
//! `"<Protocol>_<handle>"` convention.

use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

use serde::{Deserialize, Serialize};

string_id!(ProfileId);
string_id!(ChatId);
string_id!(MsgId);
string_id!(ContactId);

impl ProfileId {
    /// Builds a `ProfileId` from a protocol name and account handle, per
    /// §3's `"<ProtocolName>_<accountHandle>"` convention.
    pub fn new(protocol: &str, handle: &str) -> Self {
        ProfileId(format!("{}_{}", protocol, handle))
    }

    /// The directory name this profile lives under is exactly the id.
    pub fn dir_name(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_id_formats_protocol_and_handle() {
        let id = ProfileId::new("WhatsAppMd", "+15551234");
        assert_eq!(id.as_str(), "WhatsAppMd_+15551234");
    }
}
