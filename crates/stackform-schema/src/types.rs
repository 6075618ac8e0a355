//! Identifiers the provider hands back and forth as bare strings.
//!
//! Stack and region names travel through the definition file, the wire
//! protocol and lookups, so both serialize transparently.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! provider_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        // Lets tests and lookups compare against literals directly.
        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_owned())
            }
        }
    };
}

provider_name!(
    /// Name of a provider-managed stack, unique within one region.
    StackName
);

provider_name!(
    /// Provider region identifier, e.g. `us-east-1`.
    RegionName
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_name_display_and_as_ref() {
        let name = StackName::new("storage");
        assert_eq!(name.to_string(), "storage");
        assert_eq!(name.as_str(), "storage");
        assert_eq!(AsRef::<str>::as_ref(&name), "storage");
    }

    #[test]
    fn region_serializes_as_plain_string() {
        let region = RegionName::new("us-east-1");
        let json = serde_json::to_string(&region).unwrap();
        assert_eq!(json, "\"us-east-1\"");
        let back: RegionName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, region);
    }

    #[test]
    fn regions_order_lexicographically() {
        let mut regions = vec![RegionName::from("us-west-2"), RegionName::from("eu-west-1")];
        regions.sort();
        assert_eq!(regions[0], "eu-west-1");
    }

    #[test]
    fn stack_name_compares_with_literal_and_derefs() {
        let name = StackName::from(String::from("network"));
        assert!(name == "network");
        assert!(name.starts_with("net"));
    }
}
