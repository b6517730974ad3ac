use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a string does not satisfy an id's prefix/length contract.
#[derive(Debug, thiserror::Error)]
#[error("invalid {kind} id {value:?}: expected prefix {prefix:?} followed by 12 hex chars")]
pub struct InvalidId {
    kind: &'static str,
    prefix: &'static str,
    value: String,
}

fn random_hex12() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..12].to_string()
}

fn check_prefixed(kind: &'static str, prefix: &'static str, value: &str) -> Result<(), InvalidId> {
    let suffix = value.strip_prefix(prefix).ok_or_else(|| InvalidId {
        kind,
        prefix,
        value: value.to_string(),
    })?;
    let ok = suffix.len() == 12 && suffix.chars().all(|c| c.is_ascii_hexdigit());
    if ok {
        Ok(())
    } else {
        Err(InvalidId {
            kind,
            prefix,
            value: value.to_string(),
        })
    }
}

macro_rules! prefixed_id {
    ($name:ident, $kind:literal, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mints a fresh id with a random 12 hex char suffix.
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "{}"), random_hex12()))
            }

            /// Validates and wraps an existing id string.
            pub fn parse(value: impl Into<String>) -> Result<Self, InvalidId> {
                let value = value.into();
                check_prefixed($kind, $prefix, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

prefixed_id!(RunId, "run", "run_");
prefixed_id!(SpanId, "span", "sp_");
prefixed_id!(GateId, "gate", "gate_");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_round_trips() {
        let id = RunId::new();
        let parsed = RunId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(SpanId::parse("run_000000000000").is_err());
    }

    #[test]
    fn rejects_short_suffix() {
        assert!(GateId::parse("gate_abc").is_err());
    }
}
