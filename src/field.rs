//! Field registry for the CP750 control protocol
//!
//! Every point of device state reachable over the protocol is a [`Field`].
//! The value domain of each field lives in a static table built at compile
//! time; nothing in here is ever mutated.

use crate::error::Cp750Error;
use std::fmt;
use std::str::FromStr;

/// Token used to ask the device for the current value of a field
pub const QUERY_TOKEN: &str = "?";

/// How a field may be accessed over the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Query only (`<key> ?`)
    ReadOnly,
    /// Query and set
    ReadWrite,
    /// Set only, the device has no query form (`cp750.ctrl.*`)
    WriteOnly,
}

/// Values a field accepts besides the query token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// No settable values, the field can only be queried
    QueryOnly,
    /// Inclusive integer range in canonical decimal form
    Range { min: i32, max: i32 },
    /// Finite set of string tokens
    Tokens(&'static [&'static str]),
}

impl Domain {
    fn contains(&self, value: &str) -> bool {
        match self {
            Domain::QueryOnly => false,
            Domain::Range { min, max } => value
                .parse::<i32>()
                .map(|n| n >= *min && n <= *max && n.to_string() == value)
                .unwrap_or(false),
            Domain::Tokens(tokens) => tokens.contains(&value),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::QueryOnly => Ok(()),
            Domain::Range { min, max } => write!(f, "{}..{}", min, max),
            Domain::Tokens(tokens) => write!(f, "{}", tokens.join("|")),
        }
    }
}

/// Static description of a field
#[derive(Debug)]
pub struct FieldSpec {
    pub key: &'static str,
    pub access: Access,
    pub domain: Domain,
}

/// A named, typed point of device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    SysinfoVersion,
    SysFader,
    SysMute,
    SysInputMode,
    CtrlFaderDelta,
}

static FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        key: "cp750.sysinfo.version",
        access: Access::ReadOnly,
        domain: Domain::QueryOnly,
    },
    FieldSpec {
        key: "cp750.sys.fader",
        access: Access::ReadWrite,
        domain: Domain::Range { min: 0, max: 100 },
    },
    FieldSpec {
        key: "cp750.sys.mute",
        access: Access::ReadWrite,
        domain: Domain::Range { min: 0, max: 1 },
    },
    FieldSpec {
        key: "cp750.sys.input_mode",
        access: Access::ReadWrite,
        domain: Domain::Tokens(InputMode::TOKENS),
    },
    FieldSpec {
        key: "cp750.ctrl.fader_delta",
        access: Access::WriteOnly,
        domain: Domain::Range { min: -100, max: 100 },
    },
];

impl Field {
    /// All fields in ordinal order
    pub const ALL: [Field; 5] = [
        Field::SysinfoVersion,
        Field::SysFader,
        Field::SysMute,
        Field::SysInputMode,
        Field::CtrlFaderDelta,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn by_ordinal(ordinal: usize) -> Option<Field> {
        Self::ALL.get(ordinal).copied()
    }

    /// Resolve a protocol key by exact match
    pub fn from_key(key: &str) -> Option<Field> {
        Self::ALL.iter().copied().find(|field| field.key() == key)
    }

    pub fn spec(self) -> &'static FieldSpec {
        &FIELDS[self.ordinal()]
    }

    pub fn key(self) -> &'static str {
        self.spec().key
    }

    pub fn access(self) -> Access {
        self.spec().access
    }

    pub fn domain(self) -> Domain {
        self.spec().domain
    }

    /// Whether the device answers `<key> ?` for this field
    pub fn is_queryable(self) -> bool {
        self.access() != Access::WriteOnly
    }

    /// Fields that take part in the handshake and in bulk status responses
    pub fn queryable() -> impl Iterator<Item = Field> {
        Self::ALL.into_iter().filter(|field| field.is_queryable())
    }

    /// Check a value against the field's domain, including the query token
    pub fn is_allowed_value(self, value: &str) -> bool {
        if value == QUERY_TOKEN {
            return self.is_queryable();
        }
        self.domain().contains(value)
    }

    /// Human readable summary of accepted values, e.g. `?|0..100`
    pub fn usage(self) -> String {
        let domain = self.domain().to_string();
        match (self.is_queryable(), domain.is_empty()) {
            (true, true) => QUERY_TOKEN.to_string(),
            (true, false) => format!("{}|{}", QUERY_TOKEN, domain),
            (false, _) => domain,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Field {
    type Err = Cp750Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::from_key(s.trim()).ok_or_else(|| Cp750Error::UnknownField(s.to_string()))
    }
}

/// Input sources of the CP750
///
/// [`InputMode::Last`] is a command, not a state: it asks the device to swap
/// back to the previously active input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputMode {
    Analog,
    Dig1,
    Dig2,
    Dig3,
    Dig4,
    Last,
    Mic,
    NonSync,
}

impl InputMode {
    pub const ALL: [InputMode; 8] = [
        InputMode::Analog,
        InputMode::Dig1,
        InputMode::Dig2,
        InputMode::Dig3,
        InputMode::Dig4,
        InputMode::Last,
        InputMode::Mic,
        InputMode::NonSync,
    ];

    const TOKENS: &'static [&'static str] = &[
        "analog", "dig_1", "dig_2", "dig_3", "dig_4", "last", "mic", "non_sync",
    ];

    pub fn as_str(self) -> &'static str {
        Self::TOKENS[self as usize]
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        InputMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown input mode '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_key_and_ordinal() {
        for (ordinal, field) in Field::ALL.iter().enumerate() {
            assert_eq!(field.ordinal(), ordinal);
            assert_eq!(Field::by_ordinal(ordinal), Some(*field));
            assert_eq!(Field::from_key(field.key()), Some(*field));
        }
        assert_eq!(Field::by_ordinal(5), None);
        assert_eq!(Field::from_key("cp750.sys.volume"), None);
        assert_eq!(Field::from_key("CP750.SYS.FADER"), None);
    }

    #[test]
    fn fader_range_is_inclusive_and_canonical() {
        assert!(Field::SysFader.is_allowed_value("0"));
        assert!(Field::SysFader.is_allowed_value("100"));
        assert!(Field::SysFader.is_allowed_value("?"));
        assert!(!Field::SysFader.is_allowed_value("101"));
        assert!(!Field::SysFader.is_allowed_value("-1"));
        assert!(!Field::SysFader.is_allowed_value("05"));
        assert!(!Field::SysFader.is_allowed_value("+5"));
        assert!(!Field::SysFader.is_allowed_value("ten"));
        assert!(!Field::SysFader.is_allowed_value(""));
    }

    #[test]
    fn write_only_field_rejects_query() {
        assert!(!Field::CtrlFaderDelta.is_queryable());
        assert!(!Field::CtrlFaderDelta.is_allowed_value("?"));
        assert!(Field::CtrlFaderDelta.is_allowed_value("-100"));
        assert!(Field::CtrlFaderDelta.is_allowed_value("100"));
        assert!(!Field::CtrlFaderDelta.is_allowed_value("101"));
    }

    #[test]
    fn version_is_query_only() {
        assert!(Field::SysinfoVersion.is_allowed_value("?"));
        assert!(!Field::SysinfoVersion.is_allowed_value("1.0"));
        assert_eq!(Field::SysinfoVersion.usage(), "?");
    }

    #[test]
    fn queryable_fields_skip_ctrl() {
        let keys: Vec<_> = Field::queryable().map(Field::key).collect();
        assert_eq!(
            keys,
            vec![
                "cp750.sysinfo.version",
                "cp750.sys.fader",
                "cp750.sys.mute",
                "cp750.sys.input_mode",
            ]
        );
    }

    #[test]
    fn input_mode_tokens() {
        for mode in InputMode::ALL {
            assert!(Field::SysInputMode.is_allowed_value(mode.as_str()));
            assert_eq!(mode.as_str().parse::<InputMode>(), Ok(mode));
        }
        assert_eq!("NON_SYNC".parse::<InputMode>(), Ok(InputMode::NonSync));
        assert!("dig_5".parse::<InputMode>().is_err());
        assert!(!Field::SysInputMode.is_allowed_value("dig_5"));
    }

    #[test]
    fn usage_strings() {
        assert_eq!(Field::SysFader.usage(), "?|0..100");
        assert_eq!(Field::CtrlFaderDelta.usage(), "-100..100");
        assert!(Field::SysInputMode.usage().starts_with("?|analog|dig_1"));
    }
}
