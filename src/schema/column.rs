//! Column type model and the scalar type classifier
//!
//! A column is either a single primitive, a choice of two or more primitives
//! (seen when records disagree on a column's type), or an unsupported type.
//! The compact string encoding (`int`, `c-int-str`, `unsupported:array`) is
//! only used on the wire; internally a choice is a set.

use crate::error::SchemaError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const CHOICE_PREFIX: &str = "c-";
const CHOICE_DELIMITER: char = '-';
const UNSUPPORTED_PREFIX: &str = "unsupported:";

/// Primitive column types.
///
/// Variants are declared in alphabetical order of their tags so the derived
/// `Ord` is the canonical member order of a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    Bool,
    /// Never produced by [`classify`]; accepted from serialized schemas
    Datetime,
    Float,
    Int,
    None,
    Str,
}

impl Primitive {
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Datetime => "datetime",
            Primitive::Float => "float",
            Primitive::Int => "int",
            Primitive::None => "none",
            Primitive::Str => "str",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Primitive {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Primitive::Bool),
            "datetime" => Ok(Primitive::Datetime),
            "float" => Ok(Primitive::Float),
            "int" => Ok(Primitive::Int),
            "none" => Ok(Primitive::None),
            "str" => Ok(Primitive::Str),
            other => Err(SchemaError::InvalidColumnType(other.to_string())),
        }
    }
}

/// Two or more distinct, non-`none` primitives observed for one column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Choice(BTreeSet<Primitive>);

impl Choice {
    pub fn contains(&self, primitive: Primitive) -> bool {
        self.0.contains(&primitive)
    }

    /// Members in canonical (alphabetical) order
    pub fn members(&self) -> impl Iterator<Item = Primitive> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The recorded type of a single schema column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Primitive(Primitive),
    Choice(Choice),
    /// Wraps the native type name of a value the classifier cannot represent
    Unsupported(String),
}

impl ColumnType {
    pub const NONE: ColumnType = ColumnType::Primitive(Primitive::None);

    /// Build a column type from a set of observed primitives.
    ///
    /// `none` is dropped; an empty set is `none`, a single member collapses to
    /// that primitive, anything larger becomes a choice.
    pub fn from_members<I>(members: I) -> ColumnType
    where
        I: IntoIterator<Item = Primitive>,
    {
        let mut set: BTreeSet<Primitive> = members.into_iter().collect();
        set.remove(&Primitive::None);

        match set.len() {
            0 => ColumnType::NONE,
            1 => match set.into_iter().next() {
                Some(only) => ColumnType::Primitive(only),
                None => ColumnType::NONE,
            },
            _ => ColumnType::Choice(Choice(set)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ColumnType::Primitive(Primitive::None))
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, ColumnType::Choice(_))
    }

    /// Combine two observed types for the same column.
    ///
    /// The result depends only on the set of types involved, never on which
    /// side was seen first.
    pub fn union(&self, other: &ColumnType) -> ColumnType {
        if self == other {
            return self.clone();
        }

        match (self, other) {
            // Unsupported absorbs; the smaller name wins so the fold commutes
            (ColumnType::Unsupported(a), ColumnType::Unsupported(b)) => {
                ColumnType::Unsupported(a.min(b).clone())
            }
            (ColumnType::Unsupported(name), _) | (_, ColumnType::Unsupported(name)) => {
                ColumnType::Unsupported(name.clone())
            }
            _ => ColumnType::from_members(self.primitives().chain(other.primitives())),
        }
    }

    /// Primitives making up this type (empty for unsupported)
    fn primitives(&self) -> Box<dyn Iterator<Item = Primitive> + '_> {
        match self {
            ColumnType::Primitive(p) => Box::new(std::iter::once(*p)),
            ColumnType::Choice(choice) => Box::new(choice.members()),
            ColumnType::Unsupported(_) => Box::new(std::iter::empty()),
        }
    }
}

impl From<Primitive> for ColumnType {
    fn from(primitive: Primitive) -> Self {
        ColumnType::Primitive(primitive)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Primitive(p) => f.write_str(p.as_str()),
            ColumnType::Choice(choice) => {
                f.write_str(CHOICE_PREFIX)?;
                for (i, member) in choice.members().enumerate() {
                    if i > 0 {
                        write!(f, "{}", CHOICE_DELIMITER)?;
                    }
                    f.write_str(member.as_str())?;
                }
                Ok(())
            }
            ColumnType::Unsupported(name) => write!(f, "{}{}", UNSUPPORTED_PREFIX, name),
        }
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix(UNSUPPORTED_PREFIX) {
            return Ok(ColumnType::Unsupported(name.to_string()));
        }

        if let Some(members) = s.strip_prefix(CHOICE_PREFIX) {
            let members = members
                .split(CHOICE_DELIMITER)
                .map(Primitive::from_str)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| SchemaError::InvalidColumnType(s.to_string()))?;
            return Ok(ColumnType::from_members(members));
        }

        Ok(ColumnType::Primitive(s.parse()?))
    }
}

impl Serialize for ColumnType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Classify a scalar JSON value.
///
/// Booleans are checked before numbers. Numbers written with a fraction or
/// exponent are `float`; integer literals are `int` at any width, since
/// numbers keep their source digits. Arrays and objects are not scalars and
/// come back as unsupported.
pub fn classify(value: &Value) -> ColumnType {
    match value {
        Value::Null => Primitive::None.into(),
        Value::Bool(_) => Primitive::Bool.into(),
        Value::Number(n) if n.is_f64() => Primitive::Float.into(),
        Value::Number(_) => Primitive::Int.into(),
        Value::String(_) => Primitive::Str.into(),
        Value::Array(_) => ColumnType::Unsupported("array".to_string()),
        Value::Object(_) => ColumnType::Unsupported("object".to_string()),
    }
}
