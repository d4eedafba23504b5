//! Serde integration support.

use std::fmt;

use serde::de::{Error, Unexpected, Visitor};
use serde::*;

fn i64_to_u64<'d, V: Visitor<'d>, E: Error>(v: V, n: i64) -> Result<V::Value, E> {
    if n >= 0 {
        v.visit_u64(n as u64)
    } else {
        Err(E::invalid_value(Unexpected::Signed(n), &v))
    }
}

/// Ignore deserialization errors and revert to default.
pub fn ignore_errors<'d, T: Deserialize<'d> + Default, D: Deserializer<'d>>(
    d: D,
) -> Result<T, D::Error> {
    use serde_json::Value;

    let v = Value::deserialize(d)?;
    Ok(T::deserialize(v).ok().unwrap_or_default())
}

/// Deserialize a maybe-string snowflake ID into a u64.
pub fn deserialize_id<'d, D: Deserializer<'d>>(d: D) -> Result<u64, D::Error> {
    struct IdVisitor;
    impl<'d> Visitor<'d> for IdVisitor {
        type Value = u64;

        fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
            write!(fmt, "a u64 or parseable string")
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<u64, E> {
            i64_to_u64(self, v)
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<u64, E> {
            v.parse::<u64>()
                .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
        }
    }

    d.deserialize_any(IdVisitor)
}

/// Same as [`deserialize_id`] but for an optional field.
pub fn deserialize_id_opt<'d, D: Deserializer<'d>>(d: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_id")] u64);

    Ok(Option::<Wrapper>::deserialize(d)?.map(|w| w.0))
}

/// Make sure a field holds a certain numeric value, or fail otherwise.
///
/// Used for gateway opcode fields, which are serde-tagged by value rather
/// than by name.
#[derive(Debug, Clone, Default)]
pub struct Eq<const N: u64>;

impl<'de, const N: u64> Deserialize<'de> for Eq<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NumberVisitor<const N: u64>;

        impl<'d, const N: u64> Visitor<'d> for NumberVisitor<N> {
            type Value = u64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "the number {}", N)
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                if v == N {
                    Ok(v)
                } else {
                    Err(E::invalid_value(Unexpected::Unsigned(v), &self))
                }
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                if v as u64 == N && v >= 0 {
                    Ok(v as u64)
                } else {
                    Err(E::invalid_value(Unexpected::Signed(v), &self))
                }
            }
        }

        deserializer.deserialize_any(NumberVisitor::<N>)?;
        Ok(Self)
    }
}

impl<const N: u64> Serialize for Eq<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(N)
    }
}

/// Declares a newtype wrapper around a snowflake id, with flexible
/// int-or-string (de)serialization matching what both backends send on the
/// wire.
macro_rules! snowflake {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        pub struct $name(#[serde(deserialize_with = "crate::serial::deserialize_id", serialize_with = "crate::serial::serialize_id_as_string")] pub u64);

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                crate::serial::deserialize_id(d).map($name)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                $name(v)
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map($name)
            }
        }
    };
}

pub(crate) use snowflake;

pub fn serialize_id_as_string<S: Serializer>(id: &u64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_accepts_matching_value() {
        #[derive(Deserialize)]
        struct Op {
            op: Eq<10>,
        }
        let parsed: Op = serde_json::from_str(r#"{"op":10}"#).unwrap();
        let _ = parsed.op;
    }

    #[test]
    fn eq_rejects_mismatched_value() {
        #[derive(Deserialize)]
        struct Op {
            #[allow(dead_code)]
            op: Eq<10>,
        }
        let result: Result<Op, _> = serde_json::from_str(r#"{"op":11}"#);
        assert!(result.is_err());
    }

    #[test]
    fn deserialize_id_accepts_string_and_number() {
        #[derive(Deserialize)]
        struct Id(#[serde(deserialize_with = "deserialize_id")] u64);
        let from_str: Id = serde_json::from_str(r#""123456789012345678""#).unwrap();
        let from_num: Id = serde_json::from_str(r#"123456789012345678"#).unwrap();
        assert_eq!(from_str.0, from_num.0);
    }
}
