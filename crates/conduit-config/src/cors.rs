use std::time::Duration;

use serde::Deserialize;

/// CORS allow-list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins ("*" or explicit list)
    #[serde(default)]
    pub origins: AnyOrArray,
    /// Allowed methods ("*" or explicit list)
    #[serde(default)]
    pub methods: AnyOrArray,
    /// Allowed request headers ("*" or explicit list)
    #[serde(default)]
    pub headers: AnyOrArray,
    /// Response headers exposed to the browser
    #[serde(default)]
    pub expose_headers: Vec<String>,
    /// Allow credentials
    #[serde(default)]
    pub credentials: bool,
    /// Preflight cache lifetime
    #[serde(default, deserialize_with = "crate::duration::option::deserialize")]
    pub max_age: Option<Duration>,
}

/// Either a wildcard "*" or an explicit list of values
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawAnyOrArray")]
pub enum AnyOrArray {
    /// Match any value
    #[default]
    Any,
    /// Explicit list
    List(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAnyOrArray {
    One(String),
    Many(Vec<String>),
}

impl From<RawAnyOrArray> for AnyOrArray {
    fn from(raw: RawAnyOrArray) -> Self {
        let values = match raw {
            RawAnyOrArray::One(value) => vec![value],
            RawAnyOrArray::Many(values) => values,
        };

        if values.iter().any(|value| value == "*") {
            Self::Any
        } else {
            Self::List(values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        value: AnyOrArray,
    }

    fn parse(toml_value: &str) -> AnyOrArray {
        toml::from_str::<Wrapper>(&format!("value = {toml_value}")).unwrap().value
    }

    #[test]
    fn wildcard_string() {
        assert_eq!(parse("\"*\""), AnyOrArray::Any);
    }

    #[test]
    fn wildcard_inside_list_wins() {
        assert_eq!(parse("[\"http://a.test\", \"*\"]"), AnyOrArray::Any);
    }

    #[test]
    fn single_origin_becomes_list() {
        assert_eq!(parse("\"http://a.test\""), AnyOrArray::List(vec!["http://a.test".to_owned()]));
    }
}
