//! Human-readable duration fields (`"60s"`, `"2m"`, `"500ms"`)

use std::time::Duration;

use serde::{Deserialize, Deserializer, de};

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                duration_str::parse(&raw).map_err(|e| de::Error::custom(format!("invalid duration '{raw}': {e}")))
            })
            .transpose()
    }
}
