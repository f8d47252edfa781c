use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Failure to expand a placeholder
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("line {line}: environment variable not found: `{name}`")]
    Missing { line: usize, name: String },
    #[error("line {line}: only variables scoped with 'env.' are supported: `{key}`")]
    UnsupportedScope { line: usize, key: String },
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // {{ env.NAME }} with an optional | default("value")
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Expand `{{ env.NAME }}` placeholders in raw TOML text
///
/// `{{ env.NAME | default("x") }}` falls back to `x` when `NAME` is unset.
/// Comment lines are left untouched so documented examples never fail a load.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut lines = Vec::new();

    for (index, line) in input.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line, index + 1)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str, number: usize) -> Result<String, ExpandError> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |captures: &Captures<'_>| {
        let key = &captures[1];
        let fallback = captures.get(2).map(|m| m.as_str());

        let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
            failure.get_or_insert(ExpandError::UnsupportedScope {
                line: number,
                key: key.to_owned(),
            });
            return String::new();
        };

        match (std::env::var(name), fallback) {
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.to_owned(),
            (Err(_), None) => {
                failure.get_or_insert(ExpandError::Missing {
                    line: number,
                    name: name.to_owned(),
                });
                String::new()
            }
        }
    });

    match failure {
        Some(error) => Err(error),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[server]\nlisten_address = \"127.0.0.1:8000\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn expands_variables() {
        temp_env::with_vars([("CONDUIT_UID", Some("1001")), ("CONDUIT_DIR", Some("/srv/agent"))], || {
            let result = expand_env("user = {{ env.CONDUIT_UID }}\ndir = \"{{env.CONDUIT_DIR}}\"").unwrap();
            assert_eq!(result, "user = 1001\ndir = \"/srv/agent\"");
        });
    }

    #[test]
    fn missing_variable_reports_line() {
        temp_env::with_var_unset("CONDUIT_MISSING", || {
            let err = expand_env("a = 1\nb = \"{{ env.CONDUIT_MISSING }}\"").unwrap_err();
            assert_eq!(
                err,
                ExpandError::Missing {
                    line: 2,
                    name: "CONDUIT_MISSING".to_owned()
                }
            );
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("CONDUIT_OPTIONAL", || {
            let result = expand_env("k = \"{{ env.CONDUIT_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "k = \"fallback\"");
        });

        temp_env::with_var("CONDUIT_OPTIONAL", Some("set"), || {
            let result = expand_env("k = \"{{ env.CONDUIT_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "k = \"set\"");
        });
    }

    #[test]
    fn rejects_other_scopes() {
        let err = expand_env("k = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert!(matches!(err, ExpandError::UnsupportedScope { line: 1, .. }));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("CONDUIT_MISSING", || {
            let input = "  # token = \"{{ env.CONDUIT_MISSING }}\"";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
