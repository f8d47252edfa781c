//! Client model name resolution

use indexmap::IndexMap;

use crate::protocol::openai::{OpenAiModel, OpenAiModelList};

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("gpt-4o-mini", "claude-3-5-haiku-latest"),
    ("o3-mini", "claude-opus-4-20250514"),
    ("o1-mini", "claude-sonnet-4-20250514"),
    ("gpt-4o", "claude-3-7-sonnet-20250219"),
];

/// Alias table from client-facing model names to backend model names
#[derive(Debug, Clone)]
pub struct ModelMap {
    aliases: IndexMap<String, String>,
}

impl ModelMap {
    /// Built-in aliases overlaid with configured ones
    pub fn new(overrides: &IndexMap<String, String>) -> Self {
        let mut aliases: IndexMap<String, String> = BUILTIN_ALIASES
            .iter()
            .map(|(alias, target)| ((*alias).to_owned(), (*target).to_owned()))
            .collect();

        for (alias, target) in overrides {
            aliases.insert(alias.clone(), target.clone());
        }

        Self { aliases }
    }

    /// Backend model for a client model name
    ///
    /// Exact aliases win, then the longest alias the name starts with.
    /// Backend names and unknown names pass through.
    pub fn resolve<'a>(&'a self, model: &'a str) -> &'a str {
        if let Some(target) = self.aliases.get(model) {
            return target;
        }
        if model.starts_with("claude-") {
            return model;
        }

        self.aliases
            .iter()
            .filter(|(alias, _)| model.starts_with(alias.as_str()))
            .max_by_key(|(alias, _)| alias.len())
            .map_or(model, |(_, target)| target.as_str())
    }

    /// Models in `OpenAI` list shape: every alias, then every distinct backend target
    pub fn list(&self) -> OpenAiModelList {
        let mut ids: Vec<&str> = self.aliases.keys().map(String::as_str).collect();
        for target in self.aliases.values() {
            if !ids.contains(&target.as_str()) {
                ids.push(target);
            }
        }

        OpenAiModelList {
            object: "list".to_owned(),
            data: ids
                .into_iter()
                .map(|id| OpenAiModel {
                    id: id.to_owned(),
                    object: "model".to_owned(),
                    created: 0,
                    owned_by: if id.starts_with("claude-") { "anthropic" } else { "conduit" }.to_owned(),
                })
                .collect(),
        }
    }
}

impl Default for ModelMap {
    fn default() -> Self {
        Self::new(&IndexMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_aliases() {
        let map = ModelMap::default();
        assert_eq!(map.resolve("gpt-4o-mini"), "claude-3-5-haiku-latest");
        assert_eq!(map.resolve("o3-mini"), "claude-opus-4-20250514");
        assert_eq!(map.resolve("o1-mini"), "claude-sonnet-4-20250514");
        assert_eq!(map.resolve("gpt-4o"), "claude-3-7-sonnet-20250219");
    }

    #[test]
    fn prefix_match_prefers_longest_alias() {
        let map = ModelMap::default();
        assert_eq!(map.resolve("gpt-4o-2024-05-13"), "claude-3-7-sonnet-20250219");
        assert_eq!(map.resolve("gpt-4o-preview"), "claude-3-7-sonnet-20250219");
        assert_eq!(map.resolve("gpt-4o-mini-2024-07-18"), "claude-3-5-haiku-latest");
    }

    #[test]
    fn backend_and_unknown_names_pass_through() {
        let map = ModelMap::default();
        for model in [
            "claude-opus-4-20250514",
            "claude-3-5-haiku-20241022",
            "unknown-model",
            "my-fine-tuned-model",
        ] {
            assert_eq!(map.resolve(model), model);
        }
    }

    #[test]
    fn configured_aliases_override_builtins() {
        let overrides = IndexMap::from([
            ("gpt-4o".to_owned(), "claude-sonnet-4-20250514".to_owned()),
            ("fast".to_owned(), "claude-3-5-haiku-latest".to_owned()),
        ]);
        let map = ModelMap::new(&overrides);

        assert_eq!(map.resolve("gpt-4o"), "claude-sonnet-4-20250514");
        assert_eq!(map.resolve("fast"), "claude-3-5-haiku-latest");
        assert_eq!(map.resolve("gpt-4o-mini"), "claude-3-5-haiku-latest");
    }

    #[test]
    fn listing_includes_aliases_and_targets_once() {
        let list = ModelMap::default().list();
        let ids: Vec<&str> = list.data.iter().map(|m| m.id.as_str()).collect();

        assert_eq!(list.object, "list");
        assert_eq!(&ids[..4], ["gpt-4o-mini", "o3-mini", "o1-mini", "gpt-4o"]);
        assert_eq!(ids.len(), 8);
        assert_eq!(list.data[4].owned_by, "anthropic");
    }
}
