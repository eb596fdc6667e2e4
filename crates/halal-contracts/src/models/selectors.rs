use super::registry::{ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    /// Why the requested model was not used; `None` when it was.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, String> {
        let requested = requested
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let fallback_reason = match requested.as_deref() {
            Some(name) => match self.registry.get(name) {
                Some(model) if model.supports(capability) => {
                    return Ok(ModelSelection {
                        model: model.clone(),
                        requested,
                        fallback_reason: None,
                    });
                }
                Some(_) => format!("Model '{name}' does not support '{capability}'."),
                None => format!("Model '{name}' is not registered."),
            },
            None => "No model requested; using the default.".to_string(),
        };

        let model = self
            .registry
            .first_capable(capability)
            .cloned()
            .ok_or_else(|| format!("No registered model supports '{capability}'."))?;
        Ok(ModelSelection {
            model,
            requested,
            fallback_reason: Some(fallback_reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::registry::{CAPABILITY_CHAT, CAPABILITY_TEXT, CAPABILITY_VISION};
    use super::{ModelRegistry, ModelSelector, ModelSpec};

    fn selector_with(models: Vec<ModelSpec>) -> ModelSelector {
        let mut registry = ModelRegistry::empty();
        for model in models {
            registry.register(model);
        }
        ModelSelector::new(Some(registry))
    }

    #[test]
    fn falls_back_when_requested_model_lacks_capability() -> Result<(), String> {
        let selector = selector_with(vec![
            ModelSpec::new("text-only", "dryrun", &[CAPABILITY_TEXT]),
            ModelSpec::new("sees", "dryrun", &[CAPABILITY_TEXT, CAPABILITY_VISION]),
        ]);
        let selection = selector.select(Some("text-only"), CAPABILITY_VISION)?;
        assert_eq!(selection.model.name, "sees");
        assert_eq!(selection.requested.as_deref(), Some("text-only"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Model 'text-only' does not support 'vision'.")
        );
        Ok(())
    }

    #[test]
    fn unknown_request_falls_back_to_default() -> Result<(), String> {
        let selection = ModelSelector::new(None).select(Some("gpt-9"), CAPABILITY_CHAT)?;
        assert_eq!(selection.model.name, "gemini-3-flash-preview");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Model 'gpt-9' is not registered.")
        );
        Ok(())
    }

    #[test]
    fn blank_request_counts_as_none() -> Result<(), String> {
        let selection = ModelSelector::new(None).select(Some("  "), CAPABILITY_CHAT)?;
        assert_eq!(selection.requested, None);
        assert_eq!(selection.model.provider, "gemini");
        Ok(())
    }

    #[test]
    fn capable_request_is_honored() -> Result<(), String> {
        let selection =
            ModelSelector::default().select(Some("dryrun-oracle-1"), CAPABILITY_VISION)?;
        assert_eq!(selection.model.provider, "dryrun");
        assert_eq!(selection.fallback_reason, None);
        Ok(())
    }

    #[test]
    fn errors_when_nothing_is_capable() {
        let selector = selector_with(vec![ModelSpec::new(
            "text-only",
            "dryrun",
            &[CAPABILITY_TEXT],
        )]);
        assert_eq!(
            selector.select(None, CAPABILITY_VISION),
            Err("No registered model supports 'vision'.".to_string())
        );
    }
}
