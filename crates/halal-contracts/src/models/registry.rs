use indexmap::IndexMap;

pub const CAPABILITY_TEXT: &str = "text";
pub const CAPABILITY_VISION: &str = "vision";
pub const CAPABILITY_CHAT: &str = "chat";

const ALL_CAPABILITIES: &[&str] = &[CAPABILITY_TEXT, CAPABILITY_VISION, CAPABILITY_CHAT];

/// `(name, provider, capabilities)` in preference order.
const DEFAULT_MODELS: &[(&str, &str, &[&str])] = &[
    ("gemini-3-flash-preview", "gemini", ALL_CAPABILITIES),
    ("gemini-2.5-flash", "gemini", ALL_CAPABILITIES),
    (
        "gemini-2.5-flash-lite",
        "gemini",
        &[CAPABILITY_TEXT, CAPABILITY_CHAT],
    ),
    ("dryrun-oracle-1", "dryrun", ALL_CAPABILITIES),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities.iter().map(|item| (*item).to_string()).collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Oracle models keyed by name. Iteration order is preference order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for (name, provider, capabilities) in DEFAULT_MODELS {
            registry.register(ModelSpec::new(name, provider, capabilities));
        }
        registry
    }
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self {
            models: IndexMap::new(),
        }
    }

    /// Re-registering a name replaces the spec in place.
    pub fn register(&mut self, spec: ModelSpec) {
        self.models.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name.trim())
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn first_capable(&self, capability: &str) -> Option<&ModelSpec> {
        self.models.values().find(|model| model.supports(capability))
    }
}
