pub mod assistant;
pub mod lookup;
pub mod oracle;

use anyhow::{bail, Result};
use halal_contracts::catalog::{Catalog, CategorySelection};
use halal_contracts::events::EventWriter;
use halal_contracts::i18n::{Language, UiStrings};
use halal_contracts::models::{
    ModelSelection, ModelSelector, ModelSpec, CAPABILITY_CHAT, CAPABILITY_TEXT, CAPABILITY_VISION,
};
use halal_contracts::products::Product;
use halal_contracts::store::{
    PersistencePort, SliceOrigin, StateStore, CATALOG_KEY, FAVORITES_KEY, LANGUAGE_KEY,
};
use serde_json::{json, Value};

use crate::assistant::{AssistantMessage, AssistantSession};
use crate::lookup::{
    Classification, LookupClient, LookupError, LookupMachine, LookupOutcome, LookupTrigger,
};
use crate::oracle::OracleRegistry;

pub fn new_session_id() -> String {
    format!("session-{}", uuid::Uuid::new_v4().simple())
}

/// Owns the catalog, language, lookup lifecycle and assistant session for one
/// user. Every change to a persisted slice is followed by a save of that slice.
/// Event-log writes are best effort and never interrupt a state change.
pub struct HalalEngine<P: PersistencePort> {
    store: StateStore<P>,
    events: EventWriter,
    oracles: OracleRegistry,
    model_selector: ModelSelector,
    requested_model: Option<String>,
    catalog: Catalog,
    language: Language,
    lookup: LookupMachine,
    assistant: AssistantSession,
    last_fallback_reason: Option<String>,
}

impl<P: PersistencePort> HalalEngine<P> {
    pub fn new(
        port: P,
        events: EventWriter,
        oracles: OracleRegistry,
        requested_model: Option<String>,
    ) -> Self {
        let mut store = StateStore::new(port);
        let products = store.load_catalog();
        let favorites = store.load_favorites();
        let language = store.load_language();

        for (key, origin) in [
            (CATALOG_KEY, products.origin),
            (FAVORITES_KEY, favorites.origin),
            (LANGUAGE_KEY, language.origin),
        ] {
            if origin == SliceOrigin::Recovered {
                let _ = events.emit("state_slice_recovered", json!({ "slice": key }));
            }
        }

        let language = language.value;
        let catalog = Catalog::new(products.value, favorites.value);

        let _ = events.emit(
            "session_started",
            json!({
                "language": language.code(),
                "products": catalog.len(),
                "favorites": catalog.favorites().len(),
                "catalog_origin": products.origin.as_str(),
                "requested_model": requested_model,
                "oracles": oracles.names(),
            }),
        );

        Self {
            store,
            events,
            oracles,
            model_selector: ModelSelector::new(None),
            requested_model,
            catalog,
            language,
            lookup: LookupMachine::new(),
            assistant: AssistantSession::new(language),
            last_fallback_reason: None,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn strings(&self) -> &'static UiStrings {
        self.language.strings()
    }

    pub fn lookup(&self) -> &LookupMachine {
        &self.lookup
    }

    pub fn clear_focus(&mut self) {
        self.lookup.clear_focus();
    }

    pub fn assistant(&self) -> &AssistantSession {
        &self.assistant
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn port(&self) -> &P {
        self.store.port()
    }

    pub fn requested_model(&self) -> Option<&str> {
        self.requested_model.as_deref()
    }

    pub fn last_fallback_reason(&self) -> Option<&str> {
        self.last_fallback_reason.as_deref()
    }

    pub fn models(&self) -> Vec<ModelSpec> {
        self.model_selector.registry.list().cloned().collect()
    }

    pub fn filtered_view(&self, selection: &CategorySelection, search: &str) -> Vec<&Product> {
        self.catalog.filtered_view(selection, search)
    }

    pub fn set_model(&mut self, name: &str) -> Result<ModelSpec> {
        let trimmed = name.trim();
        let Some(spec) = self.model_selector.registry.get(trimmed).cloned() else {
            let available = self
                .models()
                .into_iter()
                .map(|model| model.name)
                .collect::<Vec<String>>()
                .join(", ");
            bail!("unknown model '{trimmed}' (available: {available})");
        };
        self.requested_model = Some(spec.name.clone());
        self.log(
            "model_selected",
            json!({
                "model": spec.name,
                "provider": spec.provider,
                "capabilities": spec.capabilities,
            }),
        );
        Ok(spec)
    }

    pub fn search(&mut self, query: &str) -> Result<LookupOutcome> {
        let selection = self.select_model(CAPABILITY_TEXT)?;
        let trigger = LookupTrigger::text(query);
        if !self.lookup.begin(trigger) {
            return self.ignore_lookup("text");
        }
        self.log(
            "lookup_started",
            json!({
                "trigger": "text",
                "query": query.trim(),
                "model": selection.model.name,
                "provider": selection.model.provider,
                "fallback_reason": selection.fallback_reason,
            }),
        );

        let result = match self.oracles.resolve(&selection.model.provider) {
            Ok(oracle) => {
                LookupClient::new(oracle, selection.model.name.clone()).classify_by_name(query)
            }
            Err(err) => Err(LookupError::Oracle(err)),
        };
        self.finish_lookup(result, &selection)
    }

    pub fn scan(&mut self, image_bytes: &[u8]) -> Result<LookupOutcome> {
        let selection = self.select_model(CAPABILITY_VISION)?;
        let trigger = LookupTrigger::image(image_bytes);
        let fingerprint = match &trigger {
            LookupTrigger::Image { fingerprint, .. } => fingerprint.clone(),
            LookupTrigger::Text(_) => String::new(),
        };
        if !self.lookup.begin(trigger) {
            return self.ignore_lookup("image");
        }
        self.log(
            "lookup_started",
            json!({
                "trigger": "image",
                "image_sha256": fingerprint,
                "image_bytes": image_bytes.len(),
                "model": selection.model.name,
                "provider": selection.model.provider,
                "fallback_reason": selection.fallback_reason,
            }),
        );

        let result = match self.oracles.resolve(&selection.model.provider) {
            Ok(oracle) => LookupClient::new(oracle, selection.model.name.clone())
                .classify_by_image(image_bytes),
            Err(err) => Err(LookupError::Oracle(err)),
        };
        self.finish_lookup(result, &selection)
    }

    pub fn toggle_favorite(&mut self, id: &str) -> bool {
        let id = id.trim();
        let favorite = self.catalog.toggle_favorite(id);
        let favorites = self.catalog.favorites();
        let saved = self.store.save_favorites(&favorites);
        self.report_save(FAVORITES_KEY, saved);
        self.log(
            "favorite_toggled",
            json!({
                "id": id,
                "favorite": favorite,
                "known": self.catalog.get(id).is_some(),
            }),
        );
        favorite
    }

    /// Returns `false` when `language` is already active.
    pub fn set_language(&mut self, language: Language) -> bool {
        if language == self.language {
            return false;
        }
        let previous = self.language;
        self.language = language;
        self.assistant.switch_language(language);
        let saved = self.store.save_language(language);
        self.report_save(LANGUAGE_KEY, saved);
        self.log(
            "language_changed",
            json!({
                "from": previous.code(),
                "to": language.code(),
                "rtl": language.is_rtl(),
            }),
        );
        true
    }

    /// Returns `None` when the turn is rejected (blank text or a turn in flight).
    pub fn ask(&mut self, text: &str) -> Result<Option<AssistantMessage>> {
        let selection = self.select_model(CAPABILITY_CHAT)?;
        let awaiting = self.assistant.is_awaiting();
        let Some(turn) = self.assistant.begin_turn(text) else {
            self.log(
                "assistant_rejected",
                json!({
                    "reason": if awaiting { "busy" } else { "blank" },
                }),
            );
            return Ok(None);
        };

        let chars_in = turn.text.chars().count();
        let reply = self
            .oracles
            .resolve(&selection.model.provider)
            .and_then(|oracle| oracle.generate(&turn.into_request(selection.model.name.clone())));
        let warnings = reply
            .as_ref()
            .map(|reply| reply.warnings.clone())
            .unwrap_or_default();
        let error = reply.as_ref().err().map(ToString::to_string);
        let message = self
            .assistant
            .complete_turn(reply.map(|reply| reply.text))
            .clone();

        self.log(
            "assistant_turn",
            json!({
                "model": selection.model.name,
                "provider": selection.model.provider,
                "language": self.language.code(),
                "chars_in": chars_in,
                "chars_out": message.text.chars().count(),
                "ok": error.is_none(),
                "error": error,
                "warnings": warnings,
            }),
        );
        Ok(Some(message))
    }

    fn select_model(&mut self, capability: &str) -> Result<ModelSelection> {
        let selection = self
            .model_selector
            .select(self.requested_model.as_deref(), capability)
            .map_err(anyhow::Error::msg)?;
        self.last_fallback_reason = selection
            .fallback_reason
            .clone()
            .filter(|_| self.requested_model.is_some());
        Ok(selection)
    }

    fn ignore_lookup(&self, trigger: &str) -> Result<LookupOutcome> {
        self.log(
            "lookup_ignored",
            json!({
                "trigger": trigger,
                "pending": self.lookup.is_pending(),
            }),
        );
        Ok(LookupOutcome::Ignored)
    }

    fn finish_lookup(
        &mut self,
        result: std::result::Result<Classification, LookupError>,
        selection: &ModelSelection,
    ) -> Result<LookupOutcome> {
        let failure_kind = result.as_ref().err().map(LookupError::kind);
        let (result, warnings) = match result {
            Ok(found) => (Ok(found.product), found.warnings),
            Err(err) => (Err(err), Vec::new()),
        };
        let outcome = self
            .lookup
            .complete(result, &mut self.catalog, self.language.strings());

        match &outcome {
            LookupOutcome::Found(product) => {
                let saved = self.store.save_catalog(self.catalog.products());
                self.report_save(CATALOG_KEY, saved);
                self.log(
                    "lookup_succeeded",
                    json!({
                        "product_id": product.id,
                        "name": product.name,
                        "status": product.status.code(),
                        "category": product.category,
                        "model": selection.model.name,
                        "warnings": warnings,
                    }),
                );
            }
            LookupOutcome::Failed { reason, .. } => {
                self.log(
                    "lookup_failed",
                    json!({
                        "kind": failure_kind,
                        "reason": reason,
                        "model": selection.model.name,
                    }),
                );
            }
            LookupOutcome::Ignored => {}
        }
        Ok(outcome)
    }

    /// Save failures are logged and otherwise ignored.
    fn report_save(&self, slice: &str, saved: Result<()>) {
        if let Err(err) = saved {
            self.log(
                "state_save_failed",
                json!({
                    "slice": slice,
                    "error": format!("{err:#}"),
                }),
            );
        }
    }

    fn log(&self, event_type: &str, payload: Value) {
        let _ = self.events.emit(event_type, payload);
    }
}
