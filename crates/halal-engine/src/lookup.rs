use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use halal_contracts::catalog::Catalog;
use halal_contracts::i18n::UiStrings;
use halal_contracts::products::{DietaryStatus, Product, ProductFragment};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::oracle::{product_schema, Oracle, OracleError, OraclePart, OracleRequest};

pub const SCAN_IMAGE_MIME: &str = "image/jpeg";
pub const DEFAULT_SCAN_MAX_DIM: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' has an unexpected type")]
    InvalidField(&'static str),
    #[error("unknown status '{0}'")]
    InvalidStatus(String),
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup query is empty")]
    EmptyQuery,
    #[error("scanned image is empty")]
    EmptyImage,
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("oracle response could not be used: {0}")]
    Unparseable(#[from] ParseError),
}

impl LookupError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::EmptyImage => "empty_image",
            Self::Oracle(OracleError::MissingCredential { .. }) => "missing_credential",
            Self::Oracle(_) => "oracle",
            Self::Unparseable(_) => "unparseable",
        }
    }
}

/// A classified product plus any oracle warnings raised while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub product: Product,
    pub warnings: Vec<String>,
}

/// Asks an oracle to classify one product. Never touches the catalog.
pub struct LookupClient<'a> {
    oracle: &'a dyn Oracle,
    model: String,
}

impl<'a> LookupClient<'a> {
    pub fn new(oracle: &'a dyn Oracle, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    pub fn classify_by_name(&self, query: &str) -> Result<Classification, LookupError> {
        if query.trim().is_empty() {
            return Err(LookupError::EmptyQuery);
        }
        let request = OracleRequest {
            model: self.model.clone(),
            parts: vec![OraclePart::Text(name_prompt(query))],
            system_instruction: None,
            response_schema: Some(product_schema()),
        };
        let reply = self.oracle.generate(&request)?;
        let fragment = parse_product_response(&reply.text)?;
        Ok(Classification {
            product: fragment.into_product(new_product_id(), placeholder_image_url(query)),
            warnings: reply.warnings,
        })
    }

    pub fn classify_by_image(&self, image_bytes: &[u8]) -> Result<Classification, LookupError> {
        if image_bytes.is_empty() {
            return Err(LookupError::EmptyImage);
        }
        let request = OracleRequest {
            model: self.model.clone(),
            parts: vec![
                OraclePart::InlineImage {
                    mime: SCAN_IMAGE_MIME.to_string(),
                    bytes: image_bytes.to_vec(),
                },
                OraclePart::Text(
                    "Identify the product in the photo and its halal status. Answer only in JSON."
                        .to_string(),
                ),
            ],
            system_instruction: None,
            response_schema: Some(product_schema()),
        };
        let reply = self.oracle.generate(&request)?;
        let fragment = parse_product_response(&reply.text)?;
        Ok(Classification {
            product: fragment.into_product(new_product_id(), image_data_url(image_bytes)),
            warnings: reply.warnings,
        })
    }
}

fn name_prompt(query: &str) -> String {
    format!(
        "You are an expert on halal products. Analyze \"{query}\". \
         Answer in JSON. If it is an E-additive, explain its origin. \
         State the status (HALAL, HARAM, MUSHBOOH)."
    )
}

/// Reads the first `{` through the last `}` when present, otherwise the whole
/// text with any code fence removed. A malformed brace span is not retried
/// against the whole text.
pub fn parse_product_response(text: &str) -> Result<ProductFragment, ParseError> {
    let candidate = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => text[start..=end].to_string(),
        _ => strip_code_fence(text),
    };
    let value: Value =
        serde_json::from_str(&candidate).map_err(|err| ParseError::InvalidJson(err.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    let status_raw = required_str(object, "status")?;
    let status = status_raw
        .parse::<DietaryStatus>()
        .map_err(|_| ParseError::InvalidStatus(status_raw.trim().to_string()))?;

    Ok(ProductFragment {
        name: required_str(object, "name")?.to_string(),
        brand: required_str(object, "brand")?.to_string(),
        flavor: optional_str(object, "flavor")?,
        status,
        category: required_str(object, "category")?.to_string(),
        ingredients: required_str_list(object, "ingredients")?,
        explanation: required_str(object, "explanation")?.to_string(),
        religious_reference: optional_str(object, "religiousReference")?,
    })
}

fn strip_code_fence(text: &str) -> String {
    let raw = text.trim();
    if !(raw.starts_with("```") && raw.ends_with("```")) {
        return raw.to_string();
    }
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 2 {
        return raw.to_string();
    }
    let mut body = lines[1..lines.len() - 1].join("\n").trim().to_string();
    if body.to_ascii_lowercase().starts_with("json") {
        body = body[4..].trim().to_string();
    }
    body
}

fn required_str<'v>(
    object: &'v Map<String, Value>,
    key: &'static str,
) -> Result<&'v str, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(ParseError::MissingField(key)),
        Some(Value::String(text)) => Ok(text.as_str()),
        Some(_) => Err(ParseError::InvalidField(key)),
    }
}

fn optional_str(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(ParseError::InvalidField(key)),
    }
}

fn required_str_list(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<Vec<String>, ParseError> {
    let items = match object.get(key) {
        None | Some(Value::Null) => return Err(ParseError::MissingField(key)),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ParseError::InvalidField(key)),
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or(ParseError::InvalidField(key))
        })
        .collect()
}

pub fn new_product_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn placeholder_image_url(query: &str) -> String {
    format!(
        "https://picsum.photos/seed/{}/400/300",
        encode_uri_component(query)
    )
}

pub fn image_data_url(image_bytes: &[u8]) -> String {
    format!("data:{SCAN_IMAGE_MIME};base64,{}", BASE64.encode(image_bytes))
}

/// Hex SHA-256 of the scanned bytes, used in logs instead of the image.
pub fn image_fingerprint(image_bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(image_bytes))
}

/// Percent-encodes everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
fn encode_uri_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')');
        if keep {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Re-encodes a photo as JPEG no larger than `max_dim` on either side,
/// flattening transparency onto white. Undecodable files are passed through.
pub fn prepare_scan_image(path: &Path, max_dim: u32) -> Result<Vec<u8>> {
    let raw = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let Ok(decoded) = image::load_from_memory(&raw) else {
        return Ok(raw);
    };

    let dim = max_dim.max(128);
    let fitted = if decoded.width() > dim || decoded.height() > dim {
        decoded.resize(dim, dim, FilterType::Triangle)
    } else {
        decoded
    };

    let rgba = fitted.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]),
        );
    }

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
    if encoder.encode_image(&flattened).is_err() {
        return Ok(raw);
    }
    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTrigger {
    Text(String),
    Image { fingerprint: String, size: usize },
}

impl LookupTrigger {
    pub fn text(query: impl Into<String>) -> Self {
        Self::Text(query.into())
    }

    pub fn image(image_bytes: &[u8]) -> Self {
        Self::Image {
            fingerprint: image_fingerprint(image_bytes),
            size: image_bytes.len(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image { .. } => "image",
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Self::Text(query) => query.trim().is_empty(),
            Self::Image { size, .. } => *size == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LookupState {
    #[default]
    Idle,
    Pending(LookupTrigger),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Ignored,
    Found(Product),
    Failed { message: String, reason: String },
}

/// At most one lookup in flight. Every completion returns to `Idle`.
#[derive(Debug, Clone, Default)]
pub struct LookupMachine {
    state: LookupState,
    last_error: Option<String>,
    focused: Option<Product>,
}

impl LookupMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LookupState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, LookupState::Pending(_))
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn focused(&self) -> Option<&Product> {
        self.focused.as_ref()
    }

    pub fn clear_focus(&mut self) {
        self.focused = None;
    }

    /// Returns `false` for blank input or while another lookup is pending.
    pub fn begin(&mut self, trigger: LookupTrigger) -> bool {
        if trigger.is_blank() || self.is_pending() {
            return false;
        }
        self.last_error = None;
        self.state = LookupState::Pending(trigger);
        true
    }

    pub fn complete(
        &mut self,
        result: Result<Product, LookupError>,
        catalog: &mut Catalog,
        strings: &UiStrings,
    ) -> LookupOutcome {
        if !self.is_pending() {
            return LookupOutcome::Ignored;
        }
        self.state = LookupState::Idle;
        match result {
            Ok(product) => {
                catalog.merge(product.clone());
                self.focused = Some(product.clone());
                LookupOutcome::Found(product)
            }
            Err(err) => {
                let message = strings.error_msg.to_string();
                self.last_error = Some(message.clone());
                LookupOutcome::Failed {
                    message,
                    reason: err.to_string(),
                }
            }
        }
    }
}
