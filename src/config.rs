use std::collections::HashMap;

use log::warn;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXPOSURE: f32 = 1.0;
pub const DEFAULT_AUTO_ROTATE_SPEED: f32 = 0.4;

/// Read-only view over the attributes of a render target.
pub trait AttributeSource {
    fn attribute(&self, name: &str) -> Option<String>;
}

impl AttributeSource for HashMap<String, String> {
    fn attribute(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

#[cfg(target_arch = "wasm32")]
impl AttributeSource for web_sys::Element {
    fn attribute(&self, name: &str) -> Option<String> {
        self.get_attribute(name)
    }
}

/// Per-canvas viewer configuration, parsed once before the viewer starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    #[serde(rename = "model")]
    pub model_url: String,
    #[serde(rename = "env")]
    pub environment_url: String,
    pub exposure: f32,
    #[serde(rename = "autorotate")]
    pub auto_rotate: bool,
    #[serde(rename = "speed")]
    pub auto_rotate_speed: f32,
    #[serde(rename = "badge")]
    pub status_badge: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model_url: String::new(),
            environment_url: String::new(),
            exposure: DEFAULT_EXPOSURE,
            auto_rotate: false,
            auto_rotate_speed: DEFAULT_AUTO_ROTATE_SPEED,
            status_badge: false,
        }
    }
}

impl ViewerConfig {
    /// Reads the `data-*` attributes of a render target.
    ///
    /// Missing or empty attributes fall back to their defaults. Numbers that
    /// do not parse are reported and replaced by the default as well.
    pub fn from_attributes(source: &impl AttributeSource) -> Self {
        Self::default().with_overrides(source)
    }

    /// Applies every attribute the source actually sets on top of `self`.
    pub fn with_overrides(mut self, source: &impl AttributeSource) -> Self {
        let read = |name: &str| {
            source
                .attribute(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(url) = read("data-model") {
            self.model_url = url;
        }
        if let Some(url) = read("data-env") {
            self.environment_url = url;
        }
        if let Some(value) = read("data-exposure") {
            self.exposure = parse_number("data-exposure", &value, self.exposure);
        }
        if let Some(value) = read("data-autorotate") {
            self.auto_rotate = value == "true";
        }
        if let Some(value) = read("data-speed") {
            self.auto_rotate_speed = parse_number("data-speed", &value, self.auto_rotate_speed);
        }
        if let Some(value) = read("data-badge") {
            self.status_badge = value == "true";
        }
        self
    }

    /// Parses a TOML document using the attribute names without the `data-`
    /// prefix as keys.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn has_model(&self) -> bool {
        !self.model_url.is_empty()
    }

    pub fn has_environment(&self) -> bool {
        !self.environment_url.is_empty()
    }
}

fn parse_number(name: &str, value: &str, fallback: f32) -> f32 {
    match value.parse::<f32>() {
        Ok(number) if number.is_finite() => number,
        _ => {
            warn!("ignoring {name}={value:?}: not a finite number, using {fallback}");
            fallback
        }
    }
}
