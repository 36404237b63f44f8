//! Encoder and decoder plugin registry
//!
//! Maps plugin names to transform constructors. Built-in plugins:
//! - `default`, `ann` - dense transform
//! - `cnn` - convolutional transform

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{ExtractorError, Result};
use crate::transform::{ConvTransform, DenseTransform, TrainableTransform, TransformRole};

type Factory = Box<dyn Fn() -> Box<dyn TrainableTransform> + Send + Sync>;

/// Static name to constructor table for encoder and decoder plugins
pub struct PluginRegistry {
    encoders: BTreeMap<String, Factory>,
    decoders: BTreeMap<String, Factory>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("encoders", &self.encoder_names())
            .field("decoders", &self.decoder_names())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl PluginRegistry {
    /// Registry without any plugins
    pub fn empty() -> Self {
        Self {
            encoders: BTreeMap::new(),
            decoders: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in dense and convolutional plugins
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        for name in ["default", "ann"] {
            registry.register_encoder(name, move || {
                Box::new(DenseTransform::new(name, TransformRole::Encoder))
            });
            registry.register_decoder(name, move || {
                Box::new(DenseTransform::new(name, TransformRole::Decoder))
            });
        }
        registry.register_encoder("cnn", || Box::new(ConvTransform::encoder()));
        registry.register_decoder("cnn", || Box::new(ConvTransform::decoder()));
        registry
    }

    pub fn register_encoder<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn TrainableTransform> + Send + Sync + 'static,
    {
        self.encoders.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_decoder<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn TrainableTransform> + Send + Sync + 'static,
    {
        self.decoders.insert(name.to_string(), Box::new(factory));
    }

    pub fn create_encoder(&self, name: &str) -> Result<Box<dyn TrainableTransform>> {
        Self::create(&self.encoders, "encoder", name)
    }

    pub fn create_decoder(&self, name: &str) -> Result<Box<dyn TrainableTransform>> {
        Self::create(&self.decoders, "decoder", name)
    }

    /// Default parameters declared by an encoder plugin
    pub fn encoder_params(&self, name: &str) -> Result<Map<String, Value>> {
        Ok(self.create_encoder(name)?.plugin_params())
    }

    /// Default parameters declared by a decoder plugin
    pub fn decoder_params(&self, name: &str) -> Result<Map<String, Value>> {
        Ok(self.create_decoder(name)?.plugin_params())
    }

    pub fn encoder_names(&self) -> Vec<&str> {
        self.encoders.keys().map(String::as_str).collect()
    }

    pub fn decoder_names(&self) -> Vec<&str> {
        self.decoders.keys().map(String::as_str).collect()
    }

    fn create(
        table: &BTreeMap<String, Factory>,
        kind: &str,
        name: &str,
    ) -> Result<Box<dyn TrainableTransform>> {
        table
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ExtractorError::PluginNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }
}
