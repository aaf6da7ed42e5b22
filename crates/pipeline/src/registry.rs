// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin name → factory registries (spec §4.1/§4.3/§4.5). A `Task` looks up
//! each `PluginSpec.name` here to construct the concrete instance its
//! `TaskConfig` asked for.

use otus_core::PluginSpec;
use otus_parsers::{FlowRegistry, Parser, Processor, SipParser};
use otus_reporters::{BatchingConfig, BatchingReporter, ConsoleSink, Reporter};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("unknown parser plugin {0:?}")]
    UnknownParser(String),
    #[error("unknown processor plugin {0:?}")]
    UnknownProcessor(String),
    #[error("unknown reporter plugin {0:?}")]
    UnknownReporter(String),
    #[error("plugin init failed: {0}")]
    InitFailed(String),
}

/// Builds the parser chain for a Pipeline from its `TaskConfig.parsers`.
/// The SIP parser is bound to the Task's shared Flow Registry; anything
/// unrecognized fails Task construction rather than silently falling back.
pub fn build_parsers(specs: &[PluginSpec], registry: &Arc<FlowRegistry>) -> Result<Vec<Box<dyn Parser>>, PluginError> {
    specs
        .iter()
        .map(|spec| match spec.name.as_str() {
            "sip" => {
                let mut parser = SipParser::new();
                otus_parsers::FlowRegistryAware::bind_registry(&mut parser, Arc::clone(registry));
                Ok(Box::new(parser) as Box<dyn Parser>)
            }
            other => Err(PluginError::UnknownParser(other.to_string())),
        })
        .collect()
}

/// Processors have no built-in implementations yet (spec §4.4 describes the
/// contract only); an empty `TaskConfig.processors` list is the common case.
pub fn build_processors(specs: &[PluginSpec]) -> Result<Vec<Box<dyn Processor>>, PluginError> {
    if let Some(spec) = specs.first() {
        return Err(PluginError::UnknownProcessor(spec.name.clone()));
    }
    Ok(Vec::new())
}

/// Builds one [`Reporter`] per `TaskConfig.reporters` entry, each wrapped in
/// its own [`BatchingReporter`] (spec §4.5).
pub fn build_reporters(specs: &[PluginSpec]) -> Result<Vec<Arc<dyn Reporter>>, PluginError> {
    specs
        .iter()
        .map(|spec| build_one_reporter(spec))
        .collect()
}

fn build_one_reporter(spec: &PluginSpec) -> Result<Arc<dyn Reporter>, PluginError> {
    let config = batching_config_from(&spec.config);
    match spec.name.as_str() {
        "console" => Ok(Arc::new(BatchingReporter::new(ConsoleSink, None, config))),
        #[cfg(feature = "kafka")]
        "kafka" => {
            let sink_config = kafka_sink_config_from(&spec.config)?;
            let sink = otus_reporters::KafkaSink::new(sink_config).map_err(|err| PluginError::InitFailed(err.to_string()))?;
            Ok(Arc::new(BatchingReporter::new(sink, None, config)))
        }
        other => Err(PluginError::UnknownReporter(other.to_string())),
    }
}

fn batching_config_from(config: &serde_json::Value) -> BatchingConfig {
    let mut batching = BatchingConfig::default();
    if let Some(n) = config.get("batch_size").and_then(|v| v.as_u64()) {
        batching.batch_size = n as usize;
    }
    if let Some(ms) = config.get("batch_timeout_ms").and_then(|v| v.as_u64()) {
        batching.batch_timeout = std::time::Duration::from_millis(ms);
    }
    batching
}

#[cfg(feature = "kafka")]
fn kafka_sink_config_from(config: &serde_json::Value) -> Result<otus_reporters::KafkaSinkConfig, PluginError> {
    let brokers = config
        .get("brokers")
        .and_then(|v| v.as_str())
        .ok_or_else(|| PluginError::InitFailed("kafka reporter config missing `brokers`".into()))?
        .to_string();
    let routing = match (config.get("topic").and_then(|v| v.as_str()), config.get("topic_prefix").and_then(|v| v.as_str())) {
        (Some(topic), None) => otus_reporters::TopicRouting::Fixed(topic.to_string()),
        (None, Some(prefix)) => otus_reporters::TopicRouting::PrefixByPayloadType(prefix.to_string()),
        _ => return Err(PluginError::InitFailed("kafka reporter needs exactly one of `topic`/`topic_prefix`".into())),
    };
    Ok(otus_reporters::KafkaSinkConfig { brokers, routing, send_timeout: std::time::Duration::from_secs(3) })
}
