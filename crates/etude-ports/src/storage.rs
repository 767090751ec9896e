use crate::types::*;
use serde::{Deserialize, Serialize};

fn default_debounce_ms() -> u64 {
    120
}

fn default_micro_batching() -> bool {
    true
}

fn default_score_paced() -> bool {
    true
}

fn default_fermata_scale() -> f64 {
    2.5
}

fn default_phrase_scale() -> f64 {
    1.5
}

fn default_fallback_delay_ms() -> u64 {
    1_000
}

fn default_bpm() -> f64 {
    120.0
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    pub selected_midi_in: Option<DeviceId>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_micro_batching")]
    pub micro_batching_enabled: bool,
    #[serde(default = "default_score_paced")]
    pub score_paced: bool,
    #[serde(default = "default_fermata_scale")]
    pub fermata_scale: f64,
    #[serde(default = "default_phrase_scale")]
    pub phrase_scale: f64,
    #[serde(default = "default_fallback_delay_ms")]
    pub fallback_delay_ms: u64,
    #[serde(default = "default_bpm")]
    pub default_bpm: f64,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            selected_midi_in: None,
            debounce_ms: 120,
            micro_batching_enabled: true,
            score_paced: true,
            fermata_scale: 2.5,
            phrase_scale: 1.5,
            fallback_delay_ms: 1_000,
            default_bpm: 120.0,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}
