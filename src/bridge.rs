use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dictionary::DictionaryEntry;
use crate::phonetic::PhoneticEngine;

/// Which layer on the native side confirmed an interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookType {
    #[serde(rename = "HAL_VIRTUAL_DEVICE")]
    HalVirtualDevice,
    #[serde(rename = "AUDIOFLINGER_HOOK")]
    AudioflingerHook,
}

impl HookType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HalVirtualDevice => "HAL_VIRTUAL_DEVICE",
            Self::AudioflingerHook => "AUDIOFLINGER_HOOK",
        }
    }
}

/// Asks the native side to mute the next stretch of audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptRequest {
    pub word: String,
    pub confidence: f64,
    pub timestamp: u64,
}

/// Per-keyword matching config compiled for the native side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordConfig {
    pub pinyin: Vec<String>,
    pub threshold: f64,
    pub beep_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfigPayload {
    pub keywords: Vec<KeywordConfig>,
    pub global_sensitivity: f64,
}

/// Operator feedback that a fired interception was wrong. Informational;
/// nothing downstream depends on it yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkFalsePositivePayload {
    pub word: String,
    pub timestamp: u64,
}

/// Acknowledgement sent back by the native side once a request took effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskInterceptedPayload {
    pub word: String,
    pub timestamp: u64,
    pub confidence: f64,
    pub hook_type: HookType,
}

/// Everything the session can send across the channel, tagged the way the
/// native side dispatches on event names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundMessage {
    #[serde(rename = "INTERCEPT_REQUEST")]
    InterceptRequest(InterceptRequest),
    #[serde(rename = "UPDATE_CONFIG")]
    UpdateConfig(UpdateConfigPayload),
    #[serde(rename = "MARK_FALSE_POSITIVE")]
    MarkFalsePositive(MarkFalsePositivePayload),
}

impl OutboundMessage {
    pub fn event(&self) -> &'static str {
        match self {
            Self::InterceptRequest(_) => "INTERCEPT_REQUEST",
            Self::UpdateConfig(_) => "UPDATE_CONFIG",
            Self::MarkFalsePositive(_) => "MARK_FALSE_POSITIVE",
        }
    }
}

pub type AckCallback = Box<dyn Fn(RiskInterceptedPayload) + Send + Sync>;

/// Transport towards the enforcement actuator. Implementations own delivery
/// and may invoke the ack listener from a background task.
pub trait Bridge: Send + Sync {
    fn emit(&self, message: OutboundMessage) -> Result<()>;

    /// Registers the listener for acknowledgements coming back from the
    /// native side, replacing any previous one.
    fn set_ack_listener(&self, listener: AckCallback);
}

/// Compiles the dictionary and global sensitivity into the config payload
/// pushed on every dictionary or threshold change. One element per entry,
/// keyed by the keyword's syllables; without a phonetic backend the element
/// falls back to the lowercased keyword.
pub fn build_update_config(
    entries: &[DictionaryEntry],
    phonetics: &PhoneticEngine,
    global_sensitivity: f64,
    beep_duration_ms: u64,
) -> UpdateConfigPayload {
    let keywords = entries
        .iter()
        .map(|entry| {
            let syllables = phonetics.syllables(&entry.keyword);
            let pinyin = if syllables.is_empty() {
                vec![entry.keyword.to_lowercase()]
            } else {
                syllables
            };
            KeywordConfig {
                pinyin,
                threshold: global_sensitivity,
                beep_duration: beep_duration_ms,
            }
        })
        .collect();
    UpdateConfigPayload {
        keywords,
        global_sensitivity,
    }
}

/// Stand-in for the real native channel: logs outbound traffic and answers
/// interception requests with a delayed `HAL_VIRTUAL_DEVICE` ack, the way
/// the device-side hook does. Must run inside a tokio runtime.
pub struct LoopbackBridge {
    ack_listener: Arc<Mutex<Option<AckCallback>>>,
    ack_delay: Duration,
}

impl LoopbackBridge {
    pub fn new() -> Self {
        Self::with_ack_delay(Duration::from_millis(50))
    }

    pub fn with_ack_delay(ack_delay: Duration) -> Self {
        Self {
            ack_listener: Arc::new(Mutex::new(None)),
            ack_delay,
        }
    }
}

impl Default for LoopbackBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge for LoopbackBridge {
    fn emit(&self, message: OutboundMessage) -> Result<()> {
        let json = serde_json::to_string(&message)?;
        debug!(event = message.event(), payload = %json, "bridge emit");

        if let OutboundMessage::InterceptRequest(request) = message {
            let ack = RiskInterceptedPayload {
                word: request.word,
                timestamp: request.timestamp,
                confidence: request.confidence,
                hook_type: HookType::HalVirtualDevice,
            };
            let listener = Arc::clone(&self.ack_listener);
            let delay = self.ack_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let guard = listener.lock().unwrap_or_else(|poisoned| {
                    warn!("ack listener mutex poisoned; recovering");
                    poisoned.into_inner()
                });
                if let Some(callback) = guard.as_ref() {
                    callback(ack);
                }
            });
        }
        Ok(())
    }

    fn set_ack_listener(&self, listener: AckCallback) {
        let mut guard = self.ack_listener.lock().unwrap_or_else(|poisoned| {
            warn!("ack listener mutex poisoned; recovering");
            poisoned.into_inner()
        });
        *guard = Some(listener);
    }
}

/// Captures outbound traffic instead of delivering it. Test support.
#[cfg(test)]
pub struct RecordingBridge {
    pub sent: Mutex<Vec<OutboundMessage>>,
}

#[cfg(test)]
impl RecordingBridge {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Bridge for RecordingBridge {
    fn emit(&self, message: OutboundMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn set_ack_listener(&self, _listener: AckCallback) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::RiskLevel;

    #[test]
    fn intercept_request_wire_shape() {
        let message = OutboundMessage::InterceptRequest(InterceptRequest {
            word: "私域".to_string(),
            confidence: 0.95,
            timestamp: 1_700_000_000_000,
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["event"], "INTERCEPT_REQUEST");
        assert_eq!(json["data"]["word"], "私域");
        assert_eq!(json["data"]["confidence"], 0.95);
    }

    #[test]
    fn hook_type_uses_native_names() {
        let json = serde_json::to_string(&HookType::HalVirtualDevice).unwrap();
        assert_eq!(json, "\"HAL_VIRTUAL_DEVICE\"");
        let parsed: HookType = serde_json::from_str("\"AUDIOFLINGER_HOOK\"").unwrap();
        assert_eq!(parsed, HookType::AudioflingerHook);
    }

    #[test]
    fn update_config_carries_one_element_per_entry() {
        let entries = vec![
            DictionaryEntry::new("hello", Vec::new(), RiskLevel::High),
            DictionaryEntry::new("world", Vec::new(), RiskLevel::Low),
        ];
        let phonetics = PhoneticEngine::new();
        let payload = build_update_config(&entries, &phonetics, 0.85, 200);
        assert_eq!(payload.global_sensitivity, 0.85);
        assert_eq!(payload.keywords.len(), 2);
        assert_eq!(payload.keywords[0].pinyin, vec!["hello".to_string()]);
        assert_eq!(payload.keywords[0].threshold, 0.85);
        assert_eq!(payload.keywords[0].beep_duration, 200);
    }

    #[cfg(feature = "pinyin")]
    #[test]
    fn update_config_decomposes_cjk_keywords() {
        let entries = vec![DictionaryEntry::new("私域", Vec::new(), RiskLevel::High)];
        let phonetics = PhoneticEngine::new();
        phonetics.load();
        let payload = build_update_config(&entries, &phonetics, 0.85, 200);
        assert_eq!(
            payload.keywords[0].pinyin,
            vec!["si".to_string(), "yu".to_string()]
        );
    }

    #[tokio::test]
    async fn loopback_acks_intercept_requests() {
        let bridge = LoopbackBridge::with_ack_delay(Duration::from_millis(1));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bridge.set_ack_listener(Box::new(move |ack| {
            let _ = tx.send(ack);
        }));

        bridge
            .emit(OutboundMessage::UpdateConfig(UpdateConfigPayload {
                keywords: Vec::new(),
                global_sensitivity: 0.85,
            }))
            .unwrap();
        bridge
            .emit(OutboundMessage::InterceptRequest(InterceptRequest {
                word: "私域".to_string(),
                confidence: 0.95,
                timestamp: 42,
            }))
            .unwrap();

        let ack = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("ack should arrive")
            .expect("channel open");
        assert_eq!(ack.word, "私域");
        assert_eq!(ack.timestamp, 42);
        assert_eq!(ack.hook_type, HookType::HalVirtualDevice);

        // Only the interception request is acknowledged.
        assert!(rx.try_recv().is_err());
    }
}
