use std::sync::Arc;

use anyhow::Result;
use ferrous_opencc::{config::BuiltinConfig, OpenCC};
use tracing::{debug, info, warn};

use crate::bridge::{
    build_update_config, Bridge, InterceptRequest, MarkFalsePositivePayload, OutboundMessage,
};
use crate::dictionary::DictionaryStore;
use crate::managers::history::InterceptHistory;
use crate::matcher::{scan, MatchResult};
use crate::phonetic::PhoneticEngine;
use crate::settings::AppSettings;
use crate::text::normalize;
use crate::transcript::{TranscriptEntry, TranscriptLog};

/// Confidence reported with every interception request.
const INTERCEPT_CONFIDENCE: f64 = 0.95;

/// Audit progress for one monitoring session. Exactly one writer: the
/// session that owns it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditState {
    /// Chars of the cumulative normalized text already scanned.
    pub pointer: usize,
    /// Epoch ms of the last fired interception event; 0 means never.
    pub last_trigger_ms: u64,
}

/// What one transcript update produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOutcome {
    pub hit: Option<MatchResult>,
    /// True when an interception event was actually emitted; a hit inside
    /// the cooldown window leaves this false.
    pub fired: bool,
}

/// Debounce decision: fire only when strictly more than `cooldown_ms` has
/// passed since the last fired event. Returns the firing decision and the
/// timestamp to carry forward.
pub fn evaluate_trigger(now_ms: u64, last_trigger_ms: u64, cooldown_ms: u64) -> (bool, u64) {
    if now_ms.saturating_sub(last_trigger_ms) > cooldown_ms {
        (true, now_ms)
    } else {
        (false, last_trigger_ms)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One monitoring session: owns the audit state, the dictionary snapshot,
/// the transcript log and the channel handle, and turns raw transcript
/// updates into debounced interception events.
pub struct MonitorSession {
    session_id: String,
    settings: AppSettings,
    dictionary: DictionaryStore,
    phonetics: Arc<PhoneticEngine>,
    bridge: Arc<dyn Bridge>,
    history: Option<Arc<InterceptHistory>>,
    folder: Option<OpenCC>,
    audit: AuditState,
    transcript: TranscriptLog,
}

impl MonitorSession {
    pub fn new(
        settings: AppSettings,
        dictionary: DictionaryStore,
        phonetics: Arc<PhoneticEngine>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let folder = if settings.fold_traditional {
            match OpenCC::from_config(BuiltinConfig::T2s) {
                Ok(converter) => Some(converter),
                Err(error) => {
                    warn!(%error, "traditional folding unavailable, continuing without");
                    None
                }
            }
        } else {
            None
        };
        let transcript = TranscriptLog::new(settings.transcript_capacity);
        Self {
            session_id,
            settings,
            dictionary,
            phonetics,
            bridge,
            history: None,
            folder,
            audit: AuditState::default(),
            transcript,
        }
    }

    /// Persist fired events into the given history store.
    pub fn with_history(mut self, history: Arc<InterceptHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn audit(&self) -> AuditState {
        self.audit
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn dictionary(&self) -> &DictionaryStore {
        &self.dictionary
    }

    /// Begins monitoring: resets the audit state, pushes the current
    /// matching config downstream and warms the phonetic backend on a
    /// background task. Must run inside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        self.audit = AuditState::default();
        info!(
            session = %self.session_id,
            entries = self.dictionary.len(),
            threshold = self.settings.similarity_threshold,
            "monitoring started"
        );
        self.push_config()?;

        let phonetics = Arc::clone(&self.phonetics);
        tokio::task::spawn_blocking(move || {
            if !phonetics.load() {
                debug!("phonetic backend unavailable, exact matching only");
            }
        });
        Ok(())
    }

    /// Replaces the dictionary snapshot wholesale and pushes the new
    /// config downstream.
    pub fn set_dictionary(&mut self, dictionary: DictionaryStore) -> Result<()> {
        self.dictionary = dictionary;
        self.push_config()
    }

    /// Updates the global similarity threshold and pushes the new config
    /// downstream.
    pub fn set_similarity_threshold(&mut self, threshold: f64) -> Result<()> {
        self.settings.similarity_threshold = threshold;
        self.push_config()
    }

    /// Flags the most recent interception as wrong, for downstream tuning.
    pub fn mark_false_positive(&self, word: &str) -> Result<()> {
        info!(session = %self.session_id, %word, "marked false positive");
        self.bridge
            .emit(OutboundMessage::MarkFalsePositive(MarkFalsePositivePayload {
                word: word.to_string(),
                timestamp: now_ms(),
            }))
    }

    /// Processes one transcript update with the current wall clock.
    pub fn feed(&mut self, text: &str) -> Result<AuditOutcome> {
        self.feed_at(text, now_ms())
    }

    /// Processes one transcript update at an explicit timestamp.
    ///
    /// `text` is the full recognized text so far. The unscanned suffix of
    /// its normalized form is matched against the dictionary; any hit
    /// advances the audit pointer to the end of the text, and a hit
    /// outside the cooldown window fires an interception request. When
    /// nothing matches the pointer stays put, so a keyword straddling the
    /// boundary is still caught once the rest of it arrives.
    pub fn feed_at(&mut self, text: &str, now: u64) -> Result<AuditOutcome> {
        if text.trim().is_empty() {
            return Ok(AuditOutcome {
                hit: None,
                fired: false,
            });
        }

        let folded;
        let effective = match &self.folder {
            Some(converter) => {
                folded = converter.convert(text);
                folded.as_str()
            }
            None => text,
        };

        let clean = normalize(effective);
        let clean_len = clean.chars().count();
        if clean_len < self.audit.pointer {
            debug!(
                session = %self.session_id,
                pointer = self.audit.pointer,
                len = clean_len,
                "transcript shorter than audit pointer, stream replaced"
            );
            self.audit.pointer = 0;
        }

        let hit = scan(
            &clean,
            self.audit.pointer,
            self.dictionary.entries(),
            &self.phonetics,
            &self.settings.match_options(),
        );

        let mut fired = false;
        if let Some(ref result) = hit {
            // Any hit marks the whole text as audited, fired or not.
            self.audit.pointer = clean_len;

            let (fire, last) =
                evaluate_trigger(now, self.audit.last_trigger_ms, self.settings.cooldown_ms);
            self.audit.last_trigger_ms = last;

            if fire {
                fired = true;
                info!(
                    session = %self.session_id,
                    word = %result.word,
                    match_type = result.match_type.as_str(),
                    index = result.index,
                    "interception fired"
                );
                self.bridge
                    .emit(OutboundMessage::InterceptRequest(InterceptRequest {
                        word: result.word.clone(),
                        confidence: INTERCEPT_CONFIDENCE,
                        timestamp: now,
                    }))?;
                if let Some(history) = &self.history {
                    if let Err(error) =
                        history.record(&self.session_id, result, INTERCEPT_CONFIDENCE, now, text)
                    {
                        warn!(%error, "failed to record interception event");
                    }
                }
            } else {
                debug!(
                    session = %self.session_id,
                    word = %result.word,
                    "hit suppressed by cooldown"
                );
            }
        }

        self.transcript.push(TranscriptEntry {
            text: text.to_string(),
            is_risk: hit.is_some(),
            hit_word: hit.as_ref().map(|m| m.word.clone()),
            timestamp: now,
        });

        Ok(AuditOutcome { hit, fired })
    }

    fn push_config(&self) -> Result<()> {
        let payload = build_update_config(
            self.dictionary.entries(),
            &self.phonetics,
            self.settings.similarity_threshold,
            self.settings.beep_duration_ms,
        );
        self.bridge.emit(OutboundMessage::UpdateConfig(payload))
    }
}
