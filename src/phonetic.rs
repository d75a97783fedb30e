use once_cell::sync::OnceCell;
#[cfg(not(feature = "pinyin"))]
use tracing::debug;
#[cfg(feature = "pinyin")]
use tracing::info;

#[cfg(feature = "pinyin")]
use crate::text::contains_cjk;

#[cfg(feature = "pinyin")]
use pinyin::ToPinyin;

/// Converts text into a romanized, tone-insensitive representation so that
/// homophones compare equal (思域 and 私域 both key to "siyu").
///
/// Implementations must be infallible: any input maps to some key, even if
/// that key is just the lowercased input.
pub trait Transliterator: Send + Sync {
    /// Concatenated phonetic key with no separators, used for homophone
    /// equality and for the fuzzy similarity tier.
    fn phonetic_key(&self, s: &str) -> String;

    /// Individual tone-stripped syllables. Runs of non-CJK characters are
    /// kept together as single lowercased tokens.
    fn syllables(&self, s: &str) -> Vec<String>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Fallback used when no phonetic backend is compiled in or loaded yet.
/// Lowercases and otherwise leaves text alone, which collapses the phonetic
/// tier into a restatement of the exact tier.
pub struct IdentityTransliterator;

impl Transliterator for IdentityTransliterator {
    fn phonetic_key(&self, s: &str) -> String {
        s.to_lowercase()
    }

    fn syllables(&self, s: &str) -> Vec<String> {
        if s.is_empty() {
            Vec::new()
        } else {
            vec![s.to_lowercase()]
        }
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Pinyin-backed transliterator. Each ideograph maps to its most common
/// tone-stripped reading; characters without a reading pass through
/// lowercased.
#[cfg(feature = "pinyin")]
pub struct PinyinTransliterator;

#[cfg(feature = "pinyin")]
impl Transliterator for PinyinTransliterator {
    fn phonetic_key(&self, s: &str) -> String {
        if !contains_cjk(s) {
            return s.to_lowercase();
        }
        let mut key = String::with_capacity(s.len());
        for ch in s.chars() {
            match ch.to_pinyin() {
                Some(p) => key.push_str(p.plain()),
                None => key.extend(ch.to_lowercase()),
            }
        }
        key
    }

    fn syllables(&self, s: &str) -> Vec<String> {
        if s.is_empty() {
            return Vec::new();
        }
        if !contains_cjk(s) {
            return vec![s.to_lowercase()];
        }
        let mut out = Vec::new();
        let mut run = String::new();
        for ch in s.chars() {
            match ch.to_pinyin() {
                Some(p) => {
                    if !run.is_empty() {
                        out.push(std::mem::take(&mut run));
                    }
                    out.push(p.plain().to_string());
                }
                None => run.extend(ch.to_lowercase()),
            }
        }
        if !run.is_empty() {
            out.push(run);
        }
        out.retain(|t| !t.trim().is_empty());
        out
    }

    fn name(&self) -> &'static str {
        "pinyin"
    }
}

static FALLBACK: IdentityTransliterator = IdentityTransliterator;

/// Owns the active transliterator and its load state.
///
/// `load` installs the real backend at most once; until then every key
/// request quietly uses the identity fallback. Readiness reads are
/// consistent snapshots, so racing a load against in-flight scans is safe:
/// a scan either sees the backend or the fallback, never a torn state.
pub struct PhoneticEngine {
    backend: OnceCell<Box<dyn Transliterator>>,
}

impl PhoneticEngine {
    pub fn new() -> Self {
        Self {
            backend: OnceCell::new(),
        }
    }

    /// Installs the phonetic backend if one is compiled in. Idempotent and
    /// never fails; returns whether a CJK-capable backend is active
    /// afterwards.
    pub fn load(&self) -> bool {
        #[cfg(feature = "pinyin")]
        {
            let first = self.backend.get().is_none();
            let backend = self.backend.get_or_init(|| Box::new(PinyinTransliterator));
            if first {
                info!("phonetic backend ready: {}", backend.name());
            }
            true
        }
        #[cfg(not(feature = "pinyin"))]
        {
            debug!("no phonetic backend compiled in, keeping identity fallback");
            false
        }
    }

    /// True once a CJK-capable backend is installed.
    pub fn is_ready(&self) -> bool {
        self.backend.get().is_some()
    }

    fn active(&self) -> &dyn Transliterator {
        match self.backend.get() {
            Some(b) => b.as_ref(),
            None => &FALLBACK,
        }
    }

    pub fn phonetic_key(&self, s: &str) -> String {
        self.active().phonetic_key(s)
    }

    pub fn syllables(&self, s: &str) -> Vec<String> {
        self.active().syllables(s)
    }
}

impl Default for PhoneticEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_lowercases() {
        let t = IdentityTransliterator;
        assert_eq!(t.phonetic_key("Hello"), "hello");
        assert_eq!(t.syllables("Hello"), vec!["hello".to_string()]);
        assert!(t.syllables("").is_empty());
    }

    #[test]
    fn test_engine_falls_back_before_load() {
        let engine = PhoneticEngine::new();
        assert!(!engine.is_ready());
        assert_eq!(engine.phonetic_key("私域"), "私域");
    }

    #[cfg(feature = "pinyin")]
    #[test]
    fn test_load_is_idempotent() {
        let engine = PhoneticEngine::new();
        assert!(engine.load());
        assert!(engine.load());
        assert!(engine.is_ready());
    }

    #[cfg(feature = "pinyin")]
    #[test]
    fn test_homophones_share_a_key() {
        let engine = PhoneticEngine::new();
        engine.load();
        assert_eq!(engine.phonetic_key("私域"), "siyu");
        assert_eq!(engine.phonetic_key("思域"), "siyu");
    }

    #[cfg(feature = "pinyin")]
    #[test]
    fn test_non_cjk_passes_through_lowercased() {
        let engine = PhoneticEngine::new();
        engine.load();
        assert_eq!(engine.phonetic_key("Hello123"), "hello123");
        assert_eq!(engine.syllables("VIP"), vec!["vip".to_string()]);
    }

    #[cfg(feature = "pinyin")]
    #[test]
    fn test_mixed_text_keeps_ascii_runs() {
        let engine = PhoneticEngine::new();
        engine.load();
        assert_eq!(engine.phonetic_key("vip群"), "vipqun");
        assert_eq!(
            engine.syllables("vip群"),
            vec!["vip".to_string(), "qun".to_string()]
        );
    }

    #[cfg(feature = "pinyin")]
    #[test]
    fn test_syllable_decomposition() {
        let engine = PhoneticEngine::new();
        engine.load();
        assert_eq!(
            engine.syllables("私域流量"),
            vec![
                "si".to_string(),
                "yu".to_string(),
                "liu".to_string(),
                "liang".to_string()
            ]
        );
    }
}
