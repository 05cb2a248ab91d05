//! Korean sentence-ending completion scoring.
//!
//! Pure function of the input string: regex rule lists checked in order
//! (ENDING, then CONTINUING), falling back to an optional morphological
//! tagger and finally a neutral default. Patterns transcribed from
//! `aicc_pipeline/turn/morpheme.py`'s `ENDING_PATTERNS`/`CONTINUING_PATTERNS`.

use once_cell::sync::Lazy;
use regex::Regex;

const ENDING_SCORE: f32 = 0.95;
const CONTINUING_SCORE: f32 = 0.2;
const DEFAULT_SCORE: f32 = 0.5;

static ENDING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"습니다$", r"입니다$", r"합니다$", r"됩니다$",
        r"예요$", r"에요$", r"이에요$", r"네요$", r"군요$",
        r"거든요$", r"잖아요$", r"는데요$",
        r"나요\?*$", r"까요\?*$", r"세요\?*$", r"어요\?*$",
        r"습니까\?*$", r"입니까\?*$",
        r"하세요$", r"주세요$", r"해주세요$", r"드릴게요$",
        r"^네$", r"^예$", r"^아니요$", r"^아니오$",
        r"^알겠습니다$", r"^감사합니다$", r"^네네$", r"^아$",
        r"었어요$", r"았어요$", r"였어요$",
        r"었습니다$", r"았습니다$", r"였습니다$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static ending pattern"))
    .collect()
});

static CONTINUING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"는데$", r"인데$", r"은데$",
        r"고$", r"고요$",
        r"며$", r"서$", r"니까$", r"면$",
        r"지만$", r"라서$", r"해서$",
        r"어\.\.\.$", r"음\.\.\.$", r"그\.\.\.$",
        r"근데$", r"그래서$", r"그런데$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static continuing pattern"))
    .collect()
});

/// Morphological part-of-speech tag consulted when no regex rule matches.
///
/// No tagger ships with this crate (spec.md describes it as "optional");
/// `Tagger::None` always falls through to the 0.5 default, the same
/// no-op-capability-variant shape `vad::NeuralVad` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosTag {
    /// Final ending — sentence-complete.
    Ef,
    /// Connecting ending — sentence continues.
    Ec,
    /// Sentence-final punctuation, carrying the tag of the token before it.
    SfAfterEf,
    SfAfterEc,
    /// Terminal noun.
    Noun,
    /// Bare verb or adjective without an ending.
    Verb,
}

fn score_tag(tag: PosTag) -> f32 {
    match tag {
        PosTag::Ef => 0.85,
        PosTag::Ec => 0.3,
        PosTag::SfAfterEf => 0.9,
        PosTag::SfAfterEc => 0.35,
        PosTag::Noun => 0.4,
        PosTag::Verb => 0.3,
    }
}

/// Analyzes a Korean utterance and returns a completion score in `[0, 1]`.
///
/// `tag` is the last-token morphological tag from an external tagger, if
/// one is wired in; pass `None` when no tagger is available (the default).
pub fn analyze(text: &str, tag: Option<PosTag>) -> f32 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return DEFAULT_SCORE;
    }

    if ENDING_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
        return ENDING_SCORE;
    }

    if CONTINUING_PATTERNS.iter().any(|re| re.is_match(trimmed)) {
        return CONTINUING_SCORE;
    }

    if let Some(tag) = tag {
        return score_tag(tag);
    }

    DEFAULT_SCORE
}
