//! Script data model
//!
//! Chapters, script lines and characters as delivered by the project store.
//! The timeline only ever reads these; editing belongs to the script editor.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// IDS
// ═══════════════════════════════════════════════════════════════════════════════

pub type ChapterId = String;
pub type LineId = String;
pub type CharacterId = String;
pub type SoundId = String;

/// Opaque handle to a decodable audio blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(pub String);

impl AudioRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AudioRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AudioRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINE TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Reserved character names that mark narration
pub const NARRATOR_NAMES: &[&str] = &["narrator", "旁白"];
/// Reserved character names for silent placeholder lines (treated as narration)
pub const SILENCE_NAMES: &[&str] = &["[silence]", "[静音]"];
/// Reserved character names for sound-effect lines
pub const SFX_NAMES: &[&str] = &["[sfx]", "[音效]"];

/// Classification of a script line used for silence lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Narration,
    Dialogue,
    Sfx,
}

impl LineType {
    pub const ALL: [LineType; 3] = [LineType::Narration, LineType::Dialogue, LineType::Sfx];

    /// Key fragment used in silence pair keys
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Narration => "narration",
            Self::Dialogue => "dialogue",
            Self::Sfx => "sfx",
        }
    }

    /// Derive the line type from the owning character (absent ⇒ narration)
    pub fn of(character: Option<&Character>) -> Self {
        character.map(Character::line_type).unwrap_or(Self::Narration)
    }
}

impl fmt::Display for LineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHARACTER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
}

impl Character {
    pub fn new(id: impl Into<CharacterId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn line_type(&self) -> LineType {
        let name = self.name.trim().to_lowercase();
        let matches = |names: &[&str]| names.iter().any(|n| *n == name);

        if matches(SFX_NAMES) {
            LineType::Sfx
        } else if matches(NARRATOR_NAMES) || matches(SILENCE_NAMES) {
            LineType::Narration
        } else {
            LineType::Dialogue
        }
    }
}

/// Characters indexed by id
#[derive(Debug, Clone, Default)]
pub struct CharacterIndex {
    by_id: HashMap<CharacterId, Character>,
}

impl CharacterIndex {
    pub fn new(characters: impl IntoIterator<Item = Character>) -> Self {
        Self {
            by_id: characters.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Character> {
        self.by_id.get(id)
    }

    /// Character owning a line, if any and if known
    pub fn for_line(&self, line: &ScriptLine) -> Option<&Character> {
        line.character_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn line_type(&self, line: &ScriptLine) -> LineType {
        LineType::of(self.for_line(line))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PINNED SOUND
// ═══════════════════════════════════════════════════════════════════════════════

/// A library sound anchored to a character offset inside a line's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedSound {
    /// Keyword as written in the script; `<...>` marks background music
    pub keyword: String,
    /// Character offset into the line text
    pub index: usize,
    /// Sound library item
    pub sound_id: SoundId,
}

impl PinnedSound {
    pub fn new(keyword: impl Into<String>, index: usize, sound_id: impl Into<SoundId>) -> Self {
        Self {
            keyword: keyword.into(),
            index,
            sound_id: sound_id.into(),
        }
    }

    pub fn is_bgm(&self) -> bool {
        let keyword = self.keyword.trim();
        keyword.len() >= 2 && keyword.starts_with('<') && keyword.ends_with('>')
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT LINE / CHAPTER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    pub id: LineId,
    pub text: String,
    #[serde(default)]
    pub character_id: Option<CharacterId>,
    #[serde(default)]
    pub audio: Option<AudioRef>,
    /// Explicit silence after this line; `None` applies the silence policy,
    /// `Some(0.0)` means no gap at all
    #[serde(default)]
    pub post_silence: Option<f64>,
    /// Non-default dialogue track, e.g. "OS" or "telephone"
    #[serde(default)]
    pub sound_type: Option<String>,
    #[serde(default)]
    pub pinned_sounds: Vec<PinnedSound>,
}

impl ScriptLine {
    pub fn new(id: impl Into<LineId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            character_id: None,
            audio: None,
            post_silence: None,
            sound_type: None,
            pinned_sounds: Vec::new(),
        }
    }

    pub fn with_character(mut self, character_id: impl Into<CharacterId>) -> Self {
        self.character_id = Some(character_id.into());
        self
    }

    pub fn with_audio(mut self, audio: impl Into<String>) -> Self {
        self.audio = Some(AudioRef::new(audio));
        self
    }

    pub fn with_post_silence(mut self, seconds: f64) -> Self {
        self.post_silence = Some(seconds);
        self
    }

    pub fn with_sound_type(mut self, sound_type: impl Into<String>) -> Self {
        self.sound_type = Some(sound_type.into());
        self
    }

    pub fn with_pinned_sound(mut self, pin: PinnedSound) -> Self {
        self.pinned_sounds.push(pin);
        self
    }

    /// Text length in characters, as used for pinned sound anchoring
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub lines: Vec<ScriptLine>,
}

impl Chapter {
    pub fn new(id: impl Into<ChapterId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            lines: Vec::new(),
        }
    }

    pub fn with_lines(mut self, lines: Vec<ScriptLine>) -> Self {
        self.lines = lines;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Which chapters of a project an operation covers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportScope {
    #[default]
    All,
    /// Listed chapters, kept in project order
    Chapters(Vec<ChapterId>),
}

impl ExportScope {
    pub fn includes(&self, chapter_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Chapters(ids) => ids.iter().any(|id| id == chapter_id),
        }
    }

    /// Filter chapters preserving their original order
    pub fn apply(&self, chapters: Vec<Chapter>) -> Vec<Chapter> {
        chapters.into_iter().filter(|c| self.includes(&c.id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_type_from_character_name() {
        assert_eq!(Character::new("1", "Narrator").line_type(), LineType::Narration);
        assert_eq!(Character::new("2", " 旁白 ").line_type(), LineType::Narration);
        assert_eq!(Character::new("3", "[静音]").line_type(), LineType::Narration);
        assert_eq!(Character::new("4", "[SFX]").line_type(), LineType::Sfx);
        assert_eq!(Character::new("5", "Alice").line_type(), LineType::Dialogue);
        assert_eq!(LineType::of(None), LineType::Narration);
    }

    #[test]
    fn test_unknown_character_is_narration() {
        let index = CharacterIndex::new(vec![Character::new("alice", "Alice")]);
        let line = ScriptLine::new("l1", "hi").with_character("ghost");
        assert_eq!(index.line_type(&line), LineType::Narration);

        let line = ScriptLine::new("l2", "hi").with_character("alice");
        assert_eq!(index.line_type(&line), LineType::Dialogue);
    }

    #[test]
    fn test_bgm_keyword() {
        assert!(PinnedSound::new("<rain>", 0, "s1").is_bgm());
        assert!(PinnedSound::new(" <rain> ", 0, "s1").is_bgm());
        assert!(!PinnedSound::new("door", 0, "s1").is_bgm());
        assert!(!PinnedSound::new("<", 0, "s1").is_bgm());
        assert!(!PinnedSound::new("<door", 0, "s1").is_bgm());
    }

    #[test]
    fn test_text_len_counts_chars() {
        let line = ScriptLine::new("l", "你好ab");
        assert_eq!(line.text_len(), 4);
    }

    #[test]
    fn test_scope_keeps_project_order() {
        let chapters = vec![Chapter::new("a", "A"), Chapter::new("b", "B"), Chapter::new("c", "C")];
        let scope = ExportScope::Chapters(vec!["c".into(), "a".into()]);
        let ids: Vec<_> = scope.apply(chapters).into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_post_silence_tristate_serde() {
        let unset: ScriptLine = serde_json::from_str(r#"{"id":"l","text":"t"}"#).unwrap();
        assert_eq!(unset.post_silence, None);

        let zero: ScriptLine =
            serde_json::from_str(r#"{"id":"l","text":"t","post_silence":0.0}"#).unwrap();
        assert_eq!(zero.post_silence, Some(0.0));
    }
}
