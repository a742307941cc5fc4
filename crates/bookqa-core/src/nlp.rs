//! Lightweight rule-based annotators.
//!
//! `HeuristicAnnotator` tokenizes with a Unicode word regex, tags parts of
//! speech from stop-word lists and suffixes, and extracts dates, capitalized
//! entity runs and adjective-noun key phrases. It is good enough to drive
//! expansion, weighting and metadata flags without a statistical model.
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};
use crate::traits::{Annotator, SynonymSource};
use crate::types::PosTag;

const MAX_KEY_PHRASES: usize = 10;

const EN_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "did", "do", "does", "for",
    "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it",
    "its", "me", "my", "no", "not", "of", "on", "or", "our", "she", "so", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "was", "we", "were", "what",
    "when", "where", "which", "who", "whom", "whose", "why", "will", "with", "would", "you",
    "your", "can", "could", "should", "may", "might", "must", "shall",
];

const RU_STOPWORDS: &[&str] = &[
    "и", "в", "во", "не", "что", "он", "на", "я", "с", "со", "как", "а", "то", "все", "она",
    "так", "его", "но", "да", "ты", "к", "у", "же", "вы", "за", "бы", "по", "только", "ее", "мне",
    "было", "вот", "от", "меня", "еще", "нет", "о", "из", "ему", "когда", "где", "кто", "почему",
    "какой", "какая", "какие", "зачем", "ли", "был", "была", "были", "это", "этот", "эта",
];

const EN_VERBS: &[&str] = &[
    "sat", "said", "went", "came", "made", "took", "saw", "knew", "found", "gave", "told",
    "became", "left", "felt", "brought", "began", "kept", "held", "wrote", "stood", "heard",
    "met", "ran", "paid", "lost", "die", "died", "born", "live", "write", "win", "won", "fight",
    "fought", "marry", "broke", "go", "come", "make", "take", "see", "know", "find", "give", "tell",
];

const EN_ADJECTIVES: &[&str] = &[
    "good", "bad", "big", "small", "old", "young", "new", "great", "long", "little", "high",
    "low", "large", "early", "late", "first", "last", "main", "common", "red", "black",
    "white", "dark", "free", "full", "true", "whole", "cold", "warm", "hot", "grand",
];

pub struct HeuristicAnnotator {
    word: Regex,
    date: Regex,
    entity: Regex,
}

impl HeuristicAnnotator {
    pub fn new() -> Result<Self> {
        let compile = |p: &str| Regex::new(p).map_err(|e| Error::Config(e.to_string()));
        Ok(Self {
            word: compile(r"[\p{L}\p{N}]+(?:['’-][\p{L}\p{N}]+)*")?,
            date: compile(r"\b\d{1,2}[-/]\d{1,2}[-/]\d{2,4}\b|\b\d{4}\b")?,
            entity: compile(r"\p{Lu}[\p{L}'’-]*(?:[ \t]+\p{Lu}[\p{L}'’-]*)*")?,
        })
    }

    fn tag_one(token: &str, position: usize) -> PosTag {
        let lower = token.to_lowercase();
        if token.chars().all(|c| c.is_numeric()) {
            return PosTag::Other;
        }
        if token.chars().any(is_cyrillic) {
            return tag_russian(&lower);
        }
        if EN_STOPWORDS.contains(&lower.as_str()) {
            return PosTag::Other;
        }
        let capitalized = token.chars().next().is_some_and(char::is_uppercase);
        if capitalized && position > 0 {
            return PosTag::ProperNoun;
        }
        if EN_VERBS.contains(&lower.as_str()) {
            return PosTag::Verb;
        }
        if EN_ADJECTIVES.contains(&lower.as_str()) {
            return PosTag::Adjective;
        }
        let long = lower.chars().count() > 4;
        if long && lower.ends_with("ly") {
            return PosTag::Adverb;
        }
        if long && (lower.ends_with("ing") || lower.ends_with("ed") || lower.ends_with("ize")) {
            return PosTag::Verb;
        }
        const ADJ_SUFFIXES: &[&str] = &["ful", "ous", "ive", "able", "ible", "al", "ic", "less", "ish"];
        if long && ADJ_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            return PosTag::Adjective;
        }
        PosTag::Noun
    }

    fn at_sentence_start(text: &str, offset: usize) -> bool {
        text[..offset]
            .trim_end()
            .chars()
            .last()
            .map_or(true, |c| matches!(c, '.' | '!' | '?' | '"' | '«' | '\n'))
    }
}

pub fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}')
}

fn tag_russian(lower: &str) -> PosTag {
    if RU_STOPWORDS.contains(&lower) {
        return PosTag::Other;
    }
    const VERB_ENDINGS: &[&str] = &["ть", "ти", "ться", "ла", "ли", "ло"];
    const ADJ_ENDINGS: &[&str] = &["ый", "ий", "ой", "ая", "яя", "ое", "ее", "ые", "ие"];
    if VERB_ENDINGS.iter().any(|s| lower.ends_with(s)) {
        PosTag::Verb
    } else if ADJ_ENDINGS.iter().any(|s| lower.ends_with(s)) {
        PosTag::Adjective
    } else {
        PosTag::Noun
    }
}

fn singular(lower: &str) -> String {
    if lower.chars().any(is_cyrillic) {
        return lower.to_string();
    }
    let n = lower.len();
    if n > 4 && lower.ends_with("ies") {
        return format!("{}y", &lower[..n - 3]);
    }
    if lower.ends_with("sses") {
        return lower[..n - 2].to_string();
    }
    if n > 3 && lower.ends_with('s') && !lower.ends_with("ss") && !lower.ends_with("us") && !lower.ends_with("is") {
        return lower[..n - 1].to_string();
    }
    lower.to_string()
}

impl Annotator for HeuristicAnnotator {
    fn tokenize(&self, text: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.word.find_iter(text).map(|m| m.as_str().to_string()).collect())
    }

    fn pos_tag(&self, tokens: &[String]) -> anyhow::Result<Vec<PosTag>> {
        Ok(tokens.iter().enumerate().map(|(i, t)| Self::tag_one(t, i)).collect())
    }

    fn lemmatize(&self, token: &str, pos: PosTag) -> anyhow::Result<String> {
        let lower = token.to_lowercase();
        Ok(match pos {
            PosTag::Noun | PosTag::ProperNoun => singular(&lower),
            _ => lower,
        })
    }

    fn extract_dates(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        for m in self.date.find_iter(text) {
            if !out.iter().any(|d| d == m.as_str()) {
                out.push(m.as_str().to_string());
            }
        }
        Ok(out)
    }

    fn extract_entities(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        for m in self.entity.find_iter(text) {
            let mut words: Vec<&str> = m.as_str().split_whitespace().collect();
            if words.len() == 1 && Self::at_sentence_start(text, m.start()) {
                continue;
            }
            // drop a leading stop word ("The Shire" -> "Shire")
            if words.first().is_some_and(|w| EN_STOPWORDS.contains(&w.to_lowercase().as_str())) {
                words.remove(0);
            }
            if words.is_empty() {
                continue;
            }
            let name = words.join(" ");
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Ok(out)
    }

    fn extract_key_phrases(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let tokens = self.tokenize(text)?;
        let tags = self.pos_tag(&tokens)?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut push = |phrase: &[String]| {
            if phrase.len() < 2 {
                return;
            }
            let p = phrase.join(" ").to_lowercase();
            let c = counts.entry(p.clone()).or_insert(0);
            if *c == 0 {
                order.push(p);
            }
            *c += 1;
        };

        // adjective* noun+
        let mut current: Vec<String> = Vec::new();
        let mut seen_noun = false;
        for (tok, tag) in tokens.iter().zip(&tags) {
            match tag {
                PosTag::Noun | PosTag::ProperNoun => {
                    current.push(tok.clone());
                    seen_noun = true;
                }
                PosTag::Adjective if !seen_noun => current.push(tok.clone()),
                PosTag::Adjective => {
                    push(&current);
                    current = vec![tok.clone()];
                    seen_noun = false;
                }
                _ => {
                    if seen_noun {
                        push(&current);
                    }
                    current.clear();
                    seen_noun = false;
                }
            }
        }
        if seen_noun {
            push(&current);
        }

        let mut ranked: Vec<(usize, String)> = order.into_iter().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| counts[b].cmp(&counts[a]).then(ia.cmp(ib)));
        Ok(ranked.into_iter().take(MAX_KEY_PHRASES).map(|(_, p)| p).collect())
    }
}

/// Synonym source that never expands.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSynonyms;

impl SynonymSource for NoSynonyms {
    fn synonyms(&self, _word: &str, _pos: PosTag) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Word -> synonyms table, loaded from a JSON object.
#[derive(Debug, Default, Clone)]
pub struct Thesaurus {
    entries: HashMap<String, Vec<String>>,
}

impl Thesaurus {
    pub fn from_map(entries: HashMap<String, Vec<String>>) -> Self {
        let entries = entries.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let entries: HashMap<String, Vec<String>> = serde_json::from_str(&raw)?;
        Ok(Self::from_map(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SynonymSource for Thesaurus {
    fn synonyms(&self, word: &str, _pos: PosTag) -> anyhow::Result<Vec<String>> {
        Ok(self.entries.get(&word.to_lowercase()).cloned().unwrap_or_default())
    }
}
