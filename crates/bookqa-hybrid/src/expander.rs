//! Query analysis, synonym expansion and part-of-speech weighting.
//!
//! Every collaborator call is fallible; failures are logged and the query
//! falls back to what was computed so far, so a broken tagger or thesaurus
//! never aborts a search.
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use bookqa_core::config::SearchSettings;
use bookqa_core::error::{Error, Result};
use bookqa_core::nlp::is_cyrillic;
use bookqa_core::traits::{Annotator, SynonymSource};
use bookqa_core::types::{Language, PosTag, Query, SearchFilter, WeightedToken};

#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnalysis {
    pub tokens: Vec<String>,
    pub pos_tags: Vec<PosTag>,
    pub language: Language,
    pub is_factual: bool,
    pub filter: Option<SearchFilter>,
}

struct LanguagePatterns {
    factual: Regex,
    date: Regex,
    person: Regex,
}

impl LanguagePatterns {
    fn compile(factual: &str, date: &str, person: &str) -> Result<Self> {
        let re = |p: &str| Regex::new(p).map_err(|e| Error::Config(e.to_string()));
        Ok(Self { factual: re(factual)?, date: re(date)?, person: re(person)? })
    }
}

pub struct QueryExpander {
    annotator: Arc<dyn Annotator>,
    synonyms: Arc<dyn SynonymSource>,
    synonyms_per_token: usize,
    english: LanguagePatterns,
    russian: LanguagePatterns,
}

pub fn detect_language(text: &str) -> Language {
    if text.chars().any(|c| c.is_alphabetic() && is_cyrillic(c)) {
        Language::Russian
    } else {
        Language::English
    }
}

/// Repetition factor for a tag: nouns > verbs > adjectives > everything else.
pub fn pos_weight(pos: PosTag) -> f32 {
    match pos {
        PosTag::Noun | PosTag::ProperNoun => 1.5,
        PosTag::Verb => 1.3,
        PosTag::Adjective => 1.2,
        PosTag::Adverb | PosTag::Other => 1.0,
    }
}

impl QueryExpander {
    pub fn new(annotator: Arc<dyn Annotator>, synonyms: Arc<dyn SynonymSource>, synonyms_per_token: usize) -> Result<Self> {
        let english = LanguagePatterns::compile(
            r"(?i)\b(what|who|whom|whose|where|when|which|why|how|date|year|born|died|place|city|country|name)\b",
            r"(?i)\b(when|date|year|years|century|born|died)\b",
            r"(?i)\b(who|whom|whose|name|person|character)\b",
        )?;
        let russian = LanguagePatterns::compile(
            r"(?i)\b(что|кто|кого|кому|чей|чья|где|когда|какой|какая|какие|почему|зачем|как|сколько|дата|год|место|имя)\b",
            r"(?i)\b(когда|дата|даты|год|году|года|век|веке|родился|родилась|умер|умерла)\b",
            r"(?i)\b(кто|кого|кому|кем|чей|чья|имя|зовут)\b",
        )?;
        Ok(Self { annotator, synonyms, synonyms_per_token, english, russian })
    }

    pub fn from_settings(annotator: Arc<dyn Annotator>, synonyms: Arc<dyn SynonymSource>, settings: &SearchSettings) -> Result<Self> {
        Self::new(annotator, synonyms, settings.synonyms_per_token)
    }

    fn patterns(&self, language: Language) -> &LanguagePatterns {
        match language {
            Language::English => &self.english,
            Language::Russian => &self.russian,
        }
    }

    pub fn analyze(&self, raw: &str) -> QueryAnalysis {
        let tokens = self.annotator.tokenize(raw).unwrap_or_else(|e| {
            warn!(error = %e, "tokenizer failed; splitting on whitespace");
            raw.split_whitespace().map(str::to_string).collect()
        });
        let pos_tags = match self.annotator.pos_tag(&tokens) {
            Ok(tags) if tags.len() == tokens.len() => tags,
            Ok(tags) => {
                warn!(tokens = tokens.len(), tags = tags.len(), "tagger returned wrong tag count; treating as untagged");
                vec![PosTag::Other; tokens.len()]
            }
            Err(e) => {
                warn!(error = %e, "tagger failed; treating as untagged");
                vec![PosTag::Other; tokens.len()]
            }
        };

        let language = detect_language(raw);
        let patterns = self.patterns(language);
        let is_factual = patterns.factual.is_match(raw);
        let filter = is_factual
            .then(|| SearchFilter {
                has_date: patterns.date.is_match(raw).then_some(true),
                has_name: patterns.person.is_match(raw).then_some(true),
            })
            .filter(|f| !f.is_empty());

        QueryAnalysis { tokens, pos_tags, language, is_factual, filter }
    }

    /// Original tokens in order, each expandable one followed by up to
    /// `synonyms_per_token` new synonyms.
    pub fn expand(&self, analysis: &QueryAnalysis) -> Vec<(String, PosTag)> {
        let mut out: Vec<(String, PosTag)> = Vec::with_capacity(analysis.tokens.len());
        for (token, &pos) in analysis.tokens.iter().zip(&analysis.pos_tags) {
            out.push((token.clone(), pos));
            let lower = token.to_lowercase();
            if !pos.is_expandable() || self.synonyms_per_token == 0 {
                continue;
            }
            let candidates = match self.synonyms.synonyms(token, pos) {
                Ok(c) => c,
                Err(e) => {
                    warn!(token = %token, error = %e, "synonym lookup failed");
                    continue;
                }
            };
            let mut added = 0;
            for syn in candidates {
                if added == self.synonyms_per_token {
                    break;
                }
                if syn.to_lowercase() == lower || out.iter().any(|(t, _)| *t == syn) {
                    continue;
                }
                out.push((syn, pos));
                added += 1;
            }
        }
        out
    }

    pub fn weight(&self, tokens: Vec<(String, PosTag)>) -> Vec<WeightedToken> {
        tokens
            .into_iter()
            .map(|(token, pos)| WeightedToken { weight: pos_weight(pos), token, pos })
            .collect()
    }

    pub fn prepare(&self, raw: &str) -> Query {
        let analysis = self.analyze(raw);
        let expanded = self.expand(&analysis);
        let expanded_tokens = self.weight(expanded);
        debug!(
            query = raw,
            language = ?analysis.language,
            factual = analysis.is_factual,
            tokens = expanded_tokens.len(),
            "prepared query"
        );
        Query {
            raw: raw.to_string(),
            language: analysis.language,
            is_factual: analysis.is_factual,
            expanded_tokens,
            filter: analysis.filter,
        }
    }

    /// Text whose embedding represents the query: every lemma repeated
    /// `round(weight * 10)` times.
    pub fn weighted_text(&self, query: &Query) -> String {
        let mut words: Vec<String> = Vec::new();
        for t in &query.expanded_tokens {
            let lemma = self.annotator.lemmatize(&t.token, t.pos).unwrap_or_else(|e| {
                debug!(token = %t.token, error = %e, "lemmatizer failed");
                t.token.to_lowercase()
            });
            let repeats = (t.weight * 10.0).round() as usize;
            words.extend(std::iter::repeat(lemma).take(repeats));
        }
        words.join(" ")
    }
}
