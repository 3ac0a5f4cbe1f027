use itertools::Itertools;
use log::error;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{ApiError, ErrorKind};
use crate::model::Scope;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    #[error("'{0}' is not a well-formed language tag")]
    InvalidTag(String),
    #[error("invalid quality value in '{0}'")]
    InvalidQuality(String),
}

/// Language tag reduced to its primary language and optional region,
/// e.g. `en` or `pt-BR`. Case is normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageTag {
    language: String,
    region: Option<String>,
}

impl LanguageTag {
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

impl FromStr for LanguageTag {
    type Err = LanguageError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || LanguageError::InvalidTag(raw.to_string());
        let mut subtags = raw.trim().split(['-', '_']);

        let language = subtags.next().ok_or_else(invalid)?;
        if !(2..=8).contains(&language.len())
            || !language.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(invalid());
        }

        let mut region = None;
        for subtag in subtags {
            if subtag.is_empty()
                || subtag.len() > 8
                || !subtag.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(invalid());
            }
            let is_region = (subtag.len() == 2 && subtag.chars().all(|c| c.is_ascii_alphabetic()))
                || (subtag.len() == 3 && subtag.chars().all(|c| c.is_ascii_digit()));
            if is_region && region.is_none() {
                region = Some(subtag.to_ascii_uppercase());
            }
        }

        Ok(Self {
            language: language.to_ascii_lowercase(),
            region,
        })
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}-{}", self.language, region),
            None => f.write_str(&self.language),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    No,
    Low,
    High,
    Exact,
}

/// Accept-Language entry: a tag, or `None` for the `*` wildcard.
pub type WeightedTag = (Option<LanguageTag>, f32);

/// Parses an Accept-Language header, best quality first.
pub fn parse_accept_language(header: &str) -> Result<Vec<WeightedTag>, LanguageError> {
    let mut entries = Vec::new();
    for part in header.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut pieces = part.split(';').map(str::trim);
        let tag = pieces.next().unwrap_or_default();

        let mut quality = 1.0_f32;
        for param in pieces {
            if let Some(q) = param.strip_prefix("q=") {
                quality = q
                    .parse::<f32>()
                    .ok()
                    .filter(|q| (0.0..=1.0).contains(q))
                    .ok_or_else(|| LanguageError::InvalidQuality(part.to_string()))?;
            }
        }

        let tag = match tag {
            "*" => None,
            other => Some(other.parse::<LanguageTag>()?),
        };
        if quality > 0.0 {
            entries.push((tag, quality));
        }
    }

    Ok(entries
        .into_iter()
        .sorted_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
        .collect())
}

/// Matches requested tags against the supported ones. The first supported
/// language is the default.
#[derive(Debug, Clone, Default)]
pub struct LanguageMatcher {
    supported: Vec<LanguageTag>,
}

impl LanguageMatcher {
    pub fn new(supported: Vec<LanguageTag>) -> Self {
        Self { supported }
    }

    pub fn parse(supported: &[String]) -> Result<Self, LanguageError> {
        let supported = supported
            .iter()
            .map(|s| s.parse::<LanguageTag>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(supported))
    }

    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }

    pub fn supported(&self) -> &[LanguageTag] {
        &self.supported
    }

    pub fn display_supported(&self) -> String {
        self.supported.iter().join(",")
    }

    /// Best supported tag for the candidates, tried in order. Without any
    /// acceptable candidate the default language is returned with `No` confidence.
    pub fn best_match(&self, candidates: &[WeightedTag]) -> Option<(LanguageTag, Confidence)> {
        let default = self.supported.first()?.clone();
        let mut best = (default, Confidence::No);

        for (candidate, _) in candidates {
            let found = match candidate {
                None => Some((best.0.clone(), Confidence::Low)),
                Some(tag) => self.match_tag(tag),
            };
            if let Some(found) = found {
                if found.1 > best.1 {
                    best = found;
                }
                if best.1 >= Confidence::High {
                    break;
                }
            }
        }
        Some(best)
    }

    pub fn match_tag(&self, tag: &LanguageTag) -> Option<(LanguageTag, Confidence)> {
        if let Some(exact) = self.supported.iter().find(|s| *s == tag) {
            return Some((exact.clone(), Confidence::Exact));
        }
        self.supported
            .iter()
            .find(|s| s.language == tag.language)
            .map(|s| (s.clone(), Confidence::High))
    }
}

impl crate::logic::JsonApiHandler {
    /// Language for a read, negotiated from the Accept-Language header. None
    /// when the engine has no supported languages configured.
    pub fn negotiate_language(
        &self,
        accept_language: Option<&str>,
    ) -> Result<Option<LanguageTag>, ApiError> {
        let candidates = match accept_language {
            Some(header) => parse_accept_language(header).map_err(|e| {
                ApiError::with_detail(ErrorKind::InvalidHeaderValue, e.to_string())
            })?,
            None => Vec::new(),
        };
        Ok(self.languages().best_match(&candidates).map(|(tag, _)| tag))
    }

    /// Checks the language tag carried by the single value of a locale-aware
    /// scope and rewrites it to the matched supported tag.
    pub fn check_value_language(&self, scope: &mut Scope) -> Result<LanguageTag, ApiError> {
        let supported = self.languages().display_supported();
        let raw = match scope.langtag() {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                return Err(ApiError::with_detail(
                    ErrorKind::InvalidInput,
                    format!(
                        "Provided object with no language code required. Supported languages: {}.",
                        supported
                    ),
                ))
            }
        };

        let tag = raw.parse::<LanguageTag>().map_err(|e| {
            ApiError::with_detail(
                ErrorKind::InvalidInput,
                format!("Provided invalid language tag: '{}'. Error: {}", raw, e),
            )
        })?;

        let matched = match self.languages().match_tag(&tag) {
            Some((matched, confidence)) if confidence > Confidence::Low => matched,
            _ => {
                return Err(ApiError::with_detail(
                    ErrorKind::LanguageNotAcceptable,
                    format!(
                        "The language: '{}' is not supported. \
                         This document supports following languages: {}",
                        raw, supported
                    ),
                ))
            }
        };

        scope.set_langtag(&matched.to_string()).map_err(|e| {
            error!("Cannot set language tag on {}: {}", scope.collection(), e);
            ApiError::internal()
        })?;
        Ok(matched)
    }
}
