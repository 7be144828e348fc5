//! Rule-based keyword classifier

use serde::Deserialize;
use serde_json::Value;

use super::ModelAdapter;
use crate::registry::parse_params;
use crate::types::{Example, ModelResponse, Params};
use crate::{Error, Result};

/// Keyword category, also the label emitted on a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordCategory {
    /// Emits `positive`
    Positive,
    /// Emits `negative`
    Negative,
}

impl KeywordCategory {
    /// Label emitted when a keyword of this category matches.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

/// A lightweight rule-based sentiment classifier.
///
/// Categories are checked in `priority` order; within a category keywords are
/// checked in list order. The first substring match wins; otherwise the
/// `default_label` is emitted.
#[derive(Debug, Clone)]
pub struct KeywordMatchingModel {
    name: String,
    positive_keywords: Vec<String>,
    negative_keywords: Vec<String>,
    default_label: String,
    case_sensitive: bool,
    priority: Vec<KeywordCategory>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeywordParams {
    #[serde(default)]
    positive_keywords: Vec<String>,
    #[serde(default)]
    negative_keywords: Vec<String>,
    #[serde(default = "default_label")]
    default_label: String,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default)]
    priority: Option<Vec<KeywordCategory>>,
    #[serde(default)]
    name: Option<String>,
}

fn default_label() -> String {
    "neutral".to_string()
}

impl KeywordMatchingModel {
    /// Case-insensitive model with the default priority (positive first).
    #[must_use]
    pub fn new(positive_keywords: &[&str], negative_keywords: &[&str]) -> Self {
        Self::build(
            "KeywordMatchingModel".to_string(),
            positive_keywords.iter().map(ToString::to_string).collect(),
            negative_keywords.iter().map(ToString::to_string).collect(),
            default_label(),
            false,
            vec![KeywordCategory::Positive, KeywordCategory::Negative],
        )
    }

    /// Override the fallback label.
    #[must_use]
    pub fn with_default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = label.into();
        self
    }

    pub(crate) fn from_params(params: &Params) -> Result<Self> {
        let params: KeywordParams = parse_params("keyword-matching", params)?;
        let priority = params
            .priority
            .unwrap_or_else(|| vec![KeywordCategory::Positive, KeywordCategory::Negative]);
        if priority.is_empty() {
            return Err(Error::InvalidConfig(
                "keyword-matching priority must name at least one category".to_string(),
            ));
        }
        Ok(Self::build(
            params.name.unwrap_or_else(|| "KeywordMatchingModel".to_string()),
            params.positive_keywords,
            params.negative_keywords,
            params.default_label,
            params.case_sensitive,
            priority,
        ))
    }

    fn build(
        name: String,
        positive: Vec<String>,
        negative: Vec<String>,
        default_label: String,
        case_sensitive: bool,
        priority: Vec<KeywordCategory>,
    ) -> Self {
        let normalize = |keywords: Vec<String>| -> Vec<String> {
            if case_sensitive {
                keywords
            } else {
                keywords.into_iter().map(|kw| kw.to_lowercase()).collect()
            }
        };
        Self {
            name,
            positive_keywords: normalize(positive),
            negative_keywords: normalize(negative),
            default_label,
            case_sensitive,
            priority,
        }
    }

    fn keywords(&self, category: KeywordCategory) -> &[String] {
        match category {
            KeywordCategory::Positive => &self.positive_keywords,
            KeywordCategory::Negative => &self.negative_keywords,
        }
    }

    fn first_match(&self, text: &str) -> Option<(KeywordCategory, &str)> {
        self.priority.iter().find_map(|&category| {
            self.keywords(category)
                .iter()
                .find(|keyword| text.contains(keyword.as_str()))
                .map(|keyword| (category, keyword.as_str()))
        })
    }
}

impl ModelAdapter for KeywordMatchingModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, example: &Example) -> Result<ModelResponse> {
        let text = match example.inputs.get("text") {
            None | Some(Value::Null) => "",
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(Error::Prediction {
                    uid: example.uid.clone(),
                    reason: format!("'text' input must be a string, got {other}"),
                })
            }
        };
        let normalized = if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        };

        let matched = self.first_match(&normalized);
        let output = matched.map_or_else(|| self.default_label.clone(), |(c, _)| c.label().to_string());

        Ok(ModelResponse::new(Value::String(output))
            .with_metadata(
                "matched_keyword",
                matched.map_or(Value::Null, |(_, kw)| Value::String(kw.to_string())),
            )
            .with_metadata(
                "matched_category",
                matched.map_or(Value::Null, |(c, _)| Value::String(c.label().to_string())),
            )
            .with_metadata("model_name", Value::String(self.name.clone())))
    }
}
