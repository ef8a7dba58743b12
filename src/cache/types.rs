//! Core type definitions for the cache system

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cache key type - `"<language>:<sha256 hex>"`
pub type CacheKey = String;

/// Supported locales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    En,
    /// Russian
    Ru,
    /// Spanish
    Es,
    /// Turkish
    Tr,
    /// Arabic
    Ar,
}

impl Language {
    /// Every supported language, in declaration order
    pub const ALL: [Language; 5] = [
        Language::En,
        Language::Ru,
        Language::Es,
        Language::Tr,
        Language::Ar,
    ];

    /// ISO 639-1 code used as the key prefix
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
            Language::Es => "es",
            Language::Tr => "tr",
            Language::Ar => "ar",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = CacheError;

    /// Accepts bare codes and region-tagged tags (`en`, `EN`, `en-US`, `ru_RU`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "en" => Ok(Language::En),
            "ru" => Ok(Language::Ru),
            "es" => Ok(Language::Es),
            "tr" => Ok(Language::Tr),
            "ar" => Ok(Language::Ar),
            _ => Err(CacheError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Classification of a query/response, selects the TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseCategory {
    Greeting,
    Pricing,
    Services,
    Hours,
    Location,
    Availability,
    Booking,
    General,
}

impl ResponseCategory {
    pub const ALL: [ResponseCategory; 8] = [
        ResponseCategory::Greeting,
        ResponseCategory::Pricing,
        ResponseCategory::Services,
        ResponseCategory::Hours,
        ResponseCategory::Location,
        ResponseCategory::Availability,
        ResponseCategory::Booking,
        ResponseCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCategory::Greeting => "greeting",
            ResponseCategory::Pricing => "pricing",
            ResponseCategory::Services => "services",
            ResponseCategory::Hours => "hours",
            ResponseCategory::Location => "location",
            ResponseCategory::Availability => "availability",
            ResponseCategory::Booking => "booking",
            ResponseCategory::General => "general",
        }
    }

    /// Parse a category label; anything unknown maps to `General`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "greeting" => ResponseCategory::Greeting,
            "pricing" => ResponseCategory::Pricing,
            "services" => ResponseCategory::Services,
            "hours" => ResponseCategory::Hours,
            "location" => ResponseCategory::Location,
            "availability" => ResponseCategory::Availability,
            "booking" => ResponseCategory::Booking,
            _ => ResponseCategory::General,
        }
    }
}

impl Default for ResponseCategory {
    fn default() -> Self {
        ResponseCategory::General
    }
}

impl fmt::Display for ResponseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("en".parse::<Language>().unwrap(), Language::En);
        assert_eq!("RU".parse::<Language>().unwrap(), Language::Ru);
        assert_eq!("es-MX".parse::<Language>().unwrap(), Language::Es);
        assert_eq!("tr_TR".parse::<Language>().unwrap(), Language::Tr);

        let err = "fr".parse::<Language>().unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedLanguage(_)));
        assert!("".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_display() {
        for lang in Language::ALL {
            assert_eq!(lang.to_string().parse::<Language>().unwrap(), lang);
        }
    }

    #[test]
    fn test_category_fallback() {
        assert_eq!(ResponseCategory::parse("Pricing"), ResponseCategory::Pricing);
        assert_eq!(ResponseCategory::parse("weather"), ResponseCategory::General);
        assert_eq!(ResponseCategory::parse(""), ResponseCategory::General);
        assert_eq!(ResponseCategory::default(), ResponseCategory::General);
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&ResponseCategory::Availability).unwrap();
        assert_eq!(json, "\"availability\"");
    }
}
