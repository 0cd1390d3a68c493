use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

pub const TRIGGER_STATE_KEY: &str = "_orchestrator/trigger_table.json";
pub const LATEST_WEATHER_VIEW_KEY: &str = "views/latest_weather.parquet";
pub const REPORTING_VIEW_KEY: &str = "views/reporting.parquet";

/// Keys of staged objects: `<source>/<UTC timestamp>_<slug>-<tag>.<ext>`.
///
/// The timestamp is fixed width so lexical order is chronological order.
/// `tag` is derived from the unslugged name, so names that slugify alike
/// still get distinct keys.
pub struct StagedKey {
    source: String,
    at: DateTime<Utc>,
    slug: String,
    extension: String,
}

impl StagedKey {
    pub fn new(source: &str, at: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            at,
            slug: String::new(),
            extension: String::new(),
        }
    }

    pub fn with_slug(mut self, name: &str) -> Self {
        self.slug = format!("{}-{}", slugify(name), name_tag(name));
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    pub fn prefix(source: &str) -> String {
        format!("{}/", source)
    }

    pub fn build(&self) -> String {
        format!(
            "{}{}_{}.{}",
            Self::prefix(&self.source),
            self.at.format("%Y%m%dT%H%M%S%.3fZ"),
            self.slug,
            self.extension
        )
    }
}

pub fn table_prefix(table: &str) -> String {
    format!("tables/{}/", table)
}

pub fn table_part_key(table: &str, at: DateTime<Utc>, sequence: u64) -> String {
    format!(
        "{}part-{}-{:06}.parquet",
        table_prefix(table),
        at.format("%Y%m%dT%H%M%S%.3fZ"),
        sequence
    )
}

/// Part holding one load, named by its load id.
pub fn load_part_key(table: &str, id: &str) -> String {
    format!("{}load-{}.parquet", table_prefix(table), id)
}

pub fn ledger_key(table: &str) -> String {
    format!("_ledger/{}.json", table)
}

// First 8 hex digits of the name's SHA-256.
fn name_tag(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Lowercase ASCII alphanumerics, everything else collapsed to `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_staged_key_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let key = StagedKey::new("weather", at)
            .with_slug("São Paulo")
            .with_extension("json")
            .build();

        assert!(key.starts_with("weather/20240309T070501.000Z_s_o_paulo-"), "{}", key);
        assert!(key.ends_with(".json"));
        assert_eq!(key.len(), "weather/20240309T070501.000Z_s_o_paulo-".len() + 8 + 5);
    }

    #[test]
    fn test_names_that_slugify_alike_get_distinct_keys() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let key = |name: &str| {
            StagedKey::new("weather", at)
                .with_slug(name)
                .with_extension("json")
                .build()
        };

        assert_eq!(slugify("Москва"), slugify("東京"));
        assert_ne!(key("Москва"), key("東京"));
        assert_eq!(slugify("New York"), slugify("New-York"));
        assert_ne!(key("New York"), key("New-York"));
        assert_eq!(key("Oslo"), key("Oslo"));
    }

    #[test]
    fn test_staged_keys_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();

        let a = StagedKey::new("climate", earlier).with_slug("z").with_extension("csv").build();
        let b = StagedKey::new("climate", later).with_slug("a").with_extension("csv").build();
        assert!(a < b);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("New York"), "new_york");
        assert_eq!(slugify("  --  "), "unnamed");
        assert_eq!(slugify("Frankfurt am Main!"), "frankfurt_am_main");
    }
}
