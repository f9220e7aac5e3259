use std::ops::RangeInclusive;

use crate::extract::PageFeatures;

const TITLE_LENGTH: RangeInclusive<usize> = 55..=60;
const META_DESCRIPTION_LENGTH: RangeInclusive<usize> = 155..=160;
const MIN_TEXT_RATIO: f64 = 0.15;

/// Column / summary key of every alert, in the order [`Alerts::flags`] yields them.
pub const ALERT_KEYS: [&str; 10] = [
    "alert_missing_title",
    "alert_long_title",
    "alert_missing_meta_description",
    "alert_long_meta_description",
    "alert_missing_h1",
    "alert_incorrect_canonical_url",
    "alert_missing_image_alt_attributes",
    "alert_missing_language_tag",
    "alert_low_text_ratio",
    "alert_no_meta_robots_or_incorrect_directives",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Alerts {
    pub missing_title: bool,
    pub long_title: bool,
    pub missing_meta_description: bool,
    pub long_meta_description: bool,
    pub missing_h1: bool,
    pub incorrect_canonical_url: bool,
    pub missing_image_alt_attributes: bool,
    pub missing_language_tag: bool,
    pub low_text_ratio: bool,
    pub no_meta_robots_or_incorrect_directives: bool,
}

impl Alerts {
    /// `(key, raised)` for every rule, keyed by [`ALERT_KEYS`].
    pub fn flags(&self) -> [(&'static str, bool); 10] {
        [
            (ALERT_KEYS[0], self.missing_title),
            (ALERT_KEYS[1], self.long_title),
            (ALERT_KEYS[2], self.missing_meta_description),
            (ALERT_KEYS[3], self.long_meta_description),
            (ALERT_KEYS[4], self.missing_h1),
            (ALERT_KEYS[5], self.incorrect_canonical_url),
            (ALERT_KEYS[6], self.missing_image_alt_attributes),
            (ALERT_KEYS[7], self.missing_language_tag),
            (ALERT_KEYS[8], self.low_text_ratio),
            (ALERT_KEYS[9], self.no_meta_robots_or_incorrect_directives),
        ]
    }

    pub fn has_alert(&self) -> bool {
        self.flags().iter().any(|(_, raised)| *raised)
    }
}

fn outside(range: &RangeInclusive<usize>, length: Option<usize>) -> bool {
    length.map(|l| !range.contains(&l)).unwrap_or(false)
}

fn bad_robots(meta_robots: Option<&str>) -> bool {
    match meta_robots {
        None => true,
        Some(content) => {
            let content = content.to_lowercase();
            content.contains("noindex") || content.contains("nofollow")
        }
    }
}

pub fn derive_alerts(f: &PageFeatures) -> Alerts {
    Alerts {
        missing_title: f.title.is_none(),
        long_title: outside(&TITLE_LENGTH, f.title_length),
        missing_meta_description: f.meta_description.is_none(),
        long_meta_description: outside(&META_DESCRIPTION_LENGTH, f.meta_description_length),
        missing_h1: f.h1.is_none(),
        incorrect_canonical_url: f.canonical_url.as_deref() != Some(f.url.as_str()),
        missing_image_alt_attributes: f.image_alt_attributes.iter().any(Option::is_none),
        missing_language_tag: f.language_tags.is_none(),
        low_text_ratio: f.text_ratio < MIN_TEXT_RATIO,
        no_meta_robots_or_incorrect_directives: bad_robots(f.meta_robots.as_deref()),
    }
}
