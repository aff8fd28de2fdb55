//! Photo and map-link lookup tables.
//!
//! Each table is an explicit, priority-ordered list of `(key, url)` entries.
//! Matching is case-insensitive substring matching, which is ambiguous when
//! keys overlap, so the first matching entry in list order wins. The tables
//! carry known data-quality issues (the misspelled `"Tykyo"` key, duplicate
//! URLs for related keys); they are data and are kept as-is.
//!
//! | Table | Match rule | Fallback |
//! |-------|-----------|----------|
//! | [`location_photo`] | exact key, then either-way substring | fixed landscape photo |
//! | [`location_map_url`] | location contains key | maps search for `<location>, Japan` |
//! | [`accommodation_map_url`] | either-way substring | none |

/// A priority-ordered lookup table.
#[derive(Debug, Clone, Copy)]
pub struct LookupTable {
    entries: &'static [(&'static str, &'static str)],
}

/// How a key is compared with the looked-up text (both lowercased).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// The text contains the key.
    TextContainsKey,
    /// The text contains the key, or the key contains the text.
    EitherContains,
}

impl LookupTable {
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &'static [(&'static str, &'static str)] {
        self.entries
    }

    /// Case-sensitive exact key match.
    pub fn exact(&self, text: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(key, _)| *key == text)
            .map(|(_, url)| *url)
    }

    /// First entry, in priority order, that satisfies `rule`.
    pub fn first_match(&self, text: &str, rule: MatchRule) -> Option<&'static str> {
        let text = text.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| {
                let key = key.to_lowercase();
                match rule {
                    MatchRule::TextContainsKey => text.contains(&key),
                    MatchRule::EitherContains => text.contains(&key) || key.contains(&text),
                }
            })
            .map(|(_, url)| *url)
    }
}

pub const ACCOMMODATION_MAPS: LookupTable = LookupTable::new(&[
    (
        "THE KNOT TOKYO Shinjuku",
        "https://maps.google.com/?q=4-31-1+Nishi-shinjuku,+Shinjuku-ku+Tokyo,+160-0023,+Japan",
    ),
    (
        "Winery Hotel and Condominium HITOHANA",
        "https://maps.google.com/?q=23-10+Kitanomine,+Furano,+Hokkaido+076-0034,+Japan",
    ),
    (
        "Keio Plaza Hotel Sapporo",
        "https://maps.google.com/?q=2-1+North+5+West+7,+Chuo-ku,+Sapporo,+Hokkaido+060-0005,+Japan",
    ),
    (
        "Hotel Kanronomori",
        "https://maps.google.com/?q=415+Niseko,+Niseko-cho,+Abuta-gun,+Hokkaido+048-1511,+Japan",
    ),
    (
        "KOKO STAY Chitose (formerly Hotel Wing International Chitose)",
        "https://maps.google.com/?q=2-2-10+Chiyoda-cho,+Chitose,+Hokkaido,+Japan",
    ),
]);

pub const LOCATION_MAPS: LookupTable = LookupTable::new(&[
    ("Tokyo", "https://maps.google.com/?q=Shinjuku,+Tokyo,+Japan"),
    ("Tykyo", "https://maps.google.com/?q=Shinjuku,+Tokyo,+Japan"),
    ("Furano", "https://maps.google.com/?q=Furano,+Hokkaido,+Japan"),
    ("Sapporo", "https://maps.google.com/?q=Sapporo,+Hokkaido,+Japan"),
    ("Niseko", "https://maps.google.com/?q=Niseko,+Hokkaido,+Japan"),
]);

pub const LOCATION_PHOTOS: LookupTable = LookupTable::new(&[
    ("Tokyo", "https://images.unsplash.com/photo-1540959733332-eab4deabeeaf?w=800&q=80"),
    ("Tykyo", "https://images.unsplash.com/photo-1540959733332-eab4deabeeaf?w=800&q=80"),
    ("Travel to Tokyo", "https://images.unsplash.com/photo-1436491865332-7a61a109cc05?w=800&q=80"),
    ("Furano", "https://images.unsplash.com/photo-1491002052546-bf38f186af56?w=800&q=80"),
    ("Sapporo", "https://images.unsplash.com/photo-1583834610905-f4e5c159a510?w=800&q=80"),
    ("Niseko", "https://images.unsplash.com/photo-1551524559-8af4e6624178?w=800&q=80"),
    ("Travel to Niseko", "https://images.unsplash.com/photo-1551524559-8af4e6624178?w=800&q=80"),
    ("travel to Sapporo", "https://images.unsplash.com/photo-1583834610905-f4e5c159a510?w=800&q=80"),
    ("to Sappoho airport/CTS", "https://images.unsplash.com/photo-1583834610905-f4e5c159a510?w=800&q=80"),
    ("To Bergen", "https://images.unsplash.com/photo-1520250497591-112f2f40a3f4?w=800&q=80"),
    ("Return to Bergen", "https://images.unsplash.com/photo-1520250497591-112f2f40a3f4?w=800&q=80"),
]);

pub const DEFAULT_PHOTO: &str =
    "https://images.unsplash.com/photo-1493976040374-85c8e12f0c0e?w=800&q=80";

/// Hero photo for a day's location.
pub fn location_photo(location: &str) -> &'static str {
    LOCATION_PHOTOS
        .exact(location)
        .or_else(|| LOCATION_PHOTOS.first_match(location, MatchRule::EitherContains))
        .unwrap_or(DEFAULT_PHOTO)
}

/// Map link for a location. Unknown locations get a search link.
pub fn location_map_url(location: &str) -> String {
    match LOCATION_MAPS.first_match(location, MatchRule::TextContainsKey) {
        Some(url) => url.to_string(),
        None => format!(
            "https://maps.google.com/?q={},+Japan",
            encode_uri_component(location)
        ),
    }
}

/// Map link for a named accommodation, if known.
pub fn accommodation_map_url(name: &str) -> Option<&'static str> {
    ACCOMMODATION_MAPS.first_match(name, MatchRule::EitherContains)
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
fn encode_uri_component(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => result.push(byte as char),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_photo_beats_earlier_substring() {
        // "Tokyo" is listed first and is a substring, but the exact key wins.
        assert_eq!(
            location_photo("Travel to Tokyo"),
            "https://images.unsplash.com/photo-1436491865332-7a61a109cc05?w=800&q=80"
        );
    }

    #[test]
    fn photo_substring_uses_priority_order() {
        // Matches both "Tokyo" and "Travel to Tokyo"; "Tokyo" comes first.
        assert_eq!(
            location_photo("travel to tokyo by night"),
            "https://images.unsplash.com/photo-1540959733332-eab4deabeeaf?w=800&q=80"
        );
    }

    #[test]
    fn photo_falls_back_to_default() {
        assert_eq!(location_photo("Kyoto"), DEFAULT_PHOTO);
    }

    #[test]
    fn misspelled_key_still_matches() {
        assert_eq!(
            location_map_url("Tykyo"),
            "https://maps.google.com/?q=Shinjuku,+Tokyo,+Japan"
        );
    }

    #[test]
    fn unknown_location_gets_search_link() {
        assert_eq!(
            location_map_url("Kyoto Station"),
            "https://maps.google.com/?q=Kyoto%20Station,+Japan"
        );
    }

    #[test]
    fn accommodation_matches_either_direction() {
        assert!(accommodation_map_url("Hotel Kanronomori (annex)").is_some());
        assert!(accommodation_map_url("koko stay chitose").is_some());
        assert!(accommodation_map_url("Park Hyatt").is_none());
    }

    #[test]
    fn encoding_matches_uri_component_rules() {
        assert_eq!(encode_uri_component("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_uri_component("it's (ok)!"), "it's%20(ok)!");
        assert_eq!(encode_uri_component("札幌"), "%E6%9C%AD%E5%B9%8C");
    }
}
