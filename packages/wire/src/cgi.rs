//! Query-string ("CGI") parameters attached to a request.
//!
//! A [`CgiMap`] keeps the order in which keys were first seen so that
//! serialization and logging are stable, while equality ignores order: two
//! maps are equal when they hold the same key/value pairs.

use std::fmt;

use url::form_urlencoded;

/// Separator placed between an existing value and an appended one.
pub const APPEND_SEPARATOR: char = ',';

/// Mapping from parameter name to parameter value.
#[derive(Debug, Clone, Default)]
pub struct CgiMap {
    entries: Vec<(String, String)>,
}

impl CgiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a query string such as `a=1&b=2`. A leading `?` is ignored,
    /// a key without `=` gets an empty value, and a repeated key keeps the
    /// last value in the position of its first occurrence. Keys and values
    /// are percent-decoded.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut map = Self::new();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if key.is_empty() {
                continue;
            }
            map.insert(key, value);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite a value. An overwritten key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterate in first-seen key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl PartialEq for CgiMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for CgiMap {}

/// Writes the percent-encoded query string, without the leading `?`.
impl fmt::Display for CgiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.iter() {
            query.append_pair(key, value);
        }
        f.write_str(&query.finish())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CgiMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Merge `incoming` into a copy of `base`.
///
/// Keys missing from `base` are added as-is. On a collision `replace`
/// overwrites the old value; otherwise the new value is appended after a
/// comma. The inputs are never modified, so a redirect chain is a left fold
/// of this function over the signals it received.
pub fn merge(base: &CgiMap, incoming: &CgiMap, replace: bool) -> CgiMap {
    let mut merged = base.clone();
    for (key, value) in incoming.iter() {
        match merged.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) if replace => *existing = value.to_string(),
            Some((_, existing)) => {
                existing.push(APPEND_SEPARATOR);
                existing.push_str(value);
            }
            None => merged.entries.push((key.to_string(), value.to_string())),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cgi(pairs: &[(&str, &str)]) -> CgiMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn parse_and_display() {
        let map = CgiMap::parse("?tried=s1&flag&x=1=2");
        assert_eq!(map.get("tried"), Some("s1"));
        assert_eq!(map.get("flag"), Some(""));
        assert_eq!(map.get("x"), Some("1=2"));
        assert_eq!(map.to_string(), "tried=s1&flag=&x=1%3D2");
    }

    #[test]
    fn reserved_characters_survive_a_round_trip() {
        let map = cgi(&[("tok", "a&b=c"), ("tried", "s1,s2"), ("path", "/x y?")]);
        let query = map.to_string();
        assert_eq!(query, "tok=a%26b%3Dc&tried=s1%2Cs2&path=%2Fx+y%3F");
        let parsed = CgiMap::parse(&query);
        assert_eq!(parsed, map);
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["tok", "tried", "path"]);
    }

    #[test]
    fn percent_encoded_input_is_decoded() {
        let map = CgiMap::parse("tok=a%26b&name=x+y");
        assert_eq!(map.get("tok"), Some("a&b"));
        assert_eq!(map.get("name"), Some("x y"));
    }

    #[test]
    fn parse_skips_empty_segments() {
        let map = CgiMap::parse("&&a=1&&=orphan&");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("a"), Some("1"));
    }

    #[test]
    fn repeated_key_keeps_first_position() {
        let map = CgiMap::parse("a=1&b=2&a=3");
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some("3"));
    }

    #[test]
    fn equality_ignores_order() {
        assert_eq!(cgi(&[("a", "1"), ("b", "2")]), cgi(&[("b", "2"), ("a", "1")]));
        assert_ne!(cgi(&[("a", "1")]), cgi(&[("a", "1"), ("b", "2")]));
        assert_ne!(cgi(&[("a", "1")]), cgi(&[("a", "2")]));
    }

    #[test]
    fn merge_inserts_missing_keys() {
        let merged = merge(&cgi(&[("a", "1")]), &cgi(&[("b", "2")]), false);
        assert_eq!(merged, cgi(&[("a", "1"), ("b", "2")]));
        assert_eq!(merged.to_string(), "a=1&b=2");
    }

    #[test]
    fn merge_replace_overwrites() {
        let merged = merge(&cgi(&[("tried", "s1")]), &cgi(&[("tried", "s2")]), true);
        assert_eq!(merged.get("tried"), Some("s2"));
    }

    #[test]
    fn merge_append_concatenates() {
        let merged = merge(&cgi(&[("tried", "s1")]), &cgi(&[("tried", "s2")]), false);
        assert_eq!(merged.get("tried"), Some("s1,s2"));
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let base = cgi(&[("a", "1")]);
        let incoming = cgi(&[("a", "2")]);
        let _ = merge(&base, &incoming, false);
        assert_eq!(base.get("a"), Some("1"));
        assert_eq!(incoming.get("a"), Some("2"));
    }

    #[test]
    fn merge_result_independent_of_incoming_order() {
        let base = cgi(&[("a", "0")]);
        let one = merge(&base, &cgi(&[("a", "1"), ("b", "2")]), false);
        let two = merge(&base, &cgi(&[("b", "2"), ("a", "1")]), false);
        assert_eq!(one, two);
    }

    #[test]
    fn single_entry_merges_match_combined_merge() {
        let base = cgi(&[("a", "0"), ("c", "9")]);
        for replace in [true, false] {
            let stepwise = merge(
                &merge(&base, &cgi(&[("a", "1")]), replace),
                &cgi(&[("b", "2")]),
                replace,
            );
            let combined = merge(&base, &cgi(&[("a", "1"), ("b", "2")]), replace);
            assert_eq!(stepwise, combined);
        }
    }

    #[test]
    fn left_fold_over_hops() {
        let hops = [
            cgi(&[("tried", "s1")]),
            cgi(&[("tried", "s2"), ("triedrc", "enoent")]),
            cgi(&[("tried", "s3")]),
        ];
        let folded = hops
            .iter()
            .fold(CgiMap::new(), |acc, signal| merge(&acc, signal, false));
        assert_eq!(folded.get("tried"), Some("s1,s2,s3"));
        assert_eq!(folded.get("triedrc"), Some("enoent"));

        let replaced = hops
            .iter()
            .fold(CgiMap::new(), |acc, signal| merge(&acc, signal, true));
        assert_eq!(replaced.get("tried"), Some("s3"));
    }

    #[test]
    fn insert_and_remove() {
        let mut map = CgiMap::new();
        assert_eq!(map.insert("a", "1"), None);
        assert_eq!(map.insert("a", "2"), Some("1".to_string()));
        assert!(map.contains_key("a"));
        assert_eq!(map.remove("a"), Some("2".to_string()));
        assert!(map.is_empty());
        assert_eq!(map.remove("a"), None);
    }
}
