//! Query string and form body parameters.

use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

/// An ordered multi-value map of parameters parsed from a query string or an
/// `application/x-www-form-urlencoded` body.
///
/// Lookups return the last value for a key, matching how browsers submit
/// repeated fields.
///
/// # Examples
///
/// ```
/// use bookshelf_http::QueryDict;
///
/// let qd = QueryDict::parse("author=Ursula+K.+Le+Guin&tag=sf&tag=classic");
/// assert_eq!(qd.get("author"), Some("Ursula K. Le Guin"));
/// assert_eq!(qd.get("tag"), Some("classic"));
/// assert_eq!(qd.get_list("tag"), vec!["sf", "classic"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDict {
    pairs: Vec<(String, String)>,
}

impl QueryDict {
    /// Creates an empty `QueryDict`.
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Parses `key=value&key2=value2`, decoding `+` and percent escapes.
    pub fn parse(query_string: &str) -> Self {
        let pairs = query_string
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(key), decode(value))
            })
            .collect();
        Self { pairs }
    }

    /// Builds a `QueryDict` from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Returns the last value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `key`, in submission order.
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Replaces every value for `key` with `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.retain(|(k, _)| k != key);
        self.pairs.push((key.to_string(), value.into()));
    }

    /// Appends a value for `key`.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_string(), value.into()));
    }

    /// Returns `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterates over all key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Encodes the parameters back into a query string.
    pub fn urlencode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k, NON_ALPHANUMERIC),
                    utf8_percent_encode(v, NON_ALPHANUMERIC)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert!(QueryDict::parse("").is_empty());
        assert!(QueryDict::parse("&&").is_empty());
    }

    #[test]
    fn test_parse_key_without_value() {
        let qd = QueryDict::parse("flag&x=1");
        assert_eq!(qd.get("flag"), Some(""));
        assert!(qd.contains_key("flag"));
        assert_eq!(qd.get("x"), Some("1"));
    }

    #[test]
    fn test_parse_decodes_escapes() {
        let qd = QueryDict::parse("title=The%20Dispossessed&q=a%2Bb+c");
        assert_eq!(qd.get("title"), Some("The Dispossessed"));
        assert_eq!(qd.get("q"), Some("a+b c"));
    }

    #[test]
    fn test_set_replaces_all_values() {
        let mut qd = QueryDict::parse("a=1&a=2");
        qd.set("a", "3");
        assert_eq!(qd.get_list("a"), vec!["3"]);
    }

    #[test]
    fn test_urlencode_escapes() {
        let qd = QueryDict::from_pairs([("next", "/bookshelf/?q=a b")]);
        assert_eq!(qd.urlencode(), "next=%2Fbookshelf%2F%3Fq%3Da%20b");
        assert_eq!(
            QueryDict::parse(&qd.urlencode()).get("next"),
            Some("/bookshelf/?q=a b")
        );
    }
}
