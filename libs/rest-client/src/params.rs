//! URL parameter flattening.

use url::form_urlencoded::byte_serialize;

/// A parameter value: a single scalar or a list of scalars
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Multi(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl<T: ToString> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        Self::Multi(values.iter().map(ToString::to_string).collect())
    }
}

impl<T: ToString, const N: usize> From<[T; N]> for ParamValue {
    fn from(values: [T; N]) -> Self {
        Self::Multi(values.iter().map(ToString::to_string).collect())
    }
}

/// Ordered parameter list; insertion order is preserved in the output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, ParamValue)>,
}

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Query parameters for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlParams {
    /// Appended verbatim after `?`
    Raw(String),
    /// Encoded with [`build_query`]
    Pairs(Params),
}

impl UrlParams {
    /// The query string (without the leading `?`)
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::Raw(raw) => raw.clone(),
            Self::Pairs(params) => build_query(params),
        }
    }
}

impl From<Params> for UrlParams {
    fn from(params: Params) -> Self {
        Self::Pairs(params)
    }
}

impl From<&str> for UrlParams {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_owned())
    }
}

impl From<String> for UrlParams {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

fn encode(input: &str) -> String {
    byte_serialize(input.as_bytes()).collect()
}

/// Flatten parameters into repeating-key form.
///
/// `{foo: "bar", test: [1, 2]}` becomes `foo=bar&test=1&test=2` with the
/// default `&` delimiter. Keys and values are form-urlencoded.
#[must_use]
pub fn array_to_url_params(params: &Params, delimiter: &str) -> String {
    let mut parts = Vec::new();
    for (key, value) in params.iter() {
        let key = encode(key);
        match value {
            ParamValue::Single(v) => parts.push(format!("{key}={}", encode(v))),
            ParamValue::Multi(values) => {
                parts.extend(values.iter().map(|v| format!("{key}={}", encode(v))));
            }
        }
    }
    parts.join(delimiter)
}

/// Build a query string, indexing list values: `test%5B0%5D=1&test%5B1%5D=2`
#[must_use]
pub fn build_query(params: &Params) -> String {
    let mut parts = Vec::new();
    for (key, value) in params.iter() {
        let key = encode(key);
        match value {
            ParamValue::Single(v) => parts.push(format!("{key}={}", encode(v))),
            ParamValue::Multi(values) => {
                for (i, v) in values.iter().enumerate() {
                    parts.push(format!("{key}%5B{i}%5D={}", encode(v)));
                }
            }
        }
    }
    parts.join("&")
}

/// Append a query to a URL, choosing `?` or `&` depending on what is already there
#[must_use]
pub fn append_query(url: &str, query: &str) -> String {
    if query.is_empty() {
        return url.to_owned();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn sample() -> Params {
        Params::new().with("foo", "bar").with("test", vec![1, 2])
    }

    #[test]
    fn test_array_to_url_params_repeats_keys() {
        assert_eq!(array_to_url_params(&sample(), "&"), "foo=bar&test=1&test=2");
    }

    #[test]
    fn test_array_to_url_params_custom_delimiter() {
        assert_eq!(array_to_url_params(&sample(), ";"), "foo=bar;test=1;test=2");
    }

    #[test]
    fn test_array_to_url_params_encodes() {
        let params = Params::new().with("a key", "x&y=z");
        assert_eq!(array_to_url_params(&params, "&"), "a+key=x%26y%3Dz");
    }

    #[test]
    fn test_empty_params() {
        assert_eq!(array_to_url_params(&Params::new(), "&"), "");
        assert_eq!(build_query(&Params::new()), "");
    }

    #[test]
    fn test_build_query_indexes_lists() {
        assert_eq!(build_query(&sample()), "foo=bar&test%5B0%5D=1&test%5B1%5D=2");
    }

    #[test]
    fn test_url_params_raw_is_verbatim() {
        let raw = UrlParams::from("q=a b&x=1");
        assert_eq!(raw.to_query(), "q=a b&x=1");
    }

    #[test]
    fn test_append_query() {
        assert_eq!(append_query("http://h/p", "a=1"), "http://h/p?a=1");
        assert_eq!(append_query("http://h/p?x=0", "a=1"), "http://h/p?x=0&a=1");
        assert_eq!(append_query("http://h/p", ""), "http://h/p");
    }

    #[test]
    fn test_params_from_iterator_keeps_order() {
        let params: Params = [("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(array_to_url_params(&params, "&"), "b=2&a=1");
    }
}
