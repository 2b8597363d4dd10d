use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Value type for a request keyword.
///
/// CDS request bodies mix scalar strings (`"product_type": "ensemble_mean"`),
/// lists (`"variable": [...]`), and numbers (`"area": [75, -40, 25, 75]`).
#[derive(Debug, Clone, PartialEq)]
pub enum RequestValue {
    Str(String),
    Int(i64),
    Float(f64),
    StrList(Vec<String>),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl From<&str> for RequestValue {
    fn from(value: &str) -> Self {
        RequestValue::Str(value.to_string())
    }
}

impl From<String> for RequestValue {
    fn from(value: String) -> Self {
        RequestValue::Str(value)
    }
}

impl From<&String> for RequestValue {
    fn from(value: &String) -> Self {
        RequestValue::Str(value.clone())
    }
}

impl From<i64> for RequestValue {
    fn from(value: i64) -> Self {
        RequestValue::Int(value)
    }
}

impl From<i32> for RequestValue {
    fn from(value: i32) -> Self {
        RequestValue::Int(value as i64)
    }
}

impl From<u32> for RequestValue {
    fn from(value: u32) -> Self {
        RequestValue::Int(value as i64)
    }
}

impl From<f64> for RequestValue {
    fn from(value: f64) -> Self {
        RequestValue::Float(value)
    }
}

impl From<NaiveDate> for RequestValue {
    fn from(value: NaiveDate) -> Self {
        RequestValue::Str(value.format("%Y-%m-%d").to_string())
    }
}

impl From<Vec<String>> for RequestValue {
    fn from(value: Vec<String>) -> Self {
        RequestValue::StrList(value)
    }
}

impl From<Vec<&str>> for RequestValue {
    fn from(value: Vec<&str>) -> Self {
        RequestValue::StrList(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RequestValue {
    fn from(value: [&str; N]) -> Self {
        RequestValue::StrList(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[String; N]> for RequestValue {
    fn from(value: [String; N]) -> Self {
        RequestValue::StrList(value.into_iter().collect())
    }
}

impl From<Vec<i64>> for RequestValue {
    fn from(value: Vec<i64>) -> Self {
        RequestValue::IntList(value)
    }
}

impl From<Vec<i32>> for RequestValue {
    fn from(value: Vec<i32>) -> Self {
        RequestValue::IntList(value.into_iter().map(|x| x as i64).collect())
    }
}

impl<const N: usize> From<[i32; N]> for RequestValue {
    fn from(value: [i32; N]) -> Self {
        RequestValue::IntList(value.into_iter().map(|x| x as i64).collect())
    }
}

impl<const N: usize> From<[i64; N]> for RequestValue {
    fn from(value: [i64; N]) -> Self {
        RequestValue::IntList(value.into_iter().collect())
    }
}

impl From<Vec<f64>> for RequestValue {
    fn from(value: Vec<f64>) -> Self {
        RequestValue::FloatList(value)
    }
}

impl<const N: usize> From<[f64; N]> for RequestValue {
    fn from(value: [f64; N]) -> Self {
        RequestValue::FloatList(value.into_iter().collect())
    }
}

impl RequestValue {
    /// Parse a user-provided string into a best-effort [`RequestValue`].
    ///
    /// Designed for config-file / CLI inputs where everything starts as a string.
    ///
    /// Rules (intentionally simple):
    /// - `"5"` -> `Int(5)`
    /// - `"0.25"` -> `Float(0.25)`
    /// - `"relative_humidity,wind_speed"` -> `StrList([..])`
    /// - `"[75, -40, 25, 75]"` -> `IntList([..])`
    /// - Otherwise -> `Str(..)`
    ///
    /// Tokens such as `"2011_2023"` or `"0.1deg"` stay strings; the service
    /// interprets them, not this client.
    pub fn parse_auto(s: &str) -> Self {
        let mut t = s.trim();
        if t.starts_with('[') && t.ends_with(']') && t.len() >= 2 {
            t = &t[1..t.len() - 1];
            t = t.trim();
        }

        if t.contains(',') {
            let items: Vec<&str> = t.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()).collect();
            if items.is_empty() {
                return RequestValue::Str(String::new());
            }

            if let Some(ints) = items.iter().map(|it| it.parse::<i64>().ok()).collect::<Option<Vec<i64>>>() {
                return RequestValue::IntList(ints);
            }
            if let Some(floats) = items.iter().map(|it| it.parse::<f64>().ok()).collect::<Option<Vec<f64>>>() {
                return RequestValue::FloatList(floats);
            }
            RequestValue::StrList(items.into_iter().map(|x| x.to_string()).collect())
        } else if let Ok(v) = t.parse::<i64>() {
            RequestValue::Int(v)
        } else if let Ok(v) = t.parse::<f64>() {
            RequestValue::Float(v)
        } else {
            RequestValue::Str(t.to_string())
        }
    }

    pub fn as_strings(&self) -> Vec<String> {
        match self {
            RequestValue::Str(s) => vec![s.clone()],
            RequestValue::Int(i) => vec![i.to_string()],
            RequestValue::Float(f) => vec![f.to_string()],
            RequestValue::StrList(xs) => xs.clone(),
            RequestValue::IntList(xs) => xs.iter().map(|x| x.to_string()).collect(),
            RequestValue::FloatList(xs) => xs.iter().map(|x| x.to_string()).collect(),
        }
    }

    /// JSON value as the CDS endpoint expects it: strings stay strings,
    /// numbers stay numbers, lists become arrays.
    pub fn to_json(&self) -> Value {
        match self {
            RequestValue::Str(s) => Value::String(s.clone()),
            RequestValue::Int(i) => Value::from(*i),
            RequestValue::Float(f) => Value::from(*f),
            RequestValue::StrList(xs) => Value::Array(xs.iter().map(|x| Value::String(x.clone())).collect()),
            RequestValue::IntList(xs) => Value::Array(xs.iter().map(|x| Value::from(*x)).collect()),
            RequestValue::FloatList(xs) => Value::Array(xs.iter().map(|x| Value::from(*x)).collect()),
        }
    }
}

/// Retrieval request expressed as keyword/value pairs.
///
/// Field values are passed through verbatim; whether a combination is valid
/// for a given dataset is decided service-side, never here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    pub(crate) inner: BTreeMap<String, RequestValue>,
}

impl Request {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Insert a keyword/value pair (value can be a scalar or list).
    pub fn kw(mut self, key: impl Into<String>, value: impl Into<RequestValue>) -> Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    /// Construct a request from an iterator of keyword/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<RequestValue>,
    {
        let mut r = Self::new();
        for (k, v) in pairs {
            r = r.kw(k, v);
        }
        r
    }

    /// Construct a request from string pairs (typical for config inputs).
    /// Values are parsed with [`RequestValue::parse_auto`].
    pub fn from_str_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut r = Self::new();
        for (k, v) in pairs {
            r = r.kw(k, RequestValue::parse_auto(v.as_ref()));
        }
        r
    }

    pub fn set(&mut self, key: impl Into<String>, value: RequestValue) {
        self.inner.insert(key.into(), value);
    }

    // Convenience builders for the common CDS keywords.
    pub fn product_type(self, v: impl Into<RequestValue>) -> Self {
        self.kw("product_type", v)
    }

    pub fn variable(self, v: impl Into<RequestValue>) -> Self {
        self.kw("variable", v)
    }

    pub fn grid_resolution(self, v: impl Into<RequestValue>) -> Self {
        self.kw("grid_resolution", v)
    }

    pub fn period(self, v: impl Into<RequestValue>) -> Self {
        self.kw("period", v)
    }

    pub fn version(self, v: impl Into<RequestValue>) -> Self {
        self.kw("version", v)
    }

    pub fn format(self, v: impl Into<RequestValue>) -> Self {
        self.kw("format", v)
    }

    pub fn year(self, v: impl Into<RequestValue>) -> Self {
        self.kw("year", v)
    }

    pub fn month(self, v: impl Into<RequestValue>) -> Self {
        self.kw("month", v)
    }

    pub fn day(self, v: impl Into<RequestValue>) -> Self {
        self.kw("day", v)
    }

    pub fn time(self, v: impl Into<RequestValue>) -> Self {
        self.kw("time", v)
    }

    pub fn date(self, v: impl Into<RequestValue>) -> Self {
        self.kw("date", v)
    }

    /// Bounding box as north/west/south/east.
    pub fn area(self, v: impl Into<RequestValue>) -> Self {
        self.kw("area", v)
    }

    /// Local output path; `Client::retrieve` takes an explicit `target`
    /// argument, but keeping it in the request is also accepted.
    pub fn target(self, v: impl Into<RequestValue>) -> Self {
        self.kw("target", v)
    }

    pub fn get(&self, key: &str) -> Option<&RequestValue> {
        self.inner.get(key)
    }

    pub fn remove(&mut self, key: &str) {
        self.inner.remove(key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RequestValue)> {
        self.inner.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The POST body submitted to `resources/{dataset}`.
    ///
    /// `target` is a client-side keyword and is stripped before submission.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (k, v) in &self.inner {
            if k == "target" {
                continue;
            }
            map.insert(k.clone(), v.to_json());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::{Request, RequestValue};
    use serde_json::json;

    #[test]
    fn parse_auto_scalars() {
        assert_eq!(RequestValue::parse_auto("5"), RequestValue::Int(5));
        assert_eq!(RequestValue::parse_auto("0.25"), RequestValue::Float(0.25));
        assert_eq!(
            RequestValue::parse_auto("ensemble_mean"),
            RequestValue::Str("ensemble_mean".to_string())
        );
        // Dataset tokens with digits stay strings.
        assert_eq!(
            RequestValue::parse_auto("2011_2023"),
            RequestValue::Str("2011_2023".to_string())
        );
        assert_eq!(
            RequestValue::parse_auto("0.1deg"),
            RequestValue::Str("0.1deg".to_string())
        );
    }

    #[test]
    fn parse_auto_lists() {
        assert_eq!(
            RequestValue::parse_auto("relative_humidity,wind_speed"),
            RequestValue::StrList(vec!["relative_humidity".to_string(), "wind_speed".to_string()])
        );
        assert_eq!(
            RequestValue::parse_auto("[75, -40, 25, 75]"),
            RequestValue::IntList(vec![75, -40, 25, 75])
        );
        assert_eq!(
            RequestValue::parse_auto("75.5,-40.25"),
            RequestValue::FloatList(vec![75.5, -40.25])
        );
    }

    #[test]
    fn from_str_pairs_builds_request() {
        let r = Request::from_str_pairs([("variable", "2m_temperature,precipitation"), ("version", "28.0e")]);
        assert_eq!(
            r.get("variable"),
            Some(&RequestValue::StrList(vec![
                "2m_temperature".to_string(),
                "precipitation".to_string()
            ]))
        );
        assert_eq!(r.get("version"), Some(&RequestValue::Str("28.0e".to_string())));
    }

    #[test]
    fn to_json_carries_all_fields_verbatim() {
        let r = Request::new()
            .product_type("ensemble_mean")
            .variable(["relative_humidity", "wind_speed"])
            .grid_resolution("0.1deg")
            .period("2011_2023")
            .version("28.0e")
            .format("tgz");

        assert_eq!(
            r.to_json(),
            json!({
                "format": "tgz",
                "grid_resolution": "0.1deg",
                "period": "2011_2023",
                "product_type": "ensemble_mean",
                "variable": ["relative_humidity", "wind_speed"],
                "version": "28.0e",
            })
        );
    }

    #[test]
    fn to_json_strips_target_but_nothing_else() {
        let r = Request::new().variable("wind_speed").target("download.tar.gz");
        let body = r.to_json();
        assert!(body.get("target").is_none());
        assert_eq!(body.get("variable"), Some(&json!("wind_speed")));
    }

    #[test]
    fn no_local_schema_validation() {
        // An empty variable list is still serialized; the service rejects it.
        let r = Request::new().variable(Vec::<String>::new());
        assert_eq!(r.to_json(), json!({ "variable": [] }));
    }

    #[test]
    fn date_keyword_accepts_naive_date() {
        let d = chrono::NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        let r = Request::new().date(d);
        assert_eq!(r.get("date"), Some(&RequestValue::Str("2023-12-31".to_string())));
    }
}
