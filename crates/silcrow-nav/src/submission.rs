//! Form submissions and search-string helpers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP-style method of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl FormMethod {
    /// Non-GET submissions run actions; GET submissions only run loaders
    pub fn is_mutation(self) -> bool {
        !matches!(self, FormMethod::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FormMethod::Get => "GET",
            FormMethod::Post => "POST",
            FormMethod::Put => "PUT",
            FormMethod::Patch => "PATCH",
            FormMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for FormMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmissionBody {
    Form(Vec<(String, String)>),
    Json(Value),
    Text(String),
}

/// A form submission: method, target href and body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub method: FormMethod,
    pub action: String,
    pub body: SubmissionBody,
}

impl Submission {
    pub fn new(method: FormMethod, action: impl Into<String>, body: SubmissionBody) -> Self {
        Self {
            method,
            action: action.into(),
            body,
        }
    }

    /// A POST of url-encoded form fields
    pub fn post_form<K, V>(action: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(FormMethod::Post, action, SubmissionBody::Form(collect_fields(fields)))
    }

    pub fn post_json(action: impl Into<String>, json: Value) -> Self {
        Self::new(FormMethod::Post, action, SubmissionBody::Json(json))
    }

    /// A GET form: fields become the search string of the target
    pub fn get<K, V>(action: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(FormMethod::Get, action, SubmissionBody::Form(collect_fields(fields)))
    }

    pub fn with_method(mut self, method: FormMethod) -> Self {
        self.method = method;
        self
    }

    /// First value of a form field
    pub fn field(&self, name: &str) -> Option<&str> {
        match &self.body {
            SubmissionBody::Form(fields) => fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            SubmissionBody::Json(_) | SubmissionBody::Text(_) => None,
        }
    }

    /// Search string a GET submission navigates to
    ///
    /// A naked `index` on the action is preserved so index targeting survives.
    pub(crate) fn get_search(&self, action_search: &str) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if has_naked_index(action_search) {
            pairs.push(("index".to_string(), String::new()));
        }
        if let SubmissionBody::Form(fields) = &self.body {
            pairs.extend(fields.iter().cloned());
        }
        encode_search(&pairs)
    }
}

fn collect_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Vec<(String, String)>
where
    K: Into<String>,
    V: Into<String>,
{
    fields
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Decodes `?a=1&b=2` into ordered pairs
///
/// # Examples
///
/// ```
/// use silcrow_nav::search_params;
///
/// let pairs = search_params("?q=hello%20world&index&page=2");
/// assert_eq!(pairs[0], ("q".to_string(), "hello world".to_string()));
/// assert_eq!(pairs[1], ("index".to_string(), String::new()));
/// assert_eq!(pairs.len(), 3);
/// ```
pub fn search_params(search: &str) -> Vec<(String, String)> {
    search
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

/// Encodes pairs into a search string (`""` when empty)
pub fn encode_search(pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return String::new();
    }

    let encoded: Vec<String> = pairs
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                urlencoding::encode(key).into_owned()
            } else {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            }
        })
        .collect();
    format!("?{}", encoded.join("&"))
}

/// Whether the search has an `index` key with no value
pub fn has_naked_index(search: &str) -> bool {
    search_params(search)
        .iter()
        .any(|(key, value)| key == "index" && value.is_empty())
}

fn decode_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
