use std::collections::HashMap;

/// Parse the query string of a request URI into key/value pairs.
///
/// Values are URL decoded; a key without `=` maps to an empty string. When a
/// key repeats, the last value wins.
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    let Some((_, query)) = uri.split_once('?') else {
        return params;
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
        let plus_decoded = raw.replace('+', " ");
        let value = urlencoding::decode(&plus_decoded)
            .map(|v| v.into_owned())
            .unwrap_or(plus_decoded);
        params.insert(key.to_string(), value);
    }

    params
}

/// UI toggles of the single post view, carried in the query string.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ViewFlags {
    /// `?edit=1`: post edit form instead of the post.
    pub editing_post: bool,
    /// `?review=<id>`: inline edit form for that review.
    pub editing_review: Option<String>,
    /// `?back=/path`: where delete and validate return to.
    pub back: Option<String>,
}

impl ViewFlags {
    pub fn from_uri(uri: &str) -> Self {
        let params = parse_query_params(uri);
        Self {
            editing_post: get_bool_flag(&params, "edit"),
            editing_review: params.get("review").filter(|v| !v.is_empty()).cloned(),
            back: params.get("back").filter(|v| !v.is_empty()).cloned(),
        }
    }
}

/// A flag is set by `1`, `true` or a bare key (`?edit`).
pub fn get_bool_flag(params: &HashMap<String, String>, key: &str) -> bool {
    params
        .get(key)
        .map(|v| matches!(v.as_str(), "" | "1" | "true"))
        .unwrap_or(false)
}
