// Report request domain model - Dashboard variables and request identity
use std::collections::BTreeMap;
use thiserror::Error;

/// Prefix Grafana uses for dashboard template variables in URLs
pub const VARIABLE_PREFIX: &str = "var-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not read var-* parameter. Name of parameter {0:?} is not valid")]
pub struct InvalidVariableError(pub String);

/// Dashboard variables forwarded verbatim to every panel render request.
/// Every key carries the `var-` prefix; a key may hold several values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterVariables(BTreeMap<String, Vec<String>>);

impl FilterVariables {
    /// Collect variables, rejecting the whole set if any key lacks the prefix
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, InvalidVariableError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.into();
            if !key.starts_with(VARIABLE_PREFIX) {
                return Err(InvalidVariableError(key));
            }
            vars.entry(key).or_default().push(value.into());
        }
        Ok(Self(vars))
    }

    /// Parse a query string such as `var-a=1&var-b=x%20y`. `+` decodes to a space
    /// and a key without `=` gets an empty value.
    pub fn parse_query(query: &str) -> Result<Self, InvalidVariableError> {
        let decode = |part: &str| {
            let part = part.replace('+', " ");
            urlencoding::decode(&part)
                .map(|decoded| decoded.into_owned())
                .map_err(|_| InvalidVariableError(part.clone()))
        };

        let mut pairs = Vec::new();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            pairs.push((decode(key)?, decode(value)?));
        }
        Self::from_pairs(pairs)
    }

    /// Flattened (key, value) pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key.as_str(), value.as_str())))
    }

    /// URL query encoding, keys sorted
    pub fn encode(&self) -> String {
        self.iter()
            .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Dashboard uids end up in file names, so separators and parent references are refused
pub fn is_safe_dashboard_uid(uid: &str) -> bool {
    !(uid.is_empty() || uid.contains('/') || uid.contains('\\') || uid.contains(".."))
}

/// Identifier of one report request; names the scratch directory and the final file.
///
/// Expressions such as `now/d` contain characters that are not allowed in
/// file names, so everything outside `[A-Za-z0-9_.-]` is replaced by `_`.
pub fn correlation_id(uid: &str, from: &str, to: &str, render_collapsed: bool) -> String {
    let suffix = if render_collapsed { "_expanded" } else { "" };
    format!("{}_report_{}-{}{}", uid, from, to, suffix)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_groups_values() {
        let vars = FilterVariables::from_pairs([
            ("var-namespace", "monitoring"),
            ("var-pod", "b"),
            ("var-pod", "a"),
        ])
        .unwrap();

        let pairs: Vec<_> = vars.iter().collect();
        assert_eq!(
            pairs,
            vec![("var-namespace", "monitoring"), ("var-pod", "b"), ("var-pod", "a")]
        );
    }

    #[test]
    fn test_from_pairs_rejects_unprefixed_key() {
        let err = FilterVariables::from_pairs([("var-ok", "1"), ("namespace", "x")]).unwrap_err();
        assert_eq!(err, InvalidVariableError("namespace".to_string()));
        assert!(err.to_string().contains("\"namespace\""));
    }

    #[test]
    fn test_parse_query() {
        let vars = FilterVariables::parse_query("var-pod=a&var-dc=eu+west&var-pod=b%2Fc&&var-empty").unwrap();
        let pairs: Vec<_> = vars.iter().collect();
        assert_eq!(
            pairs,
            vec![("var-dc", "eu west"), ("var-empty", ""), ("var-pod", "a"), ("var-pod", "b/c")]
        );

        assert_eq!(FilterVariables::parse_query("").unwrap(), FilterVariables::default());
    }

    #[test]
    fn test_parse_query_rejects_whole_set() {
        let err = FilterVariables::parse_query("var-pod=a&namespace=monitoring").unwrap_err();
        assert_eq!(err, InvalidVariableError("namespace".to_string()));
    }

    #[test]
    fn test_encode() {
        let vars = FilterVariables::from_pairs([("var-b", "x y"), ("var-a", "1&2")]).unwrap();
        assert_eq!(vars.encode(), "var-a=1%262&var-b=x%20y");
        assert_eq!(FilterVariables::default().encode(), "");
    }

    #[test]
    fn test_correlation_id() {
        assert_eq!(
            correlation_id("dashboard1", "now-1h", "now", false),
            "dashboard1_report_now-1h-now"
        );
        assert_eq!(
            correlation_id("dashboard1", "now-1h", "now", true),
            "dashboard1_report_now-1h-now_expanded"
        );
        assert_eq!(
            correlation_id("dash", "now/d", "now/d", false),
            "dash_report_now_d-now_d"
        );
    }

    #[test]
    fn test_safe_dashboard_uid() {
        assert!(is_safe_dashboard_uid("k8s-nodes_01"));
        assert!(!is_safe_dashboard_uid(""));
        assert!(!is_safe_dashboard_uid("../etc"));
        assert!(!is_safe_dashboard_uid("a/b"));
        assert!(!is_safe_dashboard_uid("a\\b"));
    }
}
