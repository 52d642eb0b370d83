//! Template variable substitution for raw SQL text.
//!
//! Dashboard variables are referenced inside SQL as `$name` or `${name}`.
//! Substitution replaces each reference with the variable's current value,
//! formatting list values so they can sit inside a SQL `IN (...)` clause.

use std::collections::HashMap;

use serde_json::Value;

/// Replaces every variable reference in `text` with its bound value.
///
/// Absent input passes through unchanged: substitution is a no-op on
/// `None`, not an error. References to unbound variables are left verbatim
/// so that the backend remains the source of truth for unknown names.
///
/// List values are joined with `,` when every element is numeric, and
/// otherwise quoted and joined with `','`:
///
/// ```
/// use std::collections::HashMap;
/// use serde_json::json;
/// use grafana_openobserve_datasource::variables::substitute;
///
/// let bindings = HashMap::from([("var".to_string(), json!([1, 2, 3]))]);
/// assert_eq!(
///     substitute(Some("x in ($var)"), &bindings).as_deref(),
///     Some("x in (1,2,3)"),
/// );
/// ```
pub fn substitute(text: Option<&str>, bindings: &HashMap<String, Value>) -> Option<String> {
    let text = text?;
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match parse_reference(rest) {
            Some((name, len)) => {
                match bindings.get(name) {
                    Some(value) => out.push_str(&render(value)),
                    None => out.push_str(&rest[..len]),
                }
                rest = &rest[len..];
            }
            None => {
                out.push('$');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Some(out)
}

/// Parses a variable reference at the start of `input` (which begins with
/// `$`), returning the variable name and the byte length of the whole
/// reference. References with format specifiers (`${name:csv}`) are not
/// simple bindings and are left for the host to interpret.
fn parse_reference(input: &str) -> Option<(&str, usize)> {
    let body = &input[1..];
    if let Some(braced) = body.strip_prefix('{') {
        let end = braced.find('}')?;
        let name = &braced[..end];
        if !name.is_empty() && name.chars().all(is_ident_char) {
            // `$` + `{` + name + `}`.
            return Some((name, 2 + end + 1));
        }
        return None;
    }
    let end = body
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(body.len());
    if end == 0 {
        return None;
    }
    Some((&body[..end], 1 + end))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn render(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(render_scalar).collect();
            if items.iter().all(Value::is_number) {
                rendered.join(",")
            } else {
                format!("'{}'", rendered.join("','"))
            }
        }
        other => render_scalar(other),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn bindings(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn absent_text_passes_through() {
        assert_eq!(substitute(None, &HashMap::new()), None);
    }

    #[test]
    fn scalar_number() {
        let b = bindings(&[("var", json!(5))]);
        assert_eq!(substitute(Some("x = $var"), &b).as_deref(), Some("x = 5"));
    }

    #[test]
    fn scalar_string_is_plain_coercion() {
        let b = bindings(&[("level", json!("error"))]);
        assert_eq!(
            substitute(Some("level = '$level'"), &b).as_deref(),
            Some("level = 'error'"),
        );
    }

    #[test]
    fn numeric_list_joins_unquoted() {
        let b = bindings(&[("var", json!([1, 2, 3]))]);
        assert_eq!(
            substitute(Some("x in ($var)"), &b).as_deref(),
            Some("x in (1,2,3)"),
        );
    }

    #[test]
    fn string_list_joins_quoted() {
        let b = bindings(&[("var", json!(["a", "b"]))]);
        assert_eq!(
            substitute(Some("x in ($var)"), &b).as_deref(),
            Some("x in ('a','b')"),
        );
    }

    #[test]
    fn mixed_list_is_quoted() {
        let b = bindings(&[("var", json!([1, "b"]))]);
        assert_eq!(
            substitute(Some("x in ($var)"), &b).as_deref(),
            Some("x in ('1','b')"),
        );
    }

    #[test]
    fn braced_reference() {
        let b = bindings(&[("var", json!(7))]);
        assert_eq!(
            substitute(Some("x = ${var} and y = ${var}"), &b).as_deref(),
            Some("x = 7 and y = 7"),
        );
    }

    #[test]
    fn unbound_reference_left_verbatim() {
        let b = bindings(&[("var", json!(5))]);
        assert_eq!(
            substitute(Some("x = $other and y = ${other}"), &b).as_deref(),
            Some("x = $other and y = ${other}"),
        );
    }

    #[test]
    fn format_specifier_left_for_host() {
        let b = bindings(&[("var", json!(5))]);
        assert_eq!(
            substitute(Some("x = ${var:csv}"), &b).as_deref(),
            Some("x = ${var:csv}"),
        );
    }

    #[test]
    fn bare_dollar_is_literal() {
        let b = bindings(&[("var", json!(5))]);
        assert_eq!(
            substitute(Some("cost is 3$ per $var"), &b).as_deref(),
            Some("cost is 3$ per 5"),
        );
    }
}
