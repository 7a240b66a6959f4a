//! Pattern-matching operators: LIKE, ILIKE, affix matches, full-text match.

use std::sync::Arc;

use sea_query::{Expr, LikeExpr, SimpleExpr};

use super::{Operator, OperatorInput, OperatorRegistry};
use crate::search::error::ValidationError;
use crate::search::expr::Expression;
use crate::search::params::{bool_param, char_param, str_param};

/// Escape character used by `autoescape` when no `escape` is given.
const DEFAULT_ESCAPE: char = '\\';

pub(super) fn register(registry: &mut OperatorRegistry) {
    let likes: [(bool, bool, &'static [&'static str]); 4] = [
        (false, false, &["like"]),
        (true, false, &["notlike", "not_like"]),
        (false, true, &["ilike"]),
        (true, true, &["notilike", "not_ilike"]),
    ];
    for (negated, insensitive, aliases) in likes {
        registry.register(Arc::new(Like {
            negated,
            insensitive,
            aliases,
        }));
    }

    let affixes: [(Affix, bool, &'static [&'static str]); 6] = [
        (Affix::Contains, false, &["contains"]),
        (Affix::Contains, true, &["icontains"]),
        (Affix::Prefix, false, &["startswith"]),
        (Affix::Prefix, true, &["istartswith"]),
        (Affix::Suffix, false, &["endswith"]),
        (Affix::Suffix, true, &["iendswith"]),
    ];
    for (affix, insensitive, aliases) in affixes {
        registry.register(Arc::new(AffixMatch {
            affix,
            insensitive,
            aliases,
        }));
    }

    registry.register(Arc::new(Match));
}

/// Escape LIKE wildcards (and the escape character itself) so a value
/// matches literally.
pub fn escape_like_wildcards(value: &str, escape: char) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == escape || c == '%' || c == '_' {
            escaped.push(escape);
        }
        escaped.push(c);
    }
    escaped
}

/// `lhs [NOT] LIKE|ILIKE pattern [ESCAPE c]`.
fn like_expr(
    lhs: SimpleExpr,
    pattern: String,
    escape: Option<char>,
    insensitive: bool,
    negated: bool,
) -> SimpleExpr {
    if !insensitive {
        let like = match escape {
            Some(c) => LikeExpr::new(pattern).escape(c),
            None => LikeExpr::new(pattern),
        };
        return if negated {
            lhs.not_like(like)
        } else {
            lhs.like(like)
        };
    }

    let keyword = if negated { "NOT ILIKE" } else { "ILIKE" };
    match escape {
        Some(c) => Expr::cust_with_exprs(
            format!("$1 {keyword} $2 ESCAPE $3"),
            [lhs, Expr::val(pattern).into(), Expr::val(c.to_string()).into()],
        ),
        None => Expr::cust_with_exprs(format!("$1 {keyword} $2"), [lhs, Expr::val(pattern).into()]),
    }
}

struct Like {
    negated: bool,
    insensitive: bool,
    aliases: &'static [&'static str],
}

impl Operator for Like {
    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn params(&self) -> &'static [&'static str] {
        &["escape"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let pattern = input.text()?.to_string();
        let escape = char_param(input.alias, input.param, "escape")?;
        let expr = like_expr(input.lhs()?, pattern, escape, self.insensitive, self.negated);
        Ok(input.finish(expr))
    }
}

#[derive(Debug, Clone, Copy)]
enum Affix {
    Contains,
    Prefix,
    Suffix,
}

/// `contains`/`startswith`/`endswith` and their case-insensitive forms.
///
/// The value is wrapped in wildcards and handed to LIKE (or ILIKE). With
/// `autoescape`, wildcards inside the value match literally.
struct AffixMatch {
    affix: Affix,
    insensitive: bool,
    aliases: &'static [&'static str],
}

impl Operator for AffixMatch {
    fn aliases(&self) -> &'static [&'static str] {
        self.aliases
    }

    fn params(&self) -> &'static [&'static str] {
        &["autoescape", "escape"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let value = input.text()?;
        let mut escape = char_param(input.alias, input.param, "escape")?;
        let value = if bool_param(input.alias, input.param, "autoescape")? {
            let c = *escape.get_or_insert(DEFAULT_ESCAPE);
            escape_like_wildcards(value, c)
        } else {
            value.to_string()
        };

        let pattern = match self.affix {
            Affix::Contains => format!("%{value}%"),
            Affix::Prefix => format!("{value}%"),
            Affix::Suffix => format!("%{value}"),
        };
        let expr = like_expr(input.lhs()?, pattern, escape, self.insensitive, false);
        Ok(input.finish(expr))
    }
}

/// Full-text match against `plainto_tsquery`.
struct Match;

impl Operator for Match {
    fn aliases(&self) -> &'static [&'static str] {
        &["match"]
    }

    fn params(&self) -> &'static [&'static str] {
        &["config"]
    }

    fn apply(&self, input: OperatorInput<'_>) -> Result<Expression, ValidationError> {
        let query: SimpleExpr = Expr::val(input.text()?).into();
        let lhs = input.lhs()?;
        let expr = match str_param(input.alias, input.param, "config")? {
            Some(config) => Expr::cust_with_exprs(
                "$1 @@ plainto_tsquery($2, $3)",
                [lhs, Expr::val(config).into(), query],
            ),
            None => Expr::cust_with_exprs("$1 @@ plainto_tsquery($2)", [lhs, query]),
        };
        Ok(input.finish(expr))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::tests::{int, render_where, text};
    use super::escape_like_wildcards;
    use crate::search::error::ValidationError;
    use crate::search::expr::EvalValue;
    use serde_json::json;

    #[test]
    fn escape_like_wildcards_function() {
        assert_eq!(escape_like_wildcards("hello", '\\'), "hello");
        assert_eq!(escape_like_wildcards("100%", '\\'), "100\\%");
        assert_eq!(escape_like_wildcards("a_b", '\\'), "a\\_b");
        assert_eq!(escape_like_wildcards("a\\b", '\\'), "a\\\\b");
        assert_eq!(escape_like_wildcards("5%!", '!'), "5!%!!");
    }

    #[test]
    fn string_operators_reject_non_strings() {
        for alias in [
            "like",
            "not_like",
            "ilike",
            "not_ilike",
            "match",
            "contains",
            "icontains",
            "startswith",
            "istartswith",
            "endswith",
            "iendswith",
        ] {
            for value in [int(3), EvalValue::List(vec![text("a")])] {
                let err = render_where(alias, "User.name", value, json!({})).unwrap_err();
                assert!(
                    matches!(err, ValidationError::InvalidValue { .. }),
                    "{alias} accepted a non-string"
                );
            }
        }
    }

    #[test]
    fn istartswith_is_ilike_with_trailing_wildcard() {
        let prefixed = render_where("istartswith", "User.name", text("abc"), json!({})).unwrap();
        let ilike = render_where("ilike", "User.name", text("abc%"), json!({})).unwrap();
        assert_eq!(prefixed, ilike);
        assert!(prefixed.contains(r#""users"."name" ILIKE 'abc%'"#), "{prefixed}");
    }

    #[test]
    fn iendswith_is_ilike_with_leading_wildcard() {
        let suffixed = render_where("iendswith", "User.name", text("abc"), json!({})).unwrap();
        let ilike = render_where("ilike", "User.name", text("%abc"), json!({})).unwrap();
        assert_eq!(suffixed, ilike);
    }

    #[test]
    fn contains_wraps_both_sides() {
        let sql = render_where("contains", "User.name", text("ann"), json!({})).unwrap();
        assert!(sql.contains(r#""users"."name" LIKE '%ann%'"#), "{sql}");
    }

    #[test]
    fn autoescape_makes_wildcards_literal() {
        let sql = render_where(
            "startswith",
            "User.name",
            text("100%"),
            json!({"autoescape": true, "escape": "!"}),
        )
        .unwrap();
        assert!(sql.contains("LIKE '100!%%'"), "{sql}");
        assert!(sql.contains("ESCAPE '!'"), "{sql}");
    }

    #[test]
    fn negated_likes() {
        let sql = render_where("not_like", "User.name", text("a%"), json!({})).unwrap();
        assert!(sql.contains("NOT LIKE 'a%'"), "{sql}");
        let sql = render_where("notilike", "User.name", text("a%"), json!({})).unwrap();
        assert!(sql.contains("NOT ILIKE 'a%'"), "{sql}");
    }

    #[test]
    fn like_rejects_wide_escape() {
        let err = render_where("like", "User.name", text("a"), json!({"escape": "!!"})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidParam { .. }));
    }

    #[test]
    fn full_text_match() {
        let sql = render_where("match", "User.name", text("fast cars"), json!({})).unwrap();
        assert!(
            sql.contains(r#""users"."name" @@ plainto_tsquery('fast cars')"#),
            "{sql}"
        );
        let sql = render_where(
            "match",
            "User.name",
            text("fast cars"),
            json!({"config": "english"}),
        )
        .unwrap();
        assert!(sql.contains("plainto_tsquery('english', 'fast cars')"), "{sql}");
    }
}
