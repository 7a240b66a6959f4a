//! String functions.

use std::sync::Arc;

use sea_query::{Alias, Expr, Func, SimpleExpr};

use super::{Function, FunctionInput, FunctionRegistry};
use crate::search::error::ValidationError;
use crate::search::expr::Expression;

pub(super) fn register(registry: &mut FunctionRegistry) {
    for kind in [
        StringFn::Concat,
        StringFn::Coalesce,
        StringFn::Substring,
        StringFn::SubstringIndex,
        StringFn::Length,
        StringFn::CharLength,
        StringFn::Lower,
    ] {
        registry.register(Arc::new(kind));
    }
}

#[derive(Debug, Clone, Copy)]
enum StringFn {
    Concat,
    Coalesce,
    Substring,
    /// Text before the `n`-th occurrence of a delimiter.
    SubstringIndex,
    Length,
    CharLength,
    Lower,
}

impl Function for StringFn {
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Concat => &["concat"],
            Self::Coalesce => &["coalesce"],
            Self::Substring => &["substring"],
            Self::SubstringIndex => &["substring_index"],
            Self::Length => &["length"],
            Self::CharLength => &["char_length"],
            Self::Lower => &["lower"],
        }
    }

    fn apply(&self, input: FunctionInput<'_>) -> Result<Expression, ValidationError> {
        let expr: SimpleExpr = match self {
            Self::Concat | Self::Coalesce => {
                if input.args.is_empty() {
                    return Err(input.arity("at least 1"));
                }
                let args = input.operands()?;
                match self {
                    Self::Coalesce => Func::coalesce(args).into(),
                    _ => Func::cust(Alias::new("CONCAT")).args(args).into(),
                }
            }
            Self::Substring => {
                if !(2..=3).contains(&input.args.len()) {
                    return Err(input.arity("2 or 3"));
                }
                Func::cust(Alias::new("SUBSTRING"))
                    .args(input.operands()?)
                    .into()
            }
            Self::SubstringIndex => {
                let args = input.operands()?;
                let [text, delimiter, count]: [SimpleExpr; 3] =
                    args.try_into().map_err(|_| input.arity("3"))?;
                // A negative count keeps the text after the n-th delimiter
                // from the right.
                Expr::cust_with_exprs(
                    concat!(
                        "ARRAY_TO_STRING(CASE WHEN ($3) >= 0 ",
                        "THEN (STRING_TO_ARRAY($1, $2))[1 : ($3)] ",
                        "ELSE (STRING_TO_ARRAY($1, $2))",
                        "[ARRAY_LENGTH(STRING_TO_ARRAY($1, $2), 1) + ($3) + 1 :] END, $2)",
                    ),
                    [text, delimiter, count],
                )
            }
            Self::Length => Func::cust(Alias::new("LENGTH"))
                .arg(input.single()?.operand()?)
                .into(),
            Self::CharLength => Func::char_length(input.single()?.operand()?).into(),
            Self::Lower => Func::lower(input.single()?.operand()?).into(),
        };
        Ok(input.finish(expr))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::super::tests::{args, render, render_args};
    use crate::search::error::ValidationError;
    use crate::search::expr::{Expression, Sources, Term};
    use crate::search::operators::tests::shop;
    use sea_query::Expr;
    use serde_json::json;

    fn count(n: i64) -> Expression {
        Expression {
            term: Term::Value(Expr::val(n).into()),
            sources: Sources::default(),
            name: n.to_string(),
        }
    }

    #[test]
    fn concat_is_variadic() {
        let models = shop();
        let mut list = args(&models, &["User.name"]);
        list.push(Expression::literal(" <"));
        list.extend(args(&models, &["User.email"]));
        let sql = render_args("concat", list, json!({})).unwrap();
        assert!(
            sql.contains(r#"CONCAT("users"."name", ' <', "users"."email")"#),
            "{sql}"
        );
    }

    #[test]
    fn coalesce_requires_an_argument() {
        let err = render("coalesce", &[], json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::Arity { found: 0, .. }));
        let sql = render("coalesce", &["User.name", "User.email"], json!({})).unwrap();
        assert!(sql.contains(r#"COALESCE("users"."name", "users"."email")"#), "{sql}");
    }

    #[test]
    fn substring_index_splits_on_the_delimiter() {
        let models = shop();
        let mut list = args(&models, &["User.email"]);
        list.push(Expression::literal("@"));
        list.push(count(1));
        let sql = render_args("substring_index", list, json!({})).unwrap();
        assert!(
            sql.contains(concat!(
                r#"ARRAY_TO_STRING(CASE WHEN (1) >= 0 "#,
                r#"THEN (STRING_TO_ARRAY("users"."email", '@'))[1 : (1)] "#,
                r#"ELSE (STRING_TO_ARRAY("users"."email", '@'))"#,
                r#"[ARRAY_LENGTH(STRING_TO_ARRAY("users"."email", '@'), 1) + (1) + 1 :] END, '@')"#,
            )),
            "{sql}"
        );
        assert!(!sql.contains('$'), "{sql}");

        let err = render("substring_index", &["User.email"], json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::Arity { found: 1, .. }));
    }

    #[test]
    fn substring_index_counts_from_the_right_when_negative() {
        let models = shop();
        let mut list = args(&models, &["User.email"]);
        list.push(Expression::literal("."));
        list.push(count(-2));
        let sql = render_args("substring_index", list, json!({})).unwrap();
        assert!(sql.contains("CASE WHEN (-2) >= 0"), "{sql}");
        assert!(
            sql.contains(r#"[ARRAY_LENGTH(STRING_TO_ARRAY("users"."email", '.'), 1) + (-2) + 1 :]"#),
            "{sql}"
        );
        assert!(!sql.contains('$'), "{sql}");
    }

    #[test]
    fn single_argument_functions() {
        let sql = render("lower", &["User.name"], json!({})).unwrap();
        assert!(sql.contains(r#"LOWER("users"."name")"#), "{sql}");
        let sql = render("length", &["User.name"], json!({})).unwrap();
        assert!(sql.contains(r#"LENGTH("users"."name")"#), "{sql}");
        let sql = render("char_length", &["User.name"], json!({})).unwrap();
        assert!(sql.contains(r#"CHAR_LENGTH("users"."name")"#), "{sql}");

        let err = render("lower", &["User.name", "User.email"], json!({})).unwrap_err();
        assert!(matches!(err, ValidationError::Arity { .. }));
    }

    #[test]
    fn substring_arity() {
        assert!(render("substring", &["User.name"], json!({})).is_err());
        assert!(render("substring", &["User.name", "User.id"], json!({})).is_ok());
    }
}
