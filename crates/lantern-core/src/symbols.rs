use std::borrow::Cow;

/// Symbolic operators that cannot be case-folded into builtin keys.
static OPERATOR_NAMES: &[(&str, &str)] = &[
    ("+", "ADD"),
    ("-", "SUBTRACT"),
    ("*", "MULT"),
    ("/", "DIVIDE"),
    ("=", "EQUALS"),
    ("/=", "NOT_EQUALS"),
    ("<", "LESS_THAN"),
    (">", "GREATER_THAN"),
    ("<=", "LESS_OR_EQUAL"),
    (">=", "GREATER_OR_EQUAL"),
    ("1+", "ONE_PLUS"),
    ("1-", "ONE_MINUS"),
];

/// Symbol names are case-normalized at every point of creation and
/// lookup; two symbols differing only in case are the same name.
pub fn canonical_symbol_name(name: &str) -> Cow<'_, str> {
    if name.chars().any(|ch| ch.is_ascii_lowercase()) {
        Cow::Owned(name.to_ascii_uppercase())
    } else {
        Cow::Borrowed(name)
    }
}

/// Key into the builtin registry: the fixed operator table first, all
/// other names case-folded with `-` mapped to `_`.
pub fn builtin_key(name: &str) -> Cow<'_, str> {
    let canonical = canonical_symbol_name(name);
    if let Some(target) = OPERATOR_NAMES
        .iter()
        .find_map(|(op, target)| (*op == canonical.as_ref()).then_some(*target))
    {
        return Cow::Borrowed(target);
    }
    if canonical.contains('-') {
        Cow::Owned(canonical.replace('-', "_"))
    } else {
        canonical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_are_uppercase() {
        assert_eq!(canonical_symbol_name("square").as_ref(), "SQUARE");
        assert_eq!(canonical_symbol_name("SQUARE").as_ref(), "SQUARE");
        assert_eq!(canonical_symbol_name("MiXeD").as_ref(), "MIXED");
    }

    #[test]
    fn operator_table_wins_over_case_folding() {
        assert_eq!(builtin_key("+").as_ref(), "ADD");
        assert_eq!(builtin_key("<=").as_ref(), "LESS_OR_EQUAL");
        assert_eq!(builtin_key("1+").as_ref(), "ONE_PLUS");
    }

    #[test]
    fn dashes_fold_to_underscores() {
        assert_eq!(builtin_key("string-upcase").as_ref(), "STRING_UPCASE");
        assert_eq!(builtin_key("car").as_ref(), "CAR");
    }
}
