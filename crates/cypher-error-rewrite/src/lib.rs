//! Authorization and authentication directives are validated against a schema where
//! every annotated type gets its own copy of the directive and its input types, named
//! after the type (`@MovieAuthorization`, `MovieAuthorizationWhere`). [`rewrite`] maps
//! those names back to the ones users wrote.

use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;

/// Applied in order, each rule once over the whole message. Replacements are never
/// matched by a later rule.
static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"\b[A-Z]\w*?(Subscriptions)?Authorization(FilterRule|ValidateRule|Where)\b",
            "${1}Authorization${2}",
        ),
        (r"\b[A-Z]\w*?JWTPayloadWhere\b", "JWTPayloadWhere"),
        (r"@[A-Z]\w*?SubscriptionsAuthorization\b", "@subscriptionsAuthorization"),
        (r"@[A-Z]\w*?Authorization\b", "@authorization"),
        (r"@[A-Z]\w*?Authentication\b", "@authentication"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("must be valid"), replacement))
    .collect()
});

/// Rewrites a validation message. Messages without generated names are returned as is.
pub fn rewrite(message: &str) -> Cow<'_, str> {
    let mut rewritten = Cow::Borrowed(message);

    for (pattern, replacement) in RULES.iter() {
        let replaced = match pattern.replace_all(&rewritten, *replacement) {
            Cow::Borrowed(_) => continue,
            Cow::Owned(replaced) => replaced,
        };

        rewritten = Cow::Owned(replaced);
    }

    rewritten
}
