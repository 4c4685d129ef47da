// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Recoverable resolution failures.
///
/// None of these abort a build: each is logged and the affected type, field,
/// or enum member degrades to a best-effort fallback. Fatal conditions
/// (engine preconditions) are reported separately as [`anyhow::Error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A referenced type name has no matching declaration.
    #[error("no declaration found for `{name}`")]
    NotFound { name: String },

    /// Two qualified names collide on the same bare suffix; the first one
    /// found keeps the redirect.
    #[error("redirect `{short}` is ambiguous: kept `{kept}`, ignored `{ignored}`")]
    AmbiguousRedirect {
        short: String,
        kept: String,
        ignored: String,
    },

    /// Unbalanced brackets or a wrong argument count in instantiation text.
    #[error("malformed generic instantiation `{text}`")]
    MalformedGenericSyntax { text: String },

    /// A constant's expression shape is outside the evaluable grammar.
    #[error("constant `{name}` could not be evaluated")]
    ConstantEvaluationFailure { name: String },

    /// A declaration transitively embeds itself.
    #[error("cyclic reference through `{name}`")]
    CyclicReference { name: String },
}
