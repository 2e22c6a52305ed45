//! Tokens
//!
//! A token is the identity of one named, typed value in a dataflow. Tokens
//! are compared by identity, not by name: two tokens created with the same
//! code name are distinct nodes.
//!
//! `Token<T>` is the typed handle callers hold. `TokenRef` is the
//! type-erased identity the graph, the scheduler and the execution log work
//! with.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

/// Unique identifier for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(u64);

impl TokenId {
    /// Generate a new unique token ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Descriptive metadata attached to a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub id: TokenId,
    /// Short identifier used in logs and diagrams.
    pub code_name: String,
    /// Human friendly name. Defaults to the code name.
    pub summary_name: String,
    pub description: Option<String>,
    /// Rust type name of the value this token carries.
    pub type_name: String,
}

/// Type-erased token identity.
///
/// Equality and hashing only consider the token id.
#[derive(Clone)]
pub struct TokenRef {
    meta: Arc<TokenMeta>,
}

impl TokenRef {
    pub fn id(&self) -> TokenId {
        self.meta.id
    }

    pub fn code_name(&self) -> &str {
        &self.meta.code_name
    }

    pub fn summary_name(&self) -> &str {
        &self.meta.summary_name
    }

    pub fn description(&self) -> Option<&str> {
        self.meta.description.as_deref()
    }

    pub fn type_name(&self) -> &str {
        &self.meta.type_name
    }

    pub fn meta(&self) -> &TokenMeta {
        &self.meta
    }
}

impl PartialEq for TokenRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TokenRef {}

impl Hash for TokenRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.meta.code_name, self.meta.id)
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.meta.code_name)
    }
}

impl Serialize for TokenRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.meta.serialize(serializer)
    }
}

/// A typed token.
///
/// # Example
///
/// ```rust
/// use tributary_core::Token;
///
/// let width: Token<u32> = Token::new("width");
/// let alias = width.clone();
/// assert_eq!(width.id(), alias.id());
///
/// let other: Token<u32> = Token::new("width");
/// assert_ne!(width.id(), other.id());
/// ```
pub struct Token<T> {
    inner: TokenRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Token<T> {
    /// Create a new token with the given code name.
    pub fn new(code_name: impl Into<String>) -> Self {
        let code_name = code_name.into();
        Self::with_meta(code_name.clone(), code_name, None)
    }

    /// Create a new token with a summary name and description.
    pub fn described(
        code_name: impl Into<String>,
        summary_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::with_meta(code_name.into(), summary_name.into(), Some(description.into()))
    }

    fn with_meta(code_name: String, summary_name: String, description: Option<String>) -> Self {
        Self {
            inner: TokenRef {
                meta: Arc::new(TokenMeta {
                    id: TokenId::new(),
                    code_name,
                    summary_name,
                    description,
                    type_name: std::any::type_name::<T>().to_string(),
                }),
            },
            _marker: PhantomData,
        }
    }
}

impl<T> Token<T> {
    pub fn id(&self) -> TokenId {
        self.inner.id()
    }

    pub fn code_name(&self) -> &str {
        self.inner.code_name()
    }

    /// The type-erased identity of this token.
    pub fn erased(&self) -> &TokenRef {
        &self.inner
    }
}

impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for Token<T> {}

impl<T> Hash for Token<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<T> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl<T> From<&Token<T>> for TokenRef {
    fn from(token: &Token<T>) -> Self {
        token.inner.clone()
    }
}

/// Anything that can be listed as a dependency.
///
/// Lets tokens of different value types share one dependency list.
pub trait AnyToken {
    fn token_ref(&self) -> &TokenRef;
}

impl<T> AnyToken for Token<T> {
    fn token_ref(&self) -> &TokenRef {
        &self.inner
    }
}

impl AnyToken for TokenRef {
    fn token_ref(&self) -> &TokenRef {
        self
    }
}
