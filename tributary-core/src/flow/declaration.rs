//! Dependency Declarations
//!
//! A declaration binds an outlet token either to a fixed initial value or
//! to a formula over an ordered list of dependency tokens. Declarations are
//! plain data: building one never runs anything.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::InputError;
use crate::token::{AnyToken, Token, TokenId, TokenRef};

/// A type-erased computed value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Error type returned by formula functions.
pub type FormulaError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Type-erased formula function.
pub type EvalFn = Arc<dyn Fn(&Inputs) -> Result<Value, FormulaError> + Send + Sync>;

/// Dependency list. Most formulas have only a handful of inputs.
pub type Dependencies = SmallVec<[TokenRef; 4]>;

/// Resolved dependency values handed to a formula.
pub struct Inputs {
    entries: SmallVec<[(TokenRef, Value); 4]>,
}

impl Inputs {
    pub(crate) fn new(entries: impl IntoIterator<Item = (TokenRef, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Read the resolved value of a dependency.
    pub fn get<T: Send + Sync + 'static>(&self, token: &Token<T>) -> Result<&T, InputError> {
        let value = self.raw(token.id()).ok_or_else(|| InputError::NotADependency {
            token: token.erased().clone(),
        })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| InputError::TypeMismatch {
                token: token.erased().clone(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Read a dependency and clone it out.
    pub fn cloned<T: Clone + Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<T, InputError> {
        self.get(token).cloned()
    }

    fn raw(&self, id: TokenId) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(token, _)| token.id() == id)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How an outlet token obtains its value.
#[derive(Clone)]
pub enum DeclarationKind {
    /// The token is fixed to this value. Shadows any formula.
    Initial(Value),

    /// The token is computed from its dependencies.
    Formula {
        depends_on: Dependencies,
        eval: EvalFn,
    },
}

/// Binding of an outlet token to a value source.
#[derive(Clone)]
pub struct Declaration {
    outlet: TokenRef,
    kind: DeclarationKind,
}

impl Declaration {
    /// Fix a token to a value.
    pub fn initial<T: Send + Sync + 'static>(outlet: &Token<T>, value: T) -> Self {
        Self {
            outlet: outlet.erased().clone(),
            kind: DeclarationKind::Initial(Arc::new(value)),
        }
    }

    /// Compute a token from the given dependencies.
    pub fn formula<T, F>(outlet: &Token<T>, depends_on: &[&dyn AnyToken], eval: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Inputs) -> Result<T, FormulaError> + Send + Sync + 'static,
    {
        Self {
            outlet: outlet.erased().clone(),
            kind: DeclarationKind::Formula {
                depends_on: depends_on.iter().map(|t| t.token_ref().clone()).collect(),
                eval: Arc::new(move |inputs: &Inputs| eval(inputs).map(|v| Arc::new(v) as Value)),
            },
        }
    }

    pub fn outlet(&self) -> &TokenRef {
        &self.outlet
    }

    pub fn kind(&self) -> &DeclarationKind {
        &self.kind
    }

    pub fn is_initial(&self) -> bool {
        matches!(self.kind, DeclarationKind::Initial(_))
    }

    /// Dependencies listed by this declaration. Empty for initial values.
    pub fn depends_on(&self) -> &[TokenRef] {
        match &self.kind {
            DeclarationKind::Initial(_) => &[],
            DeclarationKind::Formula { depends_on, .. } => depends_on,
        }
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DeclarationKind::Initial(_) => f
                .debug_struct("Declaration")
                .field("outlet", &self.outlet)
                .field("initial", &true)
                .finish(),
            DeclarationKind::Formula { depends_on, .. } => f
                .debug_struct("Declaration")
                .field("outlet", &self.outlet)
                .field("depends_on", depends_on)
                .finish(),
        }
    }
}

/// Second half of the fluent `token.depends_on(..).compute(..)` form.
pub struct FormulaBuilder<T> {
    outlet: Token<T>,
    depends_on: Dependencies,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> FormulaBuilder<T> {
    pub fn compute<F>(self, eval: F) -> Declaration
    where
        F: Fn(&Inputs) -> Result<T, FormulaError> + Send + Sync + 'static,
    {
        Declaration {
            outlet: self.outlet.erased().clone(),
            kind: DeclarationKind::Formula {
                depends_on: self.depends_on,
                eval: Arc::new(move |inputs: &Inputs| eval(inputs).map(|v| Arc::new(v) as Value)),
            },
        }
    }
}

impl<T: Send + Sync + 'static> Token<T> {
    /// Declare this token fixed to `value`.
    pub fn initialized_to(&self, value: T) -> Declaration {
        Declaration::initial(self, value)
    }

    /// Start declaring a formula for this token.
    pub fn depends_on(&self, depends_on: &[&dyn AnyToken]) -> FormulaBuilder<T> {
        FormulaBuilder {
            outlet: self.clone(),
            depends_on: depends_on.iter().map(|t| t.token_ref().clone()).collect(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(decl: &Declaration, inputs: &Inputs) -> Result<Value, FormulaError> {
        match decl.kind() {
            DeclarationKind::Formula { eval, .. } => eval(inputs),
            DeclarationKind::Initial(_) => panic!("not a formula"),
        }
    }

    #[test]
    fn initial_declaration_has_no_dependencies() {
        let a: Token<i32> = Token::new("a");
        let decl = a.initialized_to(2);
        assert!(decl.is_initial());
        assert!(decl.depends_on().is_empty());
        assert_eq!(decl.outlet(), a.erased());
    }

    #[test]
    fn formula_reads_typed_inputs() {
        let a: Token<i32> = Token::new("a");
        let s: Token<String> = Token::new("s");
        let out: Token<String> = Token::new("out");

        let (a2, s2) = (a.clone(), s.clone());
        let decl = out
            .depends_on(&[&a, &s])
            .compute(move |inputs| Ok(format!("{}{}", inputs.get(&s2)?, inputs.get(&a2)?)));
        assert_eq!(decl.depends_on(), &[a.erased().clone(), s.erased().clone()]);

        let inputs = Inputs::new([
            (a.erased().clone(), Arc::new(7) as Value),
            (s.erased().clone(), Arc::new("x".to_string()) as Value),
        ]);
        let value = eval(&decl, &inputs).unwrap();
        assert_eq!(value.downcast_ref::<String>().unwrap(), "x7");
    }

    #[test]
    fn reading_an_undeclared_input_fails() {
        let a: Token<i32> = Token::new("a");
        let b: Token<i32> = Token::new("b");
        let inputs = Inputs::new([(a.erased().clone(), Arc::new(1) as Value)]);

        let err = inputs.get(&b).unwrap_err();
        assert!(matches!(err, InputError::NotADependency { .. }));
        assert_eq!(inputs.cloned(&a).unwrap(), 1);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let a: Token<i32> = Token::new("a");
        let inputs = Inputs::new([(a.erased().clone(), Arc::new("oops") as Value)]);
        let err = inputs.get(&a).unwrap_err();
        assert!(matches!(err, InputError::TypeMismatch { .. }));
    }

    #[test]
    fn formula_errors_pass_through() {
        let a: Token<i32> = Token::new("a");
        let out: Token<i32> = Token::new("out");
        let input = a.clone();
        let decl = Declaration::formula(&out, &[&a], move |inputs| {
            let a = *inputs.get(&input)?;
            if a == 0 {
                return Err("division by zero".into());
            }
            Ok(1 / a)
        });
        let inputs = Inputs::new([(a.erased().clone(), Arc::new(0) as Value)]);
        let err = eval(&decl, &inputs).err().unwrap();
        assert_eq!(err.to_string(), "division by zero");
    }
}
