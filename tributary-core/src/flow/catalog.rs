//! Declaration catalogs.
//!
//! A catalog holds at most one active declaration per outlet token. It is
//! assembled from base declarations (usually one or more `Dataflow`s) and
//! per-run extra declarations.
//!
//! # Precedence
//!
//! 1. An initial-value declaration shadows any formula for the same token,
//!    whichever set either came from.
//! 2. Otherwise an extra declaration wins over a base declaration.
//! 3. Among declarations of equal rank, the first one declared wins.

use indexmap::map::Entry;
use indexmap::IndexMap;

use super::declaration::Declaration;
use crate::graph::GraphShape;
use crate::token::{TokenId, TokenRef};

/// A named, reusable set of declarations.
pub trait Dataflow {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn declarations(&self) -> Vec<Declaration>;
}

/// A plain `Dataflow` built from a list of declarations.
#[derive(Debug, Clone)]
pub struct Component {
    name: String,
    description: Option<String>,
    declarations: Vec<Declaration>,
}

impl Component {
    pub fn new(name: impl Into<String>, declarations: Vec<Declaration>) -> Self {
        Self {
            name: name.into(),
            description: None,
            declarations,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Dataflow for Component {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn declarations(&self) -> Vec<Declaration> {
        self.declarations.clone()
    }
}

/// Active declarations keyed by outlet token.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: IndexMap<TokenId, Declaration>,
}

impl Catalog {
    pub fn new(base: impl IntoIterator<Item = Declaration>) -> Self {
        let mut catalog = Self::default();
        for declaration in base {
            catalog.offer(declaration);
        }
        catalog
    }

    /// Build a catalog from any number of dataflows.
    pub fn from_dataflows<'a>(dataflows: impl IntoIterator<Item = &'a dyn Dataflow>) -> Self {
        Self::new(dataflows.into_iter().flat_map(|flow| flow.declarations()))
    }

    /// A new catalog where `extra` declarations take precedence over this
    /// one's.
    pub fn with_extra(&self, extra: impl IntoIterator<Item = Declaration>) -> Self {
        let mut catalog = Self::new(extra);
        for declaration in self.entries.values() {
            catalog.offer(declaration.clone());
        }
        catalog
    }

    fn offer(&mut self, declaration: Declaration) {
        match self.entries.entry(declaration.outlet().id()) {
            Entry::Vacant(slot) => {
                slot.insert(declaration);
            }
            Entry::Occupied(mut slot) => {
                if declaration.is_initial() && !slot.get().is_initial() {
                    slot.insert(declaration);
                }
            }
        }
    }

    pub fn get(&self, token: &TokenRef) -> Option<&Declaration> {
        self.entries.get(&token.id())
    }

    /// Active declarations, in first-declared order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Static shape of every declaration, without resolving a target.
    pub fn shape(&self) -> GraphShape {
        GraphShape::from_edges(
            self.entries
                .values()
                .map(|decl| (decl.outlet().clone(), decl.depends_on().to_vec())),
        )
    }

    /// Render the whole catalog as a flow chart, one line per call.
    pub fn render_flow_chart(&self, use_code_name: bool, sink: impl FnMut(&str)) {
        self.shape().render_flow_chart(use_code_name, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::DeclarationKind;
    use crate::token::Token;

    fn formula(outlet: &Token<i32>, dep: &Token<i32>) -> Declaration {
        let input = dep.clone();
        outlet
            .depends_on(&[dep])
            .compute(move |inputs| Ok(*inputs.get(&input)?))
    }

    #[test]
    fn first_base_declaration_wins() {
        let a: Token<i32> = Token::new("a");
        let b: Token<i32> = Token::new("b");
        let c: Token<i32> = Token::new("c");
        let catalog = Catalog::new([formula(&c, &a), formula(&c, &b)]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(c.erased()).unwrap().depends_on(), &[a.erased().clone()]);
    }

    #[test]
    fn extra_overrides_base() {
        let a: Token<i32> = Token::new("a");
        let b: Token<i32> = Token::new("b");
        let c: Token<i32> = Token::new("c");
        let catalog = Catalog::new([formula(&c, &a)]).with_extra([formula(&c, &b)]);
        assert_eq!(catalog.get(c.erased()).unwrap().depends_on(), &[b.erased().clone()]);
    }

    #[test]
    fn first_extra_wins_among_extras() {
        let a: Token<i32> = Token::new("a");
        let b: Token<i32> = Token::new("b");
        let c: Token<i32> = Token::new("c");
        let catalog = Catalog::default().with_extra([formula(&c, &a), formula(&c, &b)]);
        assert_eq!(catalog.get(c.erased()).unwrap().depends_on(), &[a.erased().clone()]);
    }

    #[test]
    fn initial_value_shadows_formula() {
        let a: Token<i32> = Token::new("a");
        let c: Token<i32> = Token::new("c");

        let from_base = Catalog::new([formula(&c, &a), c.initialized_to(9)]);
        assert!(from_base.get(c.erased()).unwrap().is_initial());

        let from_extra = Catalog::new([formula(&c, &a)]).with_extra([c.initialized_to(9)]);
        assert!(from_extra.get(c.erased()).unwrap().is_initial());

        let base_initial = Catalog::new([c.initialized_to(1)]).with_extra([formula(&c, &a)]);
        match base_initial.get(c.erased()).unwrap().kind() {
            DeclarationKind::Initial(v) => assert_eq!(v.downcast_ref::<i32>(), Some(&1)),
            DeclarationKind::Formula { .. } => panic!("formula should be shadowed"),
        }
    }

    #[test]
    fn dataflows_contribute_base_declarations() {
        let a: Token<i32> = Token::new("a");
        let b: Token<i32> = Token::new("b");
        let inputs = Component::new("inputs", vec![a.initialized_to(1)])
            .with_description("fixed inputs");
        let derived = Component::new("derived", vec![formula(&b, &a)]);

        assert_eq!(inputs.description(), Some("fixed inputs"));
        let catalog = Catalog::from_dataflows([&inputs as &dyn Dataflow, &derived]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.declarations().map(|d| d.outlet().code_name()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn renders_without_a_target() {
        let a: Token<i32> = Token::new("a");
        let b: Token<i32> = Token::new("b");
        let catalog = Catalog::new([a.initialized_to(1), formula(&b, &a)]);
        let mut lines = Vec::new();
        catalog.render_flow_chart(true, |line| lines.push(line.to_string()));
        assert_eq!(lines[0], "graph LR");
        assert!(lines.contains(&"    n0[\"a\"]".to_string()));
        assert!(lines.contains(&"    n1[\"b\"]".to_string()));
        assert!(lines.contains(&"    n0 --> n1".to_string()));
    }
}
