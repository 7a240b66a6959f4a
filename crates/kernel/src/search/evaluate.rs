//! Recursive evaluation of nodes and filter trees.

use super::engine::{FunctionCaller, JoinPlan};
use super::error::ValidationError;
use super::expr::{EvalValue, Expression, Predicate, Sources, column_expr};
use super::field::resolve_ref;
use super::functions::{FunctionInput, FunctionRegistry};
use super::operators::{OperatorInput, OperatorRegistry};
use super::types::{
    FieldRef, FieldSpec, FilterSide, FilterTree, FunctionArgs, FunctionNode, JoinSpec, Node,
    Operand, OperatorNode,
};
use crate::model::{FieldHandle, ModelHandle, ModelRegistry, RelationshipDescriptor};

/// Evaluates request nodes against the registries.
#[derive(Clone, Copy)]
pub struct Evaluator<'a> {
    pub models: &'a dyn ModelRegistry,
    pub operators: &'a OperatorRegistry,
    pub functions: &'a FunctionRegistry,
    pub caller: &'a dyn FunctionCaller,
}

impl Evaluator<'_> {
    pub fn eval_field(&self, spec: &FieldSpec) -> Result<Expression, ValidationError> {
        match spec {
            FieldSpec::Ref(reference) => Ok(resolve_ref(self.models, reference)?.into()),
            FieldSpec::Literal(text) => Ok(Expression::literal(text)),
            FieldSpec::Operator(node) => self.eval_operator(node),
            FieldSpec::Function(node) => self.eval_function(node),
        }
    }

    pub fn eval_fields(&self, specs: &[FieldSpec]) -> Result<Vec<Expression>, ValidationError> {
        specs.iter().map(|spec| self.eval_field(spec)).collect()
    }

    pub fn eval_node(&self, node: &Node) -> Result<Expression, ValidationError> {
        match node {
            Node::Operator(node) => self.eval_operator(node),
            Node::Function(node) => self.eval_function(node),
        }
    }

    pub fn eval_operator(&self, node: &OperatorNode) -> Result<Expression, ValidationError> {
        let field = self.eval_field(&node.field)?;
        let value = self.eval_operand(&node.value)?;
        self.operators.apply(OperatorInput {
            alias: &node.op,
            field,
            value,
            param: &node.param,
            models: self.models,
        })
    }

    pub fn eval_function(&self, node: &FunctionNode) -> Result<Expression, ValidationError> {
        let args = match &node.field {
            FunctionArgs::One(spec) => vec![self.eval_field(spec)?],
            FunctionArgs::Many(specs) => self.eval_fields(specs)?,
        };
        self.functions.apply(FunctionInput {
            name: &node.func,
            args,
            param: &node.param,
            caller: self.caller,
        })
    }

    pub fn eval_operand(&self, operand: &Operand) -> Result<EvalValue, ValidationError> {
        match operand {
            Operand::Scalar(scalar) => Ok(EvalValue::Scalar(scalar.clone())),
            Operand::List(items) => Ok(EvalValue::List(
                items
                    .iter()
                    .map(|item| self.eval_operand(item))
                    .collect::<Result<_, _>>()?,
            )),
            Operand::Node(node) => Ok(EvalValue::Expr(self.eval_node(node)?)),
        }
    }

    /// Reduce a filter tree to one predicate.
    ///
    /// Each side contributes zero or one operand; empty sides are the
    /// identity and drop out of the combination.
    pub fn eval_filter(&self, tree: &FilterTree) -> Result<Predicate, ValidationError> {
        let a = self.eval_side(&tree.a)?;
        let b = self.eval_side(&tree.b)?;
        Ok(Predicate::combine(tree.o, [a, b]))
    }

    fn eval_side(&self, side: &FilterSide) -> Result<Predicate, ValidationError> {
        match side {
            FilterSide::Empty => Ok(Predicate::Identity),
            FilterSide::Node(node) => Predicate::from_expression(self.eval_node(node)?),
            FilterSide::Tree(tree) => self.eval_filter(tree),
        }
    }

    /// Resolve a join into the joined model and its ON condition.
    ///
    /// `known` are the models already in the query, in order; they are
    /// searched for a declared relationship when `must` is absent. The
    /// returned sources are the models the condition reads.
    pub fn eval_join(
        &self,
        join: &JoinSpec,
        known: &Sources,
    ) -> Result<(JoinPlan, Sources), ValidationError> {
        let (model, via) = match &join.model {
            FieldRef::Bare(name) => (self.models.resolve_model(name)?, None),
            FieldRef::Qualified {
                direction: None,
                model,
                field,
            } => {
                let base = self.models.resolve_model(model)?;
                let FieldHandle::Relationship { relationship, .. } =
                    self.models.resolve_field(&base, field)?
                else {
                    return Err(ValidationError::InvalidJoin {
                        model: join.model.to_string(),
                        reason: format!("'{field}' is not a relationship"),
                    });
                };
                let target = self.models.resolve_model(&relationship.target)?;
                let condition = related_condition(&base, &relationship, &target);
                (target, Some((condition, base)))
            }
            FieldRef::Qualified { .. } => {
                return Err(ValidationError::InvalidJoin {
                    model: join.model.to_string(),
                    reason: "a join cannot carry a direction marker".to_string(),
                });
            }
        };

        let mut sources = Sources::one(model.clone());
        let must = match &join.must {
            Some(node) => {
                let expression = self.eval_node(node)?;
                sources.merge(&expression.sources);
                Some(expression.operand()?)
            }
            None => None,
        };

        let condition = match (via, must) {
            (Some((via, base)), must) => {
                sources.push(base);
                match must {
                    Some(must) => via.and(must),
                    None => via,
                }
            }
            (None, Some(must)) => must,
            (None, None) => {
                let (condition, other) =
                    infer_condition(&model, known).ok_or_else(|| ValidationError::InvalidJoin {
                        model: model.name().to_string(),
                        reason: "no 'must' condition and no relationship to a model already in the query"
                            .to_string(),
                    })?;
                sources.push(other);
                condition
            }
        };

        Ok((
            JoinPlan {
                model,
                condition,
                kind: join.kind,
            },
            sources,
        ))
    }
}

/// `target.remote = owner.local` for a relationship declared on `owner`.
fn related_condition(
    owner: &ModelHandle,
    relationship: &RelationshipDescriptor,
    target: &ModelHandle,
) -> sea_query::SimpleExpr {
    column_expr(target, &relationship.remote).eq(column_expr(owner, &relationship.local))
}

/// The first relationship between `model` and a known model, in either
/// direction.
fn infer_condition(
    model: &ModelHandle,
    known: &Sources,
) -> Option<(sea_query::SimpleExpr, ModelHandle)> {
    for other in known.iter().filter(|other| *other != model) {
        let outgoing = other
            .descriptor()
            .relationships
            .iter()
            .find(|r| r.target == model.name());
        if let Some(relationship) = outgoing {
            return Some((related_condition(other, relationship, model), other.clone()));
        }
        let incoming = model
            .descriptor()
            .relationships
            .iter()
            .find(|r| r.target == other.name());
        if let Some(relationship) = incoming {
            return Some((related_condition(model, relationship, other), other.clone()));
        }
    }
    None
}
