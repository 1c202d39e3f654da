//! Predicate-to-SQL compiler.
//!
//! One recursive walk over the filter tree. Every node yields a parenthesized
//! fragment and the bindings of its placeholders; placeholders are numbered
//! `@1, @2, …` across the whole compiler in first-encountered order.

use std::marker::PhantomData;

use crate::event::{EventType, BASE_PROPERTIES};
use crate::mapping::{Property, PropertyKind};
use crate::storage::sql::{JsonMode, SqlDialect};
use crate::storage::schema::PAYLOAD_COLUMN;

use super::{method, BinaryOp, Expr, Literal, PredicateError, UnaryOp};

type Result<T> = std::result::Result<T, PredicateError>;

/// One bound placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub placeholder: String,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
enum FragmentKind {
    Plain,
    Param,
    Column,
    Json { source: String, path: Vec<String> },
}

/// Compiled SQL text plus its ordered bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateFragment {
    pub sql: String,
    pub bindings: Vec<Binding>,
    kind: FragmentKind,
}

impl PredicateFragment {
    fn plain(sql: String, bindings: Vec<Binding>) -> Self {
        Self {
            sql,
            bindings,
            kind: FragmentKind::Plain,
        }
    }
}

/// Where member paths resolve to.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext {
    pub event_type: EventType,
    pub single_table: bool,
    pub compression: bool,
}

enum Resolved {
    Column(Property),
    Json { column: String, path: Vec<String> },
}

/// Compiles filter trees for one table, numbering placeholders globally.
pub struct PredicateCompiler<D: SqlDialect> {
    context: CompileContext,
    shape: Vec<Property>,
    next_param: usize,
    _dialect: PhantomData<D>,
}

impl<D: SqlDialect> PredicateCompiler<D> {
    pub fn new(context: CompileContext) -> Self {
        Self {
            shape: context.event_type.shape(),
            context,
            next_param: 1,
            _dialect: PhantomData,
        }
    }

    /// Compile a boolean condition.
    ///
    /// On failure no placeholder numbers are consumed, so a later call
    /// continues the sequence without gaps.
    pub fn compile(&mut self, expr: &Expr) -> Result<PredicateFragment> {
        let checkpoint = self.next_param;
        let result = self.condition(expr);
        if result.is_err() {
            self.next_param = checkpoint;
        }
        result
    }

    /// `(<column> = @n)` against a fixed text value.
    pub fn compile_column_eq(&mut self, column: &str, value: &str) -> PredicateFragment {
        let param = self.param(Literal::String(value.to_string()));
        PredicateFragment::plain(
            format!("({} = {})", D::quote(column), param.sql),
            param.bindings,
        )
    }

    fn param(&mut self, value: Literal) -> PredicateFragment {
        let placeholder = format!("@{}", self.next_param);
        self.next_param += 1;
        PredicateFragment {
            sql: placeholder.clone(),
            bindings: vec![Binding { placeholder, value }],
            kind: FragmentKind::Param,
        }
    }

    fn condition(&mut self, expr: &Expr) -> Result<PredicateFragment> {
        match expr {
            Expr::Member(path) => {
                if let Resolved::Column(property) = self.resolve(path)? {
                    if property.kind != PropertyKind::Bool {
                        return Err(PredicateError::TypeMismatch(format!(
                            "{} is not boolean and cannot stand alone as a condition",
                            property.name
                        )));
                    }
                }
                self.comparison(BinaryOp::Eq, expr, &Expr::Constant(Literal::Bool(true)))
            }
            Expr::Constant(Literal::Bool(value)) => {
                let param = self.param(Literal::Bool(*value));
                Ok(PredicateFragment::plain(
                    format!("({} = TRUE)", param.sql),
                    param.bindings,
                ))
            }
            Expr::Constant(other) => Err(PredicateError::TypeMismatch(format!(
                "constant {} used as a condition",
                other
            ))),
            Expr::Unary {
                op: UnaryOp::Identity,
                operand,
            } => self.condition(operand),
            _ => self.value(expr),
        }
    }

    fn value(&mut self, expr: &Expr) -> Result<PredicateFragment> {
        match expr {
            Expr::Constant(Literal::List(_)) => Err(PredicateError::TypeMismatch(
                "list constant outside of IN".to_string(),
            )),
            Expr::Constant(value) => Ok(self.param(value.clone())),
            Expr::Member(path) => self.member(path),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    let inner = self.condition(operand)?;
                    Ok(PredicateFragment::plain(
                        format!("(NOT {})", inner.sql),
                        inner.bindings,
                    ))
                }
                UnaryOp::Negate => {
                    let inner = self.value(operand)?;
                    Ok(PredicateFragment::plain(
                        format!("(- {})", inner.sql),
                        inner.bindings,
                    ))
                }
                UnaryOp::Identity => self.value(operand),
            },
            Expr::Binary { op, left, right } if op.is_logical() => {
                let left = self.condition(left)?;
                let right = self.condition(right)?;
                Ok(join(left, op.sql(), right))
            }
            Expr::Binary { op, left, right } if op.is_comparison() => {
                self.comparison(*op, left, right)
            }
            Expr::Binary { op, left, right } => {
                let left = self.value(left)?;
                let right = self.value(right)?;
                Ok(join(left, op.sql(), right))
            }
            Expr::Call {
                method,
                target,
                args,
            } => self.call(method, target, args),
        }
    }

    fn comparison(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<PredicateFragment> {
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            if let Expr::Constant(Literal::Null) = right {
                return self.null_check(op, left);
            }
            if let Expr::Constant(Literal::Null) = left {
                return self.null_check(op, right);
            }
        }

        let mut left_frag = self.operand(left, right)?;
        let mut right_frag = self.operand(right, left)?;
        if is_timestamp_param(&right_frag) && is_json(&left_frag) {
            align_timestamps::<D>(&mut left_frag, &mut right_frag);
        } else if is_timestamp_param(&left_frag) && is_json(&right_frag) {
            align_timestamps::<D>(&mut right_frag, &mut left_frag);
        } else {
            wrap_json_operand::<D>(&left_frag, &mut right_frag);
            wrap_json_operand::<D>(&right_frag, &mut left_frag);
        }

        Ok(join(left_frag, op.sql(), right_frag))
    }

    /// Compile one side of a comparison, coercing enum names to ordinals
    /// when the other side is an enum column.
    fn operand(&mut self, expr: &Expr, peer: &Expr) -> Result<PredicateFragment> {
        if let Expr::Constant(Literal::String(name)) = expr {
            if let Some(property) = self.enum_column(peer)? {
                let ordinal = property.ordinal_of(name).ok_or_else(|| {
                    PredicateError::TypeMismatch(format!(
                        "{} is not a variant of {}",
                        name, property.name
                    ))
                })?;
                return Ok(self.param(Literal::Int(i64::from(ordinal))));
            }
        }
        self.value(expr)
    }

    fn enum_column(&self, expr: &Expr) -> Result<Option<Property>> {
        let Expr::Member(path) = expr else {
            return Ok(None);
        };
        match self.resolve(path)? {
            Resolved::Column(property) if matches!(property.kind, PropertyKind::Enum(_)) => {
                Ok(Some(property))
            }
            _ => Ok(None),
        }
    }

    fn null_check(&mut self, op: BinaryOp, expr: &Expr) -> Result<PredicateFragment> {
        let target = self.value(expr)?;
        let sql = text_mode::<D>(&target);
        let check = if op == BinaryOp::Eq {
            "IS NULL"
        } else {
            "IS NOT NULL"
        };
        Ok(PredicateFragment::plain(
            format!("({} {})", sql, check),
            target.bindings,
        ))
    }

    fn call(&mut self, name: &str, target: &Expr, args: &[Expr]) -> Result<PredicateFragment> {
        let [arg] = args else {
            return Err(PredicateError::UnsupportedCall(format!(
                "{} with {} arguments",
                name,
                args.len()
            )));
        };

        match name {
            method::CONTAINS if matches!(target, Expr::Constant(Literal::List(_))) => {
                self.membership(arg, target)
            }
            method::CONTAINS => self.like(name, target, arg, |p| format!("%{}%", p)),
            method::STARTS_WITH => self.like(name, target, arg, |p| format!("{}%", p)),
            method::ENDS_WITH => self.like(name, target, arg, |p| format!("%{}", p)),
            method::IN => self.membership(target, arg),
            other => Err(PredicateError::UnsupportedCall(other.to_string())),
        }
    }

    fn like(
        &mut self,
        name: &str,
        target: &Expr,
        pattern: &Expr,
        shape: fn(&str) -> String,
    ) -> Result<PredicateFragment> {
        let Expr::Constant(Literal::String(pattern)) = pattern else {
            return Err(PredicateError::NonConstantPattern(name.to_string()));
        };

        let target = self.value(target)?;
        let target_sql = text_mode::<D>(&target);
        let param = self.param(Literal::String(shape(&escape_like(pattern))));

        let mut bindings = target.bindings;
        bindings.extend(param.bindings);
        Ok(PredicateFragment::plain(
            format!("({} LIKE {} ESCAPE '\\')", target_sql, param.sql),
            bindings,
        ))
    }

    fn membership(&mut self, target: &Expr, collection: &Expr) -> Result<PredicateFragment> {
        let Expr::Constant(Literal::List(items)) = collection else {
            return Err(PredicateError::NonConstantCollection);
        };

        let target_frag = self.value(target)?;
        let mut bindings = target_frag.bindings.clone();

        if items.is_empty() {
            return Ok(PredicateFragment::plain(
                format!("({} IN (NULL))", target_frag.sql),
                bindings,
            ));
        }

        let timestamps =
            is_json(&target_frag) && items.iter().all(|i| matches!(i, Literal::DateTime(_)));
        let target_sql = if timestamps {
            D::json_timestamp(&text_mode::<D>(&target_frag))
        } else {
            target_frag.sql.clone()
        };

        let mut placeholders = Vec::with_capacity(items.len());
        for item in items {
            let mut item_frag = self.operand(&Expr::Constant(item.clone()), target)?;
            if timestamps {
                item_frag.sql = D::timestamp_operand(&item_frag.sql);
            } else {
                wrap_json_operand::<D>(&target_frag, &mut item_frag);
            }
            placeholders.push(item_frag.sql);
            bindings.extend(item_frag.bindings);
        }

        Ok(PredicateFragment::plain(
            format!("({} IN ({}))", target_sql, placeholders.join(", ")),
            bindings,
        ))
    }

    fn member(&self, path: &[String]) -> Result<PredicateFragment> {
        match self.resolve(path)? {
            Resolved::Column(property) => Ok(PredicateFragment {
                sql: D::quote(property.name),
                bindings: Vec::new(),
                kind: FragmentKind::Column,
            }),
            Resolved::Json { column, path } => {
                let mut source = D::quote(&column);
                if self.context.compression {
                    source = D::decompress(&source).ok_or_else(|| {
                        PredicateError::DecompressionUnavailable(path.join("."))
                    })?;
                }
                Ok(PredicateFragment {
                    sql: D::json_extract(&source, &path, JsonMode::Value),
                    bindings: Vec::new(),
                    kind: FragmentKind::Json { source, path },
                })
            }
        }
    }

    fn resolve(&self, path: &[String]) -> Result<Resolved> {
        let Some((first, rest)) = path.split_first() else {
            return Err(PredicateError::UnsupportedExpression(
                "empty member path".to_string(),
            ));
        };

        let property = self
            .shape
            .iter()
            .find(|p| p.matches(first))
            .copied()
            .ok_or_else(|| PredicateError::UnknownProperty {
                type_name: self.context.event_type.name().to_string(),
                property: first.clone(),
            })?;

        if self.context.single_table {
            let is_base = BASE_PROPERTIES.iter().any(|p| p.name == property.name);
            if rest.is_empty() && is_base {
                return Ok(Resolved::Column(property));
            }
            let mut json_path = vec![property.name.to_string()];
            json_path.extend(rest.iter().cloned());
            return Ok(Resolved::Json {
                column: PAYLOAD_COLUMN.to_string(),
                path: json_path,
            });
        }

        if rest.is_empty() {
            return Ok(Resolved::Column(property));
        }
        if property.kind != PropertyKind::Json {
            return Err(PredicateError::NotJsonProperty(property.name.to_string()));
        }
        Ok(Resolved::Json {
            column: property.name.to_string(),
            path: rest.to_vec(),
        })
    }
}

fn join(left: PredicateFragment, op: &str, right: PredicateFragment) -> PredicateFragment {
    let mut bindings = left.bindings;
    bindings.extend(right.bindings);
    PredicateFragment::plain(format!("({} {} {})", left.sql, op, right.sql), bindings)
}

/// Parameters compared against extracted JSON get the dialect's JSON wrapper.
fn wrap_json_operand<D: SqlDialect>(other: &PredicateFragment, frag: &mut PredicateFragment) {
    if matches!(other.kind, FragmentKind::Json { .. }) && frag.kind == FragmentKind::Param {
        frag.sql = D::json_operand(&frag.sql);
        frag.kind = FragmentKind::Plain;
    }
}

fn is_json(frag: &PredicateFragment) -> bool {
    matches!(frag.kind, FragmentKind::Json { .. })
}

fn is_timestamp_param(frag: &PredicateFragment) -> bool {
    frag.kind == FragmentKind::Param
        && matches!(
            frag.bindings.as_slice(),
            [Binding {
                value: Literal::DateTime(_),
                ..
            }]
        )
}

/// JSON holds timestamps as RFC 3339 text of varying width, so both sides
/// are brought to the dialect's chronological form instead of comparing JSON.
fn align_timestamps<D: SqlDialect>(json: &mut PredicateFragment, param: &mut PredicateFragment) {
    json.sql = D::json_timestamp(&text_mode::<D>(json));
    json.kind = FragmentKind::Plain;
    param.sql = D::timestamp_operand(&param.sql);
    param.kind = FragmentKind::Plain;
}

fn text_mode<D: SqlDialect>(frag: &PredicateFragment) -> String {
    match &frag.kind {
        FragmentKind::Json { source, path } => D::json_extract(source, path, JsonMode::Text),
        _ => frag.sql.clone(),
    }
}

fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
