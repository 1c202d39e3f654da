//! SELECT planning for find and history retrieval.

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::event::{EventType, TIMELINE_ID, TIME_STAMP};
use crate::interfaces::event_store::Result;
use crate::predicate::{
    field, Binding, CompileContext, Expr, PredicateCompiler, PredicateError,
};
use crate::storage::schema::TYPE_COLUMN;
use crate::storage::StoreOptions;

use super::SqlDialect;

/// A compiled SELECT plus the conditions left for in-memory evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    /// SQL with `@N` placeholders.
    pub sql: String,
    pub bindings: Vec<Binding>,
    /// Conjuncts the database cannot evaluate; applied after decoding.
    pub residual: Option<Expr>,
}

/// Plan `SELECT * FROM table WHERE …` for `predicate`.
///
/// Top-level AND operands that need server-side decompression the dialect
/// lacks become the residual; any other compile error fails the plan. In
/// single-table layout the discriminator is always constrained.
pub fn plan_select<D: SqlDialect>(
    table: &str,
    event_type: EventType,
    predicate: &Expr,
    options: &StoreOptions,
) -> Result<SelectPlan> {
    let mut compiler = PredicateCompiler::<D>::new(CompileContext {
        event_type,
        single_table: options.single_table,
        compression: options.compression,
    });

    let mut conditions = Vec::new();
    let mut bindings = Vec::new();
    let mut residual = Vec::new();

    for conjunct in predicate.clone().conjuncts() {
        match compiler.compile(&conjunct) {
            Ok(fragment) => {
                conditions.push(fragment.sql);
                bindings.extend(fragment.bindings);
            }
            Err(PredicateError::DecompressionUnavailable(member)) => {
                debug!(member = %member, "Filtering on compressed member after decoding");
                residual.push(conjunct);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if options.single_table {
        let fragment = compiler.compile_column_eq(TYPE_COLUMN, event_type.type_name());
        conditions.push(fragment.sql);
        bindings.extend(fragment.bindings);
    }

    let mut sql = format!("SELECT * FROM {}", D::quote(table));
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    Ok(SelectPlan {
        sql,
        bindings,
        residual: Expr::all(residual),
    })
}

/// Filter selecting one aggregate's history up to `point_in_time`.
///
/// Events without a timeline are always part of the history; a requested
/// timeline adds its own events on top.
pub fn history_predicate(
    aggregate_id: Uuid,
    point_in_time: DateTime<Utc>,
    aggregate_properties: &[&str],
    timeline_id: Option<Uuid>,
) -> Option<Expr> {
    let aggregate = Expr::any(
        aggregate_properties
            .iter()
            .map(|property| field(property).eq(aggregate_id)),
    )?;

    let timeline = match timeline_id {
        None => field(TIMELINE_ID).is_null(),
        Some(timeline_id) => field(TIMELINE_ID)
            .is_null()
            .or(field(TIMELINE_ID).eq(timeline_id)),
    };

    Some(
        aggregate
            .and(field(TIME_STAMP).le(point_in_time))
            .and(timeline),
    )
}
